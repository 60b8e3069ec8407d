//! Shared fixtures for service-level integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mcp_langbase_evals::config::Config;
use mcp_langbase_evals::error::{AppError, AppResult};
use mcp_langbase_evals::provider::{
    EvaluationContext, LlmProvider, NarrativeInput, ResultSummary, StubProvider,
};
use mcp_langbase_evals::schema::{JudgeVerdict, MetricProposal, MetricSpec};
use mcp_langbase_evals::server::AppState;
use mcp_langbase_evals::storage::{
    ExampleType, MetricDefinition, MetricDesignIteration, SqliteStorage, Storage, TestCase,
};

/// Provider with canned answers, recording what it was asked.
#[derive(Default)]
pub struct ScriptedProvider {
    pub proposal: Vec<MetricSpec>,
    pub judge_scores: HashMap<String, f64>,
    pub failing_judges: HashSet<String>,
    pub fail_gap_analysis: bool,
    pub fail_narrative: bool,
    pub narrations: Mutex<Vec<NarrativeInput>>,
    pub judged: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proposing(mut self, specs: Vec<MetricSpec>) -> Self {
        self.proposal = specs;
        self
    }

    pub fn scoring(mut self, metric: &str, score: f64) -> Self {
        self.judge_scores.insert(metric.to_string(), score);
        self
    }

    pub fn failing_judge(mut self, metric: &str) -> Self {
        self.failing_judges.insert(metric.to_string());
        self
    }

    pub fn failing_gap_analysis(mut self) -> Self {
        self.fail_gap_analysis = true;
        self
    }

    pub fn failing_narrative(mut self) -> Self {
        self.fail_narrative = true;
        self
    }
}

fn capability_error(message: &str) -> AppError {
    AppError::Capability {
        message: message.to_string(),
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn propose_metrics(
        &self,
        _user_intent: &str,
        _context: &EvaluationContext,
    ) -> AppResult<MetricProposal> {
        Ok(MetricProposal {
            gap_analysis: "scripted gap".to_string(),
            proposed_metrics: self.proposal.clone(),
            reasoning_summary: String::new(),
        })
    }

    async fn judge(
        &self,
        metric: &MetricDefinition,
        candidate: &str,
        _context: &EvaluationContext,
    ) -> AppResult<JudgeVerdict> {
        self.judged.lock().unwrap().push(candidate.to_string());
        if self.failing_judges.contains(&metric.name) {
            return Err(capability_error("judge offline"));
        }
        Ok(JudgeVerdict {
            score: self.judge_scores.get(&metric.name).copied().unwrap_or(50.0),
            explanation: format!("scripted score for {}", metric.name),
        })
    }

    async fn analyze_results(
        &self,
        _context: &EvaluationContext,
        results: &[ResultSummary],
    ) -> AppResult<String> {
        if self.fail_gap_analysis {
            return Err(capability_error("analysis offline"));
        }
        Ok(format!("scripted analysis of {} results", results.len()))
    }

    async fn narrate(&self, input: &NarrativeInput) -> AppResult<String> {
        if self.fail_narrative {
            return Err(capability_error("narrative offline"));
        }
        self.narrations.lock().unwrap().push(input.clone());
        Ok(format!("scripted story of {} runs", input.history.len()))
    }
}

pub async fn state_with(provider: Arc<dyn LlmProvider>) -> AppState {
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    AppState::new(Config::default(), storage, provider)
}

pub async fn stub_state() -> AppState {
    state_with(Arc::new(StubProvider::new())).await
}

/// A fresh project with one test case.
pub async fn test_case(state: &AppState, name: &str) -> TestCase {
    let project = state.catalog.create_project("Project", None).await.unwrap();
    state
        .catalog
        .create_test_case(&project.id, name, None)
        .await
        .unwrap()
}

pub async fn add_examples(state: &AppState, test_case: &TestCase, examples: &[(ExampleType, &str)]) {
    for (kind, content) in examples {
        state
            .catalog
            .add_example(&test_case.id, content, Some(*kind))
            .await
            .unwrap();
    }
}

/// Record an iteration proposing `specs` and confirm it.
pub async fn confirm_specs(
    state: &AppState,
    test_case: &TestCase,
    specs: Vec<MetricSpec>,
) -> Vec<MetricDefinition> {
    let iteration = MetricDesignIteration::new(&test_case.id, "intent", &specs).unwrap();
    state.storage.create_iteration(&iteration).await.unwrap();
    state
        .design
        .confirm_design(&test_case.id, &iteration.id)
        .await
        .unwrap()
}

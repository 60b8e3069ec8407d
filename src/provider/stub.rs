use async_trait::async_trait;
use tracing::debug;

use super::{EvaluationContext, LlmProvider, NarrativeInput, ResultSummary};
use crate::error::AppResult;
use crate::schema::{JudgeVerdict, MetricProposal, MetricSpec};
use crate::storage::{ExampleType, MetricDefinition};

const STUB_KEYWORDS: [&str; 2] = ["metrics", "active"];

/// Deterministic provider used when no LLM is configured.
///
/// Every answer is a pure function of its inputs, so evaluation results are
/// reproducible across runs.
#[derive(Debug, Clone, Default)]
pub struct StubProvider;

impl StubProvider {
    /// Create a new stub provider
    pub fn new() -> Self {
        Self
    }

    /// Length and keyword heuristic used in place of a judge.
    ///
    /// The reference is the first desired example, else the first example.
    pub fn heuristic_score(candidate: &str, context: &EvaluationContext) -> (f64, f64) {
        let reference = context
            .examples_of(ExampleType::Desired)
            .next()
            .or_else(|| context.examples.first().map(|e| e.content.as_str()));

        let len_ratio = match reference {
            Some(r) if !r.is_empty() => candidate.chars().count() as f64 / r.chars().count() as f64,
            _ => 0.0,
        };

        let len_score = if (0.8..=1.2).contains(&len_ratio) { 50.0 } else { 25.0 };

        let lowered = candidate.to_lowercase();
        let keyword_score = if STUB_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            50.0
        } else {
            10.0
        };

        (f64::clamp(len_score + keyword_score, 0.0, 100.0), len_ratio)
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn propose_metrics(
        &self,
        user_intent: &str,
        context: &EvaluationContext,
    ) -> AppResult<MetricProposal> {
        debug!(test_case = %context.test_case_name, intent = %user_intent, "Stub proposal");

        Ok(MetricProposal {
            gap_analysis: "No gaps found in stub mode.".to_string(),
            reasoning_summary: "Stable deterministic reasoning.".to_string(),
            proposed_metrics: vec![
                MetricSpec::judge(
                    "Style similarity",
                    "Assesses if the tone matches the brand guidelines.",
                    "Rate stylistically from 0 to 100.",
                ),
                MetricSpec::judge(
                    "Instruction adherence",
                    "Checks if all constraints in the prompt were followed.",
                    "Score adherence from 0 to 100.",
                ),
                MetricSpec::rule(
                    "Policy violations count",
                    "Counts the number of policy violations in the response.",
                    "count_violations(text)",
                ),
            ],
        })
    }

    async fn judge(
        &self,
        metric: &MetricDefinition,
        candidate: &str,
        context: &EvaluationContext,
    ) -> AppResult<JudgeVerdict> {
        let (score, ratio) = Self::heuristic_score(candidate, context);
        debug!(metric = %metric.name, score, "Stub judgment");

        Ok(JudgeVerdict {
            score,
            explanation: format!(
                "Stub judged '{}' on length ratio {:.2} and keywords.",
                metric.name, ratio
            ),
        })
    }

    async fn analyze_results(
        &self,
        context: &EvaluationContext,
        results: &[ResultSummary],
    ) -> AppResult<String> {
        Ok(format!(
            "Stub Gap Analysis for {}: Performance is consistent with expectations based on {} metrics.",
            context.test_case_name,
            results.len()
        ))
    }

    async fn narrate(&self, _input: &NarrativeInput) -> AppResult<String> {
        Ok("Deterministic narrative based on stub data.".to_string())
    }
}

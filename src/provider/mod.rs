//! LLM capability providers.
//!
//! The services depend only on [`LlmProvider`]. [`StubProvider`] gives
//! deterministic answers for offline use and tests; [`LangbaseProvider`]
//! delegates each capability to its own Langbase pipe.

mod langbase;
mod stub;

pub use langbase::LangbaseProvider;
pub use stub::StubProvider;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{Config, LlmMode};
use crate::error::AppResult;
use crate::schema::{JudgeVerdict, MetricProposal};
use crate::storage::{Example, ExampleType, MetricDefinition, TestCase};

/// An example output as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    /// Desired or current.
    pub example_type: ExampleType,
    /// Example text.
    pub content: String,
}

/// Test case context handed to every capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Test case name.
    pub test_case_name: String,
    /// Test case description.
    pub description: Option<String>,
    /// Stored user intent.
    pub user_intent: Option<String>,
    /// All examples, in creation order.
    pub examples: Vec<LabeledExample>,
}

impl EvaluationContext {
    /// Build the context from a test case and its examples
    pub fn new(test_case: &TestCase, examples: &[Example]) -> Self {
        Self {
            test_case_name: test_case.name.clone(),
            description: test_case.description.clone(),
            user_intent: test_case.user_intent.clone(),
            examples: examples
                .iter()
                .map(|e| LabeledExample {
                    example_type: e.example_type,
                    content: e.content.clone(),
                })
                .collect(),
        }
    }

    /// Examples of the given type
    pub fn examples_of(&self, example_type: ExampleType) -> impl Iterator<Item = &str> {
        self.examples
            .iter()
            .filter(move |e| e.example_type == example_type)
            .map(|e| e.content.as_str())
    }

    /// Plain-text rendering used in prompts
    pub fn render(&self) -> String {
        let mut out = format!("Test Case: {}\n", self.test_case_name);
        if let Some(description) = &self.description {
            out.push_str(&format!("Description: {}\n", description));
        }
        if let Some(intent) = &self.user_intent {
            out.push_str(&format!("User Intent: {}\n", intent));
        }
        for (label, example_type) in [
            ("Desired Output Examples (target)", ExampleType::Desired),
            ("Current Output Examples (baseline)", ExampleType::Current),
        ] {
            let items: Vec<&str> = self.examples_of(example_type).collect();
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{}:\n", label));
            for item in items {
                out.push_str(&format!("---\n{}\n", item));
            }
        }
        out
    }
}

/// One metric result as passed to gap analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Metric name.
    pub metric_name: String,
    /// Score.
    pub score: f64,
    /// Short justification.
    pub explanation: String,
}

/// One run of a report's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    /// Run version.
    pub version: i64,
    /// Aggregated score rounded to one decimal, 0 when absent.
    pub score: f64,
    /// Gap analysis text or a placeholder.
    pub gap_analysis: String,
}

/// Input of the narrative capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeInput {
    /// Test case name.
    pub test_case_name: String,
    /// Selected runs, oldest first.
    pub history: Vec<RunHistoryEntry>,
    /// Model to narrate with instead of the configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// The LLM capabilities the evaluation services rely on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// One-time setup before serving, e.g. creating remote pipes.
    async fn prepare(&self) -> AppResult<()> {
        Ok(())
    }

    /// Propose a metric set for the intent.
    async fn propose_metrics(
        &self,
        user_intent: &str,
        context: &EvaluationContext,
    ) -> AppResult<MetricProposal>;

    /// Score `candidate` against one metric.
    async fn judge(
        &self,
        metric: &MetricDefinition,
        candidate: &str,
        context: &EvaluationContext,
    ) -> AppResult<JudgeVerdict>;

    /// Summarize what a run's results say about the test case.
    async fn analyze_results(
        &self,
        context: &EvaluationContext,
        results: &[ResultSummary],
    ) -> AppResult<String>;

    /// Write the narrative of a report.
    async fn narrate(&self, input: &NarrativeInput) -> AppResult<String>;
}

/// Build the provider selected by `LLM_MODE`.
pub fn build_provider(config: &Config) -> AppResult<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.llm.mode {
        LlmMode::Stub => Arc::new(StubProvider::new()),
        LlmMode::Langbase => Arc::new(LangbaseProvider::new(config)?),
    };

    info!(provider = provider.name(), "LLM provider selected");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context() -> EvaluationContext {
        let tc = TestCase::new("p-1", "Refund reply").with_description("Customer asks for refund");
        let examples = vec![
            Example::new(&tc.id, "We have refunded you.", ExampleType::Desired),
            Example::new(&tc.id, "No.", ExampleType::Current),
        ];
        EvaluationContext::new(&tc, &examples)
    }

    #[test]
    fn test_context_examples_of() {
        let ctx = context();
        assert_eq!(
            ctx.examples_of(ExampleType::Desired).collect::<Vec<_>>(),
            vec!["We have refunded you."]
        );
        assert_eq!(ctx.examples_of(ExampleType::Current).count(), 1);
    }

    #[test]
    fn test_context_render_labels_examples() {
        let text = context().render();
        assert!(text.starts_with("Test Case: Refund reply\n"));
        assert!(text.contains("Description: Customer asks for refund"));
        assert!(!text.contains("User Intent"));
        assert!(text.contains("Desired Output Examples (target):\n---\nWe have refunded you."));
        assert!(text.contains("Current Output Examples (baseline):\n---\nNo."));
    }

    #[test]
    fn test_build_provider_stub() {
        let config = Config::default();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "stub");
    }
}

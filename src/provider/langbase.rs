use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::{EvaluationContext, LlmProvider, NarrativeInput, ResultSummary};
use crate::config::{Config, PipeConfig};
use crate::error::{AppError, AppResult};
use crate::langbase::{LangbaseClient, Message, PipeRequest};
use crate::prompts::{GAP_ANALYSIS_PIPE, JUDGE_PIPE, METRIC_DESIGN_PIPE, NARRATIVE_PIPE};
use crate::schema::{JudgeVerdict, MetricProposal};
use crate::storage::MetricDefinition;

/// Provider backed by one Langbase pipe per capability.
#[derive(Clone)]
pub struct LangbaseProvider {
    client: LangbaseClient,
    pipes: PipeConfig,
    model: String,
}

impl LangbaseProvider {
    /// Create a provider from configuration
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = LangbaseClient::new(&config.langbase, config.request.clone())?;
        Ok(Self::with_client(client, config.pipes.clone(), config.llm.model.clone()))
    }

    /// Create a provider around an existing client
    pub fn with_client(client: LangbaseClient, pipes: PipeConfig, model: String) -> Self {
        Self {
            client,
            pipes,
            model,
        }
    }

    async fn run_text(
        &self,
        pipe: &str,
        user_content: String,
        model: Option<&str>,
    ) -> AppResult<String> {
        let mut request = PipeRequest::new(pipe, vec![Message::user(user_content)]);
        if let Some(model) = model {
            request = request.with_model(model);
        }
        let response = self.client.call_pipe(request).await?;

        let text = response.text();
        if text.is_empty() {
            return Err(AppError::Capability {
                message: format!("Pipe {} returned an empty completion", pipe),
            });
        }
        Ok(text.to_string())
    }
}

fn judge_request(metric: &MetricDefinition, candidate: &str, context: &EvaluationContext) -> String {
    let scale = match (metric.scale_min, metric.scale_max) {
        (Some(min), Some(max)) => format!("{} ({} to {})", metric.scale_type, min, max),
        _ => metric.scale_type.to_string(),
    };

    format!(
        "Metric Name: {}\nMetric Description: {}\nEvaluation Prompt: {}\nScale: {}\n\nContext:\n{}\nEvaluate this text:\n---\n{}\n---",
        metric.name,
        metric.description,
        metric.evaluation_prompt.as_deref().unwrap_or_default(),
        scale,
        context.render(),
        candidate
    )
}

#[async_trait]
impl LlmProvider for LangbaseProvider {
    fn name(&self) -> &'static str {
        "langbase"
    }

    async fn prepare(&self) -> AppResult<()> {
        for (name, template) in [
            (&self.pipes.metric_design, &METRIC_DESIGN_PIPE),
            (&self.pipes.judge, &JUDGE_PIPE),
            (&self.pipes.gap_analysis, &GAP_ANALYSIS_PIPE),
            (&self.pipes.narrative, &NARRATIVE_PIPE),
        ] {
            self.client.ensure_pipe(name, template, &self.model).await?;
        }
        info!(model = %self.model, "Langbase pipes ready");
        Ok(())
    }

    async fn propose_metrics(
        &self,
        user_intent: &str,
        context: &EvaluationContext,
    ) -> AppResult<MetricProposal> {
        let user_content = format!(
            "User Intent: {}\n{}\nAnalyze the gap between the desired and current examples given the user intent, and design metrics that measure this gap.",
            user_intent,
            context.render()
        );

        let response = self
            .client
            .call_pipe(PipeRequest::new(
                &self.pipes.metric_design,
                vec![Message::user(user_content)],
            ))
            .await?;

        let proposal: MetricProposal = response.parse_json()?;
        debug!(count = proposal.proposed_metrics.len(), "Metric proposal parsed");
        Ok(proposal)
    }

    async fn judge(
        &self,
        metric: &MetricDefinition,
        candidate: &str,
        context: &EvaluationContext,
    ) -> AppResult<JudgeVerdict> {
        let response = self
            .client
            .call_pipe(PipeRequest::new(
                &self.pipes.judge,
                vec![Message::user(judge_request(metric, candidate, context))],
            ))
            .await?;

        let verdict: JudgeVerdict = response.parse_json()?;
        if !verdict.score.is_finite() {
            return Err(AppError::Capability {
                message: format!("Judge returned a non-finite score for {}", metric.name),
            });
        }
        Ok(verdict)
    }

    async fn analyze_results(
        &self,
        context: &EvaluationContext,
        results: &[ResultSummary],
    ) -> AppResult<String> {
        let payload = serde_json::to_string_pretty(results).map_err(|e| AppError::Internal {
            message: format!("Failed to serialize results: {}", e),
        })?;

        self.run_text(
            &self.pipes.gap_analysis,
            format!("Test Case: {}\nResults: {}", context.test_case_name, payload),
            None,
        )
        .await
    }

    async fn narrate(&self, input: &NarrativeInput) -> AppResult<String> {
        let payload = json!({
            "test_case_name": input.test_case_name,
            "history": input.history,
        });

        if let Some(model) = &input.model {
            debug!(model = %model, "Narrating with model override");
        }
        self.run_text(
            &self.pipes.narrative,
            format!("Report Data: {}", payload),
            input.model.as_deref(),
        )
        .await
    }
}

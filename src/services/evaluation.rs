//! Evaluation engine and run versioning.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::core::ServiceCore;
use super::scoring::{aggregate, needs_judge, score_judged, score_rule, ScoredMetric};
use crate::error::{AppError, AppResult};
use crate::provider::{EvaluationContext, ResultSummary};
use crate::storage::{EvaluationRun, ExampleType, MetricDefinition, MetricResult, Storage, TestCase};

/// A scored run together with the warnings raised while scoring it.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    /// The run; unsaved for previews.
    pub run: EvaluationRun,
    /// Non-fatal scoring notes, e.g. excluded metrics.
    pub warnings: Vec<String>,
}

/// Scores candidate outputs against confirmed metrics and commits runs.
#[derive(Clone)]
pub struct EvaluationService {
    core: ServiceCore,
    blocklist: Vec<String>,
}

impl EvaluationService {
    /// Create a new evaluation service.
    pub fn new(core: ServiceCore, blocklist: Vec<String>) -> Self {
        Self { core, blocklist }
    }

    /// Score outputs without persisting anything.
    pub async fn preview(&self, test_case_id: &str, outputs: &[String]) -> AppResult<EvaluationOutcome> {
        let (test_case, metrics) = self.load_scoring_inputs(test_case_id).await?;
        self.evaluate(&test_case, &metrics, outputs).await
    }

    /// Score outputs and persist the result as the next version.
    pub async fn commit(
        &self,
        test_case_id: &str,
        outputs: &[String],
        notes: Option<String>,
    ) -> AppResult<EvaluationOutcome> {
        let (test_case, metrics) = self.load_scoring_inputs(test_case_id).await?;
        let mut outcome = self.evaluate(&test_case, &metrics, outputs).await?;
        outcome.run.notes = notes;

        let storage = self.core.storage();
        let version = match storage.commit_run(&outcome.run).await {
            Ok(version) => version,
            Err(e) if e.is_duplicate_key() => {
                warn!(test_case_id = %test_case_id, error = %e, "Version collision, retrying commit");
                storage.commit_run(&outcome.run).await?
            }
            Err(e) => return Err(e.into()),
        };
        outcome.run.version_number = version;

        info!(
            test_case_id = %test_case_id,
            run_id = %outcome.run.id,
            version = version,
            aggregated_score = ?outcome.run.aggregated_score,
            "Evaluation committed"
        );
        Ok(outcome)
    }

    /// Runs of a test case, newest version first.
    pub async fn list_runs(&self, test_case_id: &str) -> AppResult<Vec<EvaluationRun>> {
        self.core.require_test_case(test_case_id).await?;
        Ok(self.core.storage().list_runs(test_case_id).await?)
    }

    /// A run with its results.
    pub async fn get_run(&self, run_id: &str) -> AppResult<EvaluationRun> {
        self.core
            .storage()
            .get_run(run_id)
            .await?
            .ok_or_else(|| AppError::not_found("EvaluationRun", run_id))
    }

    async fn load_scoring_inputs(&self, test_case_id: &str) -> AppResult<(TestCase, Vec<MetricDefinition>)> {
        let test_case = self.core.require_test_case(test_case_id).await?;
        let metrics = self.core.storage().list_active_metrics(test_case_id).await?;
        if metrics.is_empty() {
            return Err(AppError::conflict(
                "No active metrics for this test case; confirm a metric design first",
            ));
        }
        Ok((test_case, metrics))
    }

    /// Score `outputs[0]` against every metric and aggregate.
    ///
    /// Judge failures are absorbed per metric; a failed gap analysis
    /// degrades to a placeholder text.
    async fn evaluate(
        &self,
        test_case: &TestCase,
        metrics: &[MetricDefinition],
        outputs: &[String],
    ) -> AppResult<EvaluationOutcome> {
        let start = Instant::now();
        let candidate = outputs.first().map(String::as_str).unwrap_or_default();
        if outputs.len() > 1 {
            debug!(ignored = outputs.len() - 1, "Only the first output is scored");
        }

        let context = self.core.context_for(test_case).await?;
        let desired: Vec<&str> = context.examples_of(ExampleType::Desired).collect();

        let mut scored: Vec<ScoredMetric> = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let result = if needs_judge(metric) {
                let verdict = self
                    .core
                    .provider()
                    .judge(metric, candidate, &context)
                    .await
                    .map_err(|e| {
                        warn!(metric = %metric.name, error = %e, "Judge failed, scoring 0");
                        e.to_string()
                    });
                score_judged(metric, verdict)
            } else {
                score_rule(metric, candidate, &desired, &self.blocklist)
            };
            scored.push(result);
        }

        let aggregated_score = aggregate(&scored);
        let warnings: Vec<String> = scored.iter().filter_map(|s| s.warning.clone()).collect();

        let mut run = EvaluationRun::new(&test_case.id);
        run.aggregated_score = aggregated_score;
        run.metric_results = metrics
            .iter()
            .zip(&scored)
            .map(|(metric, s)| {
                MetricResult::new(&run.id, metric, s.score, s.explanation.clone())
                    .with_reasoning(s.explanation.clone())
                    .with_raw_json(s.raw.to_string())
            })
            .collect();

        run.gap_analysis = Some(self.gap_analysis(&context, &run.metric_results).await);

        debug!(
            test_case_id = %test_case.id,
            metrics = metrics.len(),
            latency_ms = start.elapsed().as_millis(),
            "Evaluation scored"
        );

        Ok(EvaluationOutcome { run, warnings })
    }

    async fn gap_analysis(&self, context: &EvaluationContext, results: &[MetricResult]) -> String {
        let summaries: Vec<ResultSummary> = results
            .iter()
            .map(|r| ResultSummary {
                metric_name: r.metric_name.clone(),
                score: r.score,
                explanation: r.explanation.clone(),
            })
            .collect();

        match self.core.provider().analyze_results(context, &summaries).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Gap analysis failed, using placeholder");
                format!("Gap analysis unavailable: {}", e)
            }
        }
    }
}

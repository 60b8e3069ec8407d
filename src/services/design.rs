//! Metric design lifecycle: propose, review, confirm.
//!
//! A test case moves from no metrics, through any number of proposed
//! iterations, to a confirmed metric set. Confirmation is terminal.

use chrono::Utc;
use tracing::{info, warn};

use super::core::{require_text, ServiceCore};
use crate::error::{AppError, AppResult};
use crate::schema::{validate_all, MetricSpec};
use crate::storage::{MetricDefinition, MetricDesignIteration, Storage, TestCase};

/// Drives the propose/confirm cycle of a test case's metrics.
#[derive(Clone)]
pub struct DesignService {
    core: ServiceCore,
}

impl DesignService {
    /// Create a new design service.
    pub fn new(core: ServiceCore) -> Self {
        Self { core }
    }

    /// Ask the provider for a metric proposal and record it as a new
    /// iteration.
    pub async fn start_design(
        &self,
        test_case_id: &str,
        user_intent: &str,
        feedback: Option<String>,
    ) -> AppResult<MetricDesignIteration> {
        require_text("user_intent", user_intent)?;
        let user_intent = user_intent.trim();

        let mut test_case = self.core.require_test_case(test_case_id).await?;
        self.ensure_unlocked(&test_case).await?;

        test_case.user_intent = Some(user_intent.to_string());
        let context = self.core.context_for(&test_case).await?;

        let proposal = self
            .core
            .provider()
            .propose_metrics(user_intent, &context)
            .await?;
        let specs = validated_proposal(proposal.proposed_metrics)?;

        let mut iteration = MetricDesignIteration::new(test_case_id, user_intent, &specs)
            .map_err(|e| AppError::Internal {
                message: format!("Failed to serialize proposal: {}", e),
            })?
            .with_gap_analysis(proposal.gap_analysis);
        if !proposal.reasoning_summary.trim().is_empty() {
            iteration = iteration.with_reasoning_summary(proposal.reasoning_summary);
        }
        iteration.feedback = feedback;

        let storage = self.core.storage();
        let number = match storage.create_iteration(&iteration).await {
            Ok(n) => n,
            Err(e) if e.is_duplicate_key() => {
                warn!(test_case_id = %test_case_id, "Iteration number collision, retrying");
                storage.create_iteration(&iteration).await?
            }
            Err(e) => return Err(e.into()),
        };
        iteration.iteration_number = number;

        info!(
            test_case_id = %test_case_id,
            iteration = number,
            proposed = specs.len(),
            "Metric design iteration proposed"
        );
        Ok(iteration)
    }

    /// Lock the metric set proposed by `iteration_id`.
    pub async fn confirm_design(
        &self,
        test_case_id: &str,
        iteration_id: &str,
    ) -> AppResult<Vec<MetricDefinition>> {
        let test_case = self.core.require_test_case(test_case_id).await?;
        self.ensure_unlocked(&test_case).await?;

        let iteration = self
            .core
            .storage()
            .get_iteration(iteration_id)
            .await?
            .filter(|it| it.test_case_id == test_case_id)
            .ok_or_else(|| AppError::not_found("MetricDesignIteration", iteration_id))?;

        if iteration.is_confirmed() {
            return Err(AppError::conflict("Iteration already confirmed"));
        }

        let specs = iteration
            .proposed_metrics()
            .map_err(|e| AppError::invalid("llm_proposed_metrics", e.to_string()))?;
        let specs = validated_proposal(specs)?;

        let now = Utc::now();
        let definitions: Vec<MetricDefinition> = specs
            .into_iter()
            .map(|spec| {
                let mut def = MetricDefinition::from_spec(test_case_id, spec);
                def.created_at = now;
                def
            })
            .collect();

        self.core
            .storage()
            .confirm_metrics(test_case_id, iteration_id, &definitions, now)
            .await?;

        info!(
            test_case_id = %test_case_id,
            iteration_id = %iteration_id,
            metrics = definitions.len(),
            "Metric design confirmed"
        );
        Ok(definitions)
    }

    /// Iterations of a test case by number.
    pub async fn list_iterations(&self, test_case_id: &str) -> AppResult<Vec<MetricDesignIteration>> {
        self.core.require_test_case(test_case_id).await?;
        Ok(self.core.storage().list_iterations(test_case_id).await?)
    }

    /// Active metrics of a test case in confirmation order.
    pub async fn list_metrics(&self, test_case_id: &str) -> AppResult<Vec<MetricDefinition>> {
        self.core.require_test_case(test_case_id).await?;
        Ok(self.core.storage().list_active_metrics(test_case_id).await?)
    }

    async fn ensure_unlocked(&self, test_case: &TestCase) -> AppResult<()> {
        if test_case.metrics_locked_at.is_some()
            || self.core.storage().count_metrics(&test_case.id).await? > 0
        {
            return Err(AppError::conflict("Metrics already confirmed for this test case"));
        }
        Ok(())
    }
}

fn validated_proposal(specs: Vec<MetricSpec>) -> AppResult<Vec<MetricSpec>> {
    if specs.is_empty() {
        return Err(AppError::invalid(
            "proposed_metrics",
            "must contain at least one metric",
        ));
    }
    Ok(validate_all(specs)?)
}

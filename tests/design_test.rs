//! Metric design lifecycle tests: propose, iterate, confirm, lock.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;

use common::{confirm_specs, state_with, stub_state, test_case, ScriptedProvider};
use mcp_langbase_evals::config::Config;
use mcp_langbase_evals::error::{AppError, AppResult};
use mcp_langbase_evals::provider::{
    EvaluationContext, LlmProvider, NarrativeInput, ResultSummary, StubProvider,
};
use mcp_langbase_evals::schema::{JudgeVerdict, MetricProposal, MetricSpec, MetricType, ScaleType};
use mcp_langbase_evals::server::AppState;
use mcp_langbase_evals::storage::{
    MetricDefinition, MetricDesignIteration, Project, SqliteStorage, Storage, TestCase,
};

/// Confirms a metric set behind the caller's back while proposing.
struct ConfirmingProvider {
    storage: SqliteStorage,
    test_case_id: String,
}

#[async_trait]
impl LlmProvider for ConfirmingProvider {
    fn name(&self) -> &'static str {
        "confirming"
    }

    async fn propose_metrics(
        &self,
        user_intent: &str,
        context: &EvaluationContext,
    ) -> AppResult<MetricProposal> {
        let specs = vec![MetricSpec::judge("Tone", "Friendly", "Rate it")];
        let iteration = MetricDesignIteration::new(&self.test_case_id, "first intent", &specs)
            .map_err(|e| AppError::Internal {
                message: e.to_string(),
            })?;
        self.storage.create_iteration(&iteration).await?;
        let metrics: Vec<MetricDefinition> = specs
            .into_iter()
            .map(|s| MetricDefinition::from_spec(&self.test_case_id, s))
            .collect();
        self.storage
            .confirm_metrics(&self.test_case_id, &iteration.id, &metrics, Utc::now())
            .await?;

        StubProvider::new().propose_metrics(user_intent, context).await
    }

    async fn judge(
        &self,
        metric: &MetricDefinition,
        candidate: &str,
        context: &EvaluationContext,
    ) -> AppResult<JudgeVerdict> {
        StubProvider::new().judge(metric, candidate, context).await
    }

    async fn analyze_results(
        &self,
        context: &EvaluationContext,
        results: &[ResultSummary],
    ) -> AppResult<String> {
        StubProvider::new().analyze_results(context, results).await
    }

    async fn narrate(&self, input: &NarrativeInput) -> AppResult<String> {
        StubProvider::new().narrate(input).await
    }
}

#[tokio::test]
async fn test_start_design_records_iteration() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;

    let iteration = state
        .design
        .start_design(&tc.id, "  Friendly and brief  ", None)
        .await
        .unwrap();

    assert_eq!(iteration.iteration_number, 1);
    assert_eq!(iteration.user_intent, "Friendly and brief");
    assert_eq!(iteration.gap_analysis.as_deref(), Some("No gaps found in stub mode."));

    let specs = iteration.proposed_metrics().unwrap();
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Style similarity", "Instruction adherence", "Policy violations count"]
    );

    let stored = state.catalog.get_test_case(&tc.id).await.unwrap();
    assert_eq!(stored.test_case.user_intent.as_deref(), Some("Friendly and brief"));
    assert!(stored.metrics.is_empty());
}

#[tokio::test]
async fn test_iterations_number_sequentially_with_feedback() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;

    state.design.start_design(&tc.id, "v1", None).await.unwrap();
    let second = state
        .design
        .start_design(&tc.id, "v2", Some("Drop the style metric".to_string()))
        .await
        .unwrap();

    assert_eq!(second.iteration_number, 2);
    let listed = state.design.list_iterations(&tc.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].feedback.as_deref(), Some("Drop the style metric"));
    assert_eq!(listed[1].user_intent, "v2");
}

#[tokio::test]
async fn test_confirm_locks_metrics() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    let iteration = state.design.start_design(&tc.id, "intent", None).await.unwrap();

    let metrics = state
        .design
        .confirm_design(&tc.id, &iteration.id)
        .await
        .unwrap();
    assert_eq!(metrics.len(), 3);
    assert_eq!(metrics[2].metric_type, MetricType::Deterministic);
    assert_eq!(metrics[2].scale_type, ScaleType::Unbounded);

    let active = state.design.list_metrics(&tc.id).await.unwrap();
    assert_eq!(active.len(), 3);
    assert!(active.iter().all(|m| m.is_active));

    let detail = state.catalog.get_test_case(&tc.id).await.unwrap();
    assert!(detail.test_case.metrics_locked_at.is_some());
}

#[tokio::test]
async fn test_everything_after_confirmation_conflicts() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    let first = state.design.start_design(&tc.id, "intent", None).await.unwrap();
    let second = state.design.start_design(&tc.id, "intent", None).await.unwrap();
    state.design.confirm_design(&tc.id, &first.id).await.unwrap();

    let err = state.design.start_design(&tc.id, "again", None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    let err = state.design.confirm_design(&tc.id, &second.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    let err = state.design.confirm_design(&tc.id, &first.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    assert_eq!(state.design.list_metrics(&tc.id).await.unwrap().len(), 3);
    assert_eq!(state.design.list_iterations(&tc.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_confirmations_lock_once() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    let a = state.design.start_design(&tc.id, "intent", None).await.unwrap();
    let b = state.design.start_design(&tc.id, "intent", None).await.unwrap();

    let (ra, rb) = tokio::join!(
        state.design.confirm_design(&tc.id, &a.id),
        state.design.confirm_design(&tc.id, &b.id)
    );

    assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1);
    assert_eq!(state.storage.count_metrics(&tc.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_confirm_rejects_foreign_iteration() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    let other = test_case(&state, "Farewell").await;
    let iteration = state.design.start_design(&other.id, "intent", None).await.unwrap();

    let err = state
        .design
        .confirm_design(&tc.id, &iteration.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn test_invalid_stored_proposal_confirms_nothing() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;

    let specs = vec![
        MetricSpec::judge("Tone", "Friendly", "Rate it"),
        MetricSpec::judge("Depth", "Thorough", "Rate it")
            .with_scale(ScaleType::Bounded, Some(2.0), Some(10.0)),
    ];
    let iteration = MetricDesignIteration::new(&tc.id, "intent", &specs).unwrap();
    state.storage.create_iteration(&iteration).await.unwrap();

    let err = state
        .design
        .confirm_design(&tc.id, &iteration.id)
        .await
        .unwrap_err();
    match err {
        AppError::InvalidInput { field, .. } => assert_eq!(field, "proposed_metrics[1].scale_min"),
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(state.storage.count_metrics(&tc.id).await.unwrap(), 0);
    let detail = state.catalog.get_test_case(&tc.id).await.unwrap();
    assert!(detail.test_case.metrics_locked_at.is_none());
}

#[tokio::test]
async fn test_invalid_llm_proposal_is_rejected() {
    let provider = ScriptedProvider::new().proposing(vec![MetricSpec::rule("Count", "n", "  ")]);
    let state = state_with(Arc::new(provider)).await;
    let tc = test_case(&state, "Greeting").await;

    let err = state.design.start_design(&tc.id, "intent", None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput { .. }));
    assert!(state.design.list_iterations(&tc.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unbounded_bounds_are_normalized() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;

    let metrics = confirm_specs(
        &state,
        &tc,
        vec![MetricSpec::rule("Count", "n", "count_violations(text)").with_scale(
            ScaleType::Unbounded,
            Some(0.0),
            Some(100.0),
        )],
    )
    .await;

    assert_eq!(metrics[0].scale_min, None);
    assert_eq!(metrics[0].scale_max, None);
}

#[tokio::test]
async fn test_design_requires_existing_test_case() {
    let state = stub_state().await;
    let err = state
        .design
        .start_design("missing", "intent", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn test_confirmation_during_proposal_blocks_the_iteration() {
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let project = Project::new("Project");
    storage.create_project(&project).await.unwrap();
    let tc = TestCase::new(&project.id, "Greeting");
    storage.create_test_case(&tc).await.unwrap();

    let provider = ConfirmingProvider {
        storage: storage.clone(),
        test_case_id: tc.id.clone(),
    };
    let state = AppState::new(Config::default(), storage, Arc::new(provider));

    let err = state
        .design
        .start_design(&tc.id, "late intent", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    let iterations = state.design.list_iterations(&tc.id).await.unwrap();
    assert_eq!(iterations.len(), 1);
    assert!(iterations[0].is_confirmed());
    assert_eq!(state.design.list_metrics(&tc.id).await.unwrap().len(), 1);

    let detail = state.catalog.get_test_case(&tc.id).await.unwrap();
    assert_eq!(detail.test_case.user_intent.as_deref(), Some("first intent"));
}

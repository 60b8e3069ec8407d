//! Evaluation engine tests: scoring, aggregation, run versioning.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::{add_examples, confirm_specs, state_with, stub_state, test_case, ScriptedProvider};
use mcp_langbase_evals::config::{Config, DatabaseConfig};
use mcp_langbase_evals::error::AppError;
use mcp_langbase_evals::provider::StubProvider;
use mcp_langbase_evals::schema::{MetricSpec, ScaleType, TargetDirection};
use mcp_langbase_evals::server::AppState;
use mcp_langbase_evals::storage::{ExampleType, RunStatus, SqliteStorage, Storage};

fn outputs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_stub_judge_scores_matching_length() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    add_examples(&state, &tc, &[(ExampleType::Desired, "Desired baseline content")]).await;
    confirm_specs(&state, &tc, vec![MetricSpec::judge("Tone", "Friendly", "Rate it")]).await;

    let outcome = state
        .evaluation
        .commit(&tc.id, &outputs(&["Desired baseline content"]), None)
        .await
        .unwrap();

    assert_eq!(outcome.run.metric_results[0].score, 60.0);
    assert_eq!(outcome.run.aggregated_score, Some(60.0));
    assert_eq!(outcome.run.version_number, 1);
    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_lower_is_better_count_inverts_and_contributes() {
    let state = stub_state().await;
    let tc = test_case(&state, "Pitch").await;
    confirm_specs(
        &state,
        &tc,
        vec![MetricSpec::rule("Violations", "Blocked phrases", "count_violations(text)")],
    )
    .await;

    let outcome = state
        .evaluation
        .preview(&tc.id, &outputs(&["Returns are guaranteed."]))
        .await
        .unwrap();

    assert_eq!(outcome.run.metric_results[0].score, 0.0);
    assert_eq!(outcome.run.aggregated_score, Some(0.0));
    assert!(outcome.warnings.is_empty());

    let raw: serde_json::Value =
        serde_json::from_str(&outcome.run.metric_results[0].raw_json).unwrap();
    assert_eq!(raw["violations"], 1);
}

#[tokio::test]
async fn test_raw_unbounded_count_is_excluded_with_warning() {
    let state = stub_state().await;
    let tc = test_case(&state, "Pitch").await;
    confirm_specs(
        &state,
        &tc,
        vec![MetricSpec::rule("Mentions", "Blocked phrases", "count_violations(text)")
            .with_direction(TargetDirection::HigherIsBetter)],
    )
    .await;

    let outcome = state
        .evaluation
        .preview(&tc.id, &outputs(&["100% risk-free and guaranteed"]))
        .await
        .unwrap();

    assert_eq!(outcome.run.metric_results[0].score, 3.0);
    assert_eq!(outcome.run.aggregated_score, None);
    assert_eq!(
        outcome.warnings,
        vec!["Metric 'Mentions' excluded from aggregate (unbounded).".to_string()]
    );
}

#[tokio::test]
async fn test_aggregate_is_mean_of_contributing_scores() {
    let provider = ScriptedProvider::new()
        .scoring("Tone", 80.0)
        .scoring("Clarity", 40.0)
        .scoring("Open-ended", 900.0);
    let state = state_with(Arc::new(provider)).await;
    let tc = test_case(&state, "Greeting").await;
    confirm_specs(
        &state,
        &tc,
        vec![
            MetricSpec::judge("Tone", "Friendly", "Rate it"),
            MetricSpec::judge("Clarity", "Clear", "Rate it"),
            MetricSpec::judge("Open-ended", "Anything", "Rate it")
                .with_scale(ScaleType::Unbounded, None, None),
        ],
    )
    .await;

    let outcome = state.evaluation.preview(&tc.id, &outputs(&["Hi"])).await.unwrap();

    assert_eq!(outcome.run.aggregated_score, Some(60.0));
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("Open-ended"));
}

#[tokio::test]
async fn test_judge_failure_scores_zero() {
    let provider = ScriptedProvider::new()
        .scoring("Clarity", 90.0)
        .failing_judge("Tone");
    let state = state_with(Arc::new(provider)).await;
    let tc = test_case(&state, "Greeting").await;
    confirm_specs(
        &state,
        &tc,
        vec![
            MetricSpec::judge("Tone", "Friendly", "Rate it"),
            MetricSpec::judge("Clarity", "Clear", "Rate it"),
        ],
    )
    .await;

    let outcome = state
        .evaluation
        .commit(&tc.id, &outputs(&["Hi"]), None)
        .await
        .unwrap();

    let tone = &outcome.run.metric_results[0];
    assert_eq!(tone.metric_name, "Tone");
    assert_eq!(tone.score, 0.0);
    assert!(tone.explanation.starts_with("Error during LLM judgment:"));
    assert!(tone.explanation.contains("judge offline"));
    assert_eq!(outcome.run.aggregated_score, Some(45.0));
}

#[tokio::test]
async fn test_committed_results_carry_reasoning() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    confirm_specs(
        &state,
        &tc,
        vec![
            MetricSpec::judge("Tone", "Friendly", "Rate it"),
            MetricSpec::rule("Violations", "Count banned words", "count_violations(text)")
                .with_scale(ScaleType::Unbounded, None, None),
        ],
    )
    .await;

    let outcome = state
        .evaluation
        .commit(&tc.id, &outputs(&["Hello there"]), None)
        .await
        .unwrap();

    let fetched = state.evaluation.get_run(&outcome.run.id).await.unwrap();
    assert_eq!(fetched.metric_results.len(), 2);
    for result in &fetched.metric_results {
        assert!(!result.explanation.is_empty());
        assert_eq!(result.reasoning.as_deref(), Some(result.explanation.as_str()));
    }
}

#[tokio::test]
async fn test_gap_analysis_failure_is_not_fatal() {
    let provider = ScriptedProvider::new().failing_gap_analysis();
    let state = state_with(Arc::new(provider)).await;
    let tc = test_case(&state, "Greeting").await;
    confirm_specs(&state, &tc, vec![MetricSpec::judge("Tone", "Friendly", "Rate it")]).await;

    let outcome = state
        .evaluation
        .commit(&tc.id, &outputs(&["Hi"]), None)
        .await
        .unwrap();

    let gap = outcome.run.gap_analysis.unwrap();
    assert!(gap.starts_with("Gap analysis unavailable:"));
    assert!(gap.contains("analysis offline"));
}

#[tokio::test]
async fn test_commits_version_sequentially() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    confirm_specs(&state, &tc, vec![MetricSpec::judge("Tone", "Friendly", "Rate it")]).await;

    let first = state
        .evaluation
        .commit(&tc.id, &outputs(&["one"]), Some("baseline".to_string()))
        .await
        .unwrap();
    let second = state
        .evaluation
        .commit(&tc.id, &outputs(&["two"]), None)
        .await
        .unwrap();

    assert_eq!(first.run.version_number, 1);
    assert_eq!(second.run.version_number, 2);

    let runs = state.evaluation.list_runs(&tc.id).await.unwrap();
    let versions: Vec<i64> = runs.iter().map(|r| r.version_number).collect();
    assert_eq!(versions, vec![2, 1]);

    let fetched = state.evaluation.get_run(&first.run.id).await.unwrap();
    assert_eq!(fetched.notes.as_deref(), Some("baseline"));
    assert_eq!(fetched.metric_results.len(), 1);
}

#[tokio::test]
async fn test_preview_persists_nothing() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    confirm_specs(&state, &tc, vec![MetricSpec::judge("Tone", "Friendly", "Rate it")]).await;

    let preview = state.evaluation.preview(&tc.id, &outputs(&["Hi"])).await.unwrap();
    assert_eq!(preview.run.version_number, 0);
    assert!(state.evaluation.list_runs(&tc.id).await.unwrap().is_empty());

    let committed = state
        .evaluation
        .commit(&tc.id, &outputs(&["Hi"]), None)
        .await
        .unwrap();
    assert_eq!(committed.run.version_number, 1);
}

#[tokio::test]
async fn test_evaluation_requires_confirmed_metrics() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;

    let err = state
        .evaluation
        .commit(&tc.id, &outputs(&["Hi"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    let err = state
        .evaluation
        .preview("missing", &outputs(&["Hi"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn test_only_first_output_is_scored() {
    let provider = Arc::new(ScriptedProvider::new());
    let state = state_with(provider.clone()).await;
    let tc = test_case(&state, "Greeting").await;
    confirm_specs(&state, &tc, vec![MetricSpec::judge("Tone", "Friendly", "Rate it")]).await;

    state
        .evaluation
        .preview(&tc.id, &outputs(&["first", "second", "third"]))
        .await
        .unwrap();

    assert_eq!(*provider.judged.lock().unwrap(), vec!["first".to_string()]);
}

#[tokio::test]
async fn test_missing_output_scores_empty_candidate() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    add_examples(&state, &tc, &[(ExampleType::Desired, "Desired baseline content")]).await;
    confirm_specs(&state, &tc, vec![MetricSpec::judge("Tone", "Friendly", "Rate it")]).await;

    let outcome = state.evaluation.preview(&tc.id, &[]).await.unwrap();
    assert_eq!(outcome.run.aggregated_score, Some(35.0));
}

#[tokio::test]
async fn test_length_metric_uses_desired_examples() {
    let state = stub_state().await;
    let tc = test_case(&state, "Greeting").await;
    add_examples(
        &state,
        &tc,
        &[
            (ExampleType::Desired, "abcdefghij"),
            (ExampleType::Current, "a much longer rambling answer"),
        ],
    )
    .await;
    confirm_specs(
        &state,
        &tc,
        vec![MetricSpec::rule("Length", "Close to desired length", "length_range")
            .with_scale(ScaleType::Bounded, Some(0.0), Some(100.0))
            .with_direction(TargetDirection::HigherIsBetter)],
    )
    .await;

    let within = state
        .evaluation
        .preview(&tc.id, &outputs(&["0123456789"]))
        .await
        .unwrap();
    assert_eq!(within.run.metric_results[0].score, 100.0);

    let outside = state
        .evaluation
        .preview(&tc.id, &outputs(&["way too long for this metric"]))
        .await
        .unwrap();
    assert_eq!(outside.run.metric_results[0].score, 0.0);
}

#[tokio::test]
async fn test_boolean_rule_is_pass_fail() {
    let state = stub_state().await;
    let tc = test_case(&state, "Pitch").await;
    confirm_specs(
        &state,
        &tc,
        vec![MetricSpec::rule("Clean", "No blocked phrases", "no_violations(text)")
            .with_scale(ScaleType::Boolean, None, None)
            .with_direction(TargetDirection::HigherIsBetter)],
    )
    .await;

    let clean = state.evaluation.preview(&tc.id, &outputs(&["Hello"])).await.unwrap();
    assert_eq!(clean.run.aggregated_score, Some(1.0));

    let dirty = state
        .evaluation
        .preview(&tc.id, &outputs(&["It's RISK-FREE"]))
        .await
        .unwrap();
    assert_eq!(dirty.run.aggregated_score, Some(0.0));
}

#[tokio::test]
async fn test_concurrent_commits_get_distinct_versions() {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::new(&DatabaseConfig {
        path: dir.path().join("evals.db"),
        max_connections: 4,
    })
    .await
    .unwrap();
    let state = AppState::new(Config::default(), storage, Arc::new(StubProvider::new()));
    let tc = test_case(&state, "Greeting").await;
    confirm_specs(&state, &tc, vec![MetricSpec::judge("Tone", "Friendly", "Rate it")]).await;

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let state = state.clone();
            let id = tc.id.clone();
            tokio::spawn(async move {
                state
                    .evaluation
                    .commit(&id, &[format!("output {i}")], None)
                    .await
            })
        })
        .collect();

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap().run.version_number);
    }
    versions.sort();
    assert_eq!(versions, (1..=6).collect::<Vec<i64>>());
    assert_eq!(state.storage.list_runs(&tc.id).await.unwrap().len(), 6);
}

//! Integration tests for SQLite storage
//!
//! Exercise the Storage trait against in-memory and file-backed databases.

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use mcp_langbase_evals::config::DatabaseConfig;
use mcp_langbase_evals::error::StorageError;
use mcp_langbase_evals::schema::MetricSpec;
use mcp_langbase_evals::storage::{
    AggregateDirection, EvaluationRun, Example, ExampleType, MetricDefinition,
    MetricDesignIteration, MetricResult, Project, Report, ReportContent, ReportScope,
    SqliteStorage, Storage, TestCase, TestCaseReportContent,
};

async fn setup() -> (SqliteStorage, TestCase) {
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let project = Project::new("Support bot");
    storage.create_project(&project).await.unwrap();
    let test_case = TestCase::new(&project.id, "Refund request");
    storage.create_test_case(&test_case).await.unwrap();
    (storage, test_case)
}

fn specs() -> Vec<MetricSpec> {
    vec![
        MetricSpec::judge("Empathy", "Acknowledges frustration", "Rate empathy"),
        MetricSpec::rule("Forbidden phrases", "No promises", "count_violations(text)"),
    ]
}

async fn confirm(storage: &SqliteStorage, test_case: &TestCase) -> Vec<MetricDefinition> {
    let iteration = MetricDesignIteration::new(&test_case.id, "be kind", &specs()).unwrap();
    storage.create_iteration(&iteration).await.unwrap();

    let metrics: Vec<MetricDefinition> = specs()
        .into_iter()
        .map(|s| MetricDefinition::from_spec(&test_case.id, s))
        .collect();
    storage
        .confirm_metrics(&test_case.id, &iteration.id, &metrics, Utc::now())
        .await
        .unwrap();
    metrics
}

fn run_with(test_case: &TestCase, metrics: &[MetricDefinition], score: f64) -> EvaluationRun {
    let mut run = EvaluationRun::new(&test_case.id);
    run.aggregated_score = Some(score);
    run.metric_results = metrics
        .iter()
        .map(|m| {
            MetricResult::new(&run.id, m, score, "ok").with_raw_json(r#"{"violations":0}"#)
        })
        .collect();
    run
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn test_project_and_test_case_round_trip() {
    let (storage, test_case) = setup().await;

    let fetched = storage.get_test_case(&test_case.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Refund request");
    assert!(fetched.metrics_locked_at.is_none());
    assert!(fetched.user_intent.is_none());

    let iteration = MetricDesignIteration::new(&test_case.id, "calm tone", &specs()).unwrap();
    storage.create_iteration(&iteration).await.unwrap();
    let fetched = storage.get_test_case(&test_case.id).await.unwrap().unwrap();
    assert_eq!(fetched.user_intent.as_deref(), Some("calm tone"));

    let listed = storage.list_test_cases(&test_case.project_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(storage.get_project("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_examples_keep_type_and_order() {
    let (storage, test_case) = setup().await;

    for (content, kind) in [
        ("first", ExampleType::Desired),
        ("second", ExampleType::Current),
        ("third", ExampleType::Desired),
    ] {
        storage
            .create_example(&Example::new(&test_case.id, content, kind))
            .await
            .unwrap();
    }

    let examples = storage.list_examples(&test_case.id).await.unwrap();
    let contents: Vec<&str> = examples.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    assert_eq!(examples[1].example_type, ExampleType::Current);
}

#[tokio::test]
async fn test_example_requires_existing_test_case() {
    let (storage, _) = setup().await;
    let orphan = Example::new("missing", "text", ExampleType::Desired);
    assert!(storage.create_example(&orphan).await.is_err());
}

#[tokio::test]
async fn test_delete_test_case_cascades() {
    let (storage, test_case) = setup().await;
    storage
        .create_example(&Example::new(&test_case.id, "x", ExampleType::Desired))
        .await
        .unwrap();
    let metrics = confirm(&storage, &test_case).await;
    let run = run_with(&test_case, &metrics, 50.0);
    storage.commit_run(&run).await.unwrap();

    storage.delete_test_case(&test_case.id).await.unwrap();

    assert!(storage.get_test_case(&test_case.id).await.unwrap().is_none());
    assert!(storage.list_examples(&test_case.id).await.unwrap().is_empty());
    assert_eq!(storage.count_metrics(&test_case.id).await.unwrap(), 0);
    assert!(storage.get_run(&run.id).await.unwrap().is_none());

    let err = storage.delete_test_case(&test_case.id).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

// ============================================================================
// Metric design
// ============================================================================

#[tokio::test]
async fn test_iteration_numbers_increase() {
    let (storage, test_case) = setup().await;

    let mut numbers = Vec::new();
    for _ in 0..3 {
        let iteration = MetricDesignIteration::new(&test_case.id, "intent", &specs()).unwrap();
        numbers.push(storage.create_iteration(&iteration).await.unwrap());
    }
    assert_eq!(numbers, vec![1, 2, 3]);

    let listed = storage.list_iterations(&test_case.id).await.unwrap();
    let listed: Vec<i64> = listed.iter().map(|i| i.iteration_number).collect();
    assert_eq!(listed, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_iteration_stores_proposal_document() {
    let (storage, test_case) = setup().await;
    let iteration = MetricDesignIteration::new(&test_case.id, "intent", &specs())
        .unwrap()
        .with_gap_analysis("too curt");
    storage.create_iteration(&iteration).await.unwrap();

    let fetched = storage.get_iteration(&iteration.id).await.unwrap().unwrap();
    assert_eq!(fetched.proposed_metrics().unwrap(), specs());
    assert_eq!(fetched.gap_analysis.as_deref(), Some("too curt"));
    assert!(!fetched.is_confirmed());
}

#[tokio::test]
async fn test_confirm_locks_test_case() {
    let (storage, test_case) = setup().await;
    let metrics = confirm(&storage, &test_case).await;

    let active = storage.list_active_metrics(&test_case.id).await.unwrap();
    let names: Vec<&str> = active.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Empathy", "Forbidden phrases"]);
    assert_eq!(active[0].id, metrics[0].id);

    let locked = storage.get_test_case(&test_case.id).await.unwrap().unwrap();
    assert!(locked.metrics_locked_at.is_some());

    let iterations = storage.list_iterations(&test_case.id).await.unwrap();
    assert!(iterations[0].is_confirmed());
}

#[tokio::test]
async fn test_second_confirmation_writes_nothing() {
    let (storage, test_case) = setup().await;
    let other = MetricDesignIteration::new(&test_case.id, "again", &specs()).unwrap();
    storage.create_iteration(&other).await.unwrap();
    confirm(&storage, &test_case).await;
    let extra = vec![MetricDefinition::from_spec(
        &test_case.id,
        MetricSpec::judge("Brevity", "Short", "Rate brevity"),
    )];

    let err = storage
        .confirm_metrics(&test_case.id, &other.id, &extra, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::MetricsLocked { .. }));

    assert_eq!(storage.count_metrics(&test_case.id).await.unwrap(), 2);
    let other = storage.get_iteration(&other.id).await.unwrap().unwrap();
    assert!(!other.is_confirmed());
}

#[tokio::test]
async fn test_iteration_after_lock_is_rejected() {
    let (storage, test_case) = setup().await;
    confirm(&storage, &test_case).await;

    let late = MetricDesignIteration::new(&test_case.id, "late intent", &specs()).unwrap();
    let err = storage.create_iteration(&late).await.unwrap_err();
    assert!(matches!(err, StorageError::MetricsLocked { .. }));

    assert_eq!(storage.list_iterations(&test_case.id).await.unwrap().len(), 1);
    assert!(storage.get_iteration(&late.id).await.unwrap().is_none());
    let fetched = storage.get_test_case(&test_case.id).await.unwrap().unwrap();
    assert_eq!(fetched.user_intent.as_deref(), Some("be kind"));
}

#[tokio::test]
async fn test_confirm_foreign_iteration_rolls_back() {
    let (storage, test_case) = setup().await;
    let metrics = vec![MetricDefinition::from_spec(
        &test_case.id,
        MetricSpec::judge("Brevity", "Short", "Rate brevity"),
    )];

    let err = storage
        .confirm_metrics(&test_case.id, "no-such-iteration", &metrics, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::IterationConfirmed { .. }));

    let fetched = storage.get_test_case(&test_case.id).await.unwrap().unwrap();
    assert!(fetched.metrics_locked_at.is_none());
    assert_eq!(storage.count_metrics(&test_case.id).await.unwrap(), 0);
}

// ============================================================================
// Runs
// ============================================================================

#[tokio::test]
async fn test_commit_assigns_versions() {
    let (storage, test_case) = setup().await;
    let metrics = confirm(&storage, &test_case).await;

    for (i, score) in [40.0, 55.0, 70.0].into_iter().enumerate() {
        let version = storage
            .commit_run(&run_with(&test_case, &metrics, score))
            .await
            .unwrap();
        assert_eq!(version, i as i64 + 1);
    }

    let runs = storage.list_runs(&test_case.id).await.unwrap();
    let versions: Vec<i64> = runs.iter().map(|r| r.version_number).collect();
    assert_eq!(versions, vec![3, 2, 1]);

    let latest = storage.latest_run(&test_case.id).await.unwrap().unwrap();
    assert_eq!(latest.version_number, 3);
    assert_eq!(latest.aggregated_score, Some(70.0));
}

#[tokio::test]
async fn test_run_results_round_trip() {
    let (storage, test_case) = setup().await;
    let metrics = confirm(&storage, &test_case).await;
    let mut run = run_with(&test_case, &metrics, 80.0);
    run.notes = Some("prompt v2".to_string());
    run.gap_analysis = Some("closer".to_string());
    storage.commit_run(&run).await.unwrap();

    let fetched = storage.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(fetched.notes.as_deref(), Some("prompt v2"));
    assert_eq!(fetched.metric_results.len(), 2);
    assert_eq!(fetched.metric_results[0].metric_name, "Empathy");
    assert_eq!(fetched.metric_results[1].raw_json, r#"{"violations":0}"#);
    assert_eq!(
        fetched.result_for(&metrics[1].id).unwrap().metric_name,
        "Forbidden phrases"
    );
}

#[tokio::test]
async fn test_run_range_queries() {
    let (storage, test_case) = setup().await;
    let metrics = confirm(&storage, &test_case).await;
    let base = Utc::now() - Duration::days(10);

    for day in 0..4 {
        let mut run = run_with(&test_case, &metrics, 10.0 * day as f64);
        run.created_at = base + Duration::days(day);
        storage.commit_run(&run).await.unwrap();
    }

    let by_version = storage
        .list_runs_by_version(&test_case.id, 2, 3)
        .await
        .unwrap();
    let versions: Vec<i64> = by_version.iter().map(|r| r.version_number).collect();
    assert_eq!(versions, vec![2, 3]);

    let window = storage
        .list_runs_in_window(&test_case.id, base, base + Duration::days(1))
        .await
        .unwrap();
    let versions: Vec<i64> = window.iter().map(|r| r.version_number).collect();
    assert_eq!(versions, vec![1, 2]);

    let empty = storage
        .list_runs_in_window(&test_case.id, base - Duration::days(5), base - Duration::days(1))
        .await
        .unwrap();
    assert!(empty.is_empty());
}

// ============================================================================
// Reports
// ============================================================================

#[tokio::test]
async fn test_report_content_round_trip() {
    let (storage, test_case) = setup().await;
    let content = ReportContent::TestCase(TestCaseReportContent {
        test_case_id: test_case.id.clone(),
        test_case_name: test_case.name.clone(),
        metric_comparison: vec![],
        aggregated_score_delta: 12.5,
        aggregated_score_direction: AggregateDirection::Improved,
    });
    let now = Utc::now();
    let report = Report::new(
        ReportScope::TestCase,
        &test_case.id,
        now - Duration::days(1),
        now,
        content.clone(),
        "Better",
    );
    storage.create_report(&report).await.unwrap();

    let fetched = storage.get_report(&report.id).await.unwrap().unwrap();
    assert_eq!(fetched.content, content);
    assert_eq!(fetched.summary_text, "Better");

    let listed = storage
        .list_reports(ReportScope::TestCase, &test_case.id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(storage
        .list_reports(ReportScope::Project, &test_case.id)
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// File-backed database
// ============================================================================

fn file_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("nested").join("evals.db"),
        max_connections: 5,
    }
}

#[tokio::test]
async fn test_file_database_persists() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);

    let project = Project::new("Durable");
    {
        let storage = SqliteStorage::new(&config).await.unwrap();
        storage.create_project(&project).await.unwrap();
        storage.pool().close().await;
    }

    let reopened = SqliteStorage::new(&config).await.unwrap();
    let fetched = reopened.get_project(&project.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Durable");
}

#[tokio::test]
async fn test_concurrent_commits_get_distinct_versions() {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::new(&file_config(&dir)).await.unwrap();
    let project = Project::new("P");
    storage.create_project(&project).await.unwrap();
    let test_case = TestCase::new(&project.id, "T");
    storage.create_test_case(&test_case).await.unwrap();
    let metrics = confirm(&storage, &test_case).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let storage = storage.clone();
        let run = run_with(&test_case, &metrics, i as f64);
        handles.push(tokio::spawn(async move { storage.commit_run(&run).await }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<i64>>());
}

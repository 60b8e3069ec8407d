//! Unit tests for storage record types and builders.
//!
//! Covers constructors, enum string forms, and the serialized shape of
//! report content.

use super::*;
use crate::schema::MetricSpec;
use chrono::TimeZone;
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// Timestamp tests
// ============================================================================

#[test]
fn test_timestamp_format_is_fixed_width() {
    let a = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
    let b = a + chrono::Duration::microseconds(7);

    let fa = format_timestamp(&a);
    let fb = format_timestamp(&b);
    assert_eq!(fa, "2025-01-02T03:04:05.000000Z");
    assert_eq!(fa.len(), fb.len());
    assert!(fa < fb);
}

#[test]
fn test_timestamp_round_trip() {
    let ts = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
    assert_eq!(parse_timestamp(&format_timestamp(&ts)), ts);
}

// ============================================================================
// Project / test case tests
// ============================================================================

#[test]
fn test_project_new() {
    let project = Project::new("Support bot").with_description("tier 1");
    assert!(!project.id.is_empty());
    assert_eq!(project.name, "Support bot");
    assert_eq!(project.description.as_deref(), Some("tier 1"));
}

#[test]
fn test_test_case_new_is_unlocked() {
    let tc = TestCase::new("proj-1", "Refund reply");
    assert_eq!(tc.project_id, "proj-1");
    assert!(tc.user_intent.is_none());
    assert!(tc.metrics_locked_at.is_none());
}

// ============================================================================
// Enum string forms
// ============================================================================

#[test]
fn test_example_type_parse() {
    assert_eq!("desired".parse::<ExampleType>(), Ok(ExampleType::Desired));
    assert_eq!("CURRENT".parse::<ExampleType>(), Ok(ExampleType::Current));
    assert!("other".parse::<ExampleType>().is_err());
    assert_eq!(ExampleType::Current.to_string(), "current");
}

#[test]
fn test_run_status_parse() {
    assert_eq!("completed".parse::<RunStatus>(), Ok(RunStatus::Completed));
    assert_eq!(RunStatus::Pending.to_string(), "pending");
}

#[test]
fn test_report_scope_parse() {
    assert_eq!("test_case".parse::<ReportScope>(), Ok(ReportScope::TestCase));
    assert_eq!(ReportScope::Project.to_string(), "project");
    assert!("portfolio".parse::<ReportScope>().is_err());
}

// ============================================================================
// Metric definition tests
// ============================================================================

#[test]
fn test_metric_definition_spec_round_trip() {
    let spec = MetricSpec::judge("Tone", "Friendly tone", "Rate friendliness 0-100");
    let def = MetricDefinition::from_spec("tc-1", spec.clone());
    assert!(def.is_active);
    assert_eq!(def.test_case_id, "tc-1");
    assert_eq!(def.to_spec(), spec);
}

#[test]
fn test_iteration_proposed_metrics() {
    let specs = vec![
        MetricSpec::judge("Tone", "Friendly tone", "Rate friendliness"),
        MetricSpec::rule("Violations", "Blocked phrases", "count_violations(text)"),
    ];
    let iteration = MetricDesignIteration::new("tc-1", "be friendly", &specs)
        .unwrap()
        .with_gap_analysis("too terse")
        .with_reasoning_summary("two metrics");

    assert_eq!(iteration.iteration_number, 0);
    assert!(!iteration.is_confirmed());
    assert_eq!(iteration.proposed_metrics().unwrap(), specs);
    assert_eq!(iteration.gap_analysis.as_deref(), Some("too terse"));
}

// ============================================================================
// Run / result tests
// ============================================================================

#[test]
fn test_run_result_lookup() {
    let metric = MetricDefinition::from_spec(
        "tc-1",
        MetricSpec::judge("Tone", "Friendly tone", "Rate friendliness"),
    );
    let mut run = EvaluationRun::new("tc-1");
    run.metric_results
        .push(MetricResult::new(&run.id, &metric, 75.0, "ok").with_reasoning("long"));

    let result = run.result_for(&metric.id).unwrap();
    assert_eq!(result.score, 75.0);
    assert_eq!(result.metric_name, "Tone");
    assert_eq!(result.raw_json, "{}");
    assert!(run.result_for("missing").is_none());
}

// ============================================================================
// Report content tests
// ============================================================================

#[test]
fn test_test_case_content_shape() {
    let content = ReportContent::TestCase(TestCaseReportContent {
        test_case_id: "tc-1".to_string(),
        test_case_name: "Refund reply".to_string(),
        metric_comparison: vec![MetricDelta {
            metric_name: "Tone".to_string(),
            previous_score: 50.0,
            current_score: 80.0,
            delta: 30.0,
            direction: ScoreDirection::Increased,
        }],
        aggregated_score_delta: 30.0,
        aggregated_score_direction: AggregateDirection::Improved,
    });

    let value = serde_json::to_value(&content).unwrap();
    assert_eq!(value["aggregated_score_direction"], json!("improved"));
    assert_eq!(value["metric_comparison"][0]["direction"], json!("increased"));

    let back: ReportContent = serde_json::from_value(value).unwrap();
    assert_eq!(back, content);
}

#[test]
fn test_project_content_omits_missing_delta() {
    let content = ReportContent::Project(ProjectReportContent {
        improving_count: 1,
        regressing_count: 0,
        stable_count: 0,
        test_cases: vec![
            ProjectTestCaseEntry {
                test_case_id: "tc-1".to_string(),
                name: "A".to_string(),
                status: TestCaseTrend::Improved,
                delta: Some(0.5),
            },
            ProjectTestCaseEntry {
                test_case_id: "tc-2".to_string(),
                name: "B".to_string(),
                status: TestCaseTrend::InsufficientData,
                delta: None,
            },
        ],
    });

    let value = serde_json::to_value(&content).unwrap();
    assert_eq!(value["test_cases"][1]["status"], json!("insufficient_data"));
    assert!(value["test_cases"][1].get("delta").is_none());

    let back: ReportContent = serde_json::from_value(value).unwrap();
    assert_eq!(back, content);
}

//! Storage layer for evaluation persistence.
//!
//! This module provides SQLite-based storage for projects, test cases,
//! examples, metric definitions, design iterations, evaluation runs and
//! reports.

mod sqlite;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::schema::{MetricSpec, MetricType, ScaleType, TargetDirection};

/// Format a timestamp in the fixed-width form used for every stored column.
///
/// Microsecond precision with a `Z` suffix keeps lexical and chronological
/// order identical, which the range queries rely on.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// A group of related test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// When the project was created.
    pub created_at: DateTime<Utc>,
}

/// A unit of LLM behavior under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique test case identifier.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// Optional description of the prompt/context.
    pub description: Option<String>,
    /// Intent captured during metric design.
    pub user_intent: Option<String>,
    /// When the test case was created.
    pub created_at: DateTime<Utc>,
    /// When the metric set was confirmed; set once.
    pub metrics_locked_at: Option<DateTime<Utc>>,
}

/// Role of an example output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleType {
    /// What the output should look like.
    #[default]
    Desired,
    /// What the output currently looks like.
    Current,
}

impl std::fmt::Display for ExampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExampleType::Desired => write!(f, "desired"),
            ExampleType::Current => write!(f, "current"),
        }
    }
}

impl std::str::FromStr for ExampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desired" => Ok(ExampleType::Desired),
            "current" => Ok(ExampleType::Current),
            _ => Err(format!("Unknown example type: {}", s)),
        }
    }
}

/// An immutable example output attached to a test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    /// Unique example identifier.
    pub id: String,
    /// Owning test case.
    pub test_case_id: String,
    /// Plain-text content.
    pub content: String,
    /// Desired or current.
    pub example_type: ExampleType,
    /// When the example was created.
    pub created_at: DateTime<Utc>,
}

/// A confirmed, immutable scoring rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Unique metric identifier.
    pub id: String,
    /// Owning test case.
    pub test_case_id: String,
    /// Metric name.
    pub name: String,
    /// What the metric measures.
    pub description: String,
    /// Judge or rule based.
    pub metric_type: MetricType,
    /// Score range shape.
    pub scale_type: ScaleType,
    /// Lower bound (bounded scales).
    pub scale_min: Option<f64>,
    /// Upper bound (bounded scales).
    pub scale_max: Option<f64>,
    /// Improvement direction.
    pub target_direction: TargetDirection,
    /// Judge instructions.
    pub evaluation_prompt: Option<String>,
    /// Rule text.
    pub rule_definition: Option<String>,
    /// Whether the metric participates in evaluations.
    pub is_active: bool,
    /// When the metric was confirmed.
    pub created_at: DateTime<Utc>,
}

/// One propose/review cycle of metric design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDesignIteration {
    /// Unique iteration identifier.
    pub id: String,
    /// Owning test case.
    pub test_case_id: String,
    /// 1-based, assigned by the store.
    pub iteration_number: i64,
    /// Intent the proposal was generated for.
    pub user_intent: String,
    /// Serialized `Vec<MetricSpec>` document.
    pub llm_proposed_metrics: String,
    /// Gap analysis returned with the proposal.
    pub gap_analysis: Option<String>,
    /// Reasoning summary returned with the proposal.
    pub reasoning_summary: Option<String>,
    /// Reviewer feedback.
    pub feedback: Option<String>,
    /// When the iteration was proposed.
    pub created_at: DateTime<Utc>,
    /// When the iteration was confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of an evaluation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Not yet scored.
    Pending,
    /// Scored and persisted.
    #[default]
    Completed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "completed" => Ok(RunStatus::Completed),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// One versioned scoring pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Unique run identifier.
    pub id: String,
    /// Owning test case.
    pub test_case_id: String,
    /// 1-based, assigned at commit.
    pub version_number: i64,
    /// Run status.
    pub status: RunStatus,
    /// Mean of contributing scores.
    pub aggregated_score: Option<f64>,
    /// Narrative of where the run falls short.
    pub gap_analysis: Option<String>,
    /// Free-form notes supplied at commit.
    pub notes: Option<String>,
    /// When the run was committed.
    pub created_at: DateTime<Utc>,
    /// Per-metric results.
    #[serde(default)]
    pub metric_results: Vec<MetricResult>,
}

/// Score of one metric within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Unique result identifier.
    pub id: String,
    /// Owning run.
    pub evaluation_run_id: String,
    /// Scored metric.
    pub metric_definition_id: String,
    /// Metric name at run time.
    pub metric_name: String,
    /// Score.
    pub score: f64,
    /// Short justification.
    pub explanation: String,
    /// Longer reasoning, if any.
    pub reasoning: Option<String>,
    /// Scoring inputs as a JSON document.
    pub raw_json: String,
}

/// What a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportScope {
    /// A single test case.
    TestCase,
    /// Every test case of a project.
    Project,
}

impl std::fmt::Display for ReportScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportScope::TestCase => write!(f, "test_case"),
            ReportScope::Project => write!(f, "project"),
        }
    }
}

impl std::str::FromStr for ReportScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "test_case" => Ok(ReportScope::TestCase),
            "project" => Ok(ReportScope::Project),
            _ => Err(format!("Unknown report scope: {}", s)),
        }
    }
}

/// Raw numeric movement of a single metric between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    /// Score went up.
    Increased,
    /// Score went down.
    Decreased,
    /// No change.
    Stable,
}

/// Movement of the aggregate score, higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateDirection {
    /// Aggregate went up.
    Improved,
    /// Aggregate went down.
    Worsened,
    /// No change.
    Stable,
}

/// Trend classification of a test case inside a project report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseTrend {
    /// Aggregate rose beyond the threshold.
    Improved,
    /// Aggregate fell beyond the threshold.
    Regressed,
    /// Within the threshold.
    Stable,
    /// Fewer than two runs in the window.
    InsufficientData,
}

/// Per-metric comparison line of a test case report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    /// Metric name snapshot from the latest run.
    pub metric_name: String,
    /// Score in the first run.
    pub previous_score: f64,
    /// Score in the last run.
    pub current_score: f64,
    /// `current - previous`.
    pub delta: f64,
    /// Sign of the delta.
    pub direction: ScoreDirection,
}

/// Content of a test-case scoped report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseReportContent {
    /// Compared test case.
    pub test_case_id: String,
    /// Its name at report time.
    pub test_case_name: String,
    /// Metrics present in both endpoint runs.
    pub metric_comparison: Vec<MetricDelta>,
    /// `last.aggregate - first.aggregate`, missing scores as 0.
    pub aggregated_score_delta: f64,
    /// Sign of the aggregate delta.
    pub aggregated_score_direction: AggregateDirection,
}

/// One test case line of a project report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTestCaseEntry {
    /// Test case identifier.
    pub test_case_id: String,
    /// Test case name.
    pub name: String,
    /// Trend classification.
    pub status: TestCaseTrend,
    /// Aggregate delta, absent when data is insufficient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

/// Content of a project scoped report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReportContent {
    /// Test cases whose aggregate improved.
    pub improving_count: usize,
    /// Test cases whose aggregate regressed.
    pub regressing_count: usize,
    /// Test cases within the threshold.
    #[serde(default)]
    pub stable_count: usize,
    /// Per test case lines.
    pub test_cases: Vec<ProjectTestCaseEntry>,
}

/// Structured report payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportContent {
    /// Two-run comparison of one test case.
    TestCase(TestCaseReportContent),
    /// Project roll-up.
    Project(ProjectReportContent),
}

/// A persisted, immutable report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Unique report identifier.
    pub id: String,
    /// Scope kind.
    pub scope_type: ReportScope,
    /// Test case or project identifier.
    pub scope_id: String,
    /// Window start.
    pub start_date: DateTime<Utc>,
    /// Window end.
    pub end_date: DateTime<Utc>,
    /// Structured comparison payload.
    pub content: ReportContent,
    /// Narrative summary.
    pub summary_text: String,
    /// When the report was generated.
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl TestCase {
    /// Create a new test case in a project
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            name: name.into(),
            description: None,
            user_intent: None,
            created_at: Utc::now(),
            metrics_locked_at: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Example {
    /// Create a new example
    pub fn new(
        test_case_id: impl Into<String>,
        content: impl Into<String>,
        example_type: ExampleType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_case_id: test_case_id.into(),
            content: content.into(),
            example_type,
            created_at: Utc::now(),
        }
    }
}

impl MetricDefinition {
    /// Build an active definition from an already validated spec
    pub fn from_spec(test_case_id: impl Into<String>, spec: MetricSpec) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_case_id: test_case_id.into(),
            name: spec.name,
            description: spec.description,
            metric_type: spec.metric_type,
            scale_type: spec.scale_type,
            scale_min: spec.scale_min,
            scale_max: spec.scale_max,
            target_direction: spec.target_direction,
            evaluation_prompt: spec.evaluation_prompt,
            rule_definition: spec.rule_definition,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// The creation form of this definition
    pub fn to_spec(&self) -> MetricSpec {
        MetricSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            metric_type: self.metric_type,
            scale_type: self.scale_type,
            scale_min: self.scale_min,
            scale_max: self.scale_max,
            target_direction: self.target_direction,
            evaluation_prompt: self.evaluation_prompt.clone(),
            rule_definition: self.rule_definition.clone(),
        }
    }
}

impl MetricDesignIteration {
    /// Create an unnumbered iteration; the store assigns the number
    pub fn new(
        test_case_id: impl Into<String>,
        user_intent: impl Into<String>,
        proposed: &[MetricSpec],
    ) -> serde_json::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            test_case_id: test_case_id.into(),
            iteration_number: 0,
            user_intent: user_intent.into(),
            llm_proposed_metrics: serde_json::to_string(proposed)?,
            gap_analysis: None,
            reasoning_summary: None,
            feedback: None,
            created_at: Utc::now(),
            confirmed_at: None,
        })
    }

    /// Attach the proposal's gap analysis
    pub fn with_gap_analysis(mut self, gap_analysis: impl Into<String>) -> Self {
        self.gap_analysis = Some(gap_analysis.into());
        self
    }

    /// Attach the proposal's reasoning summary
    pub fn with_reasoning_summary(mut self, summary: impl Into<String>) -> Self {
        self.reasoning_summary = Some(summary.into());
        self
    }

    /// Deserialize the proposal document
    pub fn proposed_metrics(&self) -> serde_json::Result<Vec<MetricSpec>> {
        serde_json::from_str(&self.llm_proposed_metrics)
    }

    /// Whether this iteration locked the metric set
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

impl EvaluationRun {
    /// Create an uncommitted run; the store assigns the version
    pub fn new(test_case_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_case_id: test_case_id.into(),
            version_number: 0,
            status: RunStatus::Completed,
            aggregated_score: None,
            gap_analysis: None,
            notes: None,
            created_at: Utc::now(),
            metric_results: Vec::new(),
        }
    }

    /// Find the result for a metric definition
    pub fn result_for(&self, metric_definition_id: &str) -> Option<&MetricResult> {
        self.metric_results
            .iter()
            .find(|r| r.metric_definition_id == metric_definition_id)
    }
}

impl MetricResult {
    /// Create a result for a run
    pub fn new(
        evaluation_run_id: impl Into<String>,
        metric: &MetricDefinition,
        score: f64,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            evaluation_run_id: evaluation_run_id.into(),
            metric_definition_id: metric.id.clone(),
            metric_name: metric.name.clone(),
            score,
            explanation: explanation.into(),
            reasoning: None,
            raw_json: "{}".to_string(),
        }
    }

    /// Set the raw scoring document
    pub fn with_raw_json(mut self, raw_json: impl Into<String>) -> Self {
        self.raw_json = raw_json.into();
        self
    }

    /// Set the reasoning text
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

impl Report {
    /// Create a new report
    pub fn new(
        scope_type: ReportScope,
        scope_id: impl Into<String>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        content: ReportContent,
        summary_text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scope_type,
            scope_id: scope_id.into(),
            start_date,
            end_date,
            content,
            summary_text: summary_text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Storage trait for evaluation persistence.
///
/// Version and iteration numbers are assigned by the store so that the
/// read-max-then-increment step is atomic with the insert.
#[async_trait]
pub trait Storage: Send + Sync {
    // Project operations

    /// Create a new project.
    async fn create_project(&self, project: &Project) -> StorageResult<()>;
    /// Get a project by ID.
    async fn get_project(&self, id: &str) -> StorageResult<Option<Project>>;
    /// List all projects, newest first.
    async fn list_projects(&self) -> StorageResult<Vec<Project>>;

    // Test case operations

    /// Create a new test case.
    async fn create_test_case(&self, test_case: &TestCase) -> StorageResult<()>;
    /// Get a test case by ID.
    async fn get_test_case(&self, id: &str) -> StorageResult<Option<TestCase>>;
    /// List the test cases of a project in creation order.
    async fn list_test_cases(&self, project_id: &str) -> StorageResult<Vec<TestCase>>;
    /// Delete a test case and everything it owns.
    async fn delete_test_case(&self, id: &str) -> StorageResult<()>;

    // Example operations

    /// Create a new example.
    async fn create_example(&self, example: &Example) -> StorageResult<()>;
    /// List the examples of a test case in creation order.
    async fn list_examples(&self, test_case_id: &str) -> StorageResult<Vec<Example>>;

    // Metric operations

    /// List the active metrics of a test case in confirmation order.
    async fn list_active_metrics(&self, test_case_id: &str) -> StorageResult<Vec<MetricDefinition>>;
    /// Count every metric definition of a test case.
    async fn count_metrics(&self, test_case_id: &str) -> StorageResult<i64>;

    // Metric design operations

    /// Insert an iteration, assigning the next iteration number, and record
    /// its intent on the test case.
    ///
    /// Fails with `MetricsLocked` once the test case's metrics are confirmed.
    async fn create_iteration(&self, iteration: &MetricDesignIteration) -> StorageResult<i64>;
    /// Get an iteration by ID.
    async fn get_iteration(&self, id: &str) -> StorageResult<Option<MetricDesignIteration>>;
    /// List the iterations of a test case by iteration number.
    async fn list_iterations(&self, test_case_id: &str) -> StorageResult<Vec<MetricDesignIteration>>;
    /// Lock the metric set: mark the iteration confirmed and insert the
    /// metrics in one transaction.
    ///
    /// Fails with `MetricsLocked` when metrics already exist and with
    /// `IterationConfirmed` when the iteration was confirmed before. Nothing
    /// is written on failure.
    async fn confirm_metrics(
        &self,
        test_case_id: &str,
        iteration_id: &str,
        metrics: &[MetricDefinition],
        confirmed_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    // Evaluation run operations

    /// Insert a run with all its results in one transaction, assigning the
    /// next version number. Returns the assigned version.
    async fn commit_run(&self, run: &EvaluationRun) -> StorageResult<i64>;
    /// Get a run with its results.
    async fn get_run(&self, id: &str) -> StorageResult<Option<EvaluationRun>>;
    /// List the runs of a test case, highest version first.
    async fn list_runs(&self, test_case_id: &str) -> StorageResult<Vec<EvaluationRun>>;
    /// Completed runs with `start <= version <= end`, oldest first.
    async fn list_runs_by_version(
        &self,
        test_case_id: &str,
        start_version: i64,
        end_version: i64,
    ) -> StorageResult<Vec<EvaluationRun>>;
    /// Completed runs created within `[start, end]`, oldest first.
    async fn list_runs_in_window(
        &self,
        test_case_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<EvaluationRun>>;
    /// The highest-version completed run.
    async fn latest_run(&self, test_case_id: &str) -> StorageResult<Option<EvaluationRun>>;

    // Report operations

    /// Persist a report.
    async fn create_report(&self, report: &Report) -> StorageResult<()>;
    /// Get a report by ID.
    async fn get_report(&self, id: &str) -> StorageResult<Option<Report>>;
    /// List the reports of a scope, newest first.
    async fn list_reports(&self, scope_type: ReportScope, scope_id: &str) -> StorageResult<Vec<Report>>;
}

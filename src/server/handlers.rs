use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::services::RunRange;
use crate::storage::{ExampleType, ReportScope};

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        // Catalog
        "project_create" => handle_project_create(state, arguments).await,
        "project_list" => handle_project_list(state).await,
        "testcase_create" => handle_testcase_create(state, arguments).await,
        "testcase_list" => handle_testcase_list(state, arguments).await,
        "testcase_get" => handle_testcase_get(state, arguments).await,
        "testcase_delete" => handle_testcase_delete(state, arguments).await,
        "example_add" => handle_example_add(state, arguments).await,
        // Metric design
        "metric_design_start" => handle_design_start(state, arguments).await,
        "metric_design_confirm" => handle_design_confirm(state, arguments).await,
        "metric_design_list" => handle_design_list(state, arguments).await,
        "metric_list" => handle_metric_list(state, arguments).await,
        // Evaluation
        "evaluation_preview" => handle_evaluation_preview(state, arguments).await,
        "evaluation_commit" => handle_evaluation_commit(state, arguments).await,
        "run_list" => handle_run_list(state, arguments).await,
        "run_get" => handle_run_get(state, arguments).await,
        // Reports
        "report_test_case" => handle_report_test_case(state, arguments).await,
        "report_project" => handle_report_project(state, arguments).await,
        "report_get" => handle_report_get(state, arguments).await,
        "report_list" => handle_report_list(state, arguments).await,
        // Dashboards
        "dashboard_test_case" => handle_dashboard_test_case(state, arguments).await,
        "dashboard_project" => handle_dashboard_project(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Parameter types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ProjectIdParams {
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct TestCaseIdParams {
    test_case_id: String,
}

/// Parameters for project_create.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectParams {
    /// Project name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Parameters for testcase_create.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTestCaseParams {
    /// Owning project.
    pub project_id: String,
    /// Test case name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Parameters for example_add.
#[derive(Debug, Clone, Deserialize)]
pub struct AddExampleParams {
    /// Owning test case.
    pub test_case_id: String,
    /// Example output text.
    pub content: String,
    /// `desired` (default) or `current`.
    #[serde(default)]
    pub example_type: Option<ExampleType>,
}

/// Parameters for metric_design_start.
#[derive(Debug, Clone, Deserialize)]
pub struct DesignStartParams {
    /// Test case to design metrics for.
    pub test_case_id: String,
    /// What the user wants the outputs to achieve.
    pub user_intent: String,
    /// Feedback on a previous iteration.
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Parameters for metric_design_confirm.
#[derive(Debug, Clone, Deserialize)]
pub struct DesignConfirmParams {
    /// Test case being locked.
    pub test_case_id: String,
    /// Iteration whose proposal is accepted.
    pub iteration_id: String,
}

/// Parameters for evaluation_preview and evaluation_commit.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationParams {
    /// Test case to evaluate.
    pub test_case_id: String,
    /// Candidate outputs; only the first is scored.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Free-form notes stored on committed runs.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Parameters for run_get.
#[derive(Debug, Clone, Deserialize)]
pub struct RunGetParams {
    /// Run identifier.
    pub run_id: String,
}

/// Parameters for report_test_case.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCaseReportParams {
    /// Test case to report on.
    pub test_case_id: String,
    /// First version to compare.
    #[serde(default)]
    pub start_version: Option<i64>,
    /// Last version to compare.
    #[serde(default)]
    pub end_version: Option<i64>,
    /// Window start (RFC 3339).
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Window end (RFC 3339).
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Model to write the narrative with.
    #[serde(default)]
    pub model: Option<String>,
}

/// Parameters for report_project.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectReportParams {
    /// Project to roll up.
    pub project_id: String,
    /// Window start (RFC 3339).
    pub start_date: DateTime<Utc>,
    /// Window end (RFC 3339).
    pub end_date: DateTime<Utc>,
}

/// Parameters for report_get.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportGetParams {
    /// Report identifier.
    pub report_id: String,
}

/// Parameters for report_list.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportListParams {
    /// `test_case` or `project`.
    pub scope_type: ReportScope,
    /// Identifier of the scoped entity.
    pub scope_id: String,
}

/// Response of testcase_delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Deleted identifier.
    pub id: String,
    /// Always true on success.
    pub deleted: bool,
}

// ============================================================================
// Catalog handlers
// ============================================================================

async fn handle_project_create(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("project_create", arguments, |p: CreateProjectParams| async move {
        state.catalog.create_project(&p.name, p.description).await
    })
    .await
}

async fn handle_project_list(state: &SharedState) -> McpResult<Value> {
    let projects = state
        .catalog
        .list_projects()
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    Ok(serde_json::json!({ "projects": projects }))
}

async fn handle_testcase_create(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("testcase_create", arguments, |p: CreateTestCaseParams| async move {
        state
            .catalog
            .create_test_case(&p.project_id, &p.name, p.description)
            .await
    })
    .await
}

async fn handle_testcase_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("testcase_list", arguments, |p: ProjectIdParams| async move {
        state.catalog.list_test_cases(&p.project_id).await
    })
    .await
}

async fn handle_testcase_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("testcase_get", arguments, |p: TestCaseIdParams| async move {
        state.catalog.get_test_case(&p.test_case_id).await
    })
    .await
}

async fn handle_testcase_delete(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("testcase_delete", arguments, |p: TestCaseIdParams| async move {
        state.catalog.delete_test_case(&p.test_case_id).await?;
        Ok::<_, crate::error::AppError>(DeleteResponse {
            id: p.test_case_id,
            deleted: true,
        })
    })
    .await
}

async fn handle_example_add(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("example_add", arguments, |p: AddExampleParams| async move {
        state
            .catalog
            .add_example(&p.test_case_id, &p.content, p.example_type)
            .await
    })
    .await
}

// ============================================================================
// Metric design handlers
// ============================================================================

async fn handle_design_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("metric_design_start", arguments, |p: DesignStartParams| async move {
        state
            .design
            .start_design(&p.test_case_id, &p.user_intent, p.feedback)
            .await
    })
    .await
}

async fn handle_design_confirm(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "metric_design_confirm",
        arguments,
        |p: DesignConfirmParams| async move {
            let metrics = state
                .design
                .confirm_design(&p.test_case_id, &p.iteration_id)
                .await?;
            Ok::<_, crate::error::AppError>(serde_json::json!({
                "test_case_id": p.test_case_id,
                "iteration_id": p.iteration_id,
                "metrics": metrics,
            }))
        },
    )
    .await
}

async fn handle_design_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("metric_design_list", arguments, |p: TestCaseIdParams| async move {
        state.design.list_iterations(&p.test_case_id).await
    })
    .await
}

async fn handle_metric_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("metric_list", arguments, |p: TestCaseIdParams| async move {
        state.design.list_metrics(&p.test_case_id).await
    })
    .await
}

// ============================================================================
// Evaluation handlers
// ============================================================================

async fn handle_evaluation_preview(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("evaluation_preview", arguments, |p: EvaluationParams| async move {
        state.evaluation.preview(&p.test_case_id, &p.outputs).await
    })
    .await
}

async fn handle_evaluation_commit(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("evaluation_commit", arguments, |p: EvaluationParams| async move {
        state
            .evaluation
            .commit(&p.test_case_id, &p.outputs, p.notes)
            .await
    })
    .await
}

async fn handle_run_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("run_list", arguments, |p: TestCaseIdParams| async move {
        state.evaluation.list_runs(&p.test_case_id).await
    })
    .await
}

async fn handle_run_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("run_get", arguments, |p: RunGetParams| async move {
        state.evaluation.get_run(&p.run_id).await
    })
    .await
}

// ============================================================================
// Report handlers
// ============================================================================

async fn handle_report_test_case(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "report_test_case",
        arguments,
        |p: TestCaseReportParams| async move {
            let range = RunRange::resolve(p.start_version, p.end_version, p.start_date, p.end_date)?;
            state.reports.compare_runs(&p.test_case_id, range, p.model).await
        },
    )
    .await
}

async fn handle_report_project(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("report_project", arguments, |p: ProjectReportParams| async move {
        state
            .reports
            .compare_project(&p.project_id, p.start_date, p.end_date)
            .await
    })
    .await
}

async fn handle_report_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("report_get", arguments, |p: ReportGetParams| async move {
        state.reports.get_report(&p.report_id).await
    })
    .await
}

async fn handle_report_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("report_list", arguments, |p: ReportListParams| async move {
        state.reports.list_reports(p.scope_type, &p.scope_id).await
    })
    .await
}

// ============================================================================
// Dashboard handlers
// ============================================================================

async fn handle_dashboard_test_case(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("dashboard_test_case", arguments, |p: TestCaseIdParams| async move {
        state.dashboard.test_case_dashboard(&p.test_case_id).await
    })
    .await
}

async fn handle_dashboard_project(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("dashboard_project", arguments, |p: ProjectIdParams| async move {
        state.dashboard.project_dashboard(&p.project_id).await
    })
    .await
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse typed parameters, run a service operation and serialize its result.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}

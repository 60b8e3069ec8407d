//! Offline inspection commands.
//!
//! Read-only views over the evaluation database, printed as plain text
//! tables or pretty JSON.

use clap::Subcommand;
use serde::Serialize;

use crate::server::AppState;
use crate::services::{ProjectDashboard, TestCaseDashboard};
use crate::storage::{EvaluationRun, ReportScope};

/// Inspection subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum InspectCommands {
    /// List projects
    Projects,

    /// List evaluation runs of a test case, newest version first
    Runs {
        /// Test case ID
        test_case_id: String,

        /// Print full runs as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the score history of a test case
    Dashboard {
        /// Test case ID
        test_case_id: String,
    },

    /// Show the latest run of every test case in a project
    ProjectDashboard {
        /// Project ID
        project_id: String,
    },

    /// List stored reports of a test case or project
    Reports {
        /// `test_case` or `project`
        #[arg(long, default_value = "test_case")]
        scope: String,

        /// Test case or project ID
        scope_id: String,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute an inspection command.
pub async fn execute_command(command: InspectCommands, state: &AppState) -> CliResult {
    match command {
        InspectCommands::Projects => execute_projects(state).await,
        InspectCommands::Runs { test_case_id, json } => {
            execute_runs(state, &test_case_id, json).await
        }
        InspectCommands::Dashboard { test_case_id } => {
            match state.dashboard.test_case_dashboard(&test_case_id).await {
                Ok(dashboard) => CliResult::success(format_test_case_dashboard(&dashboard)),
                Err(e) => CliResult::error(format!("Error: {}", e)),
            }
        }
        InspectCommands::ProjectDashboard { project_id } => {
            match state.dashboard.project_dashboard(&project_id).await {
                Ok(dashboard) => CliResult::success(format_project_dashboard(&dashboard)),
                Err(e) => CliResult::error(format!("Error: {}", e)),
            }
        }
        InspectCommands::Reports { scope, scope_id } => {
            execute_reports(state, &scope, &scope_id).await
        }
    }
}

async fn execute_projects(state: &AppState) -> CliResult {
    match state.catalog.list_projects().await {
        Ok(projects) if projects.is_empty() => CliResult::success("No projects."),
        Ok(projects) => {
            let mut output = String::new();
            for project in projects {
                output.push_str(&format!(
                    "{}  {}  {}\n",
                    project.id,
                    project.created_at.format("%Y-%m-%d %H:%M"),
                    project.name
                ));
            }
            CliResult::success(output)
        }
        Err(e) => CliResult::error(format!("Error: {}", e)),
    }
}

async fn execute_runs(state: &AppState, test_case_id: &str, json: bool) -> CliResult {
    let runs = match state.evaluation.list_runs(test_case_id).await {
        Ok(runs) => runs,
        Err(e) => return CliResult::error(format!("Error: {}", e)),
    };

    if json {
        return to_json(&runs);
    }
    if runs.is_empty() {
        return CliResult::success(format!("No runs for test case {}.", test_case_id));
    }
    CliResult::success(format_runs(&runs))
}

async fn execute_reports(state: &AppState, scope: &str, scope_id: &str) -> CliResult {
    let scope_type = match scope {
        "test_case" => ReportScope::TestCase,
        "project" => ReportScope::Project,
        other => return CliResult::error(format!("Unknown scope: {}", other)),
    };

    match state.reports.list_reports(scope_type, scope_id).await {
        Ok(reports) if reports.is_empty() => CliResult::success("No reports."),
        Ok(reports) => {
            let mut output = String::new();
            for report in reports {
                output.push_str(&format!(
                    "{}  {} .. {}\n  {}\n",
                    report.id,
                    report.start_date.format("%Y-%m-%d"),
                    report.end_date.format("%Y-%m-%d"),
                    report.summary_text.lines().next().unwrap_or_default()
                ));
            }
            CliResult::success(output)
        }
        Err(e) => CliResult::error(format!("Error: {}", e)),
    }
}

fn to_json<T: Serialize>(value: &T) -> CliResult {
    match serde_json::to_string_pretty(value) {
        Ok(text) => CliResult::success(text),
        Err(e) => CliResult::error(format!("Serialization failed: {}", e)),
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{:.1}", s))
}

/// One line per run: version, date, aggregate and metric count.
pub fn format_runs(runs: &[EvaluationRun]) -> String {
    let mut output = String::from("VERSION  CREATED           AGGREGATE  METRICS\n");
    for run in runs {
        output.push_str(&format!(
            "v{:<7} {}  {:>9}  {}\n",
            run.version_number,
            run.created_at.format("%Y-%m-%d %H:%M"),
            format_score(run.aggregated_score),
            run.metric_results.len()
        ));
    }
    output
}

/// Aggregate series followed by each metric's series.
pub fn format_test_case_dashboard(dashboard: &TestCaseDashboard) -> String {
    let mut output = format!("Test case: {}\n\nAggregate\n", dashboard.test_case_name);
    if dashboard.aggregated_score_points.is_empty() {
        output.push_str("  (no scored runs)\n");
    }
    for point in &dashboard.aggregated_score_points {
        output.push_str(&format!("  v{}  {:.1}\n", point.version_number, point.score));
    }

    for series in &dashboard.metrics {
        output.push_str(&format!(
            "\n{} ({}, {})\n",
            series.metric_name, series.scale_type, series.target_direction
        ));
        for point in &series.points {
            output.push_str(&format!("  v{}  {:.1}\n", point.version_number, point.score));
        }
    }
    output
}

/// Project totals followed by one line per test case.
pub fn format_project_dashboard(dashboard: &ProjectDashboard) -> String {
    let summary = &dashboard.summary;
    let mut output = format!(
        "Project: {}\nTest cases: {} ({} with runs)\nAverage latest score: {}\n\n",
        dashboard.project_name,
        summary.total_test_cases,
        summary.test_cases_with_runs,
        format_score(summary.avg_latest_aggregated_score)
    );

    for entry in &dashboard.test_cases {
        match &entry.latest_run {
            Some(run) => output.push_str(&format!(
                "  {}  v{}  {}\n",
                entry.test_case_name,
                run.version_number,
                format_score(run.aggregated_score)
            )),
            None => output.push_str(&format!("  {}  (no runs)\n", entry.test_case_name)),
        }
    }
    output
}

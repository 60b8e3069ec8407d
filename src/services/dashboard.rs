//! Read-only views over run history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::core::ServiceCore;
use crate::error::AppResult;
use crate::schema::{ScaleType, TargetDirection};
use crate::storage::{RunStatus, Storage};

/// One point of a score series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScorePoint {
    /// Run version.
    pub version_number: i64,
    /// Run commit time.
    pub created_at: DateTime<Utc>,
    /// Score at that version.
    pub score: f64,
}

/// Score history of one active metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSeries {
    /// Metric identifier.
    pub metric_definition_id: String,
    /// Metric name.
    pub metric_name: String,
    /// Scale shape, for charting.
    pub scale_type: ScaleType,
    /// Improvement direction, for charting.
    pub target_direction: TargetDirection,
    /// Points ordered by version.
    pub points: Vec<ScorePoint>,
}

/// History of a single test case.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseDashboard {
    /// Test case identifier.
    pub test_case_id: String,
    /// Test case name.
    pub test_case_name: String,
    /// One series per active metric.
    pub metrics: Vec<MetricSeries>,
    /// Aggregated score per version, skipping runs without one.
    pub aggregated_score_points: Vec<ScorePoint>,
}

/// Latest run of a test case.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run version.
    pub version_number: i64,
    /// Run commit time.
    pub created_at: DateTime<Utc>,
    /// Aggregated score.
    pub aggregated_score: Option<f64>,
}

/// A metric score inside a run summary.
#[derive(Debug, Clone, Serialize)]
pub struct MetricScore {
    /// Metric identifier.
    pub metric_definition_id: String,
    /// Metric name.
    pub metric_name: String,
    /// Score.
    pub score: f64,
}

/// One test case line of a project dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseSummary {
    /// Test case identifier.
    pub test_case_id: String,
    /// Test case name.
    pub test_case_name: String,
    /// Latest completed run, if any.
    pub latest_run: Option<RunSummary>,
    /// Scores of the latest run.
    pub latest_metrics: Vec<MetricScore>,
}

/// Project-wide totals.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectTotals {
    /// Number of test cases.
    pub total_test_cases: usize,
    /// Test cases whose latest run has an aggregate.
    pub test_cases_with_runs: usize,
    /// Mean of those latest aggregates.
    pub avg_latest_aggregated_score: Option<f64>,
}

/// Latest state of every test case in a project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDashboard {
    /// Project identifier.
    pub project_id: String,
    /// Project name.
    pub project_name: String,
    /// Totals.
    pub summary: ProjectTotals,
    /// Per test case lines.
    pub test_cases: Vec<TestCaseSummary>,
}

/// Builds dashboard views.
#[derive(Clone)]
pub struct DashboardService {
    core: ServiceCore,
}

impl DashboardService {
    /// Create a new dashboard service.
    pub fn new(core: ServiceCore) -> Self {
        Self { core }
    }

    /// Per-metric and aggregate score series of a test case.
    pub async fn test_case_dashboard(&self, test_case_id: &str) -> AppResult<TestCaseDashboard> {
        let test_case = self.core.require_test_case(test_case_id).await?;
        let storage = self.core.storage();

        let metrics = storage.list_active_metrics(test_case_id).await?;
        let mut runs = storage.list_runs(test_case_id).await?;
        runs.retain(|r| r.status == RunStatus::Completed);
        runs.reverse();

        let mut series: Vec<MetricSeries> = metrics
            .iter()
            .map(|m| MetricSeries {
                metric_definition_id: m.id.clone(),
                metric_name: m.name.clone(),
                scale_type: m.scale_type,
                target_direction: m.target_direction,
                points: Vec::new(),
            })
            .collect();
        let index: HashMap<String, usize> = series
            .iter()
            .enumerate()
            .map(|(i, s)| (s.metric_definition_id.clone(), i))
            .collect();

        let mut aggregated_score_points = Vec::new();
        for run in &runs {
            if let Some(score) = run.aggregated_score {
                aggregated_score_points.push(ScorePoint {
                    version_number: run.version_number,
                    created_at: run.created_at,
                    score,
                });
            }
            for result in &run.metric_results {
                if let Some(&i) = index.get(&result.metric_definition_id) {
                    series[i].points.push(ScorePoint {
                        version_number: run.version_number,
                        created_at: run.created_at,
                        score: result.score,
                    });
                }
            }
        }

        Ok(TestCaseDashboard {
            test_case_id: test_case.id,
            test_case_name: test_case.name,
            metrics: series,
            aggregated_score_points,
        })
    }

    /// Latest run of every test case in a project.
    pub async fn project_dashboard(&self, project_id: &str) -> AppResult<ProjectDashboard> {
        let project = self.core.require_project(project_id).await?;
        let storage = self.core.storage();

        let test_cases = storage.list_test_cases(project_id).await?;
        let total_test_cases = test_cases.len();
        let mut summaries = Vec::with_capacity(total_test_cases);
        let mut latest_scores = Vec::new();

        for test_case in test_cases {
            let latest = storage.latest_run(&test_case.id).await?;

            let (latest_run, latest_metrics) = match latest {
                Some(run) => {
                    if let Some(score) = run.aggregated_score {
                        latest_scores.push(score);
                    }
                    let scores = run
                        .metric_results
                        .iter()
                        .map(|r| MetricScore {
                            metric_definition_id: r.metric_definition_id.clone(),
                            metric_name: r.metric_name.clone(),
                            score: r.score,
                        })
                        .collect();
                    let summary = RunSummary {
                        version_number: run.version_number,
                        created_at: run.created_at,
                        aggregated_score: run.aggregated_score,
                    };
                    (Some(summary), scores)
                }
                None => (None, Vec::new()),
            };

            summaries.push(TestCaseSummary {
                test_case_id: test_case.id,
                test_case_name: test_case.name,
                latest_run,
                latest_metrics,
            });
        }

        let avg_latest_aggregated_score = (!latest_scores.is_empty())
            .then(|| latest_scores.iter().sum::<f64>() / latest_scores.len() as f64);

        Ok(ProjectDashboard {
            project_id: project.id,
            project_name: project.name,
            summary: ProjectTotals {
                total_test_cases,
                test_cases_with_runs: latest_scores.len(),
                avg_latest_aggregated_score,
            },
            test_cases: summaries,
        })
    }
}

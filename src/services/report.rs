//! Report engine: run comparisons, narratives and project roll-ups.

use chrono::{DateTime, Utc};
use tracing::info;

use super::core::ServiceCore;
use crate::error::{AppError, AppResult};
use crate::provider::{NarrativeInput, RunHistoryEntry};
use crate::storage::{
    AggregateDirection, EvaluationRun, MetricDelta, ProjectReportContent, ProjectTestCaseEntry,
    Report, ReportContent, ReportScope, RunStatus, ScoreDirection, Storage, TestCaseReportContent,
    TestCaseTrend,
};

/// Aggregate movement needed before a project test case counts as changed.
pub const PROJECT_TREND_THRESHOLD: f64 = 0.01;

const NO_GAP_ANALYSIS: &str = "No gap analysis available.";
const INSUFFICIENT_RUNS: &str = "Insufficient runs for comparison (need at least 2)";

/// Which runs a test case report compares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunRange {
    /// Inclusive version bounds.
    Versions {
        /// First version.
        start: i64,
        /// Last version.
        end: i64,
    },
    /// Inclusive creation time bounds.
    Window {
        /// Window start.
        start: DateTime<Utc>,
        /// Window end.
        end: DateTime<Utc>,
    },
    /// Every completed run.
    All,
}

impl RunRange {
    /// Resolve optional selectors; a complete version pair wins over dates.
    pub fn resolve(
        start_version: Option<i64>,
        end_version: Option<i64>,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> AppResult<Self> {
        match (start_version, end_version) {
            (Some(start), Some(end)) if start > end => Err(AppError::invalid(
                "start_version",
                "must not be greater than end_version",
            )),
            (Some(start), Some(end)) => Ok(RunRange::Versions { start, end }),
            (Some(_), None) | (None, Some(_)) => Err(AppError::invalid(
                "start_version",
                "start_version and end_version must be given together",
            )),
            (None, None) => match (start_date, end_date) {
                (Some(start), Some(end)) if start > end => Err(AppError::invalid(
                    "start_date",
                    "must not be after end_date",
                )),
                (Some(start), Some(end)) => Ok(RunRange::Window { start, end }),
                (Some(_), None) | (None, Some(_)) => Err(AppError::invalid(
                    "start_date",
                    "start_date and end_date must be given together",
                )),
                (None, None) => Ok(RunRange::All),
            },
        }
    }
}

/// Raw numeric direction of a per-metric delta.
///
/// NOTE: sign only. `target_direction` is not consulted, so a falling
/// lower_is_better metric reads as "decreased" even though it improved.
pub fn score_direction(delta: f64) -> ScoreDirection {
    if delta > 0.0 {
        ScoreDirection::Increased
    } else if delta < 0.0 {
        ScoreDirection::Decreased
    } else {
        ScoreDirection::Stable
    }
}

/// Direction of an aggregate delta, higher is better.
pub fn aggregate_direction(delta: f64) -> AggregateDirection {
    if delta > 0.0 {
        AggregateDirection::Improved
    } else if delta < 0.0 {
        AggregateDirection::Worsened
    } else {
        AggregateDirection::Stable
    }
}

/// Trend of a project test case given its aggregate delta.
pub fn trend(delta: f64) -> TestCaseTrend {
    if delta > PROJECT_TREND_THRESHOLD {
        TestCaseTrend::Improved
    } else if delta < -PROJECT_TREND_THRESHOLD {
        TestCaseTrend::Regressed
    } else {
        TestCaseTrend::Stable
    }
}

fn aggregate_delta(first: &EvaluationRun, last: &EvaluationRun) -> f64 {
    last.aggregated_score.unwrap_or(0.0) - first.aggregated_score.unwrap_or(0.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Per-metric deltas between the endpoint runs, in the last run's order.
///
/// Metrics missing from either run are skipped.
pub fn metric_deltas(first: &EvaluationRun, last: &EvaluationRun) -> Vec<MetricDelta> {
    last.metric_results
        .iter()
        .filter_map(|current| {
            let previous = first.result_for(&current.metric_definition_id)?;
            let delta = current.score - previous.score;
            Some(MetricDelta {
                metric_name: current.metric_name.clone(),
                previous_score: previous.score,
                current_score: current.score,
                delta,
                direction: score_direction(delta),
            })
        })
        .collect()
}

/// Builds, narrates and persists reports.
#[derive(Clone)]
pub struct ReportService {
    core: ServiceCore,
}

impl ReportService {
    /// Create a new report service.
    pub fn new(core: ServiceCore) -> Self {
        Self { core }
    }

    /// Compare the first and last run of a range and persist the report.
    ///
    /// `model` overrides the provider's model for the narrative only.
    pub async fn compare_runs(
        &self,
        test_case_id: &str,
        range: RunRange,
        model: Option<String>,
    ) -> AppResult<Report> {
        let test_case = self.core.require_test_case(test_case_id).await?;
        let storage = self.core.storage();

        let runs = match range {
            RunRange::Versions { start, end } => {
                storage.list_runs_by_version(test_case_id, start, end).await?
            }
            RunRange::Window { start, end } => {
                storage.list_runs_in_window(test_case_id, start, end).await?
            }
            RunRange::All => {
                let mut runs: Vec<EvaluationRun> = storage
                    .list_runs(test_case_id)
                    .await?
                    .into_iter()
                    .filter(|r| r.status == RunStatus::Completed)
                    .collect();
                runs.sort_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then(a.version_number.cmp(&b.version_number))
                });
                runs
            }
        };

        let (first, last) = match runs.as_slice() {
            [first, .., last] => (first, last),
            _ => return Err(AppError::invalid("runs", INSUFFICIENT_RUNS)),
        };

        let agg_delta = aggregate_delta(first, last);
        let content = TestCaseReportContent {
            test_case_id: test_case.id.clone(),
            test_case_name: test_case.name.clone(),
            metric_comparison: metric_deltas(first, last),
            aggregated_score_delta: agg_delta,
            aggregated_score_direction: aggregate_direction(agg_delta),
        };

        let narrative_input = NarrativeInput {
            test_case_name: test_case.name.clone(),
            history: runs
                .iter()
                .map(|r| RunHistoryEntry {
                    version: r.version_number,
                    score: round1(r.aggregated_score.unwrap_or(0.0)),
                    gap_analysis: r
                        .gap_analysis
                        .clone()
                        .unwrap_or_else(|| NO_GAP_ANALYSIS.to_string()),
                })
                .collect(),
            model: model.filter(|m| !m.trim().is_empty()),
        };
        let summary = self.core.provider().narrate(&narrative_input).await?;

        let (start_date, end_date) = match range {
            RunRange::Window { start, end } => (start, end),
            _ => (first.created_at, last.created_at),
        };

        let report = Report::new(
            ReportScope::TestCase,
            test_case_id,
            start_date,
            end_date,
            ReportContent::TestCase(content),
            summary,
        );
        storage.create_report(&report).await?;

        info!(
            report_id = %report.id,
            test_case_id = %test_case_id,
            runs = runs.len(),
            from_version = first.version_number,
            to_version = last.version_number,
            "Test case report generated"
        );
        Ok(report)
    }

    /// Roll up every test case of a project over a window.
    pub async fn compare_project(
        &self,
        project_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Report> {
        if start > end {
            return Err(AppError::invalid("start_date", "must not be after end_date"));
        }
        let project = self.core.require_project(project_id).await?;
        let storage = self.core.storage();

        let mut entries = Vec::new();
        for test_case in storage.list_test_cases(project_id).await? {
            let runs = storage.list_runs_in_window(&test_case.id, start, end).await?;
            let (status, delta) = match runs.as_slice() {
                [first, .., last] => {
                    let delta = aggregate_delta(first, last);
                    (trend(delta), Some(delta))
                }
                _ => (TestCaseTrend::InsufficientData, None),
            };
            entries.push(ProjectTestCaseEntry {
                test_case_id: test_case.id,
                name: test_case.name,
                status,
                delta,
            });
        }

        let count = |wanted: TestCaseTrend| entries.iter().filter(|e| e.status == wanted).count();
        let (improving_count, regressing_count, stable_count) = (
            count(TestCaseTrend::Improved),
            count(TestCaseTrend::Regressed),
            count(TestCaseTrend::Stable),
        );
        let content = ProjectReportContent {
            improving_count,
            regressing_count,
            stable_count,
            test_cases: entries,
        };

        let summary = format!(
            "Project '{}' Report. {} test cases improved, {} regressed, {} stable.",
            project.name, content.improving_count, content.regressing_count, content.stable_count
        );

        let report = Report::new(
            ReportScope::Project,
            project_id,
            start,
            end,
            ReportContent::Project(content),
            summary,
        );
        storage.create_report(&report).await?;

        info!(report_id = %report.id, project_id = %project_id, "Project report generated");
        Ok(report)
    }

    /// A stored report by ID.
    pub async fn get_report(&self, report_id: &str) -> AppResult<Report> {
        self.core
            .storage()
            .get_report(report_id)
            .await?
            .ok_or_else(|| AppError::not_found("Report", report_id))
    }

    /// Stored reports of a scope, newest first.
    pub async fn list_reports(&self, scope_type: ReportScope, scope_id: &str) -> AppResult<Vec<Report>> {
        Ok(self.core.storage().list_reports(scope_type, scope_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MetricSpec;
    use crate::storage::{MetricDefinition, MetricResult};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn run_with(scores: &[(&MetricDefinition, f64)], aggregate: Option<f64>) -> EvaluationRun {
        let mut run = EvaluationRun::new("tc-1");
        run.aggregated_score = aggregate;
        run.metric_results = scores
            .iter()
            .map(|(m, s)| MetricResult::new(&run.id, m, *s, "x"))
            .collect();
        run
    }

    #[test]
    fn test_resolve_version_pair_wins() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range = RunRange::resolve(Some(1), Some(3), Some(start), None).unwrap();
        assert_eq!(range, RunRange::Versions { start: 1, end: 3 });
    }

    #[test]
    fn test_resolve_rejects_half_selectors() {
        assert!(RunRange::resolve(Some(1), None, None, None).is_err());
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(RunRange::resolve(None, None, None, Some(start)).is_err());
        assert!(RunRange::resolve(Some(3), Some(1), None, None).is_err());
        assert_eq!(RunRange::resolve(None, None, None, None).unwrap(), RunRange::All);
    }

    #[test]
    fn test_metric_deltas_skip_unmatched() {
        let tone = MetricDefinition::from_spec("tc-1", MetricSpec::judge("Tone", "d", "p"));
        let length = MetricDefinition::from_spec("tc-1", MetricSpec::judge("Length", "d", "p"));
        let first = run_with(&[(&tone, 40.0)], Some(40.0));
        let last = run_with(&[(&tone, 55.0), (&length, 90.0)], Some(72.5));

        let deltas = metric_deltas(&first, &last);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].metric_name, "Tone");
        assert_eq!(deltas[0].delta, 15.0);
        assert_eq!(deltas[0].direction, ScoreDirection::Increased);
    }

    #[test]
    fn test_directions() {
        assert_eq!(score_direction(-1.0), ScoreDirection::Decreased);
        assert_eq!(score_direction(0.0), ScoreDirection::Stable);
        assert_eq!(aggregate_direction(2.0), AggregateDirection::Improved);
        assert_eq!(aggregate_direction(-0.5), AggregateDirection::Worsened);
    }

    #[test]
    fn test_trend_threshold() {
        assert_eq!(trend(15.0), TestCaseTrend::Improved);
        assert_eq!(trend(0.01), TestCaseTrend::Stable);
        assert_eq!(trend(-0.011), TestCaseTrend::Regressed);
    }

    #[test]
    fn test_aggregate_delta_missing_as_zero() {
        let first = run_with(&[], None);
        let last = run_with(&[], Some(12.0));
        assert_eq!(aggregate_delta(&first, &last), 12.0);
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(66.66), 66.7);
        assert_eq!(round1(0.04), 0.0);
    }
}

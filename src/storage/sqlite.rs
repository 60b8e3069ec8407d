use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    format_timestamp, parse_timestamp, EvaluationRun, Example, MetricDefinition,
    MetricDesignIteration, MetricResult, Project, Report, ReportScope, Storage, TestCase,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RUN_COLUMNS: &str = "id, test_case_id, version_number, status, aggregated_score, \
                           gap_analysis, notes, created_at";

const METRIC_COLUMNS: &str = "id, test_case_id, name, description, metric_type, scale_type, \
                              scale_min, scale_max, target_direction, evaluation_prompt, \
                              rule_definition, is_active, created_at";

const ITERATION_COLUMNS: &str = "id, test_case_id, iteration_number, user_intent, \
                                 llm_proposed_metrics, gap_analysis, reasoning_summary, \
                                 feedback, created_at, confirmed_at";

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory instance, used by tests and the stub demo
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_results(&self, run_id: &str) -> StorageResult<Vec<MetricResult>> {
        let rows: Vec<MetricResultRow> = sqlx::query_as(
            r#"
            SELECT id, evaluation_run_id, metric_definition_id, metric_name, score,
                   explanation, reasoning, raw_json
            FROM metric_results
            WHERE evaluation_run_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MetricResult::from).collect())
    }

    async fn hydrate_runs(&self, rows: Vec<EvaluationRunRow>) -> StorageResult<Vec<EvaluationRun>> {
        let mut runs = Vec::with_capacity(rows.len());
        for row in rows {
            let mut run = EvaluationRun::try_from(row)?;
            run.metric_results = self.load_results(&run.id).await?;
            runs.push(run);
        }
        Ok(runs)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_project(&self, project: &Project) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(format_timestamp(&project.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_project(&self, id: &str) -> StorageResult<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT id, name, description, created_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_projects(&self) -> StorageResult<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT id, name, description, created_at FROM projects ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_test_case(&self, test_case: &TestCase) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO test_cases (id, project_id, name, description, user_intent, created_at, metrics_locked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&test_case.id)
        .bind(&test_case.project_id)
        .bind(&test_case.name)
        .bind(&test_case.description)
        .bind(&test_case.user_intent)
        .bind(format_timestamp(&test_case.created_at))
        .bind(test_case.metrics_locked_at.as_ref().map(format_timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_test_case(&self, id: &str) -> StorageResult<Option<TestCase>> {
        let row: Option<TestCaseRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, name, description, user_intent, created_at, metrics_locked_at
            FROM test_cases
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_test_cases(&self, project_id: &str) -> StorageResult<Vec<TestCase>> {
        let rows: Vec<TestCaseRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, name, description, user_intent, created_at, metrics_locked_at
            FROM test_cases
            WHERE project_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn delete_test_case(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM test_cases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "TestCase".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn create_example(&self, example: &Example) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO examples (id, test_case_id, content, example_type, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&example.id)
        .bind(&example.test_case_id)
        .bind(&example.content)
        .bind(example.example_type.to_string())
        .bind(format_timestamp(&example.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_examples(&self, test_case_id: &str) -> StorageResult<Vec<Example>> {
        let rows: Vec<ExampleRow> = sqlx::query_as(
            r#"
            SELECT id, test_case_id, content, example_type, created_at
            FROM examples
            WHERE test_case_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(test_case_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Example::try_from).collect()
    }

    async fn list_active_metrics(&self, test_case_id: &str) -> StorageResult<Vec<MetricDefinition>> {
        let sql = format!(
            "SELECT {METRIC_COLUMNS} FROM metric_definitions \
             WHERE test_case_id = ? AND is_active = 1 \
             ORDER BY created_at ASC, position ASC"
        );
        let rows: Vec<MetricDefinitionRow> = sqlx::query_as(&sql)
            .bind(test_case_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(MetricDefinition::try_from).collect()
    }

    async fn count_metrics(&self, test_case_id: &str) -> StorageResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM metric_definitions WHERE test_case_id = ?")
                .bind(test_case_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn create_iteration(&self, iteration: &MetricDesignIteration) -> StorageResult<i64> {
        let mut tx = self.pool.begin().await?;

        // Numbering, the lock check and the insert happen in one statement;
        // the unique index rejects the loser of a concurrent race and a
        // locked test case yields no row.
        let number: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO metric_design_iterations
                (id, test_case_id, iteration_number, user_intent, llm_proposed_metrics,
                 gap_analysis, reasoning_summary, feedback, created_at, confirmed_at)
            SELECT ?, ?,
                   (SELECT COALESCE(MAX(iteration_number), 0) + 1
                    FROM metric_design_iterations WHERE test_case_id = ?),
                   ?, ?, ?, ?, ?, ?, NULL
            WHERE NOT EXISTS (
                SELECT 1 FROM test_cases WHERE id = ? AND metrics_locked_at IS NOT NULL
            )
            RETURNING iteration_number
            "#,
        )
        .bind(&iteration.id)
        .bind(&iteration.test_case_id)
        .bind(&iteration.test_case_id)
        .bind(&iteration.user_intent)
        .bind(&iteration.llm_proposed_metrics)
        .bind(&iteration.gap_analysis)
        .bind(&iteration.reasoning_summary)
        .bind(&iteration.feedback)
        .bind(format_timestamp(&iteration.created_at))
        .bind(&iteration.test_case_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(duplicate_or)?;

        let number = number.ok_or_else(|| StorageError::MetricsLocked {
            test_case_id: iteration.test_case_id.clone(),
        })?;

        sqlx::query(
            "UPDATE test_cases SET user_intent = ? WHERE id = ? AND user_intent IS NOT ?",
        )
        .bind(&iteration.user_intent)
        .bind(&iteration.test_case_id)
        .bind(&iteration.user_intent)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(iteration_id = %iteration.id, iteration_number = number, "Iteration stored");
        Ok(number)
    }

    async fn get_iteration(&self, id: &str) -> StorageResult<Option<MetricDesignIteration>> {
        let sql = format!("SELECT {ITERATION_COLUMNS} FROM metric_design_iterations WHERE id = ?");
        let row: Option<IterationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_iterations(&self, test_case_id: &str) -> StorageResult<Vec<MetricDesignIteration>> {
        let sql = format!(
            "SELECT {ITERATION_COLUMNS} FROM metric_design_iterations \
             WHERE test_case_id = ? ORDER BY iteration_number ASC"
        );
        let rows: Vec<IterationRow> = sqlx::query_as(&sql)
            .bind(test_case_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn confirm_metrics(
        &self,
        test_case_id: &str,
        iteration_id: &str,
        metrics: &[MetricDefinition],
        confirmed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let stamp = format_timestamp(&confirmed_at);
        let mut tx = self.pool.begin().await?;

        // The lock column is written first so concurrent confirmations
        // serialize on the write lock; only one sees a NULL.
        let locked = sqlx::query(
            r#"
            UPDATE test_cases
            SET metrics_locked_at = ?
            WHERE id = ?
              AND metrics_locked_at IS NULL
              AND NOT EXISTS (SELECT 1 FROM metric_definitions WHERE test_case_id = ?)
            "#,
        )
        .bind(&stamp)
        .bind(test_case_id)
        .bind(test_case_id)
        .execute(&mut *tx)
        .await?;

        if locked.rows_affected() == 0 {
            return Err(StorageError::MetricsLocked {
                test_case_id: test_case_id.to_string(),
            });
        }

        let marked = sqlx::query(
            r#"
            UPDATE metric_design_iterations
            SET confirmed_at = ?
            WHERE id = ? AND test_case_id = ? AND confirmed_at IS NULL
            "#,
        )
        .bind(&stamp)
        .bind(iteration_id)
        .bind(test_case_id)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() == 0 {
            return Err(StorageError::IterationConfirmed {
                iteration_id: iteration_id.to_string(),
            });
        }

        for (position, metric) in metrics.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO metric_definitions
                    (id, test_case_id, name, description, metric_type, scale_type, scale_min,
                     scale_max, target_direction, evaluation_prompt, rule_definition, is_active,
                     created_at, position)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&metric.id)
            .bind(test_case_id)
            .bind(&metric.name)
            .bind(&metric.description)
            .bind(metric.metric_type.to_string())
            .bind(metric.scale_type.to_string())
            .bind(metric.scale_min)
            .bind(metric.scale_max)
            .bind(metric.target_direction.to_string())
            .bind(&metric.evaluation_prompt)
            .bind(&metric.rule_definition)
            .bind(metric.is_active)
            .bind(format_timestamp(&metric.created_at))
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            test_case_id = %test_case_id,
            iteration_id = %iteration_id,
            metric_count = metrics.len(),
            "Metric set locked"
        );
        Ok(())
    }

    async fn commit_run(&self, run: &EvaluationRun) -> StorageResult<i64> {
        let mut tx = self.pool.begin().await?;

        let version: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO evaluation_runs
                (id, test_case_id, version_number, status, aggregated_score, gap_analysis,
                 notes, created_at)
            SELECT ?, ?, COALESCE(MAX(version_number), 0) + 1, ?, ?, ?, ?, ?
            FROM evaluation_runs
            WHERE test_case_id = ?
            RETURNING version_number
            "#,
        )
        .bind(&run.id)
        .bind(&run.test_case_id)
        .bind(run.status.to_string())
        .bind(run.aggregated_score)
        .bind(&run.gap_analysis)
        .bind(&run.notes)
        .bind(format_timestamp(&run.created_at))
        .bind(&run.test_case_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(duplicate_or)?;

        for (position, result) in run.metric_results.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO metric_results
                    (id, evaluation_run_id, metric_definition_id, metric_name, score,
                     explanation, reasoning, raw_json, position)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&result.id)
            .bind(&run.id)
            .bind(&result.metric_definition_id)
            .bind(&result.metric_name)
            .bind(result.score)
            .bind(&result.explanation)
            .bind(&result.reasoning)
            .bind(&result.raw_json)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(run_id = %run.id, version = version, "Run committed");
        Ok(version)
    }

    async fn get_run(&self, id: &str) -> StorageResult<Option<EvaluationRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM evaluation_runs WHERE id = ?");
        let row: Option<EvaluationRunRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate_runs(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_runs(&self, test_case_id: &str) -> StorageResult<Vec<EvaluationRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM evaluation_runs \
             WHERE test_case_id = ? ORDER BY version_number DESC"
        );
        let rows: Vec<EvaluationRunRow> = sqlx::query_as(&sql)
            .bind(test_case_id)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate_runs(rows).await
    }

    async fn list_runs_by_version(
        &self,
        test_case_id: &str,
        start_version: i64,
        end_version: i64,
    ) -> StorageResult<Vec<EvaluationRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM evaluation_runs \
             WHERE test_case_id = ? AND status = 'completed' \
               AND version_number >= ? AND version_number <= ? \
             ORDER BY created_at ASC, version_number ASC"
        );
        let rows: Vec<EvaluationRunRow> = sqlx::query_as(&sql)
            .bind(test_case_id)
            .bind(start_version)
            .bind(end_version)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate_runs(rows).await
    }

    async fn list_runs_in_window(
        &self,
        test_case_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<EvaluationRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM evaluation_runs \
             WHERE test_case_id = ? AND status = 'completed' \
               AND created_at >= ? AND created_at <= ? \
             ORDER BY created_at ASC, version_number ASC"
        );
        let rows: Vec<EvaluationRunRow> = sqlx::query_as(&sql)
            .bind(test_case_id)
            .bind(format_timestamp(&start))
            .bind(format_timestamp(&end))
            .fetch_all(&self.pool)
            .await?;

        self.hydrate_runs(rows).await
    }

    async fn latest_run(&self, test_case_id: &str) -> StorageResult<Option<EvaluationRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM evaluation_runs \
             WHERE test_case_id = ? AND status = 'completed' \
             ORDER BY version_number DESC LIMIT 1"
        );
        let row: Option<EvaluationRunRow> = sqlx::query_as(&sql)
            .bind(test_case_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate_runs(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create_report(&self, report: &Report) -> StorageResult<()> {
        let content =
            serde_json::to_string(&report.content).map_err(|e| StorageError::Serialization {
                message: format!("Failed to serialize report content: {}", e),
            })?;

        sqlx::query(
            r#"
            INSERT INTO reports (id, scope_type, scope_id, start_date, end_date, content, summary_text, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(report.scope_type.to_string())
        .bind(&report.scope_id)
        .bind(format_timestamp(&report.start_date))
        .bind(format_timestamp(&report.end_date))
        .bind(&content)
        .bind(&report.summary_text)
        .bind(format_timestamp(&report.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_report(&self, id: &str) -> StorageResult<Option<Report>> {
        let row: Option<ReportRow> = sqlx::query_as(
            r#"
            SELECT id, scope_type, scope_id, start_date, end_date, content, summary_text, created_at
            FROM reports
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Report::try_from).transpose()
    }

    async fn list_reports(&self, scope_type: ReportScope, scope_id: &str) -> StorageResult<Vec<Report>> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            r#"
            SELECT id, scope_type, scope_id, start_date, end_date, content, summary_text, created_at
            FROM reports
            WHERE scope_type = ? AND scope_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(scope_type.to_string())
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Report::try_from).collect()
    }
}

fn duplicate_or(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::DuplicateKey {
            message: db.message().to_string(),
        },
        _ => StorageError::Sqlx(err),
    }
}

fn parse_column<T: FromStr<Err = String>>(column: &str, raw: &str) -> StorageResult<T> {
    raw.parse().map_err(|e| StorageError::Serialization {
        message: format!("Invalid {}: {}", column, e),
    })
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    description: Option<String>,
    created_at: String,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TestCaseRow {
    id: String,
    project_id: String,
    name: String,
    description: Option<String>,
    user_intent: Option<String>,
    created_at: String,
    metrics_locked_at: Option<String>,
}

impl From<TestCaseRow> for TestCase {
    fn from(row: TestCaseRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            description: row.description,
            user_intent: row.user_intent,
            created_at: parse_timestamp(&row.created_at),
            metrics_locked_at: row.metrics_locked_at.as_deref().map(parse_timestamp),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExampleRow {
    id: String,
    test_case_id: String,
    content: String,
    example_type: String,
    created_at: String,
}

impl TryFrom<ExampleRow> for Example {
    type Error = StorageError;

    fn try_from(row: ExampleRow) -> StorageResult<Self> {
        Ok(Self {
            id: row.id,
            test_case_id: row.test_case_id,
            content: row.content,
            example_type: parse_column("example_type", &row.example_type)?,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct MetricDefinitionRow {
    id: String,
    test_case_id: String,
    name: String,
    description: String,
    metric_type: String,
    scale_type: String,
    scale_min: Option<f64>,
    scale_max: Option<f64>,
    target_direction: String,
    evaluation_prompt: Option<String>,
    rule_definition: Option<String>,
    is_active: bool,
    created_at: String,
}

impl TryFrom<MetricDefinitionRow> for MetricDefinition {
    type Error = StorageError;

    fn try_from(row: MetricDefinitionRow) -> StorageResult<Self> {
        Ok(Self {
            id: row.id,
            test_case_id: row.test_case_id,
            name: row.name,
            description: row.description,
            metric_type: parse_column("metric_type", &row.metric_type)?,
            scale_type: parse_column("scale_type", &row.scale_type)?,
            scale_min: row.scale_min,
            scale_max: row.scale_max,
            target_direction: parse_column("target_direction", &row.target_direction)?,
            evaluation_prompt: row.evaluation_prompt,
            rule_definition: row.rule_definition,
            is_active: row.is_active,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct IterationRow {
    id: String,
    test_case_id: String,
    iteration_number: i64,
    user_intent: String,
    llm_proposed_metrics: String,
    gap_analysis: Option<String>,
    reasoning_summary: Option<String>,
    feedback: Option<String>,
    created_at: String,
    confirmed_at: Option<String>,
}

impl From<IterationRow> for MetricDesignIteration {
    fn from(row: IterationRow) -> Self {
        Self {
            id: row.id,
            test_case_id: row.test_case_id,
            iteration_number: row.iteration_number,
            user_intent: row.user_intent,
            llm_proposed_metrics: row.llm_proposed_metrics,
            gap_analysis: row.gap_analysis,
            reasoning_summary: row.reasoning_summary,
            feedback: row.feedback,
            created_at: parse_timestamp(&row.created_at),
            confirmed_at: row.confirmed_at.as_deref().map(parse_timestamp),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EvaluationRunRow {
    id: String,
    test_case_id: String,
    version_number: i64,
    status: String,
    aggregated_score: Option<f64>,
    gap_analysis: Option<String>,
    notes: Option<String>,
    created_at: String,
}

impl TryFrom<EvaluationRunRow> for EvaluationRun {
    type Error = StorageError;

    fn try_from(row: EvaluationRunRow) -> StorageResult<Self> {
        Ok(Self {
            id: row.id,
            test_case_id: row.test_case_id,
            version_number: row.version_number,
            status: parse_column("status", &row.status)?,
            aggregated_score: row.aggregated_score,
            gap_analysis: row.gap_analysis,
            notes: row.notes,
            created_at: parse_timestamp(&row.created_at),
            metric_results: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct MetricResultRow {
    id: String,
    evaluation_run_id: String,
    metric_definition_id: String,
    metric_name: String,
    score: f64,
    explanation: String,
    reasoning: Option<String>,
    raw_json: String,
}

impl From<MetricResultRow> for MetricResult {
    fn from(row: MetricResultRow) -> Self {
        Self {
            id: row.id,
            evaluation_run_id: row.evaluation_run_id,
            metric_definition_id: row.metric_definition_id,
            metric_name: row.metric_name,
            score: row.score,
            explanation: row.explanation,
            reasoning: row.reasoning,
            raw_json: row.raw_json,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: String,
    scope_type: String,
    scope_id: String,
    start_date: String,
    end_date: String,
    content: String,
    summary_text: String,
    created_at: String,
}

impl TryFrom<ReportRow> for Report {
    type Error = StorageError;

    fn try_from(row: ReportRow) -> StorageResult<Self> {
        let content = serde_json::from_str(&row.content).map_err(|e| StorageError::Serialization {
            message: format!("Invalid report content: {}", e),
        })?;

        Ok(Self {
            id: row.id,
            scope_type: parse_column("scope_type", &row.scope_type)?,
            scope_id: row.scope_id,
            start_date: parse_timestamp(&row.start_date),
            end_date: parse_timestamp(&row.end_date),
            content,
            summary_text: row.summary_text,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

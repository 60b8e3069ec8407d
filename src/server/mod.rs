//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::provider::LlmProvider;
use crate::services::{
    CatalogService, DashboardService, DesignService, EvaluationService, ReportService, ServiceCore,
};
use crate::storage::SqliteStorage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Projects, test cases and examples.
    pub catalog: CatalogService,
    /// Metric design lifecycle.
    pub design: DesignService,
    /// Scoring and versioned runs.
    pub evaluation: EvaluationService,
    /// Run comparisons and roll-ups.
    pub reports: ReportService,
    /// Score series and summaries.
    pub dashboard: DashboardService,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, storage: SqliteStorage, provider: Arc<dyn LlmProvider>) -> Self {
        tracing::info!(
            provider = provider.name(),
            judge_pipe = %config.pipes.judge,
            blocklist = config.evaluation.blocklist.len(),
            "AppState initializing"
        );

        let core = ServiceCore::new(storage.clone(), provider);
        let blocklist = config.evaluation.blocklist.clone();

        Self {
            catalog: CatalogService::new(core.clone()),
            design: DesignService::new(core.clone()),
            evaluation: EvaluationService::new(core.clone(), blocklist),
            reports: ReportService::new(core.clone()),
            dashboard: DashboardService::new(core),
            config,
            storage,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

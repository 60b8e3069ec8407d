//! Shared infrastructure for the evaluation services.
//!
//! [`ServiceCore`] bundles the record store and the LLM provider so each
//! service composes it instead of repeating the fields.

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::provider::{EvaluationContext, LlmProvider};
use crate::storage::{Project, SqliteStorage, Storage, TestCase};

/// Core infrastructure shared by all services.
#[derive(Clone)]
pub struct ServiceCore {
    storage: SqliteStorage,
    provider: Arc<dyn LlmProvider>,
}

impl ServiceCore {
    /// Create a new service core.
    pub fn new(storage: SqliteStorage, provider: Arc<dyn LlmProvider>) -> Self {
        Self { storage, provider }
    }

    /// Get a reference to the storage backend.
    #[inline]
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Get a reference to the LLM provider.
    #[inline]
    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// Load a project or fail with NotFound.
    pub async fn require_project(&self, id: &str) -> AppResult<Project> {
        self.storage
            .get_project(id)
            .await?
            .ok_or_else(|| AppError::not_found("Project", id))
    }

    /// Load a test case or fail with NotFound.
    pub async fn require_test_case(&self, id: &str) -> AppResult<TestCase> {
        self.storage
            .get_test_case(id)
            .await?
            .ok_or_else(|| AppError::not_found("TestCase", id))
    }

    /// Build the provider context for a test case.
    pub async fn context_for(&self, test_case: &TestCase) -> AppResult<EvaluationContext> {
        let examples = self.storage.list_examples(&test_case.id).await?;
        Ok(EvaluationContext::new(test_case, &examples))
    }
}

/// Reject blank text fields.
pub(crate) fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::invalid(field, "must not be empty"));
    }
    Ok(())
}

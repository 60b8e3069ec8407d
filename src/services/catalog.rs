//! Projects, test cases and examples.

use serde::Serialize;
use tracing::info;

use super::core::{require_text, ServiceCore};
use crate::error::AppResult;
use crate::storage::{Example, ExampleType, MetricDefinition, Project, Storage, TestCase};

/// A test case with everything attached to it.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseDetail {
    /// The test case itself.
    #[serde(flatten)]
    pub test_case: TestCase,
    /// Examples in creation order.
    pub examples: Vec<Example>,
    /// Active metrics, empty until confirmed.
    pub metrics: Vec<MetricDefinition>,
}

/// CRUD over the catalog entities.
#[derive(Clone)]
pub struct CatalogService {
    core: ServiceCore,
}

impl CatalogService {
    /// Create a new catalog service.
    pub fn new(core: ServiceCore) -> Self {
        Self { core }
    }

    /// Create a project with a non-empty name.
    pub async fn create_project(&self, name: &str, description: Option<String>) -> AppResult<Project> {
        require_text("name", name)?;
        let mut project = Project::new(name.trim());
        project.description = description;
        self.core.storage().create_project(&project).await?;

        info!(project_id = %project.id, name = %project.name, "Project created");
        Ok(project)
    }

    /// All projects, newest first.
    pub async fn list_projects(&self) -> AppResult<Vec<Project>> {
        Ok(self.core.storage().list_projects().await?)
    }

    /// A project by ID.
    pub async fn get_project(&self, id: &str) -> AppResult<Project> {
        self.core.require_project(id).await
    }

    /// Create a test case in an existing project.
    pub async fn create_test_case(
        &self,
        project_id: &str,
        name: &str,
        description: Option<String>,
    ) -> AppResult<TestCase> {
        require_text("name", name)?;
        self.core.require_project(project_id).await?;

        let mut test_case = TestCase::new(project_id, name.trim());
        test_case.description = description;
        self.core.storage().create_test_case(&test_case).await?;

        info!(test_case_id = %test_case.id, project_id = %project_id, "Test case created");
        Ok(test_case)
    }

    /// Test cases of a project in creation order.
    pub async fn list_test_cases(&self, project_id: &str) -> AppResult<Vec<TestCase>> {
        self.core.require_project(project_id).await?;
        Ok(self.core.storage().list_test_cases(project_id).await?)
    }

    /// A test case with its examples and active metrics.
    pub async fn get_test_case(&self, id: &str) -> AppResult<TestCaseDetail> {
        let test_case = self.core.require_test_case(id).await?;
        let storage = self.core.storage();
        Ok(TestCaseDetail {
            examples: storage.list_examples(id).await?,
            metrics: storage.list_active_metrics(id).await?,
            test_case,
        })
    }

    /// Delete a test case with its examples, metrics, iterations and runs.
    pub async fn delete_test_case(&self, id: &str) -> AppResult<()> {
        self.core.storage().delete_test_case(id).await?;
        info!(test_case_id = %id, "Test case deleted");
        Ok(())
    }

    /// Attach an example; the type defaults to desired.
    pub async fn add_example(
        &self,
        test_case_id: &str,
        content: &str,
        example_type: Option<ExampleType>,
    ) -> AppResult<Example> {
        require_text("content", content)?;
        self.core.require_test_case(test_case_id).await?;

        let example = Example::new(test_case_id, content, example_type.unwrap_or_default());
        self.core.storage().create_example(&example).await?;
        Ok(example)
    }
}

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("LLM capability failed: {message}")]
    Capability { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Shorthand for a missing entity
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        AppError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Shorthand for a state conflict
    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for a field-level input error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Metrics already confirmed for test case {test_case_id}")]
    MetricsLocked { test_case_id: String },

    #[error("Iteration already confirmed: {iteration_id}")]
    IterationConfirmed { iteration_id: String },

    #[error("Duplicate key: {message}")]
    DuplicateKey { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl StorageError {
    /// Whether this error is a uniqueness violation worth retrying
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            StorageError::DuplicateKey { .. } => true,
            StorageError::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Metric definition validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Validation failed: {field} - {reason}")]
    Field { field: String, reason: String },
}

impl ValidationError {
    /// Create a field-level validation error
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Field { field, reason } => AppError::InvalidInput { field, reason },
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => AppError::NotFound { entity, id },
            StorageError::MetricsLocked { .. } => {
                AppError::conflict("Metrics already confirmed for this test case")
            }
            StorageError::IterationConfirmed { .. } => {
                AppError::conflict("Iteration already confirmed")
            }
            err if err.is_duplicate_key() => AppError::conflict(err.to_string()),
            err => AppError::Storage(err),
        }
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

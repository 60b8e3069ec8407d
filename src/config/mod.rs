use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Default phrases counted by the deterministic blocklist rule
pub const DEFAULT_BLOCKLIST: &[&str] = &["guaranteed", "risk-free", "100%"];

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub langbase: LangbaseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub evaluation: EvaluationConfig,
}

/// Which provider backs the LLM capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmMode {
    /// Deterministic in-process provider
    #[default]
    Stub,
    /// Langbase pipes over HTTPS
    Langbase,
}

impl std::str::FromStr for LlmMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stub" => Ok(LlmMode::Stub),
            "langbase" => Ok(LlmMode::Langbase),
            other => Err(format!("Unknown LLM mode: {}", other)),
        }
    }
}

/// LLM provider selection
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub mode: LlmMode,
    pub model: String,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration, one pipe per capability
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub metric_design: String,
    pub judge: String,
    pub gap_analysis: String,
    pub narrative: String,
}

/// Deterministic scoring configuration
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub blocklist: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            mode: env::var("LLM_MODE")
                .unwrap_or_else(|_| "stub".to_string())
                .parse()
                .map_err(|message| AppError::Config { message })?,
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "openai:gpt-4o-mini".to_string()),
        };

        let api_key = env::var("LANGBASE_API_KEY").unwrap_or_default();
        if llm.mode == LlmMode::Langbase && api_key.trim().is_empty() {
            return Err(AppError::Config {
                message: "LANGBASE_API_KEY is required when LLM_MODE=langbase".to_string(),
            });
        }

        let langbase = LangbaseConfig {
            api_key,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/evals.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let defaults = PipeConfig::default();
        let pipes = PipeConfig {
            metric_design: env::var("PIPE_METRIC_DESIGN").unwrap_or(defaults.metric_design),
            judge: env::var("PIPE_JUDGE").unwrap_or(defaults.judge),
            gap_analysis: env::var("PIPE_GAP_ANALYSIS").unwrap_or(defaults.gap_analysis),
            narrative: env::var("PIPE_NARRATIVE").unwrap_or(defaults.narrative),
        };

        let evaluation = match env::var("EVAL_BLOCKLIST") {
            Ok(raw) => EvaluationConfig::from_list(&raw),
            Err(_) => EvaluationConfig::default(),
        };

        Ok(Config {
            llm,
            langbase,
            database,
            logging,
            request,
            pipes,
            evaluation,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            langbase: LangbaseConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            request: RequestConfig::default(),
            pipes: PipeConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl Default for LangbaseConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.langbase.com".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/evals.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            metric_design: "metric-design-v1".to_string(),
            judge: "metric-judge-v1".to_string(),
            gap_analysis: "gap-analysis-v1".to_string(),
            narrative: "report-narrative-v1".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: LlmMode::Stub,
            model: "openai:gpt-4o-mini".to_string(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EvaluationConfig {
    /// Parse a comma-separated phrase list; blank entries are dropped
    pub fn from_list(raw: &str) -> Self {
        let blocklist: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if blocklist.is_empty() {
            return Self::default();
        }
        Self { blocklist }
    }
}

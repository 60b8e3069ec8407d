use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{LangbaseError, LangbaseResult};

/// Message in a Langbase conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Request to run a Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    /// Pipe name (required by Langbase API)
    pub name: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    /// Model overriding the pipe's configured one for this run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Response from a Langbase pipe
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    pub completion: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    pub raw: Option<RawResponse>,
}

/// Raw model response details
#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl PipeRequest {
    /// Create a non-streaming pipe request
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
            model: None,
        }
    }

    /// Run with `model` instead of the pipe's own
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl PipeResponse {
    /// Completion text with surrounding whitespace removed
    pub fn text(&self) -> &str {
        self.completion.trim()
    }

    /// Parse the completion as a JSON document of type `T`
    pub fn parse_json<T: DeserializeOwned>(&self) -> LangbaseResult<T> {
        let json = extract_json_from_completion(&self.completion)
            .map_err(|message| LangbaseError::InvalidResponse { message })?;

        serde_json::from_str(json).map_err(|e| LangbaseError::InvalidResponse {
            message: format!("Completion did not match the expected shape: {}", e),
        })
    }
}

/// Locate the JSON document inside a completion.
///
/// Accepts raw JSON, fenced ```json blocks, bare ``` fences, and as a last
/// resort the outermost `{...}` span of prose-wrapped output.
pub fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    if let (Some(start), Some(end)) = (completion.find('{'), completion.rfind('}')) {
        if start < end {
            return Ok(&completion[start..=end]);
        }
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Request to create a new Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct CreatePipeRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsert: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

/// Response from creating a pipe
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePipeResponse {
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub owner_login: String,
    pub url: String,
    #[serde(rename = "type")]
    pub pipe_type: String,
    pub api_key: String,
}

impl CreatePipeRequest {
    /// Create a new pipe request with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            model: None,
            upsert: None,
            json: None,
            temperature: None,
            max_tokens: None,
            messages: None,
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set model (e.g., "openai:gpt-4o-mini")
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Enable upsert (update if exists)
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = Some(upsert);
        self
    }

    /// Enable JSON output mode
    pub fn with_json_output(mut self, json: bool) -> Self {
        self.json = Some(json);
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set system/user messages
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }
}

/// Static description of one capability pipe.
#[derive(Debug, Clone, Copy)]
pub struct PipeTemplate {
    /// Human readable purpose, sent as the pipe description.
    pub description: &'static str,
    /// System prompt installed on the pipe.
    pub system_prompt: &'static str,
    /// Whether the pipe answers in JSON mode.
    pub json_output: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl PipeTemplate {
    /// Build the creation request for this template under `name`
    pub fn to_request(&self, name: &str, model: &str) -> CreatePipeRequest {
        CreatePipeRequest::new(name)
            .with_description(self.description)
            .with_model(model)
            .with_upsert(true)
            .with_json_output(self.json_output)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_messages(vec![Message::system(self.system_prompt)])
    }
}

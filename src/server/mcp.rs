//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// Server name reported in the initialize handshake.
pub const SERVER_NAME: &str = "mcp-langbase-evals";

/// MCP protocol version supported.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier, null when the request could not be parsed.
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    fn text(text: String, is_error: Option<bool>) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error,
        }
    }
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP Server running over stdio.
///
/// Reads one JSON-RPC message per line from stdin and writes responses
/// to stdout. Logs go to stderr.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("MCP Langbase Evals Server starting...");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let Some(response) = self.handle_line(&line).await else {
                continue;
            };

            let response_json = serde_json::to_string(&response)?;
            debug!(response = %response_json, "Sending response");

            stdout.write_all(response_json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        Ok(())
    }

    /// Handle one raw input line; `None` means nothing is written back.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        debug!(request = %trimmed, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle a single JSON-RPC request.
    /// Notifications (no id) never get a response.
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Received notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");
        JsonRpcResponse::success(id, json!({ "tools": list_tools() }))
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let tool_result = match handle_tool_call(&self.state, &params.name, params.arguments).await
        {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                    error!(error = %e, "Failed to serialize tool result");
                    format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                });
                ToolCallResult::text(text, None)
            }
            Err(e) => {
                info!(tool = %params.name, error = %e, "Tool call failed");
                ToolCallResult::text(format!("Error: {}", e), Some(true))
            }
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }
}

/// Every tool this server exposes, in listing order.
pub fn list_tools() -> Vec<Tool> {
    vec![
        // Catalog
        get_project_create_tool(),
        get_project_list_tool(),
        get_testcase_create_tool(),
        get_testcase_list_tool(),
        id_tool("testcase_get", "Get a test case with its examples and active metrics.", "test_case_id"),
        id_tool(
            "testcase_delete",
            "Delete a test case together with its examples, metrics, design iterations and runs.",
            "test_case_id",
        ),
        get_example_add_tool(),
        // Metric design
        get_design_start_tool(),
        get_design_confirm_tool(),
        id_tool(
            "metric_design_list",
            "List the metric design iterations of a test case in order.",
            "test_case_id",
        ),
        id_tool(
            "metric_list",
            "List the confirmed, active metrics of a test case.",
            "test_case_id",
        ),
        // Evaluation
        get_evaluation_tool(
            "evaluation_preview",
            "Score candidate outputs against the active metrics without saving anything.",
            false,
        ),
        get_evaluation_tool(
            "evaluation_commit",
            "Score candidate outputs and store the result as the next run version.",
            true,
        ),
        id_tool(
            "run_list",
            "List evaluation runs of a test case, newest version first.",
            "test_case_id",
        ),
        id_tool("run_get", "Get one evaluation run with its metric results.", "run_id"),
        // Reports
        get_report_test_case_tool(),
        get_report_project_tool(),
        id_tool("report_get", "Get a stored report.", "report_id"),
        get_report_list_tool(),
        // Dashboards
        id_tool(
            "dashboard_test_case",
            "Score history of a test case: one series per active metric plus the aggregate.",
            "test_case_id",
        ),
        id_tool(
            "dashboard_project",
            "Latest run of every test case in a project with project totals.",
            "project_id",
        ),
    ]
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// A tool whose only argument is one identifier.
fn id_tool(name: &str, description: &str, id_field: &str) -> Tool {
    let mut properties = serde_json::Map::new();
    properties.insert(
        id_field.to_string(),
        json!({ "type": "string", "description": format!("The {}", id_field.replace('_', " ")) }),
    );

    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: object_schema(Value::Object(properties), &[id_field]),
    }
}

fn get_project_create_tool() -> Tool {
    Tool {
        name: "project_create".to_string(),
        description: "Create a project that groups related test cases.".to_string(),
        input_schema: object_schema(
            json!({
                "name": { "type": "string", "minLength": 1, "description": "Project name" },
                "description": { "type": "string", "description": "Optional description" }
            }),
            &["name"],
        ),
    }
}

fn get_project_list_tool() -> Tool {
    Tool {
        name: "project_list".to_string(),
        description: "List all projects, newest first.".to_string(),
        input_schema: object_schema(json!({}), &[]),
    }
}

fn get_testcase_create_tool() -> Tool {
    Tool {
        name: "testcase_create".to_string(),
        description: "Create a test case: a prompt or context whose outputs will be evaluated."
            .to_string(),
        input_schema: object_schema(
            json!({
                "project_id": { "type": "string", "description": "Owning project" },
                "name": { "type": "string", "minLength": 1, "description": "Test case name" },
                "description": { "type": "string", "description": "What the test case exercises" }
            }),
            &["project_id", "name"],
        ),
    }
}

fn get_testcase_list_tool() -> Tool {
    Tool {
        name: "testcase_list".to_string(),
        description: "List the test cases of a project.".to_string(),
        input_schema: object_schema(
            json!({
                "project_id": { "type": "string", "description": "The project id" }
            }),
            &["project_id"],
        ),
    }
}

fn get_example_add_tool() -> Tool {
    Tool {
        name: "example_add".to_string(),
        description: "Attach an example output to a test case. Desired examples describe the target; current examples show today's output.".to_string(),
        input_schema: object_schema(
            json!({
                "test_case_id": { "type": "string", "description": "The test case id" },
                "content": { "type": "string", "minLength": 1, "description": "Example output text" },
                "example_type": {
                    "type": "string",
                    "enum": ["desired", "current"],
                    "default": "desired",
                    "description": "Role of the example"
                }
            }),
            &["test_case_id", "content"],
        ),
    }
}

fn get_design_start_tool() -> Tool {
    Tool {
        name: "metric_design_start".to_string(),
        description: "Ask the LLM to propose evaluation metrics for a test case. Each call records a new numbered iteration; fails once metrics are confirmed.".to_string(),
        input_schema: object_schema(
            json!({
                "test_case_id": { "type": "string", "description": "The test case id" },
                "user_intent": {
                    "type": "string",
                    "minLength": 1,
                    "description": "What good output should achieve"
                },
                "feedback": {
                    "type": "string",
                    "description": "Feedback on the previous proposal"
                }
            }),
            &["test_case_id", "user_intent"],
        ),
    }
}

fn get_design_confirm_tool() -> Tool {
    Tool {
        name: "metric_design_confirm".to_string(),
        description: "Confirm an iteration's proposed metrics. This locks the metric set of the test case permanently.".to_string(),
        input_schema: object_schema(
            json!({
                "test_case_id": { "type": "string", "description": "The test case id" },
                "iteration_id": { "type": "string", "description": "The iteration to accept" }
            }),
            &["test_case_id", "iteration_id"],
        ),
    }
}

fn get_evaluation_tool(name: &str, description: &str, with_notes: bool) -> Tool {
    let mut properties = json!({
        "test_case_id": { "type": "string", "description": "The test case id" },
        "outputs": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Candidate outputs; the first one is scored"
        }
    });
    if with_notes {
        properties["notes"] = json!({ "type": "string", "description": "Notes stored with the run" });
    }

    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: object_schema(properties, &["test_case_id", "outputs"]),
    }
}

fn get_report_test_case_tool() -> Tool {
    Tool {
        name: "report_test_case".to_string(),
        description: "Compare evaluation runs of a test case by version pair or date window and store a report with per-metric deltas and a narrative. Without a range every run is compared.".to_string(),
        input_schema: object_schema(
            json!({
                "test_case_id": { "type": "string", "description": "The test case id" },
                "start_version": { "type": "integer", "minimum": 1, "description": "First version" },
                "end_version": { "type": "integer", "minimum": 1, "description": "Last version" },
                "start_date": { "type": "string", "format": "date-time", "description": "Window start (RFC 3339)" },
                "end_date": { "type": "string", "format": "date-time", "description": "Window end (RFC 3339)" },
                "model": { "type": "string", "description": "Model for the narrative, e.g. openai:gpt-4o. Defaults to the configured model" }
            }),
            &["test_case_id"],
        ),
    }
}

fn get_report_project_tool() -> Tool {
    Tool {
        name: "report_project".to_string(),
        description: "Roll up every test case of a project over a date window into improved, regressed and stable counts.".to_string(),
        input_schema: object_schema(
            json!({
                "project_id": { "type": "string", "description": "The project id" },
                "start_date": { "type": "string", "format": "date-time", "description": "Window start (RFC 3339)" },
                "end_date": { "type": "string", "format": "date-time", "description": "Window end (RFC 3339)" }
            }),
            &["project_id", "start_date", "end_date"],
        ),
    }
}

fn get_report_list_tool() -> Tool {
    Tool {
        name: "report_list".to_string(),
        description: "List stored reports of a test case or project, newest first.".to_string(),
        input_schema: object_schema(
            json!({
                "scope_type": { "type": "string", "enum": ["test_case", "project"] },
                "scope_id": { "type": "string", "description": "The test case or project id" }
            }),
            &["scope_type", "scope_id"],
        ),
    }
}

// ABOUTME: MCP (Model Context Protocol) JSON-RPC surface for the bridge tools
// ABOUTME: Exposes the full tool set to MCP clients via the HTTP /mcp endpoint

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{ToolCall, ToolDispatcher};
use crate::server::AppState;

/// JSON-RPC request structure
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response structure
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tool definition for MCP
#[derive(Debug, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Get list of available tools
pub fn get_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_messages".to_string(),
            description: "Get recent messages from a Discord channel, newest first.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Discord channel ID to read from"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Number of messages to return (1-100, default 10)"
                    },
                    "before_message_id": {
                        "type": "string",
                        "description": "Only return messages older than this message ID (optional)"
                    }
                },
                "required": ["channel_id"]
            }),
        },
        ToolDefinition {
            name: "search_messages".to_string(),
            description: "Search recent messages in a channel for a case-insensitive substring."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Discord channel ID to search"
                    },
                    "query": {
                        "type": "string",
                        "description": "Substring to match, case-insensitive"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum matches to return (1-100, default 10)"
                    }
                },
                "required": ["channel_id", "query"]
            }),
        },
        ToolDefinition {
            name: "search_guild_messages".to_string(),
            description: "Search every accessible channel of a guild for a substring. Returns matches plus search metadata.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "guild_id": {
                        "type": "string",
                        "description": "Discord guild (server) ID to search"
                    },
                    "query": {
                        "type": "string",
                        "description": "Substring to match, case-insensitive"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum matches across all channels (1-50, default 50)"
                    }
                },
                "required": ["guild_id", "query"]
            }),
        },
        ToolDefinition {
            name: "get_message_by_url".to_string(),
            description: "Fetch a single message from a Discord message link.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Message URL like https://discord.com/channels/<guild>/<channel>/<message>"
                    }
                },
                "required": ["url"]
            }),
        },
        ToolDefinition {
            name: "list_channels".to_string(),
            description: "List the text channels the bridge may access, across all guilds."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "list_guild_users".to_string(),
            description: "List the human members of one guild.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "guild_id": {
                        "type": "string",
                        "description": "Discord guild (server) ID"
                    }
                },
                "required": ["guild_id"]
            }),
        },
        ToolDefinition {
            name: "list_all_users".to_string(),
            description: "List the human members of every accessible guild, deduplicated by user id.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "send_message".to_string(),
            description: "Send a message to a Discord channel, optionally as a reply.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Discord channel ID to post to"
                    },
                    "content": {
                        "type": "string",
                        "description": "Message text to send"
                    },
                    "reply_to_message_id": {
                        "type": "string",
                        "description": "Message ID to reply to (optional)"
                    }
                },
                "required": ["channel_id", "content"]
            }),
        },
        ToolDefinition {
            name: "ask_question".to_string(),
            description: "Post a question to a channel and wait for the next human reply. Blocks until a reply arrives or the timeout elapses.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Discord channel ID to ask in"
                    },
                    "prompt": {
                        "type": "string",
                        "description": "Question text to post"
                    },
                    "target_user_id": {
                        "type": "string",
                        "description": "Only accept a reply from this user ID (optional)"
                    },
                    "timeout_seconds": {
                        "type": "integer",
                        "description": "Seconds to wait for a reply (default 300)"
                    }
                },
                "required": ["channel_id", "prompt"]
            }),
        },
    ]
}

/// Handle MCP JSON-RPC requests
pub async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    tracing::debug!(method = %request.method, "MCP request received");
    let response = handle_request(&state.dispatcher, request).await;
    (StatusCode::OK, Json(response))
}

/// Route one JSON-RPC request. Split from the axum handler so tests can
/// drive the protocol without a server.
pub async fn handle_request(
    dispatcher: &ToolDispatcher,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    match request.method.as_str() {
        "initialize" => handle_initialize(&request),
        "notifications/initialized" => handle_initialized_notification(&request),
        "tools/list" => handle_tools_list(&request),
        "tools/call" => handle_tools_call(dispatcher, &request).await,
        _ => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: format!("Method not found: {}", request.method),
                data: None,
            }),
        },
    }
}

/// Handle MCP initialize request
fn handle_initialize(request: &JsonRpcRequest) -> JsonRpcResponse {
    tracing::info!("MCP initialize request received");
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: request.id.clone(),
        result: Some(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "herald",
                "version": env!("CARGO_PKG_VERSION")
            }
        })),
        error: None,
    }
}

/// Handle MCP initialized notification (no response needed for notifications)
fn handle_initialized_notification(request: &JsonRpcRequest) -> JsonRpcResponse {
    // Notifications don't require a response, but we return success anyway
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: request.id.clone(),
        result: Some(json!({})),
        error: None,
    }
}

/// Handle tools/list request
fn handle_tools_list(request: &JsonRpcRequest) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: request.id.clone(),
        result: Some(json!({
            "tools": get_tools()
        })),
        error: None,
    }
}

/// Handle tools/call request
async fn handle_tools_call(dispatcher: &ToolDispatcher, request: &JsonRpcRequest) -> JsonRpcResponse {
    let params = &request.params;

    let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    tracing::info!(tool = %tool_name, "MCP tool call");

    let call = ToolCall {
        name: tool_name.to_string(),
        arguments,
    };

    match dispatcher.dispatch(&call).await {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id.clone(),
            result: Some(json!({
                "content": [{
                    "type": "text",
                    "text": value.to_string()
                }]
            })),
            error: None,
        },
        Err(error) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id.clone(),
            result: Some(json!({
                "content": [{
                    "type": "text",
                    "text": error.to_string()
                }],
                "isError": true
            })),
            error: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn test_initialize_reports_server_info() {
        let response = handle_initialize(&request("initialize", json!({})));
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "herald");
        assert!(response.error.is_none());
    }

    #[test]
    fn test_tools_list_names_every_tool() {
        let response = handle_tools_list(&request("tools/list", json!({})));
        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        let names: Vec<&str> = tools
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(tools.len(), 9);
        for expected in [
            "get_messages",
            "search_messages",
            "search_guild_messages",
            "get_message_by_url",
            "list_channels",
            "list_guild_users",
            "list_all_users",
            "send_message",
            "ask_question",
        ] {
            assert!(names.contains(&expected), "missing tool {}", expected);
        }
    }

    #[test]
    fn test_tool_schemas_use_mcp_field_name() {
        let serialized = serde_json::to_value(get_tools()).unwrap();
        let first = &serialized.as_array().unwrap()[0];
        assert!(first.get("inputSchema").is_some());
        assert!(first.get("input_schema").is_none());
    }
}

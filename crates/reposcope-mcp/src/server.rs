// Copyright 2025 Reposcope Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stdio MCP wiring: advertises `search_code` and `read_code` and bridges
//! tool calls to the core handlers. Expected failures surface as
//! error-flagged tool results, never as protocol errors. The tool
//! definitions here are shared with the http transport.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rust_mcp_sdk::mcp_server::{server_runtime, ServerHandler};
use rust_mcp_sdk::schema::schema_utils::CallToolError;
use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolResult, Implementation, InitializeResult, ListToolsRequest,
    ListToolsResult, RpcError, ServerCapabilities, ServerCapabilitiesTools, Tool,
    LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::McpServer;
use tracing::info;

use reposcope::{handle_read, handle_search, ReadArgs, RepoService, SearchArgs, ToolOutcome};

static TOOLS: Lazy<Vec<Tool>> = Lazy::new(|| {
    serde_json::from_value(serde_json::json!([
        {
            "name": "search_code",
            "description": "Search for code across indexed git repositories using full-text search",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query (supports wildcards and phrases)"
                    },
                    "repository": {
                        "type": "string",
                        "description": "Filter by repository name (e.g., github.com/org/repo)"
                    },
                    "extension": {
                        "type": "string",
                        "description": "Filter by file extension (e.g., go, py, js)"
                    }
                },
                "required": ["query"]
            }
        },
        {
            "name": "read_code",
            "description": "Read a file from an indexed git repository",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repository": {
                        "type": "string",
                        "description": "Repository name (e.g., github.com/org/repo)"
                    },
                    "path": {
                        "type": "string",
                        "description": "File path relative to repository root"
                    }
                },
                "required": ["repository", "path"]
            }
        }
    ]))
    .expect("static tool definitions match the MCP schema")
});

/// The two tool definitions, shared by both transports.
pub(crate) fn tool_definitions() -> &'static [Tool] {
    &TOOLS
}

/// The MCP tool-result JSON for an outcome, used by the http transport's
/// hand-rolled dispatch.
pub(crate) fn tool_result_value(outcome: &ToolOutcome) -> serde_json::Value {
    serde_json::json!({
        "content": [{"type": "text", "text": outcome.text}],
        "isError": outcome.is_error,
    })
}

#[derive(Debug)]
struct HandlerError(String);

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HandlerError {}

/// Converts a core outcome into a protocol tool result, preserving the
/// error flag alongside the human-readable content block.
fn tool_result(outcome: &ToolOutcome) -> CallToolResult {
    serde_json::from_value(tool_result_value(outcome))
        .expect("text result matches the tool-result schema")
}

struct Handler {
    service: Option<Arc<RepoService>>,
}

#[async_trait]
impl ServerHandler for Handler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: &dyn McpServer,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        let tools = if self.service.is_some() {
            TOOLS.clone()
        } else {
            Vec::new()
        };
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools,
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: &dyn McpServer,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let tool_name = request.params.name.as_str();
        let Some(service) = &self.service else {
            return Err(CallToolError::unknown_tool(tool_name.to_string()));
        };

        let args = serde_json::Value::Object(request.params.arguments.clone().unwrap_or_default());

        match tool_name {
            "search_code" => {
                let parsed: SearchArgs =
                    serde_json::from_value(args).map_err(CallToolError::new)?;
                let service = Arc::clone(service);
                let outcome = tokio::task::spawn_blocking(move || handle_search(&service, parsed))
                    .await
                    .map_err(|e| CallToolError::new(HandlerError(e.to_string())))?;
                Ok(tool_result(&outcome))
            }
            "read_code" => {
                let parsed: ReadArgs = serde_json::from_value(args).map_err(CallToolError::new)?;
                let service = Arc::clone(service);
                let outcome = tokio::task::spawn_blocking(move || handle_read(&service, parsed))
                    .await
                    .map_err(|e| CallToolError::new(HandlerError(e.to_string())))?;
                Ok(tool_result(&outcome))
            }
            _ => Err(CallToolError::unknown_tool(tool_name.to_string())),
        }
    }
}

fn server_details() -> InitializeResult {
    InitializeResult {
        server_info: Implementation {
            name: "reposcope-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(
            "Search and read code across the indexed git repositories.".to_string(),
        ),
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}

/// Runs the MCP server over stdio until the host disconnects.
pub async fn serve_stdio(service: Option<Arc<RepoService>>) -> Result<()> {
    info!("starting MCP server on stdio");
    let handler = Handler { service };
    let transport = rust_mcp_sdk::StdioTransport::new(rust_mcp_sdk::TransportOptions::default())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let server = server_runtime::create_server(server_details(), transport, handler);
    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definitions_deserialize() {
        assert_eq!(TOOLS.len(), 2);
        assert_eq!(TOOLS[0].name, "search_code");
        assert_eq!(TOOLS[1].name, "read_code");
    }

    #[test]
    fn tool_result_preserves_error_flag() {
        let ok = tool_result(&ToolOutcome::ok("fine"));
        assert_eq!(ok.is_error, Some(false));

        let err = tool_result(&ToolOutcome::error("broken"));
        assert_eq!(err.is_error, Some(true));
    }
}

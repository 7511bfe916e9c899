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

//! HTTP transport: a JSON-RPC endpoint at `/mcp` plus an unauthenticated
//! `/health` probe. Requests pass the configured authenticator before
//! they reach the protocol dispatch.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::{info, warn};

use reposcope::{handle_read, handle_search, ReadArgs, RepoService, SearchArgs};

use crate::auth::Authenticator;
use crate::server::{tool_definitions, tool_result_value};
use crate::settings::ServerSettings;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Clone)]
struct AppState {
    service: Option<Arc<RepoService>>,
    auth: Arc<Authenticator>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum JsonRpcMessage {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

#[derive(Deserialize, Debug)]
struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    _jsonrpc: String,
    method: String,
    params: Option<serde_json::Value>,
    id: Option<serde_json::Value>,
}

/// Serves the MCP JSON-RPC surface over HTTP until the process exits.
pub async fn serve_http(
    settings: &ServerSettings,
    service: Option<Arc<RepoService>>,
) -> Result<()> {
    let auth = Arc::new(Authenticator::new(&settings.auth)?);
    let state = AppState { service, auth };

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/mcp", post(handle_mcp))
        .with_state(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, auth = %settings.auth.auth_type_or_none(), "http transport listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn handle_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if !state.auth.authorize(&headers) {
        warn!("rejected unauthorized request");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let parsed: Result<JsonRpcMessage, _> = serde_json::from_slice(&body);
    match parsed {
        Ok(JsonRpcMessage::Single(request)) => {
            match handle_single(&state, request).await {
                Some(value) => Json(value).into_response(),
                // A notification: no body to return.
                None => StatusCode::ACCEPTED.into_response(),
            }
        }
        Ok(JsonRpcMessage::Batch(requests)) => {
            let mut responses = Vec::new();
            for request in requests {
                if let Some(value) = handle_single(&state, request).await {
                    responses.push(value);
                }
            }
            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(serde_json::Value::Array(responses)).into_response()
            }
        }
        Err(e) => {
            let error = rpc_error(None, -32700, &format!("Parse error: {e}"));
            (StatusCode::BAD_REQUEST, Json(error)).into_response()
        }
    }
}

/// Dispatches one JSON-RPC request. Returns `None` for notifications.
async fn handle_single(state: &AppState, request: JsonRpcRequest) -> Option<serde_json::Value> {
    if request.id.is_none() {
        // Notifications ("notifications/initialized", "exit") need no
        // response.
        return None;
    }
    let id = request.id.clone();

    let value = match request.method.as_str() {
        "initialize" => rpc_result(
            id,
            serde_json::json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {
                    "name": "reposcope-mcp",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "tools/list" => {
            let tools = if state.service.is_some() {
                serde_json::to_value(tool_definitions()).unwrap_or_default()
            } else {
                serde_json::Value::Array(Vec::new())
            };
            rpc_result(id, serde_json::json!({ "tools": tools }))
        }
        "tools/call" => return Some(handle_tool_call(state, id, request.params).await),
        "$/ping" => rpc_result(id, serde_json::Value::Null),
        "shutdown" => rpc_result(id, serde_json::Value::Null),
        other => rpc_error(id, -32601, &format!("Method '{other}' not found")),
    };
    Some(value)
}

async fn handle_tool_call(
    state: &AppState,
    id: Option<serde_json::Value>,
    params: Option<serde_json::Value>,
) -> serde_json::Value {
    let Some(params) = params else {
        return rpc_error(id, -32602, "Missing params for tools/call");
    };
    let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
        return rpc_error(id, -32602, "Invalid params for tools/call");
    };
    let arguments = params
        .get("arguments")
        .and_then(|v| v.as_object())
        .cloned()
        .map(serde_json::Value::Object)
        .unwrap_or_else(|| serde_json::json!({}));

    let Some(service) = &state.service else {
        return rpc_error(id, -32601, &format!("Unknown tool: {name}"));
    };

    match name {
        "search_code" => {
            let args: SearchArgs = match serde_json::from_value(arguments) {
                Ok(args) => args,
                Err(e) => return rpc_error(id, -32602, &format!("Invalid arguments: {e}")),
            };
            let service = Arc::clone(service);
            match tokio::task::spawn_blocking(move || handle_search(&service, args)).await {
                Ok(outcome) => rpc_result(id, tool_result_value(&outcome)),
                Err(e) => rpc_error(id, -32603, &format!("Tool execution failed: {e}")),
            }
        }
        "read_code" => {
            let args: ReadArgs = match serde_json::from_value(arguments) {
                Ok(args) => args,
                Err(e) => return rpc_error(id, -32602, &format!("Invalid arguments: {e}")),
            };
            let service = Arc::clone(service);
            match tokio::task::spawn_blocking(move || handle_read(&service, args)).await {
                Ok(outcome) => rpc_result(id, tool_result_value(&outcome)),
                Err(e) => rpc_error(id, -32603, &format!("Tool execution failed: {e}")),
            }
        }
        other => rpc_error(id, -32601, &format!("Unknown tool: {other}")),
    }
}

fn rpc_result(id: Option<serde_json::Value>, result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "jsonrpc": "2.0", "result": result, "id": id })
}

fn rpc_error(id: Option<serde_json::Value>, code: i32, message: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "id": id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSettings;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    fn request(method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            _jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(serde_json::json!(1)),
        }
    }

    fn empty_state() -> AppState {
        AppState {
            service: None,
            auth: Arc::new(Authenticator::new(&AuthSettings::default()).unwrap()),
        }
    }

    async fn ready_state(base: &Path) -> AppState {
        use async_trait::async_trait;
        use reposcope::git::CommandExecutor;

        struct SeedGit;

        #[async_trait]
        impl CommandExecutor for SeedGit {
            async fn run(
                &self,
                _dir: Option<&Path>,
                _program: &str,
                args: &[&str],
            ) -> anyhow::Result<Vec<u8>> {
                match args.first().copied() {
                    Some("clone") => {
                        let dest = std::path::PathBuf::from(args[args.len() - 1]);
                        std::fs::create_dir_all(&dest)?;
                        std::fs::write(dest.join("main.go"), "package main\nfunc main() {}\n")?;
                        Ok(Vec::new())
                    }
                    Some("rev-parse") => Ok(b"c1\n".to_vec()),
                    _ => Ok(Vec::new()),
                }
            }
        }

        let settings = reposcope::RepoSettings {
            enabled: true,
            urls: vec!["git@github.com:test/repo.git".to_string()],
            base_dir: base.to_path_buf(),
            ..reposcope::RepoSettings::default()
        };
        let service =
            Arc::new(RepoService::with_executor(settings, Arc::new(SeedGit)).unwrap());
        service.initialize(&CancellationToken::new()).await.unwrap();

        AppState {
            service: Some(service),
            auth: Arc::new(Authenticator::new(&AuthSettings::default()).unwrap()),
        }
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let value = handle_single(&empty_state(), request("initialize", None))
            .await
            .unwrap();
        assert_eq!(value["result"]["serverInfo"]["name"], "reposcope-mcp");
        assert_eq!(value["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn tools_list_is_empty_without_a_service() {
        let value = handle_single(&empty_state(), request("tools/list", None))
            .await
            .unwrap();
        assert_eq!(value["result"]["tools"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let notification = JsonRpcRequest {
            _jsonrpc: "2.0".to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
            id: None,
        };
        assert!(handle_single(&empty_state(), notification).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_a_protocol_error() {
        let value = handle_single(&empty_state(), request("frobnicate", None))
            .await
            .unwrap();
        assert_eq!(value["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tools_call_runs_search_end_to_end() {
        let base = tempfile::tempdir().unwrap();
        let state = ready_state(base.path()).await;

        let value = handle_single(
            &state,
            request(
                "tools/call",
                Some(serde_json::json!({
                    "name": "search_code",
                    "arguments": {"query": "main"},
                })),
            ),
        )
        .await
        .unwrap();

        assert_eq!(value["result"]["isError"], serde_json::json!(false));
        let text = value["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("main.go"), "unexpected text: {text}");
    }

    #[tokio::test]
    async fn tools_call_surfaces_expected_failures_as_tool_results() {
        let base = tempfile::tempdir().unwrap();
        let state = ready_state(base.path()).await;

        let value = handle_single(
            &state,
            request(
                "tools/call",
                Some(serde_json::json!({
                    "name": "read_code",
                    "arguments": {
                        "repository": "github.com/test/repo",
                        "path": "../../../etc/passwd",
                    },
                })),
            ),
        )
        .await
        .unwrap();

        // An expected failure is an error-flagged result, not a protocol
        // error.
        assert!(value.get("error").is_none());
        assert_eq!(value["result"]["isError"], serde_json::json!(true));
        let text = value["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Invalid path"));
    }

    #[tokio::test]
    async fn tools_call_rejects_unknown_tools() {
        let base = tempfile::tempdir().unwrap();
        let state = ready_state(base.path()).await;

        let value = handle_single(
            &state,
            request(
                "tools/call",
                Some(serde_json::json!({"name": "rm_rf", "arguments": {}})),
            ),
        )
        .await
        .unwrap();
        assert_eq!(value["error"]["code"], -32601);
    }
}

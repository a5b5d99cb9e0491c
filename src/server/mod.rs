//! Tool protocol server: dispatcher, transports, and session management.

pub mod http;
mod session;
mod stdio;
mod tools;

pub use http::{build_router, run_http, AppState};
pub use session::{SessionManager, SessionRuntime};
pub use stdio::run_line_transport;
pub use tools::{ContentBlock, ServerCore, Tool, ToolHandler, ToolRegistry, ToolResult};

use serde_json::{json, Value};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error codes used on the wire.
pub mod rpc_codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SESSION_NOT_FOUND: i64 = -32001;
}

pub fn rpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "id": id,
    })
}

fn rpc_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

/// Whether a message is an initialization request.
pub fn is_initialize(message: &Value) -> bool {
    message.get("method").and_then(Value::as_str) == Some("initialize")
}

/// Dispatch one protocol message. Returns `None` for notifications, which
/// produce no response body.
pub async fn dispatch_message(registry: &ToolRegistry, message: &Value) -> Option<Value> {
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    let is_notification = message.get("id").is_none();

    let Some(method) = message.get("method").and_then(Value::as_str) else {
        if is_notification {
            return None;
        }
        return Some(rpc_error(
            id,
            rpc_codes::INVALID_REQUEST,
            "missing method",
        ));
    };

    if is_notification {
        tracing::debug!(method, "notification received");
        return None;
    }

    let response = match method {
        "initialize" => rpc_result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "ping" => rpc_result(id, json!({})),
        "tools/list" => {
            let tools: Vec<Value> = registry
                .all()
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "inputSchema": tool.input_schema,
                    })
                })
                .collect();
            rpc_result(id, json!({ "tools": tools }))
        }
        "tools/call" => {
            let params = message.get("params").cloned().unwrap_or(json!({}));
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return Some(rpc_error(
                    id,
                    rpc_codes::INVALID_PARAMS,
                    "tools/call requires params.name",
                ));
            };
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            let result = registry.execute(name, arguments).await;
            match serde_json::to_value(&result) {
                Ok(result) => rpc_result(id, result),
                Err(error) => {
                    tracing::error!(%error, "failed to serialize tool result");
                    rpc_error(id, rpc_codes::INTERNAL_ERROR, "Internal server error")
                }
            }
        }
        _ => rpc_error(
            id,
            rpc_codes::METHOD_NOT_FOUND,
            &format!("method '{method}' not found"),
        ),
    };
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cite::CitationEngine;
    use crate::graph::{GraphConfig, LiteratureGraph};
    use crate::ingest::{IngestSettings, IngestionEngine};
    use crate::models::ProviderKind;
    use crate::providers::mock::MockProvider;
    use crate::providers::{GoogleScholarProvider, Provider};
    use crate::utils::{FetchConfig, PacedClient};
    use std::sync::Arc;

    fn test_registry() -> ToolRegistry {
        let providers: Vec<Arc<dyn Provider>> = ProviderKind::ALL
            .iter()
            .map(|kind| Arc::new(MockProvider::new(*kind)) as Arc<dyn Provider>)
            .collect();
        let graph = Arc::new(LiteratureGraph::new(providers, GraphConfig::default()));
        let client = Arc::new(PacedClient::new(FetchConfig::default(), "test").unwrap());
        ToolRegistry::from_core(ServerCore {
            graph: graph.clone(),
            engine: IngestionEngine::new(graph.clone(), client.clone(), IngestSettings::default()),
            cite: Arc::new(CitationEngine::new(graph)),
            scholar: Arc::new(GoogleScholarProvider::new(
                client,
                "https://scholar.google.com".to_string(),
            )),
        })
    }

    #[tokio::test]
    async fn test_initialize_response() {
        let registry = test_registry();
        let response = dispatch_message(
            &registry,
            &json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
        )
        .await
        .unwrap();
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let registry = test_registry();
        let response = dispatch_message(
            &registry,
            &json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
        )
        .await
        .unwrap();
        assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let registry = test_registry();
        let response = dispatch_message(
            &registry,
            &json!({ "jsonrpc": "2.0", "id": 3, "method": "bogus/method" }),
        )
        .await
        .unwrap();
        assert_eq!(response["error"]["code"], rpc_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let registry = test_registry();
        let response = dispatch_message(
            &registry,
            &json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_tools_call_shapes_result() {
        let registry = test_registry();
        let response = dispatch_message(
            &registry,
            &json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {
                    "name": "search_literature_graph",
                    "arguments": { "query": "transformers" }
                }
            }),
        )
        .await
        .unwrap();
        let result = &response["result"];
        assert!(result["content"].is_array());
        assert!(result["structuredContent"]["results"].is_array());
        assert_eq!(result["isError"], false);
    }
}

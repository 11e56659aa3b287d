//! Minimal newline-delimited JSON-RPC 2.0 loop over stdio.
//!
//! Dispatches only the three MCP methods the core needs to be exercised
//! end to end: `initialize` (a stub handshake), `resources/list`,
//! `resources/templates/list`, and `resources/read`. Full MCP tool/prompt/
//! completion surfaces are out of scope.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::resources::CachedResourceHandler;

/// Runs the read-eval-print loop against `stdin`/`stdout` until EOF.
pub async fn run(handler: Arc<CachedResourceHandler>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    info!("stdio transport started");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("request", request_id = %request_id);

        let response = async {
            match serde_json::from_str::<Value>(&line) {
                Ok(request) => dispatch(&request, &handler).await,
                Err(err) => {
                    warn!(error = %err, "malformed JSON-RPC request");
                    error_response(Value::Null, -32700, "parse error")
                }
            }
        }
        .instrument(span)
        .await;

        let mut serialized = serde_json::to_string(&response).unwrap_or_default();
        serialized.push('\n');
        if let Err(err) = stdout.write_all(serialized.as_bytes()).await {
            error!(error = %err, "failed writing response");
            return Err(err);
        }
        stdout.flush().await?;
    }

    info!("stdio transport exiting on EOF");
    Ok(())
}

async fn dispatch(request: &Value, handler: &Arc<CachedResourceHandler>) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");

    match method {
        "initialize" => success_response(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "resources": {} },
                "serverInfo": { "name": "obsidian-mcp-server", "version": env!("CARGO_PKG_VERSION") },
            }),
        ),
        "resources/list" => success_response(id, json!({ "resources": handler.list_resources() })),
        "resources/templates/list" => success_response(
            id,
            json!({ "resourceTemplates": handler.list_resources() }),
        ),
        "resources/read" => {
            let uri = request
                .get("params")
                .and_then(|p| p.get("uri"))
                .and_then(Value::as_str);

            match uri {
                None => error_response(id, -32602, "missing required param: uri"),
                Some(uri) => match handler.execute(uri).await {
                    Ok(response) => success_response(
                        id,
                        json!({ "contents": [serde_json::to_value(response).unwrap_or(Value::Null)] }),
                    ),
                    Err(err) => error_response(id, -32000, &err.to_string()),
                },
            }
        }
        other => error_response(id, -32601, &format!("method not found: {other}")),
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

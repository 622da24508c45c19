use std::sync::Arc;

use doc_rpc::dispatcher::TOOL_NAMES;
use doc_rpc::protocol::{INTERNAL_ERROR, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};
use doc_rpc::{Dispatcher, RpcError, RpcRequest, RpcResponse};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

/// Protocol version advertised in the `initialize` handshake (§6.1). Bumped
/// whenever the wire shape of requests/responses changes in a
/// backwards-incompatible way.
const PROTOCOL_VERSION: &str = "2025-01-15";
const SERVER_NAME: &str = "compounding-docs-engine";

/// Reads line-delimited JSON-RPC 2.0 requests from stdin and writes
/// responses to stdout, one JSON object per line in both directions (§6.1).
/// `tokio::io::AsyncBufReadExt::read_line` grows its buffer to fit the line
/// rather than truncating at a fixed size, so requests larger than 64KB are
/// read in full. Diagnostics go to stderr exclusively; stdout carries only
/// the transport.
pub async fn serve(dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("stdin closed, draining in-flight work before exit");
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = handle_line(&dispatcher, trimmed).await;
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        stdout.write_all(&payload).await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn handle_line(dispatcher: &Arc<Dispatcher>, line: &str) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "failed to parse request line");
            return RpcResponse::failure(Value::Null, RpcError::new(PARSE_ERROR, err.to_string()));
        }
    };

    let id = request.id.clone().unwrap_or(Value::Null);
    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return RpcResponse::failure(id, RpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""));
    }

    if request.method == "initialize" {
        return RpcResponse::success(id, initialize_result());
    }

    if !Dispatcher::is_known_tool(&request.method) {
        return RpcResponse::failure(id, RpcError::new(METHOD_NOT_FOUND, format!("unknown method `{}`", request.method)));
    }

    let params = request.params.unwrap_or(Value::Null);
    match dispatcher.dispatch(&request.method, params).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(err) if matches!(err, doc_rpc::DispatchError::Internal(_)) => {
            error!(method = %request.method, error = %err, "unhandled internal error");
            RpcResponse::failure(id, RpcError::new(INTERNAL_ERROR, "internal error"))
        }
        Err(err) => {
            // Application failures (§6.2) are a *successful* JSON-RPC result
            // carrying the `{error: true, code, ...}` envelope, not a
            // protocol-level error.
            RpcResponse::success(
                id,
                json!({
                    "error": true,
                    "code": err.code(),
                    "message": err.to_string(),
                    "details": err.details(),
                }),
            )
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": TOOL_NAMES.iter().map(|name| json!({ "name": name })).collect::<Vec<_>>(),
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

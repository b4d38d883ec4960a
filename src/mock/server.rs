//! JSON-RPC over HTTP and WebSocket for the mock chain
//!
//! `POST /` takes single requests and batches; `GET /` upgrades to a
//! WebSocket that answers every text frame.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::rpc::{codes, ResponseMessage};

use super::state::MockChain;

/// Chain shared by every connection of one server
pub type SharedChain = Arc<Mutex<MockChain>>;

pub fn router(chain: SharedChain) -> Router {
    Router::new()
        .route("/", get(ws_rpc).post(http_rpc))
        .with_state(chain)
}

/// Serve until the listener fails
pub async fn serve(listener: TcpListener, chain: SharedChain) -> std::io::Result<()> {
    axum::serve(listener, router(chain)).await
}

fn handle_request(chain: &SharedChain, request: &Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    let response = match request.get("method").and_then(Value::as_str) {
        None => ResponseMessage::failure(id, codes::INVALID_REQUEST, "Invalid request"),
        Some(method) => {
            let params = match request.get("params") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(other) => vec![other.clone()],
            };
            let result = chain
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handle(method, &params);
            match result {
                Ok(value) => ResponseMessage::success(id, value),
                Err((code, message)) => {
                    tracing::debug!(%method, code, %message, "Mock call failed");
                    ResponseMessage::failure(id, code, message)
                }
            }
        }
    };

    serde_json::to_value(response).unwrap_or(Value::Null)
}

/// Answer one frame; `None` when there is nothing to send back
fn respond(chain: &SharedChain, frame: &str) -> Option<String> {
    let reply = match serde_json::from_str::<Value>(frame) {
        Err(e) => serde_json::to_value(ResponseMessage::failure(
            Value::Null,
            codes::PARSE_ERROR,
            format!("Parse error: {}", e),
        ))
        .unwrap_or(Value::Null),
        Ok(Value::Array(requests)) if requests.is_empty() => return None,
        Ok(Value::Array(requests)) => Value::Array(
            requests
                .iter()
                .map(|request| handle_request(chain, request))
                .collect(),
        ),
        Ok(request) => handle_request(chain, &request),
    };
    serde_json::to_string(&reply).ok()
}

async fn http_rpc(State(chain): State<SharedChain>, body: String) -> Response {
    match respond(&chain, &body) {
        Some(reply) => ([(header::CONTENT_TYPE, "application/json")], reply).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn ws_rpc(ws: WebSocketUpgrade, State(chain): State<SharedChain>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, chain))
}

async fn serve_socket(mut socket: WebSocket, chain: SharedChain) {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                if let Some(reply) = respond(&chain, text.as_str()) {
                    if socket.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    tracing::debug!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_and_parse_errors() {
        let chain = SharedChain::default();

        let reply = respond(&chain, "{not json").unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["error"]["code"], json!(codes::PARSE_ERROR));

        let batch = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber", "params": []},
            {"jsonrpc": "2.0", "id": 2, "method": "eth_compileSolidity", "params": []},
        ]);
        let reply: Value = serde_json::from_str(&respond(&chain, &batch.to_string()).unwrap()).unwrap();
        assert_eq!(reply[0]["result"], json!("0x0"));
        assert_eq!(reply[1]["error"]["message"], json!("Method not found"));
    }
}

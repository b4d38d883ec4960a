//! JSON-RPC wire codec
//!
//! Frames are whole JSON documents: one HTTP body or one WebSocket text
//! message. A frame is either a single response, a batch array, or a
//! subscription notification (which carries `method` and no `id`).

use serde_json::Value;

use crate::common::Error;

use super::types::{RequestMessage, ResponseMessage};

/// Upper bound for a single frame; anything larger is treated as garbage
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// A decoded incoming frame
#[derive(Debug)]
pub enum Incoming {
    Single(ResponseMessage),
    Batch(Vec<ResponseMessage>),
    /// Server-initiated notification, e.g. a subscription update
    Notification { method: String, params: Value },
}

/// Encode a single request
pub fn encode_request(request: &RequestMessage) -> Result<String, Error> {
    Ok(serde_json::to_string(request)?)
}

/// Encode a batch of requests as a JSON array
pub fn encode_batch(requests: &[RequestMessage]) -> Result<String, Error> {
    Ok(serde_json::to_string(requests)?)
}

/// Decode an incoming frame
pub fn decode_frame(frame: &str) -> Result<Incoming, Error> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "Frame too large: {} bytes",
            frame.len()
        )));
    }

    let value: Value = serde_json::from_str(frame)
        .map_err(|e| Error::Protocol(format!("Invalid JSON: {}", e)))?;

    match value {
        Value::Array(items) => {
            let responses = items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<ResponseMessage>, _>>()
                .map_err(|e| Error::Protocol(format!("Invalid batch response: {}", e)))?;
            Ok(Incoming::Batch(responses))
        }
        Value::Object(ref map) if map.contains_key("method") && !map.contains_key("id") => {
            let method = map
                .get("method")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            let params = map.get("params").cloned().unwrap_or(Value::Null);
            Ok(Incoming::Notification { method, params })
        }
        Value::Object(_) => {
            let response: ResponseMessage = serde_json::from_value(value)
                .map_err(|e| Error::Protocol(format!("Invalid response: {}", e)))?;
            if response.result.is_none()
                && response.error.is_none()
                && response.numeric_id().is_none()
            {
                return Err(Error::Protocol(
                    "Response has neither id, result nor error".to_string(),
                ));
            }
            Ok(Incoming::Single(response))
        }
        other => Err(Error::Protocol(format!(
            "Unexpected JSON-RPC frame: {}",
            other
        ))),
    }
}

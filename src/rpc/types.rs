//! JSON-RPC 2.0 message types
//!
//! Only the envelope is typed; `params` and `result` stay as
//! `serde_json::Value` because their shapes are dictated by the node.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::Error;

/// JSON-RPC protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Outgoing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl RequestMessage {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Incoming response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Echoed request id; `null` for errors the node could not attribute
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl ResponseMessage {
    /// Build a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response
    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Numeric request id, accepting ids echoed back as strings
    pub fn numeric_id(&self) -> Option<u64> {
        match &self.id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Convert into the decoded result or the node's error
    ///
    /// A response without `result` and without `error` is a successful
    /// `null` result.
    pub fn into_result(self) -> Result<Value, Error> {
        match self.error {
            Some(err) => Err(Error::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tagged outcome of one RPC call
///
/// Lets callers branch on the kind of failure without inspecting
/// response shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    /// Decoded `result` field
    Ok(Value),
    /// The node answered with a JSON-RPC error object
    RpcFailure { code: i64, message: String },
    /// The node could not be reached or answered garbage
    TransportFailure(String),
}

impl RpcOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, RpcOutcome::Ok(_))
    }

    /// Result value, if the call succeeded
    pub fn value(&self) -> Option<&Value> {
        match self {
            RpcOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// Convert back into a `Result`
    pub fn into_result(self) -> Result<Value, Error> {
        match self {
            RpcOutcome::Ok(v) => Ok(v),
            RpcOutcome::RpcFailure { code, message } => Err(Error::Rpc {
                code,
                message,
                data: None,
            }),
            RpcOutcome::TransportFailure(msg) => Err(Error::Transport(msg)),
        }
    }
}

impl From<Result<Value, Error>> for RpcOutcome {
    fn from(result: Result<Value, Error>) -> Self {
        match result {
            Ok(v) => RpcOutcome::Ok(v),
            Err(Error::Rpc { code, message, .. }) => RpcOutcome::RpcFailure { code, message },
            Err(e) => RpcOutcome::TransportFailure(e.to_string()),
        }
    }
}

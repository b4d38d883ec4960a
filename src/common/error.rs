//! Error types for the chain harness
//!
//! Errors keep the node's own wording intact (RPC messages are surfaced
//! verbatim) so test cases can assert on exact messages.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the chain harness
#[derive(Error, Debug)]
pub enum Error {
    // === Node Communication Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Malformed RPC response: {0}")]
    Protocol(String),

    // === Chain Errors ===
    #[error("Extrinsic {extrinsic} failed: {error}")]
    Dispatch { extrinsic: String, error: String },

    #[error("Failed to start dev node: {0}")]
    NodeStartFailed(String),

    #[error("Endpoint '{0}' is not configured for this network")]
    UnknownEndpoint(String),

    #[error("Network '{0}' is not configured")]
    UnknownNetwork(String),

    // === Test Outcome Errors ===
    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Skipped: {0}")]
    Skipped(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an RPC error from a node error object
    pub fn rpc(code: i64, message: &str) -> Self {
        Self::Rpc {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    /// Create a dispatch error for an extrinsic
    pub fn dispatch(extrinsic: &str, error: &str) -> Self {
        Self::Dispatch {
            extrinsic: extrinsic.to_string(),
            error: error.to_string(),
        }
    }

    /// Create an assertion error showing both values
    pub fn mismatch<E: std::fmt::Debug, A: std::fmt::Debug>(expected: E, actual: A) -> Self {
        Self::Assertion(format!("expected: {:?}, actual: {:?}", expected, actual))
    }

    /// Stable code used in reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport(_) => "TRANSPORT",
            Error::Rpc { .. } => "RPC",
            Error::Protocol(_) => "PROTOCOL",
            Error::Dispatch { .. } => "DISPATCH",
            Error::NodeStartFailed(_) => "NODE_START_FAILED",
            Error::UnknownEndpoint(_) | Error::UnknownNetwork(_) => "CONFIG",
            Error::Assertion(_) => "ASSERTION",
            Error::Skipped(_) => "SKIPPED",
            Error::Timeout(_) => "TIMEOUT",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Io(_) | Error::FileRead { .. } => "IO",
            Error::Json(_) => "JSON",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the node could not be reached at all
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_message_is_verbatim() {
        let e = Error::rpc(-32601, "Method not found");
        assert_eq!(e.to_string(), "RPC error -32601: Method not found");
        assert_eq!(e.kind(), "RPC");
    }

    #[test]
    fn test_mismatch_shows_both_values() {
        let e = Error::mismatch(1u64, 2u64);
        assert_eq!(e.to_string(), "Assertion failed: expected: 1, actual: 2");
    }
}

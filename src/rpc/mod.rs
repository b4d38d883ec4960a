//! JSON-RPC 2.0 client adapter
//!
//! Issues arbitrary requests to a node over HTTP or WebSocket and returns
//! decoded results or structured errors.

pub mod client;
pub mod codec;
pub mod transport;
pub mod types;

pub use client::RpcClient;
pub use types::*;

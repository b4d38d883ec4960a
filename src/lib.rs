//! Chain Harness - end-to-end testing for JSON-RPC blockchain nodes
//!
//! Connects to (or launches) a manual-seal development node, authors blocks
//! on demand and checks what they did. Suites are registered in code or
//! loaded from YAML and run by the [`registry`].

pub mod assert;
pub mod chain;
pub mod cli;
pub mod commands;
pub mod common;
pub mod helpers;
pub mod mock;
pub mod registry;
pub mod rpc;
pub mod scenario;

// Re-export commonly used types for tests
pub use chain::{BlockRef, ChainContext, CreateBlockOptions, Extrinsic};
pub use common::{Error, Result};

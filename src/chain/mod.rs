//! Chain context provider
//!
//! Connections to a node, block production on manual-seal dev nodes,
//! storage queries at a block reference, and the lifecycle of the node
//! processes and shared contexts behind them.

pub mod block;
pub mod context;
pub mod inspector;
pub mod node;
pub mod provider;
pub mod shared;
pub mod storage;

pub use block::{
    BlockRef, BlockResult, CreateBlockOptions, DispatchFailure, Event, Extrinsic, ExtrinsicResult,
};
pub use context::ChainContext;
pub use inspector::{DispatchInspector, ReceiptInspector, Submitted};
pub use provider::{ContextProvider, NetworkProvider, StaticProvider, SuiteMeta};
pub use storage::{StorageHasher, StorageKeyArg, StorageValue};

pub use crate::common::config::Foundation;

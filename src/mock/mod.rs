//! Mock manual-seal dev node
//!
//! Enough of a Substrate/Frontier dev node to exercise the harness without
//! one: block authoring, balances, receipts and raw storage, served over
//! HTTP and WebSocket. Used by the crate's tests and the `mock-node` binary.

pub mod server;
pub mod state;
pub mod tx;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::common::Result;

pub use server::{router, serve, SharedChain};
pub use state::MockChain;
pub use tx::MockTx;

/// Funded development accounts (Alith, Baltathar, Charleth, Dorothy)
pub const DEV_ACCOUNTS: [&str; 4] = [
    "0xf24FF3a9CF04c71Dbc94D0b566f7A27B94566cac",
    "0x3Cd0A705a2DC65e5b1E1205896BaA2be8A07c6e0",
    "0x798d4Ba9baf0064Ec19eB4F0a1a45785ae9D6DFc",
    "0x773539d4Ac0e786233D90A233654ccEE26a613D9",
];

/// Serve a fresh mock chain on a random local port
pub async fn spawn_local() -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, SharedChain::default()).await {
            tracing::warn!(error = %e, "Mock node stopped");
        }
    });
    Ok((addr, handle))
}

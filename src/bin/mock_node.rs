//! Mock manual-seal dev node for integration testing
//!
//! Serves an in-memory chain over HTTP and WebSocket on one port so the
//! harness can be exercised without a real node.

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;

use chain_harness::common::logging;
use chain_harness::mock::{self, SharedChain};

#[derive(Parser)]
#[command(name = "mock-node", about = "In-memory manual-seal dev node")]
struct Args {
    /// Port to listen on (HTTP and WebSocket)
    #[arg(long, default_value_t = 9944)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() {
    logging::init_cli();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, accounts = mock::DEV_ACCOUNTS.len(), "Mock node listening");
    mock::serve(listener, SharedChain::default()).await
}

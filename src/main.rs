//! Chain Harness - end-to-end test runner for manual-seal dev nodes
//!
//! Runs YAML suites against a JSON-RPC node and offers one-shot commands
//! for poking at a network by hand.

use std::path::PathBuf;

use chain_harness::cli::{self, GlobalArgs};
use chain_harness::commands::Commands;
use chain_harness::common::logging;
use clap::Parser;

#[derive(Parser)]
#[command(name = "chain-harness", about = "End-to-end test harness for JSON-RPC chain nodes")]
#[command(version, long_about = None)]
struct Cli {
    /// Network to use (default: HARNESS_NETWORK or the config default)
    #[arg(long, short, global = true)]
    network: Option<String>,

    /// Config file (default: ~/.config/chain-harness/config.toml or HARNESS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Test runs keep a log file; the guard flushes it on exit
    let guard = match &cli.command {
        Commands::Test { .. } => logging::init_run().1,
        _ => {
            logging::init_cli();
            None
        }
    };

    let global = GlobalArgs {
        network: cli.network,
        config: cli.config,
    };

    let result = cli::dispatch(cli.command, global).await;
    drop(guard);

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

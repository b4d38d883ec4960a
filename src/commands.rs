//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Key material selecting a dev account
#[derive(Args, Debug, Clone, Default)]
pub struct SignerArgs {
    /// 32-byte hex secp256k1 private key
    #[arg(long, conflicts_with = "mnemonic")]
    pub private_key: Option<String>,

    /// BIP-39 mnemonic; accounts follow m/44'/60'/0'/0/<index>
    #[arg(long)]
    pub mnemonic: Option<String>,

    /// Account index under the mnemonic (default: 0)
    #[arg(long, requires = "mnemonic")]
    pub account_index: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run YAML test suites
    #[command(alias = "t")]
    Test {
        /// Scenario files or directories containing them
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only run suites or cases whose id starts with this prefix (e.g. D01, D01T02)
        #[arg(long, short)]
        filter: Option<String>,

        /// Number of suites to run concurrently (default: from config)
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Rewrite snapshots instead of comparing against them
        #[arg(long)]
        update_snapshots: bool,
    },

    /// Issue a raw JSON-RPC call and print the result
    Rpc {
        /// Method name, e.g. eth_blockNumber
        method: String,

        /// Positional params; each is parsed as JSON, falling back to a string
        params: Vec<String>,

        /// Endpoint name from the network config (default: the network's default)
        #[arg(long, short)]
        endpoint: Option<String>,
    },

    /// Read a raw storage item
    Query {
        /// Pallet name, e.g. System
        pallet: String,

        /// Storage item name, e.g. Number
        item: String,

        /// Map key as hasher:0x<hex>; repeat for double maps
        #[arg(long = "key", short = 'k')]
        keys: Vec<String>,

        /// Block number or hash (default: best block)
        #[arg(long)]
        at: Option<String>,
    },

    /// Author a block on a dev network
    #[command(name = "create-block")]
    CreateBlock {
        /// Raw signed Ethereum transaction to include
        #[arg(long)]
        ethereum: Vec<String>,

        /// Encoded Substrate extrinsic to include
        #[arg(long)]
        substrate: Vec<String>,

        /// Report failed extrinsics instead of exiting with an error
        #[arg(long)]
        allow_failures: bool,

        /// Event (section.method) that must appear; can be repeated
        #[arg(long = "expect-event")]
        expect_events: Vec<String>,

        /// Account the extrinsics were signed by, recorded with the block
        #[command(flatten)]
        signer: SignerArgs,
    },

    /// Show the balance and nonce of an Ethereum account
    Account {
        /// 20-byte hex address
        address: String,

        /// Block number or hash (default: latest)
        #[arg(long)]
        at: Option<String>,
    },

    /// Print the account of a private key or mnemonic without connecting
    #[command(name = "derive-account")]
    DeriveAccount {
        #[command(flatten)]
        signer: SignerArgs,
    },

    /// Read one storage item across a range of blocks
    #[command(name = "scan-storage")]
    ScanStorage {
        /// Pallet name
        pallet: String,

        /// Storage item name
        item: String,

        /// Map key as hasher:0x<hex>
        #[arg(long = "key", short = 'k')]
        keys: Vec<String>,

        /// First block number (inclusive)
        #[arg(long)]
        from: u64,

        /// Last block number (inclusive, default: best block)
        #[arg(long)]
        to: Option<u64>,

        /// Blocks fetched at once
        #[arg(long, default_value = "8")]
        concurrency: usize,
    },

    /// Split a fee into burnt and treasury portions
    Fees {
        /// Total fee in the smallest unit
        fee: u128,

        /// Treasury share in percent
        #[arg(long, default_value = "20")]
        treasury_percent: u8,
    },

    /// Print the resolved configuration of a network
    Networks,
}

//! CLI command handling
//!
//! Validates arguments, connects to the selected network and formats output.
//! Input errors are reported before any connection is made.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::assert::SnapshotStore;
use crate::chain::{
    shared, BlockRef, BlockResult, ChainContext, CreateBlockOptions, Extrinsic, NetworkProvider,
    StorageKeyArg,
};
use crate::commands::{Commands, SignerArgs};
use crate::common::config::{Config, ResolvedNetwork};
use crate::common::{Error, Result};
use crate::helpers::{self, explore_block_range, fee_portions, parse_address, Signer};
use crate::registry::{Registry, RunSettings};
use crate::scenario;

/// Global options shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub network: Option<String>,
    pub config: Option<PathBuf>,
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, global: GlobalArgs) -> Result<()> {
    let config = load_config(global.config.as_deref())?;

    match command {
        Commands::Test {
            files,
            filter,
            jobs,
            update_snapshots,
        } => {
            let mut config = config;
            if update_snapshots {
                config.snapshots.update = true;
            }
            let snapshots = SnapshotStore::from_config(&config);
            let suites = scenario::load_suites(&files, &snapshots)?;

            let mut registry = Registry::with_settings(RunSettings {
                default_timeout: Duration::from_secs(config.timeouts.test_case_secs),
                print: true,
            });
            for suite in suites {
                registry.register(suite)?;
            }
            if let Some(filter) = &filter {
                registry.filter(filter);
                if registry.suites().is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "No suites or cases match '{}'",
                        filter
                    )));
                }
            }

            let jobs = jobs.unwrap_or(config.defaults.jobs);
            let network = config.network_name(global.network.as_deref());
            // Fail on an unknown network before any suite starts
            config.network(&network)?;

            let provider = Arc::new(NetworkProvider::new(config, network));
            let report = registry.run(provider, jobs).await;
            shared::teardown().await;

            report.print_summary();
            if report.passed() {
                Ok(())
            } else {
                let (_, failed, _) = report.counts();
                Err(Error::Assertion(format!(
                    "{} test case(s) failed",
                    failed.max(1)
                )))
            }
        }

        Commands::Rpc {
            method,
            params,
            endpoint,
        } => {
            let params = params.iter().map(|p| parse_param(p)).collect::<Vec<_>>();
            let ctx = connect(&config, &global).await?;
            let rpc = match &endpoint {
                Some(name) => ctx.rpc(name)?,
                None => ctx.default_rpc(),
            };
            let result = rpc.request(&method, params).await;
            ctx.close().await;
            println!("{}", serde_json::to_string_pretty(&result?)?);
            Ok(())
        }

        Commands::Query {
            pallet,
            item,
            keys,
            at,
        } => {
            let keys = parse_keys(&keys)?;
            let at = at.as_deref().map(BlockRef::parse).transpose()?;
            let ctx = connect(&config, &global).await?;
            let value = ctx.query(&pallet, &item, &keys, at).await;
            ctx.close().await;
            match value? {
                Some(value) => println!("{}", value.as_hex()),
                None => println!("{}", "<none>".dimmed()),
            }
            Ok(())
        }

        Commands::CreateBlock {
            ethereum,
            substrate,
            allow_failures,
            expect_events,
            signer,
        } => {
            let signer = resolve_signer(&signer)?;
            let extrinsics = ethereum
                .into_iter()
                .map(Extrinsic::Ethereum)
                .chain(substrate.into_iter().map(Extrinsic::Substrate))
                .collect::<Vec<_>>();
            for extrinsic in &extrinsics {
                extrinsic.validate()?;
            }

            let ctx = connect(&config, &global).await?;
            let options = CreateBlockOptions {
                signer: signer.map(|s| s.to_string()),
                allow_failures,
                expect_events,
            };
            let block = ctx.create_block(extrinsics, options).await;
            ctx.close().await;
            print_block(&block?);
            Ok(())
        }

        Commands::Account { address, at } => {
            let address = parse_address(&address)?;
            let at = at.as_deref().map(BlockRef::parse).transpose()?;
            let ctx = connect(&config, &global).await?;

            let balance = helpers::eth::balance(&ctx, &address, at.as_ref()).await;
            let nonce = helpers::eth::transaction_count(&ctx, &address, at.as_ref()).await;
            ctx.close().await;

            println!("Account: {}", address);
            println!("  Balance: {}", balance?);
            println!("  Nonce:   {}", nonce?);
            Ok(())
        }

        Commands::DeriveAccount { signer } => {
            let signer = resolve_signer(&signer)?.ok_or_else(|| {
                Error::InvalidInput("Pass --private-key or --mnemonic".to_string())
            })?;
            println!("Account: {}", signer.address);
            match signer.origin {
                helpers::SignerOrigin::PrivateKey => println!("  From:    private key"),
                helpers::SignerOrigin::Mnemonic { index } => println!(
                    "  From:    mnemonic, {}/{}",
                    helpers::signer::ETH_DERIVATION_PREFIX,
                    index
                ),
            }
            Ok(())
        }

        Commands::ScanStorage {
            pallet,
            item,
            keys,
            from,
            to,
            concurrency,
        } => {
            let keys = parse_keys(&keys)?;
            if let Some(to) = to {
                if from > to {
                    return Err(Error::InvalidInput(format!(
                        "Block range {}..={} is empty",
                        from, to
                    )));
                }
            }

            let ctx = connect(&config, &global).await?;
            let result = scan_storage(&ctx, &pallet, &item, &keys, from, to, concurrency).await;
            ctx.close().await;
            result
        }

        Commands::Fees {
            fee,
            treasury_percent,
        } => {
            let portions = fee_portions(fee, treasury_percent)?;
            println!("Fee:      {}", fee);
            println!("Burnt:    {}", portions.burnt);
            println!("Treasury: {}", portions.treasury);
            Ok(())
        }

        Commands::Networks => {
            let name = config.network_name(global.network.as_deref());
            let network = config.network(&name)?;
            print_network(&network);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

async fn connect(config: &Config, global: &GlobalArgs) -> Result<ChainContext> {
    let name = config.network_name(global.network.as_deref());
    let network = config.network(&name)?;
    ChainContext::connect(&network).await
}

/// JSON when it parses, a plain string otherwise
fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn resolve_signer(args: &SignerArgs) -> Result<Option<Signer>> {
    Signer::from_args(
        args.private_key.as_deref(),
        args.mnemonic.as_deref(),
        args.account_index,
    )
}

fn parse_keys(keys: &[String]) -> Result<Vec<StorageKeyArg>> {
    keys.iter().map(|k| StorageKeyArg::parse(k)).collect()
}

async fn scan_storage(
    ctx: &ChainContext,
    pallet: &str,
    item: &str,
    keys: &[StorageKeyArg],
    from: u64,
    to: Option<u64>,
    concurrency: usize,
) -> Result<()> {
    let to = match to {
        Some(to) => to,
        None => ctx.latest_number().await?,
    };
    if from > to {
        return Err(Error::InvalidInput(format!(
            "Block range {}..={} is empty",
            from, to
        )));
    }

    let pb = ProgressBar::new(to - from + 1);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta})")
            .map_err(|e| Error::Internal(format!("Invalid progress template: {}", e)))?
            .progress_chars("=> "),
    );

    // Rows are only kept where the value changes
    let rows: RefCell<Vec<(u64, String)>> = RefCell::new(Vec::new());
    explore_block_range(ctx, from, to, concurrency, |block| {
        let (pb, rows) = (&pb, &rows);
        async move {
            let value = ctx
                .query_at(pallet, item, keys, BlockRef::Hash(block.hash.clone()))
                .await?
                .map(|v| v.as_hex())
                .unwrap_or_else(|| "<none>".to_string());
            let mut rows = rows.borrow_mut();
            if rows.last().map(|(_, v)| v) != Some(&value) {
                rows.push((block.number, value));
            }
            pb.inc(1);
            Ok(())
        }
    })
    .await?;
    pb.finish_and_clear();

    println!("{}::{} over blocks {}..={}", pallet, item, from, to);
    for (number, value) in rows.into_inner() {
        println!("  #{:<8} {}", number, value);
    }
    Ok(())
}

fn print_block(block: &BlockResult) {
    let marker = if block.all_succeeded() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("{} Block #{} {}", marker, block.number, block.hash.dimmed());

    for (i, extrinsic) in block.extrinsics.iter().enumerate() {
        match &extrinsic.error {
            None => println!("  [{}] {} {}", i, extrinsic.hash, "ok".green()),
            Some(failure) => println!(
                "  [{}] {} {}",
                i,
                extrinsic.hash,
                format!("failed: {}", failure).red()
            ),
        }
        for event in &extrinsic.events {
            println!("      {}", event.name().dimmed());
        }
    }
}

fn print_network(network: &ResolvedNetwork) {
    println!("Network: {}", network.name.bold());
    println!("  Foundation: {:?}", network.foundation);
    println!("  Endpoints:");
    for (name, url) in &network.endpoints {
        let marker = if *name == network.default_endpoint {
            " (default)"
        } else {
            ""
        };
        println!("    {:<10} {}{}", name, url, marker);
    }
    if let Some(launch) = &network.launch {
        println!(
            "  Launch:     {} {}",
            launch.command.display(),
            launch.args.join(" ")
        );
    }
    if !network.constants.is_empty() {
        println!("  Constants:");
        for (name, value) in &network.constants {
            println!("    {:<24} {}", name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_param_falls_back_to_string() {
        assert_eq!(parse_param("1"), json!(1));
        assert_eq!(parse_param("true"), json!(true));
        assert_eq!(parse_param("[\"0x1\", false]"), json!(["0x1", false]));
        assert_eq!(parse_param("0x1a"), json!("0x1a"));
        assert_eq!(parse_param("latest"), json!("latest"));
    }

    #[test]
    fn test_parse_keys_rejects_unknown_hasher() {
        assert!(parse_keys(&["twox64concat:0x01".to_string()]).is_ok());
        assert!(parse_keys(&["sha3:0x01".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_invalid_address_fails_before_connecting() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        // Nothing listens on this port
        std::fs::write(
            &path,
            "[networks.dead]\nendpoints = { para = \"http://127.0.0.1:1\" }\n",
        )
        .unwrap();

        let err = dispatch(
            Commands::Account {
                address: "0x1234".to_string(),
                at: None,
            },
            GlobalArgs {
                network: Some("dead".to_string()),
                config: Some(path),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_invalid_signer_fails_before_connecting() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[networks.dead]\nendpoints = { para = \"http://127.0.0.1:1\" }\n",
        )
        .unwrap();
        let global = GlobalArgs {
            network: Some("dead".to_string()),
            config: Some(path),
        };
        let create = |signer: SignerArgs| Commands::CreateBlock {
            ethereum: vec![],
            substrate: vec![],
            allow_failures: false,
            expect_events: vec![],
            signer,
        };

        let bad_key = SignerArgs {
            private_key: Some("0x1234".to_string()),
            ..Default::default()
        };
        let bad_phrase = SignerArgs {
            mnemonic: Some("bottom drive obey".to_string()),
            account_index: Some(1),
            ..Default::default()
        };
        for signer in [bad_key, bad_phrase] {
            let err = dispatch(create(signer), global.clone()).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
        }

        let err = dispatch(
            Commands::DeriveAccount {
                signer: SignerArgs::default(),
            },
            global,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
    }

    #[test]
    fn test_signer_args_parse_from_command_line() {
        use clap::Parser;

        #[derive(Parser)]
        struct Cli {
            #[command(subcommand)]
            command: Commands,
        }

        let cli = Cli::try_parse_from([
            "chain-harness",
            "derive-account",
            "--mnemonic",
            helpers::signer::DEV_MNEMONIC,
            "--account-index",
            "1",
        ])
        .unwrap();
        let Commands::DeriveAccount { signer } = cli.command else {
            panic!("wrong command");
        };
        let signer = resolve_signer(&signer).unwrap().unwrap();
        assert_eq!(signer.address, parse_address(crate::mock::DEV_ACCOUNTS[1]).unwrap());

        // An index without a mnemonic is rejected by the parser
        assert!(Cli::try_parse_from(["chain-harness", "derive-account", "--account-index", "1"]).is_err());
        assert!(Cli::try_parse_from([
            "chain-harness",
            "derive-account",
            "--private-key",
            "0x01",
            "--mnemonic",
            "a b c"
        ])
        .is_err());
    }
}

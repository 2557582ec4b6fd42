//! SFC CLI
//!
//! Command-line interface for running the SFC devnet node and inspecting
//! a stored ledger.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sfc_core::decimal::format_tokens;
use sfc_core::{Address, ValidatorId};
use sfc_node::node::unix_now;
use sfc_node::{GenesisFile, NodeConfig, SfcNode};
use sfc_staking::{NodeDriverAuth, Sfc};
use sfc_storage::LedgerStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sfc")]
#[command(version)]
#[command(about = "SFC - validator staking and reward ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the devnet node
    Node {
        /// Configuration file path
        #[arg(short, long, default_value = "sfc.toml")]
        config: PathBuf,

        /// Genesis file, required for an empty data directory
        #[arg(short, long)]
        genesis: Option<PathBuf>,

        /// Data directory (overrides the config file)
        #[arg(short, long, env = "SFC_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = "sfc.toml")]
        output: PathBuf,
    },

    /// Generate a devnet genesis file
    Genesis {
        /// Number of validators
        #[arg(short, long, default_value = "4")]
        validators: u32,

        /// Genesis time (Unix seconds, defaults to now)
        #[arg(long)]
        time: Option<u64>,

        #[arg(short, long, default_value = "genesis.json")]
        output: PathBuf,
    },

    /// Print a stored ledger
    Inspect {
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Show the stakes of one account
        #[arg(long)]
        staker: Option<String>,
    },

    /// Version information
    Version,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_logging(level: &str, json: bool) {
    if json {
        tracing_subscriber::registry()
            .with(env_filter(level))
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter(level))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false),
            )
            .init();
    }
}

/// Open a stored ledger read-only
fn load_ledger(data_dir: &Path) -> anyhow::Result<Sfc> {
    let store = LedgerStore::open(data_dir.join("ledger"))?;
    let stored = store
        .load()?
        .with_context(|| format!("no ledger under {}", data_dir.display()))?;
    // inspection never drives the ledger; any authority will do
    let (authority, _) = NodeDriverAuth::issue();
    Ok(Sfc::restore(
        stored.state,
        stored.snapshots,
        Box::new(authority),
    )?)
}

fn print_ledger(sfc: &Sfc) {
    let accounting = sfc.accounting();
    println!("Owner:              {}", sfc.owner());
    println!("Accrual:            {:?}", sfc.accrual_version());
    println!("Sealed epoch:       {}", sfc.current_sealed_epoch());
    println!("Phase:              {:?}", sfc.phase());
    println!("Min gas price:      {} wei", sfc.min_gas_price());
    println!("Total stake:        {}", format_tokens(accounting.total_stake));
    println!("Active stake:       {}", format_tokens(accounting.total_active_stake));
    println!("Rewards paid:       {}", format_tokens(accounting.total_rewards_paid));
    println!("Burnt:              {}", format_tokens(accounting.total_burnt));
    println!("Treasury:           {}", format_tokens(accounting.treasury));
    println!("Slashed:            {}", format_tokens(accounting.total_slashed_stake));
    println!();
    println!("{:>4}  {:<44}  {:<10}  {:>24}  {:>24}", "ID", "AUTH", "STATUS", "SELF", "RECEIVED");
    for v in sfc.state().ledger.validators.values() {
        println!(
            "{:>4}  {:<44}  {:<10}  {:>24}  {:>24}",
            v.id,
            v.auth.to_string(),
            v.status.name(),
            format_tokens(sfc.self_stake(v.id)),
            format_tokens(v.received_stake),
        );
    }
}

fn print_staker(sfc: &Sfc, staker: &Address, now: u64) -> anyhow::Result<()> {
    let ids: Vec<ValidatorId> = sfc
        .state()
        .ledger
        .stakes
        .keys()
        .filter(|(addr, _)| addr == staker)
        .map(|(_, id)| *id)
        .collect();
    if ids.is_empty() {
        println!("{} has no stake", staker);
        return Ok(());
    }
    println!("Balance: {}", format_tokens(sfc.balance_of(staker)));
    for id in ids {
        println!(
            "validator {:>4}: stake {}  locked {}  pending {}",
            id,
            format_tokens(sfc.stake_of(staker, id)),
            format_tokens(sfc.locked_stake(staker, id, now)),
            format_tokens(sfc.pending_rewards(staker, id)?),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Node {
            config,
            genesis,
            data_dir,
        } => {
            let mut node_config = if config.exists() {
                NodeConfig::from_file(&config)?
            } else {
                NodeConfig::default()
            };
            if let Some(dir) = data_dir {
                node_config.node.data_dir = dir.display().to_string();
            }

            let level = if cli.verbose {
                "debug".to_string()
            } else {
                node_config.logging.level.clone()
            };
            init_logging(&level, cli.json || node_config.logging.format == "json");
            if !config.exists() {
                tracing::info!("Config {} not found, using defaults", config.display());
            }

            let genesis = genesis.map(|path| GenesisFile::load(&path)).transpose()?;
            std::fs::create_dir_all(&node_config.node.data_dir)?;

            let mut node = SfcNode::open(node_config, genesis.as_ref())?;
            node.run().await?;
        }

        Commands::Init { output } => {
            init_logging(if cli.verbose { "debug" } else { "info" }, cli.json);
            std::fs::write(&output, NodeConfig::default().to_toml()?)?;
            println!("Configuration written to {}", output.display());
        }

        Commands::Genesis {
            validators,
            time,
            output,
        } => {
            init_logging(if cli.verbose { "debug" } else { "info" }, cli.json);
            let genesis = GenesisFile::sample(validators, time.unwrap_or_else(unix_now));
            genesis.save(&output)?;

            println!("Genesis generated successfully!");
            println!("Output: {}", output.display());
            println!("Genesis time: {}", genesis.genesis_time);
            println!("Validators: {}", genesis.validators.len());
        }

        Commands::Inspect { data_dir, staker } => {
            init_logging(if cli.verbose { "debug" } else { "warn" }, cli.json);
            let sfc = load_ledger(&data_dir)?;
            match staker {
                Some(staker) => print_staker(&sfc, &Address::from_hex(&staker)?, unix_now())?,
                None => print_ledger(&sfc),
            }
        }

        Commands::Version => {
            println!("sfc v{}", env!("CARGO_PKG_VERSION"));
            println!("Accrual schemes: legacy, multilock");
        }
    }

    Ok(())
}

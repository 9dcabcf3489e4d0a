//! Cipher Bond - sealed-bid corporate bond auction client
//!
//! Command line front end over the bidding core:
//!
//! - **list**: show the bond listings and which auctions accept bids
//! - **encode**: print the fixed-point value a bid is submitted as
//! - **bid**: validate, encode, submit and track one bid to its outcome
//!
//! `--mode simulation` (default) runs against in-memory settlement doubles;
//! `--mode production` talks JSON-RPC to the configured node.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cipher_bond::bond::BondCatalog;
use cipher_bond::config::Config;
use cipher_bond::controller::{Submission, SubmissionController, SubmissionStatus};
use cipher_bond::encoder::{FixedPointEncoder, DEFAULT_DECIMALS};
use cipher_bond::errors::BidError;
use cipher_bond::metrics::metrics;
use cipher_bond::mock::{MockReceipts, MockSettlement};
use cipher_bond::notify::{ChannelNotifier, Notification};
use cipher_bond::rpc::JsonRpcSettlement;
use cipher_bond::settlement::{ReceiptSource, SettlementService};
use cipher_bond::validator::parse_amount;
use cipher_bond::wallet::{StaticWallet, WalletAddress};

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// In-memory settlement, every bid confirms
    Simulation,
    /// JSON-RPC settlement against the configured node
    Production,
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Operating mode
    #[arg(short, long, value_enum, default_value = "simulation")]
    mode: Mode,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List bond auctions
    List,

    /// Show the fixed-point encoding of an amount
    Encode {
        #[arg(long)]
        amount: String,

        /// Precision, defaults to the configured one
        #[arg(long)]
        decimals: Option<u32>,
    },

    /// Place a sealed bid and wait for its outcome
    Bid {
        /// Bond id
        #[arg(long)]
        bond: String,

        #[arg(long)]
        amount: String,

        /// Bidding account, overrides the configured wallet
        #[arg(long, env = "CIPHER_BOND_WALLET_ADDRESS")]
        wallet: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args.config)?;

    // Initialize logging
    init_logging(args.verbose, config.monitoring.json_logs)?;
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating mode: {:?}", args.mode);

    match &args.command {
        Command::List => list(&config)?,
        Command::Encode { amount, decimals } => {
            encode(amount, decimals.unwrap_or(config.settlement.decimals))?
        }
        Command::Bid {
            bond,
            amount,
            wallet,
        } => bid(&config, args.mode, bond, amount, wallet.as_deref()).await?,
    }

    if args.metrics && config.monitoring.enable_metrics {
        print!("{}", metrics().render()?);
    }

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "cipher_bond=debug,info"
    } else {
        "cipher_bond=info,warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &std::path::Path) -> Result<Config> {
    if path.exists() {
        Config::load(Some(path))
            .with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        Config::load(None)
    }
}

fn load_catalog(config: &Config) -> Result<BondCatalog> {
    match &config.catalog.path {
        Some(path) => BondCatalog::from_file(path),
        None => Ok(BondCatalog::demo()),
    }
}

fn list(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    for bond in &catalog.bonds {
        println!(
            "{:>3}  {:<28} {:<4} {:<9} {:>6}  min {:<10} {:<8} {}",
            bond.id,
            bond.issuer,
            bond.rating,
            bond.maturity,
            bond.yield_rate,
            bond.min_bid,
            bond.status.as_str(),
            bond.time_remaining
        );
        if let Some(notice) = bond.status.card_notice() {
            println!("     {}", notice);
        }
    }
    Ok(())
}

fn encode(raw: &str, decimals: u32) -> Result<()> {
    let encoder = FixedPointEncoder::new(decimals)
        .with_context(|| format!("Unsupported precision: {} decimals", decimals))?;
    let amount = parse_amount(raw)?;
    let encoded = encoder.encode(&amount)?;
    println!("{}", encoded);
    if decimals != DEFAULT_DECIMALS {
        info!(decimals, "Encoded at non-default precision");
    }
    Ok(())
}

async fn bid(
    config: &Config,
    mode: Mode,
    bond_id: &str,
    raw_amount: &str,
    wallet_arg: Option<&str>,
) -> Result<()> {
    let catalog = load_catalog(config)?;
    let record = catalog
        .get(bond_id)
        .with_context(|| format!("Unknown bond: {}", bond_id))?;
    let Some(bond) = record.biddable() else {
        bail!(
            "Bond {} is {}: {}",
            record.id,
            record.status,
            record.status.card_notice().unwrap_or("bidding is not available")
        );
    };

    let address = match wallet_arg {
        Some(raw) => Some(WalletAddress::parse(raw)?),
        None => config.wallet_address()?,
    };
    let wallet = match &address {
        Some(address) => StaticWallet::connected(address.clone()),
        None => {
            warn!("No wallet address configured, bidding as a disconnected session");
            StaticWallet::disconnected()
        }
    };

    let target = config.settlement_target()?;
    let (settlement, receipts): (Arc<dyn SettlementService>, Arc<dyn ReceiptSource>) = match mode {
        Mode::Simulation => {
            let settlement: Arc<dyn SettlementService> = Arc::new(MockSettlement::new());
            let receipts: Arc<dyn ReceiptSource> = Arc::new(MockReceipts::succeeding());
            (settlement, receipts)
        }
        Mode::Production => {
            let Some(from) = address.clone() else {
                bail!("Production mode needs a wallet address");
            };
            let client = Arc::new(JsonRpcSettlement::new(
                config.settlement.rpc_url.clone(),
                from,
                target.clone(),
                config.request_timeout(),
            )?);
            let settlement: Arc<dyn SettlementService> = client.clone();
            let receipts: Arc<dyn ReceiptSource> = client;
            (settlement, receipts)
        }
    };

    let encoder = FixedPointEncoder::new(target.decimals)
        .with_context(|| format!("Unsupported precision: {} decimals", target.decimals))?;
    let (notifier, mut notices) = ChannelNotifier::new();
    let controller = SubmissionController::new(
        settlement,
        receipts,
        Arc::new(notifier),
        encoder,
        config.controller_config(),
    )
    .with_call(target.call.clone());

    let outcome = match controller.submit(&bond, raw_amount, &wallet) {
        Ok(mut handle) => {
            info!(submission_id = %handle.id(), "Bid submitted, waiting for outcome");
            tokio::select! {
                submission = handle.wait() => Ok(Some(submission)),
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    handle.stop_tracking();
                    Ok(None)
                }
            }
        }
        Err(error) => Err(error),
    };

    notices.close();
    while let Some(notice) = notices.recv().await {
        print_notification(&notice);
    }

    if let Ok(Some(submission)) = &outcome {
        if let Some(tx) = &submission.transaction_ref {
            println!("transaction: {}", tx);
        }
        println!("status: {}", submission.status);
    }
    bid_exit(outcome)
}

/// Only a confirmed bid exits cleanly
fn bid_exit(outcome: Result<Option<Submission>, BidError>) -> Result<()> {
    match outcome? {
        Some(submission) if submission.status == SubmissionStatus::Confirmed => Ok(()),
        Some(submission) => match submission.error {
            Some(error) => bail!("Bid {}: {}", submission.status, error),
            None => bail!("Bid ended as {}", submission.status),
        },
        None => bail!("Stopped tracking before the bid reached an outcome"),
    }
}

fn print_notification(notice: &Notification) {
    println!("[{:?}] {}: {}", notice.severity, notice.title, notice.description);
}

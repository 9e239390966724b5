//! xdomain-bridge CLI
//!
//! - `deposit`  - L1 -> L2, waits until relayed on L2
//! - `withdraw` - L2 -> L1, waits out the challenge period and finalizes
//! - `resume`   - continue an interrupted transfer from its checkpoint
//! - `status`   - one-shot status of the checkpointed transfer
//! - `balances` - print (optionally repeated) balance snapshots

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Result, WrapErr};
use crossdomain_rs::evm::{resolve_signers, OpStackMessenger};
use crossdomain_rs::{cancel_pair, BridgeError, BridgeOrchestrator, CheckpointStore};
use tracing::{info, warn};

use xdomain_bridge::report::{self, parse_address, parse_amount};
use xdomain_bridge::shutdown;
use xdomain_bridge::Config;

const DEFAULT_LOG_FILTER: &str = "info,crossdomain_rs=debug,xdomain_bridge=debug";

#[derive(Parser)]
#[command(name = "xdomain-bridge")]
#[command(about = "Move ETH and ERC20 tokens between L1 and an OP-stack L2", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Load environment from this file instead of `.env`
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deposit from L1 to L2 and wait until the message is relayed
    Deposit {
        /// Amount in base units (wei for ETH)
        #[arg(long, value_parser = parse_amount)]
        amount: U256,

        /// L1 token address (ERC20 transfers)
        #[arg(long, value_parser = parse_address, requires = "l2_token")]
        l1_token: Option<Address>,

        /// L2 token address (ERC20 transfers)
        #[arg(long, value_parser = parse_address, requires = "l1_token")]
        l2_token: Option<Address>,
    },

    /// Withdraw from L2 to L1, finalize, and wait until relayed
    Withdraw {
        /// Amount in base units (wei for ETH)
        #[arg(long, value_parser = parse_amount)]
        amount: U256,

        /// L1 token address (ERC20 transfers)
        #[arg(long, value_parser = parse_address, requires = "l2_token")]
        l1_token: Option<Address>,

        /// L2 token address (ERC20 transfers)
        #[arg(long, value_parser = parse_address, requires = "l1_token")]
        l2_token: Option<Address>,
    },

    /// Continue the transfer saved in the checkpoint file
    Resume {
        /// Checkpoint file (defaults to CHECKPOINT_PATH)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Query the current status of the checkpointed transfer
    Status {
        /// Checkpoint file (defaults to CHECKPOINT_PATH)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Print balances on both chains
    Balances {
        /// L1 token address (ERC20 balances)
        #[arg(long, value_parser = parse_address, requires = "l2_token")]
        l1_token: Option<Address>,

        /// L2 token address (ERC20 balances)
        #[arg(long, value_parser = parse_address, requires = "l1_token")]
        l2_token: Option<Address>,

        /// Number of snapshots to take
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Delay between snapshots
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

impl Commands {
    fn checkpoint_override(&self) -> Option<PathBuf> {
        match self {
            Commands::Resume { checkpoint } | Commands::Status { checkpoint } => checkpoint.clone(),
            _ => None,
        }
    }
}

fn main() -> Result<ExitCode> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.env_file {
        Some(path) => {
            if !path.exists() {
                bail!("env file {} does not exist", path.display());
            }
            Config::load_from_file(path)?
        }
        None => Config::load()?,
    };
    info!(
        network = %config.network,
        l1_chain_id = config.l1.chain_id,
        l2_chain_id = config.l2.chain_id,
        credential = config.credential.kind(),
        "Configuration loaded"
    );

    let store = config.checkpoint_store(cli.command.checkpoint_override());

    let (l1_endpoint, l2_endpoint) = config.endpoints()?;
    let (l1, l2) = resolve_signers(&config.credential, l1_endpoint, l2_endpoint)?;
    l1.verify_chain().await.wrap_err("L1 endpoint check failed")?;
    l2.verify_chain().await.wrap_err("L2 endpoint check failed")?;

    let l1 = Arc::new(l1);
    let l2 = Arc::new(l2);
    let messenger = Arc::new(
        OpStackMessenger::new(l1.clone(), l2.clone(), config.contracts)
            .with_min_gas_limit(config.flow.min_gas_limit),
    );
    let orchestrator =
        BridgeOrchestrator::new(l1.clone(), l2.clone(), messenger, config.flow_settings())
            .with_checkpoints(store.clone());

    // Ctrl+C / SIGTERM cancel the running flow at its next suspension point
    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(shutdown::handle_signals(cancel_handle));

    let outcome = match cli.command {
        Commands::Deposit {
            amount,
            l1_token,
            l2_token,
        } => {
            refuse_pending_checkpoint(&store)?;
            let asset = report::asset_from_args(l1_token, l2_token)?;
            orchestrator.deposit(asset, amount, &cancel).await
        }
        Commands::Withdraw {
            amount,
            l1_token,
            l2_token,
        } => {
            refuse_pending_checkpoint(&store)?;
            let asset = report::asset_from_args(l1_token, l2_token)?;
            orchestrator.withdraw(asset, amount, &cancel).await
        }
        Commands::Resume { .. } => {
            let Some(checkpoint) = store.load()? else {
                bail!("no checkpoint found at {}", store.path().display());
            };
            orchestrator.resume(checkpoint, &cancel).await
        }
        Commands::Status { .. } => {
            let Some(checkpoint) = store.load()? else {
                println!("No transfer in progress ({})", store.path().display());
                return Ok(ExitCode::SUCCESS);
            };
            let status = orchestrator.status(&checkpoint.handle).await?;
            report::print_status(&checkpoint, status);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Balances {
            l1_token,
            l2_token,
            repeat,
            interval_ms,
        } => {
            let asset = report::asset_from_args(l1_token, l2_token)?;
            let mut index = 0u32;
            orchestrator
                .reporter()
                .watch(
                    l1.as_ref(),
                    l2.as_ref(),
                    asset,
                    repeat.max(1),
                    Duration::from_millis(interval_ms),
                    &cancel,
                    |snapshot| {
                        index += 1;
                        report::print_balances(&format!("[{}]", index), snapshot);
                    },
                )
                .await?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    match outcome {
        Ok(transfer) => {
            report::print_report(&transfer);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            report::print_failure(&failure, store.path());
            if matches!(failure.error, BridgeError::Cancelled { .. }) {
                Ok(ExitCode::from(shutdown::INTERRUPTED))
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// An unfinished transfer must be resumed or removed before starting another
fn refuse_pending_checkpoint(store: &CheckpointStore) -> Result<()> {
    if let Some(pending) = store.load()? {
        warn!(
            stage = %pending.stage,
            tx_hash = %pending.handle.tx_hash,
            "Unfinished transfer checkpoint present"
        );
        bail!(
            "unfinished transfer in {} ({}); run `resume` or delete the file",
            store.path().display(),
            pending.handle
        );
    }
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging(verbose: bool, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

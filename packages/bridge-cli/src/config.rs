//! Environment configuration for the bridge CLI
//!
//! Everything is read from environment variables, after loading a `.env`
//! file (or the file given with `--env-file`) when present.
//!
//! ## Variables
//!
//! | Variable | Default | Notes |
//! |---|---|---|
//! | `L1_RPC_URL`, `L1_CHAIN_ID` | required | |
//! | `L2_RPC_URL`, `L2_CHAIN_ID` | required | |
//! | `BRIDGE_MNEMONIC` | | with `BRIDGE_MNEMONIC_INDEX` (0) |
//! | `BRIDGE_PRIVATE_KEY` | | exclusive with the mnemonic |
//! | `BRIDGE_NETWORK` | `custom` | `mainnet`, `sepolia`, `custom` |
//! | `L1_STANDARD_BRIDGE`, `OPTIMISM_PORTAL`, `L2_OUTPUT_ORACLE` | preset | required for `custom` |
//! | `POLL_INTERVAL_MS` | 1000 | |
//! | `POLL_TIMEOUT_MS` | 3600000 | |
//! | `INCLUSION_TIMEOUT_MS` | 300000 | |
//! | `RETRY_ATTEMPTS` | 3 | |
//! | `RETRY_DELAY_MS` | 1000 | |
//! | `MIN_GAS_LIMIT` | 200000 | |
//! | `CHECKPOINT_PATH` | `.xdomain-checkpoint.json` | |

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use crossdomain_rs::evm::{L1Contracts, Network};
use crossdomain_rs::{
    ChainEndpoint, CheckpointStore, Credential, FlowSettings, PollConfig, RetryConfig,
};
use eyre::{eyre, Result, WrapErr};

/// One side of the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

/// Polling, retry and submission knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub inclusion_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub min_gas_limit: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            poll_timeout_ms: default_poll_timeout(),
            inclusion_timeout_ms: default_inclusion_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
            min_gas_limit: default_min_gas_limit(),
        }
    }
}

/// Main configuration for the CLI
///
/// `Debug` is safe to log: the credential prints as `<redacted>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub l1: ChainConfig,
    pub l2: ChainConfig,
    pub credential: Credential,
    pub network: Network,
    pub contracts: L1Contracts,
    pub flow: FlowConfig,
    pub checkpoint_path: PathBuf,
}

/// Default functions
fn default_poll_interval() -> u64 {
    1000
}

fn default_poll_timeout() -> u64 {
    3_600_000
}

fn default_inclusion_timeout() -> u64 {
    300_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_min_gas_limit() -> u32 {
    200_000
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(".xdomain-checkpoint.json")
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} environment variable is required", name))
}

/// Optional numeric variable; a present but unparsable value is an error
fn parsed_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| eyre!("{} must be a valid number, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

fn optional_address(name: &str) -> Result<Option<Address>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => Address::from_str(raw.trim())
            .map(Some)
            .map_err(|e| eyre!("{} is not a valid address: {}", name, e)),
        _ => Ok(None),
    }
}

/// Resolve the credential variables
///
/// Exactly one of `BRIDGE_MNEMONIC` and `BRIDGE_PRIVATE_KEY` must be set.
pub fn credential_from_env() -> Result<Credential> {
    let mnemonic = env::var("BRIDGE_MNEMONIC").ok().filter(|v| !v.trim().is_empty());
    let private_key = env::var("BRIDGE_PRIVATE_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty());

    match (mnemonic, private_key) {
        (Some(_), Some(_)) => Err(eyre!(
            "both BRIDGE_MNEMONIC and BRIDGE_PRIVATE_KEY are set, use only one"
        )),
        (Some(phrase), None) => {
            let index = parsed_or("BRIDGE_MNEMONIC_INDEX", 0u32)?;
            Ok(Credential::mnemonic(phrase, index))
        }
        (None, Some(key)) => Ok(Credential::private_key(key)),
        (None, None) => Err(eyre!(
            "a credential is required: set BRIDGE_MNEMONIC or BRIDGE_PRIVATE_KEY"
        )),
    }
}

/// Combine a preset with per-address overrides
fn resolve_contracts(network: Network) -> Result<L1Contracts> {
    let bridge = optional_address("L1_STANDARD_BRIDGE")?;
    let portal = optional_address("OPTIMISM_PORTAL")?;
    let oracle = optional_address("L2_OUTPUT_ORACLE")?;

    match network.l1_contracts() {
        Some(preset) => Ok(L1Contracts {
            l1_standard_bridge: bridge.unwrap_or(preset.l1_standard_bridge),
            optimism_portal: portal.unwrap_or(preset.optimism_portal),
            l2_output_oracle: oracle.unwrap_or(preset.l2_output_oracle),
        }),
        None => Ok(L1Contracts {
            l1_standard_bridge: bridge
                .ok_or_else(|| eyre!("L1_STANDARD_BRIDGE is required for a custom network"))?,
            optimism_portal: portal
                .ok_or_else(|| eyre!("OPTIMISM_PORTAL is required for a custom network"))?,
            l2_output_oracle: oracle
                .ok_or_else(|| eyre!("L2_OUTPUT_ORACLE is required for a custom network"))?,
        }),
    }
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(Path::new(".env"))
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            dotenvy::from_path(path)
                .wrap_err_with(|| format!("Failed to load env file from {}", path.display()))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables only
    pub fn load_from_env() -> Result<Self> {
        let l1 = ChainConfig {
            rpc_url: required("L1_RPC_URL")?,
            chain_id: required("L1_CHAIN_ID")?
                .trim()
                .parse()
                .wrap_err("L1_CHAIN_ID must be a valid u64")?,
        };
        let l2 = ChainConfig {
            rpc_url: required("L2_RPC_URL")?,
            chain_id: required("L2_CHAIN_ID")?
                .trim()
                .parse()
                .wrap_err("L2_CHAIN_ID must be a valid u64")?,
        };

        let network = match env::var("BRIDGE_NETWORK") {
            Ok(raw) => raw.parse::<Network>()?,
            Err(_) => Network::Custom,
        };

        let flow = FlowConfig {
            poll_interval_ms: parsed_or("POLL_INTERVAL_MS", default_poll_interval())?,
            poll_timeout_ms: parsed_or("POLL_TIMEOUT_MS", default_poll_timeout())?,
            inclusion_timeout_ms: parsed_or("INCLUSION_TIMEOUT_MS", default_inclusion_timeout())?,
            retry_attempts: parsed_or("RETRY_ATTEMPTS", default_retry_attempts())?,
            retry_delay_ms: parsed_or("RETRY_DELAY_MS", default_retry_delay())?,
            min_gas_limit: parsed_or("MIN_GAS_LIMIT", default_min_gas_limit())?,
        };

        let config = Config {
            l1,
            l2,
            credential: credential_from_env()?,
            network,
            contracts: resolve_contracts(network)?,
            flow,
            checkpoint_path: env::var("CHECKPOINT_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_checkpoint_path),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.l1.rpc_url.trim().is_empty() {
            return Err(eyre!("L1_RPC_URL cannot be empty"));
        }
        if self.l2.rpc_url.trim().is_empty() {
            return Err(eyre!("L2_RPC_URL cannot be empty"));
        }

        if self.l1.chain_id == self.l2.chain_id {
            return Err(eyre!(
                "L1_CHAIN_ID and L2_CHAIN_ID must differ, both are {}",
                self.l1.chain_id
            ));
        }

        if let Some((l1, l2)) = self.network.chain_ids() {
            if (self.l1.chain_id, self.l2.chain_id) != (l1, l2) {
                return Err(eyre!(
                    "network {} expects chain ids {}/{}, configured {}/{}",
                    self.network,
                    l1,
                    l2,
                    self.l1.chain_id,
                    self.l2.chain_id
                ));
            }
        }

        if self.flow.poll_interval_ms == 0 {
            return Err(eyre!("POLL_INTERVAL_MS must be greater than 0"));
        }
        if self.flow.retry_attempts == 0 {
            return Err(eyre!("RETRY_ATTEMPTS must be at least 1"));
        }
        if self.flow.min_gas_limit == 0 {
            return Err(eyre!("MIN_GAS_LIMIT must be greater than 0"));
        }

        self.endpoints()?;
        Ok(())
    }

    /// Parsed L1 and L2 endpoints
    pub fn endpoints(&self) -> Result<(ChainEndpoint, ChainEndpoint)> {
        let l1 = ChainEndpoint::new(self.l1.chain_id, self.l1.rpc_url.trim())
            .wrap_err("L1_RPC_URL is not a valid URL")?;
        let l2 = ChainEndpoint::new(self.l2.chain_id, self.l2.rpc_url.trim())
            .wrap_err("L2_RPC_URL is not a valid URL")?;
        Ok((l1, l2))
    }

    /// Backoff for read-only queries
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.flow.retry_attempts,
            initial_backoff: Duration::from_millis(self.flow.retry_delay_ms),
            ..RetryConfig::default()
        }
    }

    /// Timing for orchestrated flows
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            poll: PollConfig::new(
                Duration::from_millis(self.flow.poll_interval_ms),
                Duration::from_millis(self.flow.poll_timeout_ms),
            )
            .with_retry(self.retry_config()),
            inclusion_timeout: Duration::from_millis(self.flow.inclusion_timeout_ms),
        }
    }

    /// Checkpoint store at `path`, or at `CHECKPOINT_PATH` when not given
    pub fn checkpoint_store(&self, path: Option<PathBuf>) -> CheckpointStore {
        CheckpointStore::new(path.unwrap_or_else(|| self.checkpoint_path.clone()))
    }
}

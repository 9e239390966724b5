//! Live Node Integration Test
//!
//! Runs a real deposit against an L1 / L2 pair (e.g. a local OP-stack devnet
//! or Sepolia / OP Sepolia) with a funded account.
//!
//! ## Setup
//!
//! - `L1_RPC_URL`, `L1_CHAIN_ID` - L1 endpoint
//! - `L2_RPC_URL`, `L2_CHAIN_ID` - L2 endpoint
//! - `BRIDGE_MNEMONIC` - funded account (index 0)
//! - `BRIDGE_NETWORK` - `mainnet`, `sepolia` or `custom`
//! - `L1_STANDARD_BRIDGE`, `OPTIMISM_PORTAL`, `L2_OUTPUT_ORACLE` - required for `custom`
//!
//! ## Running
//!
//! ```bash
//! cd packages/crossdomain-rs
//! cargo test --test live_node -- --ignored --nocapture
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, I256, U256};
use crossdomain_rs::evm::{resolve_signers, L1Contracts, Network, OpStackMessenger};
use crossdomain_rs::{
    Asset, BridgeOrchestrator, CancelSignal, ChainEndpoint, Credential, FlowSettings, PollConfig,
};

struct LiveEnv {
    l1: ChainEndpoint,
    l2: ChainEndpoint,
    credential: Credential,
    contracts: L1Contracts,
}

fn env(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("{} not set", name))
}

fn address(name: &str) -> Result<Address, String> {
    Address::from_str(&env(name)?).map_err(|e| format!("{}: {}", name, e))
}

impl LiveEnv {
    fn load() -> Result<Self, String> {
        let l1 = ChainEndpoint::new(
            env("L1_CHAIN_ID")?.parse().map_err(|_| "bad L1_CHAIN_ID")?,
            &env("L1_RPC_URL")?,
        )
        .map_err(|e| e.to_string())?;
        let l2 = ChainEndpoint::new(
            env("L2_CHAIN_ID")?.parse().map_err(|_| "bad L2_CHAIN_ID")?,
            &env("L2_RPC_URL")?,
        )
        .map_err(|e| e.to_string())?;

        let network: Network = env("BRIDGE_NETWORK")
            .unwrap_or_else(|_| "custom".to_string())
            .parse()
            .map_err(|e: crossdomain_rs::BridgeError| e.to_string())?;
        let contracts = match network.l1_contracts() {
            Some(contracts) => contracts,
            None => L1Contracts {
                l1_standard_bridge: address("L1_STANDARD_BRIDGE")?,
                optimism_portal: address("OPTIMISM_PORTAL")?,
                l2_output_oracle: address("L2_OUTPUT_ORACLE")?,
            },
        };

        Ok(Self {
            l1,
            l2,
            credential: Credential::mnemonic(env("BRIDGE_MNEMONIC")?, 0),
            contracts,
        })
    }
}

#[tokio::test]
#[ignore = "requires funded account on live L1 / L2 endpoints"]
async fn test_live_deposit_reaches_relayed() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,crossdomain_rs=debug")
        .try_init();

    let env = match LiveEnv::load() {
        Ok(env) => env,
        Err(e) => panic!("live environment incomplete: {}", e),
    };

    let (l1, l2) = resolve_signers(&env.credential, env.l1, env.l2).unwrap();
    l1.verify_chain().await.unwrap();
    l2.verify_chain().await.unwrap();

    let l1 = Arc::new(l1);
    let l2 = Arc::new(l2);
    let messenger = Arc::new(OpStackMessenger::new(l1.clone(), l2.clone(), env.contracts));
    let orchestrator = BridgeOrchestrator::new(
        l1,
        l2,
        messenger,
        FlowSettings {
            poll: PollConfig::new(Duration::from_secs(5), Duration::from_secs(900)),
            inclusion_timeout: Duration::from_secs(300),
        },
    );

    let amount = U256::from(1_000_000_001u64);
    let report = orchestrator
        .deposit(Asset::Native, amount, &CancelSignal::never())
        .await
        .unwrap_or_else(|f| panic!("deposit failed: {}\n{}", f.error, f.last_known));

    println!("before: {}", report.before);
    println!("after:  {}", report.after);
    // Deposits carry no L2-side fee
    let delta = report.before.delta(&report.after);
    assert_eq!(delta.l2, I256::from_raw(amount));
    assert!(delta.l1 < I256::ZERO);
}

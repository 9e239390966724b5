//! Argument parsing and console output for the CLI

use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use crossdomain_rs::{
    Asset, BalanceSnapshot, Checkpoint, Direction, FlowFailure, MessageStatus, TransferReport,
};
use eyre::{eyre, Result};

/// Parse a base-unit amount (decimal or `0x` hex)
pub fn parse_amount(raw: &str) -> Result<U256, String> {
    let raw = raw.trim();
    let amount = match raw.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(raw, 10),
    }
    .map_err(|e| format!("invalid amount '{}': {}", raw, e))?;

    if amount.is_zero() {
        return Err("amount must be greater than zero".to_string());
    }
    Ok(amount)
}

pub fn parse_address(raw: &str) -> Result<Address, String> {
    Address::from_str(raw.trim()).map_err(|e| format!("invalid address '{}': {}", raw, e))
}

/// ETH unless both token addresses are given
pub fn asset_from_args(l1_token: Option<Address>, l2_token: Option<Address>) -> Result<Asset> {
    match (l1_token, l2_token) {
        (None, None) => Ok(Asset::Native),
        (Some(l1_token), Some(l2_token)) => Ok(Asset::Erc20 { l1_token, l2_token }),
        _ => Err(eyre!("--l1-token and --l2-token must be given together")),
    }
}

pub fn print_balances(label: &str, snapshot: &BalanceSnapshot) {
    println!("{:<8} {}", label, snapshot);
}

pub fn print_report(report: &TransferReport) {
    println!("Transfer complete: {}", report.handle);
    if let Some(tx) = report.handle.finalization_tx {
        println!("Finalized in L1 tx {}", tx);
    }
    println!("Final status: {}", report.final_status);
    print_balances("Before:", &report.before);
    print_balances("After:", &report.after);

    let delta = report.before.delta(&report.after);
    println!("Change:  L1 {}    L2 {}", delta.l1, delta.l2);
}

pub fn print_failure(failure: &FlowFailure, checkpoint: &Path) {
    eprintln!("Transfer stopped: {}", failure.error);
    eprintln!("{}", failure.last_known);
    if failure.is_resumable() {
        eprintln!(
            "Progress is saved in {}; run `xdomain-bridge resume` to continue",
            checkpoint.display()
        );
    }
}

pub fn print_status(checkpoint: &Checkpoint, status: MessageStatus) {
    println!("Transfer: {}", checkpoint.handle);
    println!("Stage:    {} (saved {})", checkpoint.stage, checkpoint.updated_at);
    println!("Status:   {}", status);
    if checkpoint.handle.direction == Direction::Withdraw && status == MessageStatus::ReadyForRelay
    {
        println!("Ready to finalize: run `xdomain-bridge resume`");
    }
}

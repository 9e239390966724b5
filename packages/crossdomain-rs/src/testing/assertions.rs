//! Common Test Assertions
//!
//! Assertion helpers for transfer tests, returning `eyre` errors so they can
//! be used with `?` in live-node tests as well as unwrapped in unit tests.

use alloy::primitives::U256;
use eyre::{eyre, Result};

use crate::types::{BalanceSnapshot, Direction, MessageStatus};

/// Side of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    L1,
    L2,
}

fn side(snapshot: &BalanceSnapshot, chain: Chain) -> U256 {
    match chain {
        Chain::L1 => snapshot.l1,
        Chain::L2 => snapshot.l2,
    }
}

/// Assert that the balance on `chain` grew by exactly `expected`
pub fn assert_balance_increased(
    before: &BalanceSnapshot,
    after: &BalanceSnapshot,
    chain: Chain,
    expected: U256,
) -> Result<()> {
    assert_balance_increased_within(before, after, chain, expected, U256::ZERO)
}

/// Assert that the balance on `chain` grew by `expected` ± `tolerance`
pub fn assert_balance_increased_within(
    before: &BalanceSnapshot,
    after: &BalanceSnapshot,
    chain: Chain,
    expected: U256,
    tolerance: U256,
) -> Result<()> {
    let (b, a) = (side(before, chain), side(after, chain));
    if a < b {
        return Err(eyre!(
            "{:?} balance decreased: before {}, after {}",
            chain,
            b,
            a
        ));
    }

    let actual = a - b;
    let min = expected.saturating_sub(tolerance);
    let max = expected.saturating_add(tolerance);
    if actual < min || actual > max {
        return Err(eyre!(
            "{:?} balance increase mismatch: expected {} ± {}, got {} (before: {}, after: {})",
            chain,
            expected,
            tolerance,
            actual,
            b,
            a
        ));
    }
    Ok(())
}

/// Assert that `status` is at or past `target` for `direction`
pub fn assert_status_at_least(
    status: MessageStatus,
    target: MessageStatus,
    direction: Direction,
) -> Result<()> {
    if !status.satisfies(target, direction) {
        return Err(eyre!(
            "{} status {} has not reached {}",
            direction,
            status,
            target
        ));
    }
    Ok(())
}

//! Balance reporting across both chains
//!
//! Read-only. Every query goes through [`with_retry`], so a flaky RPC is
//! retried with backoff before a [`BridgeError::Network`] is surfaced.
//! Snapshots are returned as values; nothing is cached between calls.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use chrono::Utc;
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::error::BridgeError;
use crate::retry::{with_retry, RetryConfig};
use crate::traits::ChainSigner;
use crate::types::{Asset, BalanceSnapshot};

/// Takes [`BalanceSnapshot`]s of one account on L1 and L2
#[derive(Debug, Clone, Default)]
pub struct BalanceReporter {
    retry: RetryConfig,
}

impl BalanceReporter {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    /// Balance of `asset` held by `signer` on its chain
    ///
    /// `token` is the asset's contract on that chain, `None` for native ETH.
    pub async fn balance_of<S: ChainSigner + ?Sized>(
        &self,
        signer: &S,
        token: Option<Address>,
    ) -> Result<U256, BridgeError> {
        match token {
            None => with_retry(&self.retry, "native_balance", || signer.native_balance()).await,
            Some(token) => {
                with_retry(&self.retry, "token_balance", || signer.token_balance(token)).await
            }
        }
    }

    /// Snapshot both sides
    pub async fn snapshot<S: ChainSigner + ?Sized>(
        &self,
        l1: &S,
        l2: &S,
        asset: Asset,
    ) -> Result<BalanceSnapshot, BridgeError> {
        let l1_balance = self.balance_of(l1, asset.l1_token()).await?;
        let l2_balance = self.balance_of(l2, asset.l2_token()).await?;

        let snapshot = BalanceSnapshot {
            asset,
            l1: l1_balance,
            l2: l2_balance,
            taken_at: Utc::now(),
        };
        debug!(
            asset = %asset,
            l1 = %snapshot.l1,
            l2 = %snapshot.l2,
            "Balance snapshot"
        );
        Ok(snapshot)
    }

    /// Take `count` snapshots `interval` apart, handing each to `on_snapshot`
    ///
    /// Stops early on cancellation and returns the snapshots taken so far.
    #[allow(clippy::too_many_arguments)]
    pub async fn watch<S, F>(
        &self,
        l1: &S,
        l2: &S,
        asset: Asset,
        count: u32,
        interval: Duration,
        cancel: &CancelSignal,
        mut on_snapshot: F,
    ) -> Result<Vec<BalanceSnapshot>, BridgeError>
    where
        S: ChainSigner + ?Sized,
        F: FnMut(&BalanceSnapshot),
    {
        let mut taken = Vec::with_capacity(count as usize);
        for i in 0..count {
            if i > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!(taken = taken.len(), "Balance watch cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            let snapshot = self.snapshot(l1, l2, asset).await?;
            on_snapshot(&snapshot);
            taken.push(snapshot);
        }
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::testing::MockSigner;

    fn signers() -> (MockSigner, MockSigner) {
        let address = Address::repeat_byte(0xaa);
        (
            MockSigner::new(address, 31337).with_native_balance(U256::from(5_000_000_000u64)),
            MockSigner::new(address, 901).with_native_balance(U256::from(1_000u64)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_native() {
        let (l1, l2) = signers();
        let snapshot = BalanceReporter::default()
            .snapshot(&l1, &l2, Asset::Native)
            .await
            .unwrap();
        assert_eq!(snapshot.l1, U256::from(5_000_000_000u64));
        assert_eq!(snapshot.l2, U256::from(1_000u64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_token_uses_per_chain_address() {
        let (l1, l2) = signers();
        let l1_token = Address::repeat_byte(0x01);
        let l2_token = Address::repeat_byte(0x02);
        l1.set_token_balance(l1_token, U256::from(77u64));
        l2.set_token_balance(l2_token, U256::from(5u64));
        // Wrong-side token must not be read
        l2.set_token_balance(l1_token, U256::from(999u64));

        let snapshot = BalanceReporter::default()
            .snapshot(&l1, &l2, Asset::Erc20 { l1_token, l2_token })
            .await
            .unwrap();
        assert_eq!(snapshot.l1, U256::from(77u64));
        assert_eq!(snapshot.l2, U256::from(5u64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let (l1, l2) = signers();
        l1.fail_next_queries(2);

        let snapshot = BalanceReporter::new(RetryConfig::default())
            .snapshot(&l1, &l2, Asset::Native)
            .await
            .unwrap();
        assert_eq!(snapshot.l1, U256::from(5_000_000_000u64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_surfaces_network_error() {
        let (l1, l2) = signers();
        l1.fail_next_queries(10);

        let err = BalanceReporter::new(RetryConfig::default())
            .snapshot(&l1, &l2, Asset::Native)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_takes_requested_snapshots() {
        let (l1, l2) = signers();
        let mut seen = 0;
        let taken = BalanceReporter::default()
            .watch(
                &l1,
                &l2,
                Asset::Native,
                3,
                Duration::from_secs(1),
                &CancelSignal::never(),
                |_| seen += 1,
            )
            .await
            .unwrap();
        assert_eq!(taken.len(), 3);
        assert_eq!(seen, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_on_cancel() {
        let (l1, l2) = signers();
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let taken = BalanceReporter::default()
            .watch(
                &l1,
                &l2,
                Asset::Native,
                20,
                Duration::from_secs(1),
                &signal,
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(taken.len(), 1);
    }
}

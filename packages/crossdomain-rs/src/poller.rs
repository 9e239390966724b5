//! Status polling
//!
//! [`StatusPoller::await_status`] queries the messenger until the handle's
//! message reaches a target status, the deadline passes, or the cancel
//! signal fires.
//!
//! ## Loop
//!
//! 1. Query the status (network errors retried with backoff, never past
//!    the deadline; a query still failing at the deadline is a timeout).
//! 2. Keep the highest-ranked status seen so far. A lower one is a
//!    regression: it is logged and ignored.
//! 3. Return once the kept status ranks at or above the target.
//! 4. Fail with [`BridgeError::Timeout`] once the deadline has passed.
//! 5. Sleep `min(interval, remaining)`, racing the cancel signal.
//!
//! A zero timeout therefore performs exactly one query. Neither timeout nor
//! cancellation consumes the handle; calling again simply resumes polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::error::BridgeError;
use crate::retry::{with_retry_until, RetryConfig};
use crate::traits::BridgeMessenger;
use crate::types::{MessageStatus, TransferHandle};

/// Polling cadence and deadline
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay between status queries
    pub interval: Duration,
    /// Overall bound on one `await_status` call
    pub timeout: Duration,
    /// Backoff for failed status queries
    pub retry: RetryConfig,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(3600),
            retry: RetryConfig::default(),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Polls message status through a [`BridgeMessenger`]
pub struct StatusPoller<M: BridgeMessenger> {
    messenger: Arc<M>,
}

impl<M: BridgeMessenger> StatusPoller<M> {
    pub fn new(messenger: Arc<M>) -> Self {
        Self { messenger }
    }

    /// One status query, validated against the handle's direction
    pub async fn status(
        &self,
        handle: &TransferHandle,
        retry: &RetryConfig,
    ) -> Result<MessageStatus, BridgeError> {
        self.status_until(handle, retry, None).await
    }

    async fn status_until(
        &self,
        handle: &TransferHandle,
        retry: &RetryConfig,
        deadline: Option<Instant>,
    ) -> Result<MessageStatus, BridgeError> {
        let status = with_retry_until(retry, "message_status", deadline, || {
            self.messenger.message_status(handle)
        })
        .await?;
        status.checked_rank(handle.direction)?;
        Ok(status)
    }

    /// Wait until the handle's message reaches at least `target`
    pub async fn await_status(
        &self,
        handle: &TransferHandle,
        target: MessageStatus,
        config: &PollConfig,
        cancel: &CancelSignal,
    ) -> Result<MessageStatus, BridgeError> {
        let direction = handle.direction;
        let target_rank = target.rank(direction).ok_or_else(|| {
            BridgeError::InvalidRequest(format!("{} is not a {} status", target, direction))
        })?;

        let started = Instant::now();
        let deadline = started + config.timeout;
        let mut best: Option<MessageStatus> = None;
        let mut best_rank = 0u8;
        let mut polls = 0u32;

        debug!(
            message_hash = %handle.message.hash,
            target = %target,
            timeout_ms = config.timeout.as_millis() as u64,
            "Awaiting message status"
        );

        loop {
            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(BridgeError::Cancelled { target, last: best });
                }
                result = self.status_until(handle, &config.retry, Some(deadline)) => result,
            };
            let observed = match observed {
                Ok(status) => status,
                Err(e) if e.is_retryable() && Instant::now() >= deadline => {
                    warn!(error = %e, target = %target, "Status query still failing at deadline");
                    return Err(BridgeError::Timeout {
                        target,
                        last: best,
                        elapsed: Instant::now().duration_since(started),
                    });
                }
                Err(e) => return Err(e),
            };
            polls += 1;

            let rank = observed.checked_rank(direction)?;
            match best {
                Some(previous) if rank < best_rank => {
                    warn!(
                        message_hash = %handle.message.hash,
                        previous = %previous,
                        observed = %observed,
                        "Status regression ignored"
                    );
                }
                Some(previous) if previous == observed => {
                    debug!(status = %observed, poll = polls, "Status unchanged");
                }
                _ => {
                    info!(
                        message_hash = %handle.message.hash,
                        status = %observed,
                        poll = polls,
                        "Message status"
                    );
                    if observed == MessageStatus::FailedL1ToL2 {
                        warn!(
                            message_hash = %handle.message.hash,
                            "Deposit relay failed on L2; message is replayable, still waiting"
                        );
                    }
                    best = Some(observed);
                    best_rank = rank;
                }
            }

            if best_rank >= target_rank {
                return Ok(best.unwrap_or(observed));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BridgeError::Timeout {
                    target,
                    last: best,
                    elapsed: now.duration_since(started),
                });
            }

            let pause = config.interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(target = %target, last = ?best, "Polling cancelled");
                    return Err(BridgeError::Cancelled { target, last: best });
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::executor::TransferExecutor;
    use crate::testing::{MessengerCall, MockMessenger, MockSigner};
    use crate::types::{Asset, Direction, TransferRequest};
    use alloy::primitives::{Address, U256};

    struct Fixture {
        messenger: Arc<MockMessenger>,
        poller: StatusPoller<MockMessenger>,
        handle: TransferHandle,
    }

    async fn fixture(direction: Direction, script: &[MessageStatus]) -> Fixture {
        let address = Address::repeat_byte(0x42);
        let l1 = MockSigner::new(address, 31337).with_native_balance(U256::from(10u64.pow(18)));
        let l2 = MockSigner::new(address, 901).with_native_balance(U256::from(10u64.pow(18)));
        let messenger = Arc::new(MockMessenger::new(l1.clone(), l2.clone()));
        let executor = TransferExecutor::new(messenger.clone());
        let request =
            TransferRequest::between(direction, Asset::Native, U256::from(1_000u64), &l1, &l2)
                .unwrap();
        let handle = match direction {
            Direction::Deposit => executor.submit_deposit(&request).await.unwrap(),
            Direction::Withdraw => executor.submit_withdrawal(&request).await.unwrap(),
        };
        messenger.script_statuses(script.iter().copied());
        messenger.clear_calls();
        Fixture {
            poller: StatusPoller::new(messenger.clone()),
            messenger,
            handle,
        }
    }

    fn status_polls(messenger: &MockMessenger) -> usize {
        messenger
            .calls()
            .iter()
            .filter(|c| matches!(c, MessengerCall::Status(_)))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_relayed_after_two_polls() {
        let f = fixture(
            Direction::Deposit,
            &[MessageStatus::Unconfirmed, MessageStatus::Relayed],
        )
        .await;
        let config = PollConfig::new(Duration::from_secs(1), Duration::from_secs(60));

        let status = f
            .poller
            .await_status(&f.handle, MessageStatus::Relayed, &config, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(status, MessageStatus::Relayed);
        assert_eq!(status_polls(&f.messenger), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_target_returns_after_one_query() {
        let f = fixture(Direction::Deposit, &[MessageStatus::Relayed]).await;
        let config = PollConfig::new(Duration::from_secs(1), Duration::from_secs(60));

        for _ in 0..2 {
            let status = f
                .poller
                .await_status(
                    &f.handle,
                    MessageStatus::Unconfirmed,
                    &config,
                    &CancelSignal::never(),
                )
                .await
                .unwrap();
            assert_eq!(status, MessageStatus::Relayed);
        }
        assert_eq!(status_polls(&f.messenger), 2);
        assert!(f
            .messenger
            .calls()
            .iter()
            .all(|c| matches!(c, MessengerCall::Status(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_queries_exactly_once() {
        let f = fixture(Direction::Withdraw, &[MessageStatus::InChallengePeriod]).await;
        let config = PollConfig::new(Duration::from_secs(1), Duration::ZERO);

        let err = f
            .poller
            .await_status(
                &f.handle,
                MessageStatus::ReadyForRelay,
                &config,
                &CancelSignal::never(),
            )
            .await
            .unwrap_err();
        match err {
            BridgeError::Timeout { target, last, .. } => {
                assert_eq!(target, MessageStatus::ReadyForRelay);
                assert_eq!(last, Some(MessageStatus::InChallengePeriod));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(status_polls(&f.messenger), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_total_wait() {
        let f = fixture(Direction::Deposit, &[MessageStatus::Unconfirmed]).await;
        let config = PollConfig::new(Duration::from_secs(2), Duration::from_secs(5));

        let started = Instant::now();
        let err = f
            .poller
            .await_status(&f.handle, MessageStatus::Relayed, &config, &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        // t = 0, 2, 4, 5
        assert_eq!(status_polls(&f.messenger), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep_returns_within_interval() {
        let f = fixture(Direction::Withdraw, &[MessageStatus::InChallengePeriod]).await;
        let config = PollConfig::new(Duration::from_secs(30), Duration::from_secs(3600));
        let (handle, signal) = cancel_pair();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            handle.cancel();
        });

        let started = Instant::now();
        let err = f
            .poller
            .await_status(&f.handle, MessageStatus::Relayed, &config, &signal)
            .await
            .unwrap_err();
        assert!(started.elapsed() < config.interval);
        match err {
            BridgeError::Cancelled { target, last } => {
                assert_eq!(target, MessageStatus::Relayed);
                assert_eq!(last, Some(MessageStatus::InChallengePeriod));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // The handle is still usable after cancellation
        f.messenger.script_statuses([MessageStatus::ReadyForRelay]);
        let status = f
            .poller
            .await_status(
                &f.handle,
                MessageStatus::ReadyForRelay,
                &config,
                &CancelSignal::never(),
            )
            .await
            .unwrap();
        assert_eq!(status, MessageStatus::ReadyForRelay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regression_is_ignored() {
        let f = fixture(
            Direction::Withdraw,
            &[
                MessageStatus::InChallengePeriod,
                MessageStatus::Unconfirmed,
                MessageStatus::Unconfirmed,
            ],
        )
        .await;
        let config = PollConfig::new(Duration::from_secs(1), Duration::from_secs(2));

        let err = f
            .poller
            .await_status(
                &f.handle,
                MessageStatus::ReadyForRelay,
                &config,
                &CancelSignal::never(),
            )
            .await
            .unwrap_err();
        match err {
            BridgeError::Timeout { last, .. } => {
                assert_eq!(last, Some(MessageStatus::InChallengePeriod))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_deposit_keeps_polling() {
        let f = fixture(
            Direction::Deposit,
            &[
                MessageStatus::FailedL1ToL2,
                MessageStatus::FailedL1ToL2,
                MessageStatus::Relayed,
            ],
        )
        .await;
        let config = PollConfig::new(Duration::from_secs(1), Duration::from_secs(60));

        let status = f
            .poller
            .await_status(&f.handle, MessageStatus::Relayed, &config, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(status, MessageStatus::Relayed);
        assert_eq!(status_polls(&f.messenger), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_foreign_to_direction_is_rejected() {
        let f = fixture(Direction::Deposit, &[MessageStatus::Unconfirmed]).await;
        let err = f
            .poller
            .await_status(
                &f.handle,
                MessageStatus::ReadyForRelay,
                &PollConfig::default(),
                &CancelSignal::never(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert_eq!(status_polls(&f.messenger), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_status_errors_are_retried() {
        let f = fixture(Direction::Deposit, &[MessageStatus::Relayed]).await;
        f.messenger.fail_next_status_queries(2);

        let status = f
            .poller
            .await_status(
                &f.handle,
                MessageStatus::Relayed,
                &PollConfig::default(),
                &CancelSignal::never(),
            )
            .await
            .unwrap();
        assert_eq!(status, MessageStatus::Relayed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_query_at_zero_timeout_is_a_timeout() {
        let f = fixture(Direction::Withdraw, &[MessageStatus::InChallengePeriod]).await;
        f.messenger.fail_next_status_queries(2);
        let config = PollConfig::new(Duration::from_secs(1), Duration::ZERO);

        let started = Instant::now();
        let err = f
            .poller
            .await_status(
                &f.handle,
                MessageStatus::ReadyForRelay,
                &config,
                &CancelSignal::never(),
            )
            .await
            .unwrap_err();
        match err {
            BridgeError::Timeout { last, elapsed, .. } => {
                assert_eq!(last, None);
                assert_eq!(elapsed, Duration::ZERO);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(status_polls(&f.messenger), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_never_overruns_timeout() {
        let f = fixture(Direction::Deposit, &[MessageStatus::Unconfirmed]).await;
        f.messenger.fail_next_status_queries(10);
        let config = PollConfig::new(Duration::from_secs(1), Duration::from_millis(1500))
            .with_retry(RetryConfig {
                max_attempts: 10,
                ..RetryConfig::default()
            });

        let started = Instant::now();
        let err = f
            .poller
            .await_status(&f.handle, MessageStatus::Relayed, &config, &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert!(started.elapsed() <= config.timeout + Duration::from_millis(5));
    }
}

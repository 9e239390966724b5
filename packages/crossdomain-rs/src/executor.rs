//! Transfer execution
//!
//! Validates requests, hands them to a [`BridgeMessenger`] and turns the
//! source-chain inclusion into an immutable [`TransferHandle`]. Broadcast
//! and inclusion share one inclusion-timeout budget; once a transaction has
//! been broadcast its hash is carried by any timeout error so it can be
//! followed up. The executor never retries a submission on its own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{classify_error, BridgeError, ErrorClass};
use crate::traits::{BridgeMessenger, Inclusion};
use crate::types::{Direction, TransferHandle, TransferRequest};

/// Default bound on waiting for a transaction to be mined
pub const DEFAULT_INCLUSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Submits deposits, withdrawals and finalizations
pub struct TransferExecutor<M: BridgeMessenger> {
    messenger: Arc<M>,
    inclusion_timeout: Duration,
}

impl<M: BridgeMessenger> TransferExecutor<M> {
    pub fn new(messenger: Arc<M>) -> Self {
        Self {
            messenger,
            inclusion_timeout: DEFAULT_INCLUSION_TIMEOUT,
        }
    }

    pub fn with_inclusion_timeout(mut self, timeout: Duration) -> Self {
        self.inclusion_timeout = timeout;
        self
    }

    pub fn messenger(&self) -> &Arc<M> {
        &self.messenger
    }

    /// Send an L1 -> L2 deposit and wait for its inclusion on L1
    pub async fn submit_deposit(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferHandle, BridgeError> {
        Self::check(request, Direction::Deposit)?;
        self.check_allowance(request).await?;

        info!(
            asset = %request.asset,
            amount = %request.amount,
            sender = %request.sender,
            recipient = %request.recipient,
            "Submitting deposit"
        );
        let deadline = Instant::now() + self.inclusion_timeout;
        let tx_hash = match self
            .bounded(deadline, None, self.messenger.submit_deposit(request))
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => return Err(self.explain_rejection(request, e).await),
        };
        let inclusion = self
            .bounded(
                deadline,
                Some(tx_hash),
                self.messenger.wait_for_inclusion(Direction::Deposit, tx_hash),
            )
            .await?;
        Ok(Self::handle_for(request, inclusion))
    }

    /// Send an L2 -> L1 withdrawal and wait for its inclusion on L2
    pub async fn submit_withdrawal(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferHandle, BridgeError> {
        Self::check(request, Direction::Withdraw)?;

        info!(
            asset = %request.asset,
            amount = %request.amount,
            sender = %request.sender,
            recipient = %request.recipient,
            "Submitting withdrawal"
        );
        let deadline = Instant::now() + self.inclusion_timeout;
        let tx_hash = self
            .bounded(deadline, None, self.messenger.submit_withdrawal(request))
            .await?;
        let inclusion = self
            .bounded(
                deadline,
                Some(tx_hash),
                self.messenger.wait_for_inclusion(Direction::Withdraw, tx_hash),
            )
            .await?;
        Ok(Self::handle_for(request, inclusion))
    }

    /// Finalize a withdrawal on L1
    ///
    /// Returns a new handle carrying the finalization transaction; the input
    /// handle is left untouched.
    pub async fn finalize(&self, handle: &TransferHandle) -> Result<TransferHandle, BridgeError> {
        if handle.direction != Direction::Withdraw {
            return Err(BridgeError::InvalidRequest(
                "only withdrawals can be finalized".to_string(),
            ));
        }

        info!(
            tx_hash = %handle.tx_hash,
            message_hash = %handle.message.hash,
            "Finalizing withdrawal"
        );
        let deadline = Instant::now() + self.inclusion_timeout;
        let tx_hash: B256 = self
            .bounded(deadline, None, self.messenger.finalize(handle))
            .await?;
        self.bounded(
            deadline,
            Some(tx_hash),
            self.messenger.wait_for_finalization(tx_hash),
        )
        .await?;
        info!(
            finalization_tx = %tx_hash,
            withdrawal_hash = %handle.message.hash,
            "Withdrawal finalized on L1"
        );
        Ok(handle.with_finalization(tx_hash))
    }

    fn check(request: &TransferRequest, expected: Direction) -> Result<(), BridgeError> {
        if request.direction != expected {
            return Err(BridgeError::InvalidRequest(format!(
                "expected a {} request, got a {}",
                expected, request.direction
            )));
        }
        request.validate()
    }

    async fn check_allowance(&self, request: &TransferRequest) -> Result<(), BridgeError> {
        let Some(token) = request.asset.l1_token() else {
            return Ok(());
        };
        let available = self
            .messenger
            .bridge_allowance(token, request.sender)
            .await?;
        if available < request.amount {
            warn!(
                token = %token,
                required = %request.amount,
                available = %available,
                "Bridge allowance too low"
            );
            return Err(BridgeError::InsufficientAllowance {
                token,
                required: request.amount,
                available,
            });
        }
        Ok(())
    }

    /// Re-read the allowance when the node rejected a token deposit for it
    async fn explain_rejection(&self, request: &TransferRequest, error: BridgeError) -> BridgeError {
        let BridgeError::Submission(message) = &error else {
            return error;
        };
        if classify_error(message) != ErrorClass::Allowance {
            return error;
        }
        let Some(token) = request.asset.l1_token() else {
            return error;
        };
        let allowance = self
            .messenger
            .bridge_allowance(token, request.sender)
            .await;
        allowance_rejection(token, request.amount, error, allowance)
    }

    /// Run `fut` until `deadline`
    ///
    /// `tx_hash` names the transaction being waited for, if one was already
    /// broadcast.
    async fn bounded<T>(
        &self,
        deadline: Instant,
        tx_hash: Option<B256>,
        fut: impl Future<Output = Result<T, BridgeError>>,
    ) -> Result<T, BridgeError> {
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(tx_hash) = tx_hash {
                    warn!(
                        tx_hash = %tx_hash,
                        waited_ms = self.inclusion_timeout.as_millis() as u64,
                        "Transaction broadcast but not yet included; it may still land"
                    );
                }
                Err(BridgeError::InclusionTimeout {
                    waited: self.inclusion_timeout,
                    tx_hash,
                })
            }
        }
    }

    fn handle_for(request: &TransferRequest, inclusion: Inclusion) -> TransferHandle {
        let handle = TransferHandle {
            direction: request.direction,
            asset: request.asset,
            amount: request.amount,
            sender: request.sender,
            recipient: request.recipient,
            tx_hash: inclusion.tx_hash,
            block_number: inclusion.block_number,
            message: inclusion.message,
            submitted_at: Utc::now(),
            finalization_tx: None,
        };
        info!(
            direction = %handle.direction,
            tx_hash = %handle.tx_hash,
            block = handle.block_number,
            message_hash = %handle.message.hash,
            "Transfer submitted"
        );
        handle
    }
}

/// Error for a token deposit the node rejected over its allowance
///
/// Reports the allowance read back after the rejection. If that read fails
/// the original submission error is kept.
pub fn allowance_rejection(
    token: Address,
    required: U256,
    error: BridgeError,
    allowance: Result<U256, BridgeError>,
) -> BridgeError {
    match allowance {
        Ok(available) => BridgeError::InsufficientAllowance {
            token,
            required,
            available,
        },
        Err(query) => {
            warn!(
                token = %token,
                error = %query,
                "Allowance unavailable after rejected deposit"
            );
            error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MessengerCall, MockMessenger, MockSigner};
    use crate::traits::ChainSigner;
    use crate::types::Asset;
    use alloy::primitives::{Address, U256};

    fn setup() -> (MockSigner, MockSigner, Arc<MockMessenger>) {
        let address = Address::repeat_byte(0x42);
        let l1 = MockSigner::new(address, 31337).with_native_balance(U256::from(10u64).pow(U256::from(18u64)));
        let l2 = MockSigner::new(address, 901).with_native_balance(U256::from(10u64).pow(U256::from(18u64)));
        let messenger = Arc::new(MockMessenger::new(l1.clone(), l2.clone()));
        (l1, l2, messenger)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_handle_describes_request() {
        let (l1, l2, messenger) = setup();
        let executor = TransferExecutor::new(messenger.clone());
        let request = TransferRequest::between(
            Direction::Deposit,
            Asset::Native,
            U256::from(1_000_000_001u64),
            &l1,
            &l2,
        )
        .unwrap();

        let handle = executor.submit_deposit(&request).await.unwrap();
        assert_eq!(handle.direction, Direction::Deposit);
        assert_eq!(handle.amount, request.amount);
        assert_eq!(handle.recipient, l2.address());
        assert!(handle.message.withdrawal.is_none());
        assert!(handle.finalization_tx.is_none());
        assert_eq!(messenger.calls(), vec![MessengerCall::SubmitDeposit]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_direction_is_rejected() {
        let (l1, l2, messenger) = setup();
        let executor = TransferExecutor::new(messenger.clone());
        let request =
            TransferRequest::between(Direction::Withdraw, Asset::Native, U256::from(1u64), &l1, &l2)
                .unwrap();

        let err = executor.submit_deposit(&request).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert!(messenger.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_amount_never_reaches_messenger() {
        let (l1, l2, messenger) = setup();
        let executor = TransferExecutor::new(messenger.clone());
        let mut request =
            TransferRequest::between(Direction::Deposit, Asset::Native, U256::from(1u64), &l1, &l2)
                .unwrap();
        request.amount = U256::ZERO;

        let err = executor.submit_deposit(&request).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert!(messenger.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_inclusion_times_out() {
        let (l1, l2, messenger) = setup();
        messenger.delay_submissions(Duration::from_secs(600));
        let executor =
            TransferExecutor::new(messenger.clone()).with_inclusion_timeout(Duration::from_secs(30));
        let request =
            TransferRequest::between(Direction::Withdraw, Asset::Native, U256::from(5u64), &l1, &l2)
                .unwrap();

        let err = executor.submit_withdrawal(&request).await.unwrap_err();
        match err {
            BridgeError::InclusionTimeout { waited, tx_hash } => {
                assert_eq!(waited, Duration::from_secs(30));
                // Broadcast happened, so the hash is kept for follow-up
                assert!(tx_hash.is_some());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(messenger.calls(), vec![MessengerCall::SubmitWithdrawal]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_erc20_deposit_requires_allowance() {
        let (l1, l2, messenger) = setup();
        let l1_token = Address::repeat_byte(0x01);
        let l2_token = Address::repeat_byte(0x02);
        l1.set_token_balance(l1_token, U256::from(1_000u64));
        messenger.set_allowance(l1_token, U256::from(10u64));

        let executor = TransferExecutor::new(messenger.clone());
        let request = TransferRequest::between(
            Direction::Deposit,
            Asset::Erc20 { l1_token, l2_token },
            U256::from(100u64),
            &l1,
            &l2,
        )
        .unwrap();

        let err = executor.submit_deposit(&request).await.unwrap_err();
        match err {
            BridgeError::InsufficientAllowance {
                token,
                required,
                available,
            } => {
                assert_eq!(token, l1_token);
                assert_eq!(required, U256::from(100u64));
                assert_eq!(available, U256::from(10u64));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(messenger.calls().is_empty());

        messenger.set_allowance(l1_token, U256::from(100u64));
        assert!(executor.submit_deposit(&request).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_returns_new_handle() {
        let (l1, l2, messenger) = setup();
        let executor = TransferExecutor::new(messenger.clone());
        let request =
            TransferRequest::between(Direction::Withdraw, Asset::Native, U256::from(5u64), &l1, &l2)
                .unwrap();
        let handle = executor.submit_withdrawal(&request).await.unwrap();
        assert!(handle.message.withdrawal.is_some());

        let finalized = executor.finalize(&handle).await.unwrap();
        assert!(handle.finalization_tx.is_none());
        assert!(finalized.finalization_tx.is_some());
        assert_eq!(finalized.tx_hash, handle.tx_hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_rejects_deposits() {
        let (l1, l2, messenger) = setup();
        let executor = TransferExecutor::new(messenger.clone());
        let request =
            TransferRequest::between(Direction::Deposit, Asset::Native, U256::from(5u64), &l1, &l2)
                .unwrap();
        let handle = executor.submit_deposit(&request).await.unwrap();

        let err = executor.finalize(&handle).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert!(!messenger.calls().contains(&MessengerCall::Finalize));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_is_surfaced() {
        let (l1, l2, messenger) = setup();
        messenger.fail_next_submission("execution reverted");
        let executor = TransferExecutor::new(messenger.clone());
        let request =
            TransferRequest::between(Direction::Deposit, Asset::Native, U256::from(5u64), &l1, &l2)
                .unwrap();

        let err = executor.submit_deposit(&request).await.unwrap_err();
        assert_eq!(err.kind(), "submission");
    }

    #[tokio::test(start_paused = true)]
    async fn test_allowance_revert_is_surfaced_as_allowance_error() {
        let (l1, l2, messenger) = setup();
        let l1_token = Address::repeat_byte(0x01);
        let l2_token = Address::repeat_byte(0x02);
        l1.set_token_balance(l1_token, U256::from(1_000u64));
        // Pre-flight passes; the node still rejects the transfer
        messenger.set_allowance(l1_token, U256::from(100u64));
        messenger.fail_next_submission("execution reverted: ERC20: insufficient allowance");

        let executor = TransferExecutor::new(messenger.clone());
        let request = TransferRequest::between(
            Direction::Deposit,
            Asset::Erc20 { l1_token, l2_token },
            U256::from(100u64),
            &l1,
            &l2,
        )
        .unwrap();

        let err = executor.submit_deposit(&request).await.unwrap_err();
        match err {
            BridgeError::InsufficientAllowance {
                token,
                required,
                available,
            } => {
                assert_eq!(token, l1_token);
                assert_eq!(required, U256::from(100u64));
                assert_eq!(available, U256::from(100u64));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_failed_allowance_read_keeps_submission_error() {
        let token = Address::repeat_byte(0x01);
        let original = BridgeError::Submission("execution reverted: ERC20: insufficient allowance".into());

        let err = allowance_rejection(
            token,
            U256::from(5u64),
            original,
            Err(BridgeError::Network("connection refused".into())),
        );
        assert_eq!(err.kind(), "submission");

        let err = allowance_rejection(
            token,
            U256::from(5u64),
            BridgeError::Submission("execution reverted".into()),
            Ok(U256::from(2u64)),
        );
        assert!(matches!(
            err,
            BridgeError::InsufficientAllowance { available, .. } if available == U256::from(2u64)
        ));
    }
}

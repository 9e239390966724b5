//! In-memory chain and bridge fakes
//!
//! [`MockSigner`] keeps balances in shared memory so a test can hold a clone
//! while the code under test reads through another. [`MockMessenger`]
//! replays a scripted status sequence, records every call, and moves funds
//! between the two mock signers without fees:
//!
//! - submitting debits the source signer; the transaction is included on
//!   the first `wait_for_inclusion`, after the configured delay
//! - the first `RELAYED` observed for a message credits the destination signer
//!
//! A withdrawal is never reported `RELAYED` before it has been finalized;
//! the mock answers `READY_FOR_RELAY` until then.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use url::Url;

use crate::error::BridgeError;
use crate::hash::{encode_versioned_nonce, hash_withdrawal, keccak256};
use crate::traits::{BridgeMessenger, ChainSigner, Inclusion};
use crate::types::{
    Asset, ChainEndpoint, CrossDomainMessage, Direction, MessageStatus, TransferHandle,
    TransferRequest, WithdrawalTransaction,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Mock Signer
// ============================================================================

#[derive(Debug, Default)]
struct SignerState {
    native: U256,
    tokens: HashMap<Address, U256>,
    failures: u32,
}

/// Chain signer with in-memory balances
#[derive(Debug, Clone)]
pub struct MockSigner {
    address: Address,
    endpoint: ChainEndpoint,
    state: Arc<Mutex<SignerState>>,
}

impl MockSigner {
    pub fn new(address: Address, chain_id: u64) -> Self {
        let rpc_url =
            Url::parse(&format!("http://mock-{}.invalid", chain_id)).expect("mock URL is valid");
        Self {
            address,
            endpoint: ChainEndpoint { chain_id, rpc_url },
            state: Arc::new(Mutex::new(SignerState::default())),
        }
    }

    pub fn with_native_balance(self, balance: U256) -> Self {
        self.set_native_balance(balance);
        self
    }

    pub fn set_native_balance(&self, balance: U256) {
        lock(&self.state).native = balance;
    }

    pub fn set_token_balance(&self, token: Address, balance: U256) {
        lock(&self.state).tokens.insert(token, balance);
    }

    /// Current native balance
    pub fn native(&self) -> U256 {
        lock(&self.state).native
    }

    /// Current balance of `token`
    pub fn token(&self, token: Address) -> U256 {
        lock(&self.state)
            .tokens
            .get(&token)
            .copied()
            .unwrap_or_default()
    }

    /// Make the next `n` balance queries fail with a network error
    pub fn fail_next_queries(&self, n: u32) {
        lock(&self.state).failures = n;
    }

    fn credit(&self, token: Option<Address>, amount: U256) {
        let mut state = lock(&self.state);
        match token {
            None => state.native = state.native.saturating_add(amount),
            Some(token) => {
                let entry = state.tokens.entry(token).or_default();
                *entry = entry.saturating_add(amount);
            }
        }
    }

    fn debit(&self, token: Option<Address>, amount: U256) -> Result<(), BridgeError> {
        let mut state = lock(&self.state);
        let balance = match token {
            None => &mut state.native,
            Some(token) => state.tokens.entry(token).or_default(),
        };
        if *balance < amount {
            return Err(BridgeError::Submission(format!(
                "insufficient funds: balance {}, need {}",
                balance, amount
            )));
        }
        *balance -= amount;
        Ok(())
    }

    fn take_failure(&self) -> Result<(), BridgeError> {
        let mut state = lock(&self.state);
        if state.failures > 0 {
            state.failures -= 1;
            return Err(BridgeError::Network("connection refused (mock)".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn endpoint(&self) -> &ChainEndpoint {
        &self.endpoint
    }

    async fn native_balance(&self) -> Result<U256, BridgeError> {
        self.take_failure()?;
        Ok(self.native())
    }

    async fn token_balance(&self, token: Address) -> Result<U256, BridgeError> {
        self.take_failure()?;
        Ok(self.token(token))
    }

    async fn chain_id_from_rpc(&self) -> Result<u64, BridgeError> {
        self.take_failure()?;
        Ok(self.endpoint.chain_id)
    }
}

// ============================================================================
// Mock Messenger
// ============================================================================

/// A call made to the [`MockMessenger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessengerCall {
    SubmitDeposit,
    SubmitWithdrawal,
    /// Status query and the status answered
    Status(MessageStatus),
    Finalize,
}

#[derive(Debug, Clone)]
struct PendingCredit {
    direction: Direction,
    asset: Asset,
    amount: U256,
    credited: bool,
}

#[derive(Debug, Default)]
struct MessengerState {
    script: VecDeque<MessageStatus>,
    last: Option<MessageStatus>,
    calls: Vec<MessengerCall>,
    pending: HashMap<B256, PendingCredit>,
    inclusions: HashMap<B256, Inclusion>,
    finalized: HashSet<B256>,
    allowances: HashMap<Address, U256>,
    nonce: u64,
    submit_failure: Option<String>,
    finalize_failure: Option<String>,
    status_failures: u32,
    submit_delay: Option<Duration>,
}

/// Scripted bridge messenger
pub struct MockMessenger {
    l1: MockSigner,
    l2: MockSigner,
    state: Mutex<MessengerState>,
}

impl MockMessenger {
    pub fn new(l1: MockSigner, l2: MockSigner) -> Self {
        Self {
            l1,
            l2,
            state: Mutex::new(MessengerState::default()),
        }
    }

    /// Replace the status script
    ///
    /// Each status query consumes one entry; once the script is exhausted
    /// the last answer repeats (`UNCONFIRMED_L1_TO_L2` if none yet).
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = MessageStatus>) {
        lock(&self.state).script = statuses.into_iter().collect();
    }

    pub fn calls(&self) -> Vec<MessengerCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn set_allowance(&self, token: Address, amount: U256) {
        lock(&self.state).allowances.insert(token, amount);
    }

    /// Fail the next deposit or withdrawal with `message`
    pub fn fail_next_submission(&self, message: &str) {
        lock(&self.state).submit_failure = Some(message.to_string());
    }

    /// Fail the next finalization with `message`
    pub fn fail_next_finalize(&self, message: &str) {
        lock(&self.state).finalize_failure = Some(message.to_string());
    }

    /// Make the next `n` status queries fail with a network error
    pub fn fail_next_status_queries(&self, n: u32) {
        lock(&self.state).status_failures = n;
    }

    /// Delay the inclusion of every submitted transaction by `delay`
    pub fn delay_submissions(&self, delay: Duration) {
        lock(&self.state).submit_delay = Some(delay);
    }

    /// Record a withdrawal as finalized without logging a call
    pub fn mark_finalized(&self, handle: &TransferHandle) {
        lock(&self.state).finalized.insert(handle.message.hash);
    }

    fn token_on(asset: &Asset, chain_is_l1: bool) -> Option<Address> {
        if chain_is_l1 {
            asset.l1_token()
        } else {
            asset.l2_token()
        }
    }

    fn submit(&self, request: &TransferRequest, call: MessengerCall) -> Result<B256, BridgeError> {
        if let Some(message) = lock(&self.state).submit_failure.take() {
            return Err(BridgeError::Submission(message));
        }

        let source_is_l1 = request.direction == Direction::Deposit;
        let source = if source_is_l1 { &self.l1 } else { &self.l2 };
        source.debit(Self::token_on(&request.asset, source_is_l1), request.amount)?;

        let mut state = lock(&self.state);
        state.calls.push(call);
        state.nonce += 1;
        let nonce = state.nonce;

        let tx_hash = B256::from(keccak256(format!("tx-{}-{}", request.direction, nonce).as_bytes()));
        let message = match request.direction {
            Direction::Deposit => CrossDomainMessage {
                hash: B256::from(keccak256(format!("message-{}", nonce).as_bytes())),
                withdrawal: None,
            },
            Direction::Withdraw => {
                let withdrawal = WithdrawalTransaction {
                    nonce: encode_versioned_nonce(U256::from(nonce), 1),
                    sender: request.sender,
                    target: request.recipient,
                    value: request.amount,
                    gas_limit: U256::from(200_000u64),
                    data: Bytes::new(),
                };
                CrossDomainMessage {
                    hash: hash_withdrawal(&withdrawal),
                    withdrawal: Some(withdrawal),
                }
            }
        };

        state.pending.insert(
            message.hash,
            PendingCredit {
                direction: request.direction,
                asset: request.asset,
                amount: request.amount,
                credited: false,
            },
        );

        state.inclusions.insert(
            tx_hash,
            Inclusion {
                tx_hash,
                block_number: 100 + nonce,
                message,
            },
        );
        Ok(tx_hash)
    }
}

#[async_trait]
impl BridgeMessenger for MockMessenger {
    async fn submit_deposit(&self, request: &TransferRequest) -> Result<B256, BridgeError> {
        self.submit(request, MessengerCall::SubmitDeposit)
    }

    async fn submit_withdrawal(&self, request: &TransferRequest) -> Result<B256, BridgeError> {
        self.submit(request, MessengerCall::SubmitWithdrawal)
    }

    async fn wait_for_inclusion(
        &self,
        _direction: Direction,
        tx_hash: B256,
    ) -> Result<Inclusion, BridgeError> {
        let delay = lock(&self.state).submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.state)
            .inclusions
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| BridgeError::Submission(format!("unknown transaction {}", tx_hash)))
    }

    async fn message_status(&self, handle: &TransferHandle) -> Result<MessageStatus, BridgeError> {
        let mut state = lock(&self.state);
        if state.status_failures > 0 {
            state.status_failures -= 1;
            return Err(BridgeError::Network("request timed out (mock)".to_string()));
        }

        let hash = handle.message.hash;
        let blocked = handle.direction == Direction::Withdraw && !state.finalized.contains(&hash);
        let status = match state.script.front().copied() {
            Some(MessageStatus::Relayed) if blocked => MessageStatus::ReadyForRelay,
            Some(next) => {
                state.script.pop_front();
                next
            }
            None => match state.last {
                Some(MessageStatus::Relayed) if blocked => MessageStatus::ReadyForRelay,
                Some(last) => last,
                None => MessageStatus::Unconfirmed,
            },
        };
        state.last = Some(status);
        state.calls.push(MessengerCall::Status(status));

        if status == MessageStatus::Relayed {
            if let Some(pending) = state.pending.get_mut(&hash) {
                if !pending.credited {
                    pending.credited = true;
                    let to_l1 = pending.direction == Direction::Withdraw;
                    let destination = if to_l1 { &self.l1 } else { &self.l2 };
                    destination.credit(Self::token_on(&pending.asset, to_l1), pending.amount);
                }
            }
        }
        Ok(status)
    }

    async fn finalize(&self, handle: &TransferHandle) -> Result<B256, BridgeError> {
        let mut state = lock(&self.state);
        state.calls.push(MessengerCall::Finalize);
        if let Some(message) = state.finalize_failure.take() {
            return Err(BridgeError::Submission(message));
        }
        if handle.message.withdrawal.is_none() {
            return Err(BridgeError::InvalidRequest(
                "handle carries no withdrawal transaction".to_string(),
            ));
        }
        state.finalized.insert(handle.message.hash);
        Ok(B256::from(keccak256(
            format!("finalize-{}", handle.message.hash).as_bytes(),
        )))
    }

    async fn wait_for_finalization(&self, _tx_hash: B256) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn bridge_allowance(&self, token: Address, _owner: Address) -> Result<U256, BridgeError> {
        Ok(lock(&self.state)
            .allowances
            .get(&token)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(direction: Direction, amount: u64) -> TransferRequest {
        TransferRequest::new(
            direction,
            Asset::Native,
            U256::from(amount),
            Address::repeat_byte(1),
            Address::repeat_byte(1),
        )
        .unwrap()
    }

    fn handle_for(request: &TransferRequest, inclusion: Inclusion) -> TransferHandle {
        TransferHandle {
            direction: request.direction,
            asset: request.asset,
            amount: request.amount,
            sender: request.sender,
            recipient: request.recipient,
            tx_hash: inclusion.tx_hash,
            block_number: inclusion.block_number,
            message: inclusion.message,
            submitted_at: chrono::Utc::now(),
            finalization_tx: None,
        }
    }

    #[tokio::test]
    async fn test_withdrawal_blocked_until_finalized() {
        let l1 = MockSigner::new(Address::repeat_byte(1), 1);
        let l2 = MockSigner::new(Address::repeat_byte(1), 10).with_native_balance(U256::from(100u64));
        let messenger = MockMessenger::new(l1.clone(), l2.clone());

        let req = request(Direction::Withdraw, 40);
        let tx_hash = messenger.submit_withdrawal(&req).await.unwrap();
        assert_eq!(l2.native(), U256::from(60u64));
        let inclusion = messenger
            .wait_for_inclusion(Direction::Withdraw, tx_hash)
            .await
            .unwrap();
        assert_eq!(inclusion.tx_hash, tx_hash);
        let handle = handle_for(&req, inclusion);

        messenger.script_statuses([MessageStatus::Relayed]);
        let status = messenger.message_status(&handle).await.unwrap();
        assert_eq!(status, MessageStatus::ReadyForRelay);
        assert_eq!(l1.native(), U256::ZERO);

        messenger.finalize(&handle).await.unwrap();
        let status = messenger.message_status(&handle).await.unwrap();
        assert_eq!(status, MessageStatus::Relayed);
        assert_eq!(l1.native(), U256::from(40u64));

        // Credited once only
        messenger.message_status(&handle).await.unwrap();
        assert_eq!(l1.native(), U256::from(40u64));
    }

    #[tokio::test]
    async fn test_submission_needs_funds() {
        let l1 = MockSigner::new(Address::repeat_byte(1), 1).with_native_balance(U256::from(5u64));
        let l2 = MockSigner::new(Address::repeat_byte(1), 10);
        let messenger = MockMessenger::new(l1, l2);

        let err = messenger
            .submit_deposit(&request(Direction::Deposit, 6))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "submission");
        assert!(messenger.calls().is_empty());
    }
}

//! OP-stack bridge messenger
//!
//! Implements [`BridgeMessenger`] over an L1 and an L2 [`EvmSigner`].
//!
//! ## Deposits
//!
//! Sent through `L1StandardBridge`. The message hash is rebuilt from the L1
//! messenger's `SentMessage` / `SentMessageExtension1` logs and looked up in
//! the L2 messenger's `successfulMessages` / `failedMessages` maps.
//!
//! ## Withdrawals
//!
//! Sent through the `L2StandardBridge` predeploy. The `MessagePassed` log of
//! the message passer carries the withdrawal transaction and its hash. The
//! L1 portal reports proven and finalized state; proving itself happens
//! outside this client.
//!
//! Two portal generations are supported and told apart by `version()`:
//!
//! - [`PortalKind::Legacy`]: one proof per withdrawal, challenge period from
//!   `L2OutputOracle.FINALIZATION_PERIOD_SECONDS`
//! - [`PortalKind::FaultProof`]: proofs recorded per submitter, maturity
//!   delay from `proofMaturityDelaySeconds`, dispute game checked with
//!   `checkWithdrawal`

use std::sync::Arc;
use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, B256, U256},
    providers::Provider,
    rpc::types::{BlockNumberOrTag, BlockTransactionsKind, Log, TransactionReceipt},
    sol_types::SolEvent,
};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::contracts::{
    CrossDomainMessenger, L1StandardBridge, L2OutputOracle, L2StandardBridge, L2ToL1MessagePasser,
    OptimismPortal, OptimismPortal2, ERC20, L2_CROSS_DOMAIN_MESSENGER, L2_STANDARD_BRIDGE,
    L2_TO_L1_MESSAGE_PASSER, LEGACY_ERC20_ETH,
};
use super::network::L1Contracts;
use super::signer::EvmSigner;
use crate::error::{query_error, send_error, BridgeError};
use crate::hash::{hash_cross_domain_message, hash_withdrawal, RelayedMessage};
use crate::traits::{BridgeMessenger, ChainSigner, Inclusion};
use crate::types::{
    Asset, CrossDomainMessage, Direction, MessageStatus, TransferHandle, TransferRequest,
    WithdrawalTransaction,
};

/// Default gas limit forwarded to the destination chain
pub const DEFAULT_MIN_GAS_LIMIT: u32 = 200_000;

/// Delay between receipt lookups while waiting for inclusion
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Portal generation deployed at the configured `OptimismPortal` address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalKind {
    /// Output-oracle proofs
    Legacy,
    /// `OptimismPortal2`, fault-proof dispute games
    FaultProof,
}

impl PortalKind {
    /// Classify a portal by its semver `version()`; 3.x and later are
    /// fault-proof portals
    pub fn from_version(version: &str) -> Self {
        let major = version
            .trim()
            .trim_start_matches('v')
            .split('.')
            .next()
            .and_then(|major| major.parse::<u64>().ok());
        match major {
            Some(major) if major >= 3 => PortalKind::FaultProof,
            _ => PortalKind::Legacy,
        }
    }
}

/// Messenger for one L1 / L2 OP-stack pair
pub struct OpStackMessenger {
    l1: Arc<EvmSigner>,
    l2: Arc<EvmSigner>,
    contracts: L1Contracts,
    min_gas_limit: u32,
    portal_kind: OnceCell<PortalKind>,
    challenge_period: OnceCell<u64>,
}

impl OpStackMessenger {
    pub fn new(l1: Arc<EvmSigner>, l2: Arc<EvmSigner>, contracts: L1Contracts) -> Self {
        Self {
            l1,
            l2,
            contracts,
            min_gas_limit: DEFAULT_MIN_GAS_LIMIT,
            portal_kind: OnceCell::new(),
            challenge_period: OnceCell::new(),
        }
    }

    /// Override the destination gas limit
    pub fn with_min_gas_limit(mut self, min_gas_limit: u32) -> Self {
        self.min_gas_limit = min_gas_limit;
        self
    }

    // =========================================================================
    // Inclusion
    // =========================================================================

    /// Poll for the receipt of `tx_hash` until it is mined
    ///
    /// Lookup failures are logged and retried; the caller bounds the wait.
    async fn wait_for_receipt(
        signer: &EvmSigner,
        tx_hash: B256,
    ) -> Result<TransactionReceipt, BridgeError> {
        let provider = signer.provider();
        debug!(tx_hash = %tx_hash, chain_id = signer.chain_id(), "Waiting for inclusion");

        loop {
            match provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.status() {
                        return Err(BridgeError::Submission(format!(
                            "transaction {} reverted",
                            tx_hash
                        )));
                    }
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(tx_hash = %tx_hash, error = %e, "Receipt lookup failed, retrying");
                }
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    fn block_number(receipt: &TransactionReceipt) -> Result<u64, BridgeError> {
        receipt.block_number.ok_or_else(|| {
            BridgeError::Submission(format!(
                "receipt for {} has no block number",
                receipt.transaction_hash
            ))
        })
    }

    // =========================================================================
    // Message extraction
    // =========================================================================

    /// Rebuild the deposit message sent by the L1 bridge
    fn deposit_message(&self, receipt: &TransactionReceipt) -> Result<CrossDomainMessage, BridgeError> {
        let bridge = self.contracts.l1_standard_bridge;
        let mut sent = None;
        let mut value = U256::ZERO;

        for log in receipt.inner.logs() {
            if let Some(event) = decode_event::<CrossDomainMessenger::SentMessage>(log) {
                if event.sender == bridge && sent.is_none() {
                    sent = Some(event);
                }
            } else if let Some(event) =
                decode_event::<CrossDomainMessenger::SentMessageExtension1>(log)
            {
                if event.sender == bridge {
                    value = event.value;
                }
            }
        }

        let sent = sent.ok_or_else(|| {
            BridgeError::Submission(format!(
                "no SentMessage log from bridge {} in {}",
                bridge, receipt.transaction_hash
            ))
        })?;

        let relayed = RelayedMessage {
            nonce: sent.messageNonce,
            sender: sent.sender,
            target: sent.target,
            value,
            gas_limit: sent.gasLimit,
            data: sent.message,
        };
        let hash = hash_cross_domain_message(&relayed).ok_or_else(|| {
            BridgeError::Submission(format!(
                "unsupported message version in nonce {}",
                relayed.nonce
            ))
        })?;

        Ok(CrossDomainMessage {
            hash,
            withdrawal: None,
        })
    }

    /// Extract the withdrawal recorded by the L2 message passer
    fn withdrawal_message(receipt: &TransactionReceipt) -> Result<CrossDomainMessage, BridgeError> {
        let passed = receipt
            .inner
            .logs()
            .iter()
            .filter(|log| log.inner.address == L2_TO_L1_MESSAGE_PASSER)
            .find_map(decode_event::<L2ToL1MessagePasser::MessagePassed>)
            .ok_or_else(|| {
                BridgeError::Submission(format!(
                    "no MessagePassed log in {}",
                    receipt.transaction_hash
                ))
            })?;

        let withdrawal = WithdrawalTransaction {
            nonce: passed.nonce,
            sender: passed.sender,
            target: passed.target,
            value: passed.value,
            gas_limit: passed.gasLimit,
            data: passed.data,
        };

        let computed = hash_withdrawal(&withdrawal);
        if computed != passed.withdrawalHash {
            warn!(
                emitted = %passed.withdrawalHash,
                computed = %computed,
                "Withdrawal hash mismatch, using emitted hash"
            );
        }

        Ok(CrossDomainMessage {
            hash: passed.withdrawalHash,
            withdrawal: Some(withdrawal),
        })
    }

    // =========================================================================
    // Status queries
    // =========================================================================

    async fn deposit_status(&self, hash: B256) -> Result<MessageStatus, BridgeError> {
        let provider = self.l2.provider();
        let messenger = CrossDomainMessenger::new(L2_CROSS_DOMAIN_MESSENGER, &provider);

        let relayed = messenger
            .successfulMessages(hash)
            .call()
            .await
            .map_err(|e| query_error("successfulMessages", e))?
            ._0;
        if relayed {
            return Ok(MessageStatus::Relayed);
        }

        let failed = messenger
            .failedMessages(hash)
            .call()
            .await
            .map_err(|e| query_error("failedMessages", e))?
            ._0;
        if failed {
            return Ok(MessageStatus::FailedL1ToL2);
        }

        Ok(MessageStatus::Unconfirmed)
    }

    async fn withdrawal_status(&self, hash: B256) -> Result<MessageStatus, BridgeError> {
        match self.portal_kind().await? {
            PortalKind::Legacy => self.legacy_withdrawal_status(hash).await,
            PortalKind::FaultProof => self.fault_proof_withdrawal_status(hash).await,
        }
    }

    async fn legacy_withdrawal_status(&self, hash: B256) -> Result<MessageStatus, BridgeError> {
        let provider = self.l1.provider();
        let portal = OptimismPortal::new(self.contracts.optimism_portal, &provider);

        let finalized = portal
            .finalizedWithdrawals(hash)
            .call()
            .await
            .map_err(|e| query_error("finalizedWithdrawals", e))?
            ._0;
        if finalized {
            return Ok(MessageStatus::Relayed);
        }

        let proven = portal
            .provenWithdrawals(hash)
            .call()
            .await
            .map_err(|e| query_error("provenWithdrawals", e))?;
        if proven.timestamp == 0 {
            return Ok(MessageStatus::Unconfirmed);
        }

        let period = self.challenge_period().await?;
        let now = self.latest_l1_timestamp().await?;
        let proven_at = u64::try_from(proven.timestamp).unwrap_or(u64::MAX);

        Ok(challenge_status(proven_at, period, now))
    }

    async fn fault_proof_withdrawal_status(&self, hash: B256) -> Result<MessageStatus, BridgeError> {
        let provider = self.l1.provider();
        let portal = OptimismPortal2::new(self.contracts.optimism_portal, &provider);

        let finalized = portal
            .finalizedWithdrawals(hash)
            .call()
            .await
            .map_err(|e| query_error("finalizedWithdrawals", e))?
            ._0;
        if finalized {
            return Ok(MessageStatus::Relayed);
        }

        let Some((submitter, proven_at)) = self.fault_proof(hash).await? else {
            return Ok(MessageStatus::Unconfirmed);
        };

        let period = self.challenge_period().await?;
        let now = self.latest_l1_timestamp().await?;
        if challenge_status(proven_at, period, now) == MessageStatus::InChallengePeriod {
            return Ok(MessageStatus::InChallengePeriod);
        }

        // Matured; the dispute game must also have resolved in its favour
        match portal.checkWithdrawal(hash, submitter).call().await {
            Ok(_) => Ok(MessageStatus::ReadyForRelay),
            Err(e) => match query_error("checkWithdrawal", e) {
                BridgeError::CallReverted(reason) => {
                    warn!(
                        withdrawal_hash = %hash,
                        proof_submitter = %submitter,
                        reason = %reason,
                        "Proof matured but withdrawal is not finalizable yet"
                    );
                    Ok(MessageStatus::InChallengePeriod)
                }
                other => Err(other),
            },
        }
    }

    /// Proof submitter and proof timestamp of a withdrawal on a fault-proof
    /// portal
    ///
    /// Our own proof is preferred; otherwise the first recorded submitter.
    async fn fault_proof(&self, hash: B256) -> Result<Option<(Address, u64)>, BridgeError> {
        let provider = self.l1.provider();
        let portal = OptimismPortal2::new(self.contracts.optimism_portal, &provider);

        let ours = self.l1.address();
        let proven = portal
            .provenWithdrawals(hash, ours)
            .call()
            .await
            .map_err(|e| query_error("provenWithdrawals", e))?;
        if proven.timestamp != 0 {
            return Ok(Some((ours, proven.timestamp)));
        }

        let first = match portal.proofSubmitters(hash, U256::ZERO).call().await {
            Ok(result) => result._0,
            Err(e) => {
                return match query_error("proofSubmitters", e) {
                    // Out-of-bounds read: nobody has proven it
                    BridgeError::CallReverted(_) => Ok(None),
                    other => Err(other),
                };
            }
        };
        if first == ours {
            return Ok(None);
        }

        let proven = portal
            .provenWithdrawals(hash, first)
            .call()
            .await
            .map_err(|e| query_error("provenWithdrawals", e))?;
        if proven.timestamp == 0 {
            return Ok(None);
        }
        debug!(withdrawal_hash = %hash, proof_submitter = %first, "Using external proof");
        Ok(Some((first, proven.timestamp)))
    }

    async fn portal_kind(&self) -> Result<PortalKind, BridgeError> {
        self.portal_kind
            .get_or_try_init(|| async {
                let provider = self.l1.provider();
                let portal = OptimismPortal::new(self.contracts.optimism_portal, &provider);
                let kind = match portal.version().call().await {
                    Ok(version) => PortalKind::from_version(&version._0),
                    Err(e) => match query_error("version", e) {
                        BridgeError::CallReverted(_) => PortalKind::Legacy,
                        other => return Err(other),
                    },
                };
                info!(
                    portal = %self.contracts.optimism_portal,
                    kind = ?kind,
                    "Detected OptimismPortal"
                );
                Ok::<PortalKind, BridgeError>(kind)
            })
            .await
            .copied()
    }

    /// Seconds between a proof and the earliest finalization
    async fn challenge_period(&self) -> Result<u64, BridgeError> {
        let kind = self.portal_kind().await?;
        self.challenge_period
            .get_or_try_init(|| async {
                let provider = self.l1.provider();
                let period = match kind {
                    PortalKind::Legacy => {
                        let oracle = L2OutputOracle::new(self.contracts.l2_output_oracle, &provider);
                        oracle
                            .FINALIZATION_PERIOD_SECONDS()
                            .call()
                            .await
                            .map_err(|e| query_error("FINALIZATION_PERIOD_SECONDS", e))?
                            ._0
                    }
                    PortalKind::FaultProof => {
                        let portal = OptimismPortal2::new(self.contracts.optimism_portal, &provider);
                        portal
                            .proofMaturityDelaySeconds()
                            .call()
                            .await
                            .map_err(|e| query_error("proofMaturityDelaySeconds", e))?
                            ._0
                    }
                };
                let period = u64::try_from(period).unwrap_or(u64::MAX);
                debug!(seconds = period, "Loaded challenge period");
                Ok::<u64, BridgeError>(period)
            })
            .await
            .copied()
    }

    async fn latest_l1_timestamp(&self) -> Result<u64, BridgeError> {
        let block = self
            .l1
            .provider()
            .get_block_by_number(BlockNumberOrTag::Latest, BlockTransactionsKind::Hashes)
            .await?
            .ok_or_else(|| BridgeError::Network("latest L1 block unavailable".to_string()))?;
        Ok(block.header.timestamp)
    }
}

/// Decode a log as `E` if its first topic is the event signature
fn decode_event<E: SolEvent>(log: &Log) -> Option<E> {
    if log.topics().first() != Some(&E::SIGNATURE_HASH) {
        return None;
    }
    log.log_decode::<E>().ok().map(|decoded| decoded.inner.data)
}

/// Status of a proven withdrawal at L1 time `now`
pub fn challenge_status(proven_at: u64, period: u64, now: u64) -> MessageStatus {
    if now < proven_at.saturating_add(period) {
        MessageStatus::InChallengePeriod
    } else {
        MessageStatus::ReadyForRelay
    }
}

#[async_trait]
impl BridgeMessenger for OpStackMessenger {
    async fn submit_deposit(&self, request: &TransferRequest) -> Result<B256, BridgeError> {
        let provider = self.l1.provider();
        let bridge = L1StandardBridge::new(self.contracts.l1_standard_bridge, &provider);

        let sent = match request.asset {
            Asset::Native => {
                bridge
                    .depositETHTo(request.recipient, self.min_gas_limit, Bytes::new())
                    .value(request.amount)
                    .send()
                    .await
            }
            Asset::Erc20 { l1_token, l2_token } => {
                bridge
                    .depositERC20To(
                        l1_token,
                        l2_token,
                        request.recipient,
                        request.amount,
                        self.min_gas_limit,
                        Bytes::new(),
                    )
                    .send()
                    .await
            }
        };
        let tx_hash = *sent.map_err(|e| send_error("deposit", e))?.tx_hash();

        info!(tx_hash = %tx_hash, asset = %request.asset, "Deposit broadcast on L1");
        Ok(tx_hash)
    }

    async fn submit_withdrawal(&self, request: &TransferRequest) -> Result<B256, BridgeError> {
        let provider = self.l2.provider();
        let bridge = L2StandardBridge::new(L2_STANDARD_BRIDGE, &provider);

        let sent = match request.asset {
            Asset::Native => {
                bridge
                    .withdrawTo(
                        LEGACY_ERC20_ETH,
                        request.recipient,
                        request.amount,
                        self.min_gas_limit,
                        Bytes::new(),
                    )
                    .value(request.amount)
                    .send()
                    .await
            }
            Asset::Erc20 { l2_token, .. } => {
                bridge
                    .withdrawTo(
                        l2_token,
                        request.recipient,
                        request.amount,
                        self.min_gas_limit,
                        Bytes::new(),
                    )
                    .send()
                    .await
            }
        };
        let tx_hash = *sent.map_err(|e| send_error("withdrawal", e))?.tx_hash();

        info!(tx_hash = %tx_hash, asset = %request.asset, "Withdrawal broadcast on L2");
        Ok(tx_hash)
    }

    async fn wait_for_inclusion(
        &self,
        direction: Direction,
        tx_hash: B256,
    ) -> Result<Inclusion, BridgeError> {
        let source = match direction {
            Direction::Deposit => &self.l1,
            Direction::Withdraw => &self.l2,
        };
        let receipt = Self::wait_for_receipt(source, tx_hash).await?;
        let block_number = Self::block_number(&receipt)?;
        let message = match direction {
            Direction::Deposit => self.deposit_message(&receipt)?,
            Direction::Withdraw => Self::withdrawal_message(&receipt)?,
        };

        info!(
            direction = %direction,
            tx_hash = %tx_hash,
            block = block_number,
            message_hash = %message.hash,
            "Transfer included on source chain"
        );

        Ok(Inclusion {
            tx_hash,
            block_number,
            message,
        })
    }

    async fn message_status(&self, handle: &TransferHandle) -> Result<MessageStatus, BridgeError> {
        match handle.direction {
            Direction::Deposit => self.deposit_status(handle.message.hash).await,
            Direction::Withdraw => self.withdrawal_status(handle.message.hash).await,
        }
    }

    async fn finalize(&self, handle: &TransferHandle) -> Result<B256, BridgeError> {
        let withdrawal = handle.message.withdrawal.as_ref().ok_or_else(|| {
            BridgeError::InvalidRequest(format!(
                "handle {} carries no withdrawal transaction",
                handle.tx_hash
            ))
        })?;

        let provider = self.l1.provider();
        let sent = match self.portal_kind().await? {
            PortalKind::Legacy => {
                let portal = OptimismPortal::new(self.contracts.optimism_portal, &provider);
                let tx = OptimismPortal::WithdrawalTransaction {
                    nonce: withdrawal.nonce,
                    sender: withdrawal.sender,
                    target: withdrawal.target,
                    value: withdrawal.value,
                    gasLimit: withdrawal.gas_limit,
                    data: withdrawal.data.clone(),
                };
                portal.finalizeWithdrawalTransaction(tx).send().await
            }
            PortalKind::FaultProof => {
                let Some((submitter, _)) = self.fault_proof(handle.message.hash).await? else {
                    return Err(BridgeError::InvalidRequest(format!(
                        "withdrawal {} has not been proven",
                        handle.message.hash
                    )));
                };
                let portal = OptimismPortal2::new(self.contracts.optimism_portal, &provider);
                let tx = OptimismPortal2::WithdrawalTransaction {
                    nonce: withdrawal.nonce,
                    sender: withdrawal.sender,
                    target: withdrawal.target,
                    value: withdrawal.value,
                    gasLimit: withdrawal.gas_limit,
                    data: withdrawal.data.clone(),
                };
                if submitter == self.l1.address() {
                    portal.finalizeWithdrawalTransaction(tx).send().await
                } else {
                    portal
                        .finalizeWithdrawalTransactionExternalProof(tx, submitter)
                        .send()
                        .await
                }
            }
        };
        let tx_hash = *sent
            .map_err(|e| send_error("finalizeWithdrawalTransaction", e))?
            .tx_hash();

        info!(
            tx_hash = %tx_hash,
            withdrawal_hash = %handle.message.hash,
            "Finalization broadcast on L1"
        );
        Ok(tx_hash)
    }

    async fn wait_for_finalization(&self, tx_hash: B256) -> Result<(), BridgeError> {
        Self::wait_for_receipt(&self.l1, tx_hash).await?;
        Ok(())
    }

    async fn bridge_allowance(&self, token: Address, owner: Address) -> Result<U256, BridgeError> {
        let provider = self.l1.provider();
        let erc20 = ERC20::new(token, &provider);
        let allowance = erc20
            .allowance(owner, self.contracts.l1_standard_bridge)
            .call()
            .await
            .map_err(|e| query_error("allowance", e))?
            ._0;
        debug!(
            token = %token,
            owner = %owner,
            signer = %self.l1.address(),
            allowance = %allowance,
            "Bridge allowance"
        );
        Ok(allowance)
    }
}

//! Common types for cross-domain transfers
//!
//! Endpoints, requests, handles, message statuses and balance snapshots
//! shared by the executor, poller, reporter and orchestrator.

use alloy::primitives::{utils::format_units, Address, Bytes, B256, I256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::BridgeError;
use crate::traits::ChainSigner;

// ============================================================================
// Chain Endpoints
// ============================================================================

/// RPC endpoint of one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoint {
    /// EIP-155 chain id
    pub chain_id: u64,
    /// JSON-RPC URL
    pub rpc_url: Url,
}

impl ChainEndpoint {
    /// Create from a chain id and a URL string
    pub fn new(chain_id: u64, rpc_url: &str) -> Result<Self, BridgeError> {
        let rpc_url = rpc_url
            .parse()
            .map_err(|e| BridgeError::InvalidRequest(format!("invalid RPC URL {}: {}", rpc_url, e)))?;
        Ok(Self { chain_id, rpc_url })
    }
}

impl fmt::Display for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain {} ({})", self.chain_id, self.rpc_url)
    }
}

// ============================================================================
// Transfer Requests
// ============================================================================

/// Direction of a transfer across the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// L1 -> L2
    Deposit,
    /// L2 -> L1, subject to the challenge period
    Withdraw,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdraw => "withdrawal",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Asset being bridged
///
/// A bridged ERC20 has a distinct contract on each chain, so both
/// addresses are carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    /// Native ETH
    Native,
    /// ERC20 token pair
    Erc20 { l1_token: Address, l2_token: Address },
}

impl Asset {
    /// Token contract on the L1 side, if any
    pub fn l1_token(&self) -> Option<Address> {
        match self {
            Asset::Native => None,
            Asset::Erc20 { l1_token, .. } => Some(*l1_token),
        }
    }

    /// Token contract on the L2 side, if any
    pub fn l2_token(&self) -> Option<Address> {
        match self {
            Asset::Native => None,
            Asset::Erc20 { l2_token, .. } => Some(*l2_token),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "ETH"),
            Asset::Erc20 { l1_token, l2_token } => write!(f, "ERC20 {} / {}", l1_token, l2_token),
        }
    }
}

/// A single deposit or withdrawal to submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub direction: Direction,
    pub asset: Asset,
    /// Amount in the asset's smallest unit
    pub amount: U256,
    /// Account signing on the source chain
    pub sender: Address,
    /// Account credited on the destination chain
    pub recipient: Address,
}

impl TransferRequest {
    /// Create a request, rejecting a zero amount
    pub fn new(
        direction: Direction,
        asset: Asset,
        amount: U256,
        sender: Address,
        recipient: Address,
    ) -> Result<Self, BridgeError> {
        let request = Self {
            direction,
            asset,
            amount,
            sender,
            recipient,
        };
        request.validate()?;
        Ok(request)
    }

    /// Create a request between the two chain signers
    ///
    /// The source signer sends and the destination signer receives, picked
    /// by direction.
    pub fn between<S: ChainSigner + ?Sized>(
        direction: Direction,
        asset: Asset,
        amount: U256,
        l1: &S,
        l2: &S,
    ) -> Result<Self, BridgeError> {
        let (sender, recipient) = match direction {
            Direction::Deposit => (l1.address(), l2.address()),
            Direction::Withdraw => (l2.address(), l1.address()),
        };
        Self::new(direction, asset, amount, sender, recipient)
    }

    /// Check request invariants
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.amount.is_zero() {
            return Err(BridgeError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            ));
        }
        if self.recipient == Address::ZERO {
            return Err(BridgeError::InvalidRequest(
                "recipient must not be the zero address".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Cross-Domain Messages
// ============================================================================

/// L2 -> L1 withdrawal as emitted by the L2 message passer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalTransaction {
    pub nonce: U256,
    pub sender: Address,
    pub target: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub data: Bytes,
}

/// Identifier of the cross-domain message behind a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossDomainMessage {
    /// Message hash tracked on the destination chain
    pub hash: B256,
    /// Withdrawal payload, needed to finalize on L1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal: Option<WithdrawalTransaction>,
}

/// Reference to a submitted transfer
///
/// Created by the executor once the source transaction is included and
/// never mutated afterwards; [`TransferHandle::with_finalization`] returns
/// a new value. Serializable so polling can resume after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHandle {
    pub direction: Direction,
    pub asset: Asset,
    pub amount: U256,
    pub sender: Address,
    pub recipient: Address,
    /// Source-chain transaction hash
    pub tx_hash: B256,
    /// Block the source transaction was included in
    pub block_number: u64,
    pub message: CrossDomainMessage,
    pub submitted_at: DateTime<Utc>,
    /// L1 finalization transaction (withdrawals only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalization_tx: Option<B256>,
}

impl TransferHandle {
    /// Copy of this handle with the finalization transaction recorded
    pub fn with_finalization(&self, tx_hash: B256) -> Self {
        Self {
            finalization_tx: Some(tx_hash),
            ..self.clone()
        }
    }

    /// Message hash as 0x-prefixed hex
    pub fn message_hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.message.hash))
    }
}

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} {} (tx {}, block {}, message {})",
            self.direction,
            self.amount,
            self.asset,
            self.tx_hash,
            self.block_number,
            self.message_hash_hex()
        )
    }
}

// ============================================================================
// Message Status
// ============================================================================

/// Status of a cross-domain message as reported by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Deposit not yet executed on L2, or withdrawal not yet proven on L1
    #[serde(rename = "UNCONFIRMED_L1_TO_L2")]
    Unconfirmed,
    /// Deposit executed on L2 but the call failed (replayable)
    #[serde(rename = "FAILED_L1_TO_L2")]
    FailedL1ToL2,
    /// Withdrawal proven, challenge period running
    InChallengePeriod,
    /// Challenge period over, withdrawal can be finalized
    ReadyForRelay,
    /// Message executed on the destination chain
    Relayed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Unconfirmed => "UNCONFIRMED_L1_TO_L2",
            MessageStatus::FailedL1ToL2 => "FAILED_L1_TO_L2",
            MessageStatus::InChallengePeriod => "IN_CHALLENGE_PERIOD",
            MessageStatus::ReadyForRelay => "READY_FOR_RELAY",
            MessageStatus::Relayed => "RELAYED",
        }
    }

    /// Position of this status in the direction's progression
    ///
    /// Returns `None` for statuses that never occur in that direction.
    pub fn rank(&self, direction: Direction) -> Option<u8> {
        match (direction, self) {
            (Direction::Deposit, MessageStatus::Unconfirmed) => Some(0),
            (Direction::Deposit, MessageStatus::FailedL1ToL2) => Some(1),
            (Direction::Deposit, MessageStatus::Relayed) => Some(2),
            (Direction::Withdraw, MessageStatus::Unconfirmed) => Some(0),
            (Direction::Withdraw, MessageStatus::InChallengePeriod) => Some(1),
            (Direction::Withdraw, MessageStatus::ReadyForRelay) => Some(2),
            (Direction::Withdraw, MessageStatus::Relayed) => Some(3),
            _ => None,
        }
    }

    /// Rank, or an error if the status is foreign to the direction
    pub fn checked_rank(&self, direction: Direction) -> Result<u8, BridgeError> {
        self.rank(direction).ok_or(BridgeError::UnexpectedStatus {
            status: *self,
            direction,
        })
    }

    /// Whether `self` is at or past `target` in the direction's ordering
    pub fn satisfies(&self, target: MessageStatus, direction: Direction) -> bool {
        match (self.rank(direction), target.rank(direction)) {
            (Some(current), Some(wanted)) => current >= wanted,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Relayed)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle stage of a transfer handle
///
/// Withdrawal: `Submitted -> InChallengePeriod -> ReadyForRelay -> Finalizing -> Relayed`.
/// Deposit: `Submitted -> Relayed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStage {
    Submitted,
    InChallengePeriod,
    ReadyForRelay,
    Finalizing,
    Relayed,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Submitted => "SUBMITTED",
            TransferStage::InChallengePeriod => "IN_CHALLENGE_PERIOD",
            TransferStage::ReadyForRelay => "READY_FOR_RELAY",
            TransferStage::Finalizing => "FINALIZING",
            TransferStage::Relayed => "RELAYED",
        }
    }

    /// Stage reached once `status` has been observed for a handle in `direction`
    ///
    /// Never moves backwards from `current`.
    pub fn advance(self, direction: Direction, status: MessageStatus) -> Self {
        let observed = match (direction, status) {
            (_, MessageStatus::Relayed) => TransferStage::Relayed,
            (Direction::Withdraw, MessageStatus::ReadyForRelay) => TransferStage::ReadyForRelay,
            (Direction::Withdraw, MessageStatus::InChallengePeriod) => {
                TransferStage::InChallengePeriod
            }
            _ => TransferStage::Submitted,
        };
        self.max(observed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStage::Relayed)
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Balance Snapshots
// ============================================================================

/// Balances of one asset on both chains at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub asset: Asset,
    /// L1 balance in base units
    pub l1: U256,
    /// L2 balance in base units
    pub l2: U256,
    pub taken_at: DateTime<Utc>,
}

/// Signed balance change between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub l1: I256,
    pub l2: I256,
}

impl BalanceSnapshot {
    /// Change from `self` to a later snapshot
    pub fn delta(&self, after: &BalanceSnapshot) -> BalanceDelta {
        BalanceDelta {
            l1: I256::from_raw(after.l1).wrapping_sub(I256::from_raw(self.l1)),
            l2: I256::from_raw(after.l2).wrapping_sub(I256::from_raw(self.l2)),
        }
    }
}

/// Exact fixed-point rendering of a base-unit amount
pub fn format_amount(amount: U256, unit: &str) -> String {
    format_units(amount, unit).unwrap_or_else(|_| amount.to_string())
}

impl fmt::Display for BalanceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.asset {
            Asset::Native => write!(
                f,
                "On L1: {} Gwei    On L2: {} Gwei",
                format_amount(self.l1, "gwei"),
                format_amount(self.l2, "gwei")
            ),
            Asset::Erc20 { .. } => write!(f, "On L1: {}    On L2: {}", self.l1, self.l2),
        }
    }
}

//! Error taxonomy for bridge transfers
//!
//! Every fallible operation in this crate returns [`BridgeError`]. Only
//! [`BridgeError::Network`] is considered transient and retried internally
//! (see [`crate::retry`]); every other kind propagates to the caller as-is.

use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

use crate::types::{Direction, MessageStatus};

/// Errors surfaced by the signer provider, reporter, executor and poller.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The credential could not be decoded into a private key
    #[error("credential error: {0}")]
    Credential(String),

    /// RPC query or transport failure (transient, retryable)
    #[error("network error: {0}")]
    Network(String),

    /// A read-only contract call reverted or returned undecodable data
    #[error("contract call failed: {0}")]
    CallReverted(String),

    /// Transaction could not be signed or broadcast, or it reverted
    #[error("submission failed: {0}")]
    Submission(String),

    /// Transaction was not mined within the bounded wait
    ///
    /// `tx_hash` is set when the transaction had already been broadcast and
    /// may still be included later.
    #[error("transaction {} not included within {waited:?}", display_tx(.tx_hash))]
    InclusionTimeout {
        waited: Duration,
        tx_hash: Option<B256>,
    },

    /// ERC20 allowance towards the bridge is below the transfer amount
    #[error("insufficient allowance for token {token}: {required} required, {available} approved")]
    InsufficientAllowance {
        token: Address,
        required: U256,
        available: U256,
    },

    /// Polling deadline elapsed before the target status was observed
    #[error("timed out after {elapsed:?} waiting for {target} (last status: {})", display_last(.last))]
    Timeout {
        target: MessageStatus,
        last: Option<MessageStatus>,
        elapsed: Duration,
    },

    /// An external cancellation signal aborted the wait
    #[error("cancelled while waiting for {target} (last status: {})", display_last(.last))]
    Cancelled {
        target: MessageStatus,
        last: Option<MessageStatus>,
    },

    /// Request failed validation before anything was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Status reported by the messenger has no meaning for this direction
    #[error("status {status} is not valid for a {direction}")]
    UnexpectedStatus {
        status: MessageStatus,
        direction: Direction,
    },

    /// RPC endpoint serves a different chain than configured
    #[error("chain id mismatch: expected {expected}, endpoint reports {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Checkpoint file could not be read or written
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

fn display_tx(tx_hash: &Option<B256>) -> String {
    tx_hash
        .map(|h| h.to_string())
        .unwrap_or_else(|| "(not broadcast)".to_string())
}

fn display_last(last: &Option<MessageStatus>) -> String {
    last.map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl BridgeError {
    /// Whether the operation may succeed if simply retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Network(_))
    }

    /// Whether polling may resume later with the same handle
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            BridgeError::Network(_) | BridgeError::Timeout { .. } | BridgeError::Cancelled { .. }
        )
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Credential(_) => "credential",
            BridgeError::Network(_) => "network",
            BridgeError::CallReverted(_) => "call_reverted",
            BridgeError::Submission(_) => "submission",
            BridgeError::InclusionTimeout { .. } => "inclusion_timeout",
            BridgeError::InsufficientAllowance { .. } => "insufficient_allowance",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::Cancelled { .. } => "cancelled",
            BridgeError::InvalidRequest(_) => "invalid_request",
            BridgeError::UnexpectedStatus { .. } => "unexpected_status",
            BridgeError::ChainMismatch { .. } => "chain_mismatch",
            BridgeError::Checkpoint(_) => "checkpoint",
        }
    }
}

impl From<alloy::transports::TransportError> for BridgeError {
    fn from(e: alloy::transports::TransportError) -> Self {
        BridgeError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Checkpoint(e.to_string())
    }
}

/// Coarse classification of RPC / contract error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeouts, dropped connections, rate limits
    Transient,
    /// ERC20 allowance too low for the bridge to pull tokens
    Allowance,
    /// Execution reverted or was rejected by the node
    Rejected,
    /// Anything else
    Unknown,
}

/// Classify an error message for retry and reporting decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("allowance") {
        return ErrorClass::Allowance;
    }

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    if error_lower.contains("revert")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("nonce too low")
        || error_lower.contains("underpriced")
        || error_lower.contains("invalid signature")
        || error_lower.contains("out of gas")
    {
        return ErrorClass::Rejected;
    }

    ErrorClass::Unknown
}

/// Map a failed read-only contract call to a bridge error
///
/// Reverts and undecodable return data are deterministic and come back as
/// [`BridgeError::CallReverted`]; everything else is a retryable
/// [`BridgeError::Network`] error.
pub fn query_error(context: &str, error: impl std::fmt::Display) -> BridgeError {
    let detail = error.to_string();
    let lower = detail.to_lowercase();
    let message = format!("{}: {}", context, detail);
    if lower.contains("revert")
        || lower.contains("abi decod")
        || lower.contains("buffer overrun")
        || classify_error(&detail) == ErrorClass::Rejected
    {
        return BridgeError::CallReverted(message);
    }
    BridgeError::Network(message)
}

/// Map a failed transaction broadcast to a bridge error
pub fn send_error(context: &str, error: impl std::fmt::Display) -> BridgeError {
    let message = format!("{}: {}", context, error);
    match classify_error(&message) {
        ErrorClass::Transient => BridgeError::Network(message),
        _ => BridgeError::Submission(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_error("connection refused"), ErrorClass::Transient);
        assert_eq!(classify_error("HTTP 503 Service Unavailable"), ErrorClass::Transient);
        assert_eq!(
            classify_error("execution reverted: ERC20: insufficient allowance"),
            ErrorClass::Allowance
        );
        assert_eq!(classify_error("execution reverted"), ErrorClass::Rejected);
        assert_eq!(classify_error("insufficient funds for gas"), ErrorClass::Rejected);
        assert_eq!(classify_error("something odd"), ErrorClass::Unknown);
    }

    #[test]
    fn test_query_reverts_are_not_retryable() {
        let err = query_error("provenWithdrawals", "server returned an error response: error code 3: execution reverted");
        assert_eq!(err.kind(), "call_reverted");
        assert!(!err.is_retryable());

        let err = query_error("FINALIZATION_PERIOD_SECONDS", "ABI decoding failed: buffer overrun while deserializing");
        assert_eq!(err.kind(), "call_reverted");

        let err = query_error("successfulMessages", "error sending request: connection refused");
        assert_eq!(err.kind(), "network");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_send_error_mapping() {
        assert_eq!(send_error("depositETHTo", "request timed out").kind(), "network");
        assert_eq!(
            send_error("depositERC20To", "execution reverted: ERC20: insufficient allowance").kind(),
            "submission"
        );
    }

    #[test]
    fn test_inclusion_timeout_names_broadcast_tx() {
        let tx_hash = B256::repeat_byte(0xab);
        let err = BridgeError::InclusionTimeout {
            waited: Duration::from_secs(30),
            tx_hash: Some(tx_hash),
        };
        assert!(err.to_string().contains(&tx_hash.to_string()));

        let err = BridgeError::InclusionTimeout {
            waited: Duration::from_secs(30),
            tx_hash: None,
        };
        assert!(err.to_string().contains("not broadcast"));
    }

    #[test]
    fn test_only_network_is_retryable() {
        assert!(BridgeError::Network("boom".into()).is_retryable());
        assert!(!BridgeError::Submission("reverted".into()).is_retryable());
        assert!(!BridgeError::Timeout {
            target: MessageStatus::Relayed,
            last: None,
            elapsed: Duration::ZERO,
        }
        .is_retryable());
    }

    #[test]
    fn test_timeout_and_cancel_are_resumable() {
        let timeout = BridgeError::Timeout {
            target: MessageStatus::ReadyForRelay,
            last: Some(MessageStatus::InChallengePeriod),
            elapsed: Duration::from_secs(5),
        };
        let cancelled = BridgeError::Cancelled {
            target: MessageStatus::Relayed,
            last: None,
        };

        assert!(timeout.is_resumable());
        assert!(cancelled.is_resumable());
        assert!(!BridgeError::InvalidRequest("zero".into()).is_resumable());
        assert_ne!(timeout.kind(), cancelled.kind());
    }

    #[test]
    fn test_timeout_message_includes_last_status() {
        let err = BridgeError::Timeout {
            target: MessageStatus::ReadyForRelay,
            last: Some(MessageStatus::InChallengePeriod),
            elapsed: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("READY_FOR_RELAY"));
        assert!(msg.contains("IN_CHALLENGE_PERIOD"));

        let err = BridgeError::Cancelled {
            target: MessageStatus::Relayed,
            last: None,
        };
        assert!(err.to_string().contains("none"));
    }
}

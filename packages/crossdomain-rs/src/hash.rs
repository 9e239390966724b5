//! Cross-domain message hashing
//!
//! Hashes that identify a message on its destination chain, computed the
//! same way as the OP-stack contracts:
//!
//! - Deposits are tracked by the L2 messenger under the keccak256 of the
//!   `relayMessage(...)` calldata. The encoding depends on the version packed
//!   into the top two bytes of the message nonce.
//! - Withdrawals are tracked by the portal under
//!   `keccak256(abi.encode(nonce, sender, target, value, gasLimit, data))`.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};
use tiny_keccak::{Hasher, Keccak};

use crate::types::WithdrawalTransaction;

mod legacy {
    alloy::sol! {
        function relayMessage(address _target, address _sender, bytes _message, uint256 _messageNonce);
    }
}

mod versioned {
    alloy::sol! {
        function relayMessage(
            uint256 _nonce,
            address _sender,
            address _target,
            uint256 _value,
            uint256 _minGasLimit,
            bytes _message
        );
    }
}

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Message encoding version stored in the upper 16 bits of a nonce
pub fn nonce_version(nonce: U256) -> u16 {
    let shifted: U256 = nonce >> 240;
    shifted.to::<u16>()
}

/// Nonce with the version removed
pub fn nonce_sequence(nonce: U256) -> U256 {
    let mask = (U256::from(1u8) << 240) - U256::from(1u8);
    nonce & mask
}

/// Pack a version into the upper 16 bits of a nonce
pub fn encode_versioned_nonce(sequence: U256, version: u16) -> U256 {
    nonce_sequence(sequence) | (U256::from(version) << 240)
}

/// A message sent through a cross-domain messenger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedMessage {
    /// Versioned messenger nonce
    pub nonce: U256,
    pub sender: Address,
    pub target: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub data: Bytes,
}

/// `relayMessage` calldata for a messenger message
///
/// Returns `None` for unknown versions.
pub fn encode_relay_message(message: &RelayedMessage) -> Option<Vec<u8>> {
    match nonce_version(message.nonce) {
        0 => Some(
            legacy::relayMessageCall {
                _target: message.target,
                _sender: message.sender,
                _message: message.data.clone(),
                _messageNonce: message.nonce,
            }
            .abi_encode(),
        ),
        1 => Some(
            versioned::relayMessageCall {
                _nonce: message.nonce,
                _sender: message.sender,
                _target: message.target,
                _value: message.value,
                _minGasLimit: message.gas_limit,
                _message: message.data.clone(),
            }
            .abi_encode(),
        ),
        _ => None,
    }
}

/// Hash under which the destination messenger records a message
pub fn hash_cross_domain_message(message: &RelayedMessage) -> Option<B256> {
    encode_relay_message(message).map(|calldata| B256::from(keccak256(&calldata)))
}

/// Hash under which the L1 portal records a withdrawal
pub fn hash_withdrawal(withdrawal: &WithdrawalTransaction) -> B256 {
    let encoded = (
        withdrawal.nonce,
        withdrawal.sender,
        withdrawal.target,
        withdrawal.value,
        withdrawal.gas_limit,
        withdrawal.data.clone(),
    )
        .abi_encode_params();
    B256::from(keccak256(&encoded))
}

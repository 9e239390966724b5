//! Capability traits
//!
//! The orchestrator, executor, poller and balance reporter only talk to
//! chains through these two traits. The `evm` module implements them over
//! alloy providers; the `testing` module implements them with scripted
//! in-memory fakes.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::error::BridgeError;
use crate::types::{
    ChainEndpoint, CrossDomainMessage, Direction, MessageStatus, TransferHandle, TransferRequest,
};

/// An account bound to one chain
#[async_trait]
pub trait ChainSigner: Send + Sync {
    /// Account address (same on L1 and L2 for one credential)
    fn address(&self) -> Address;

    /// Endpoint this signer is bound to
    fn endpoint(&self) -> &ChainEndpoint;

    /// Native balance of [`ChainSigner::address`] in wei
    async fn native_balance(&self) -> Result<U256, BridgeError>;

    /// ERC20 balance of [`ChainSigner::address`] in base units
    async fn token_balance(&self, token: Address) -> Result<U256, BridgeError>;

    /// Chain id reported by the RPC endpoint
    async fn chain_id_from_rpc(&self) -> Result<u64, BridgeError>;
}

/// Source-chain inclusion of a bridge transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub tx_hash: B256,
    pub block_number: u64,
    pub message: CrossDomainMessage,
}

/// Bridge contracts on both chains
///
/// Sending and waiting are separate steps. `submit_*` and `finalize` return
/// the transaction hash as soon as the node accepts the transaction;
/// `wait_for_*` blocks until it is mined with one confirmation. Neither
/// enforces a deadline; the executor bounds the waits.
#[async_trait]
pub trait BridgeMessenger: Send + Sync {
    /// Broadcast an L1 -> L2 deposit
    async fn submit_deposit(&self, request: &TransferRequest) -> Result<B256, BridgeError>;

    /// Broadcast an L2 -> L1 withdrawal
    async fn submit_withdrawal(&self, request: &TransferRequest) -> Result<B256, BridgeError>;

    /// Wait until a broadcast transfer is mined on its source chain and
    /// extract the cross-domain message it sent
    async fn wait_for_inclusion(
        &self,
        direction: Direction,
        tx_hash: B256,
    ) -> Result<Inclusion, BridgeError>;

    /// Current status of the handle's cross-domain message
    async fn message_status(&self, handle: &TransferHandle) -> Result<MessageStatus, BridgeError>;

    /// Broadcast the L1 finalization of a proven withdrawal
    async fn finalize(&self, handle: &TransferHandle) -> Result<B256, BridgeError>;

    /// Wait until a finalization transaction is mined and succeeded
    async fn wait_for_finalization(&self, tx_hash: B256) -> Result<(), BridgeError>;

    /// Amount of `token` that the L1 bridge may pull from `owner`
    async fn bridge_allowance(&self, token: Address, owner: Address) -> Result<U256, BridgeError>;
}

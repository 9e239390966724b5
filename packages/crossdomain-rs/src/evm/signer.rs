//! EVM signer bound to one chain
//!
//! Wraps alloy's `PrivateKeySigner` and `EthereumWallet` together with the
//! chain endpoint. Providers are built on demand from the stored wallet, so
//! constructing a signer never touches the network; connectivity problems
//! surface as [`BridgeError::Network`] on first use.

use alloy::{
    network::{Ethereum, EthereumWallet},
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use std::fmt;
use tracing::{debug, info};

use super::contracts::ERC20;
use crate::credential::Credential;
use crate::error::{query_error, BridgeError};
use crate::traits::ChainSigner;
use crate::types::ChainEndpoint;

/// Chain-scoped signing account
#[derive(Clone)]
pub struct EvmSigner {
    /// Ethereum wallet wrapper
    wallet: EthereumWallet,
    /// Signer's address
    address: Address,
    endpoint: ChainEndpoint,
}

impl EvmSigner {
    /// Create a signer from a decoded key
    pub fn new(signer: PrivateKeySigner, endpoint: ChainEndpoint) -> Self {
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        debug!(
            address = %address,
            chain_id = endpoint.chain_id,
            "EVM signer initialized"
        );

        Self {
            wallet,
            address,
            endpoint,
        }
    }

    /// Create from a credential
    pub fn from_credential(
        credential: &Credential,
        endpoint: ChainEndpoint,
    ) -> Result<Self, BridgeError> {
        Ok(Self::new(credential.to_local_signer()?, endpoint))
    }

    /// Get the chain ID
    pub fn chain_id(&self) -> u64 {
        self.endpoint.chain_id
    }

    /// Provider with recommended fillers (nonce, gas, chain id) and the
    /// wallet attached
    pub fn provider(&self) -> impl Provider<Http<Client>, Ethereum> + Clone {
        ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet.clone())
            .on_http(self.endpoint.rpc_url.clone())
    }

    /// Fail unless the endpoint serves the configured chain
    pub async fn verify_chain(&self) -> Result<(), BridgeError> {
        let actual = self.chain_id_from_rpc().await?;
        if actual != self.endpoint.chain_id {
            return Err(BridgeError::ChainMismatch {
                expected: self.endpoint.chain_id,
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmSigner")
            .field("address", &self.address)
            .field("chain_id", &self.endpoint.chain_id)
            .field("rpc_url", &self.endpoint.rpc_url.as_str())
            .finish()
    }
}

#[async_trait]
impl ChainSigner for EvmSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn endpoint(&self) -> &ChainEndpoint {
        &self.endpoint
    }

    async fn native_balance(&self) -> Result<U256, BridgeError> {
        let balance = self.provider().get_balance(self.address).await?;
        Ok(balance)
    }

    async fn token_balance(&self, token: Address) -> Result<U256, BridgeError> {
        let provider = self.provider();
        let erc20 = ERC20::new(token, &provider);
        let result = erc20
            .balanceOf(self.address)
            .call()
            .await
            .map_err(|e| query_error("balanceOf", e))?;
        Ok(result._0)
    }

    async fn chain_id_from_rpc(&self) -> Result<u64, BridgeError> {
        let chain_id = self.provider().get_chain_id().await?;
        Ok(chain_id)
    }
}

/// Resolve a credential into an L1 and an L2 signer sharing one key
pub fn resolve_signers(
    credential: &Credential,
    l1: ChainEndpoint,
    l2: ChainEndpoint,
) -> Result<(EvmSigner, EvmSigner), BridgeError> {
    if l1.chain_id == l2.chain_id {
        return Err(BridgeError::InvalidRequest(format!(
            "L1 and L2 must be different chains, both are {}",
            l1.chain_id
        )));
    }

    let key = credential.to_local_signer()?;
    let l1_signer = EvmSigner::new(key.clone(), l1);
    let l2_signer = EvmSigner::new(key, l2);

    info!(
        address = %l1_signer.address(),
        credential = credential.kind(),
        l1_chain_id = l1_signer.chain_id(),
        l2_chain_id = l2_signer.chain_id(),
        "Resolved bridge signers"
    );

    Ok((l1_signer, l2_signer))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    fn endpoints() -> (ChainEndpoint, ChainEndpoint) {
        (
            ChainEndpoint::new(31337, "http://127.0.0.1:8545").unwrap(),
            ChainEndpoint::new(901, "http://127.0.0.1:9545").unwrap(),
        )
    }

    #[test]
    fn test_resolve_signers_share_address() {
        let (l1, l2) = endpoints();
        let (l1, l2) = resolve_signers(&Credential::mnemonic(TEST_MNEMONIC, 0), l1, l2).unwrap();
        assert_eq!(l1.address(), l2.address());
        assert_eq!(l1.chain_id(), 31337);
        assert_eq!(l2.chain_id(), 901);
    }

    #[test]
    fn test_resolve_signers_rejects_bad_credential() {
        let (l1, l2) = endpoints();
        let err = resolve_signers(&Credential::private_key("0xnope"), l1, l2).unwrap_err();
        assert_eq!(err.kind(), "credential");
    }

    #[test]
    fn test_resolve_signers_rejects_same_chain() {
        let (l1, _) = endpoints();
        let err = resolve_signers(&Credential::mnemonic(TEST_MNEMONIC, 0), l1.clone(), l1)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let l1 = ChainEndpoint::new(31337, "http://127.0.0.1:1").unwrap();
        let signer = EvmSigner::from_credential(&Credential::mnemonic(TEST_MNEMONIC, 0), l1).unwrap();
        let err = signer.verify_chain().await.unwrap_err();
        assert!(err.is_retryable(), "got {:?}", err);
    }

    #[test]
    fn test_debug_has_no_key_material() {
        let (l1, _) = endpoints();
        let signer = EvmSigner::from_credential(&Credential::mnemonic(TEST_MNEMONIC, 0), l1).unwrap();
        let debug = format!("{:?}", signer);
        assert!(debug.contains("31337"));
        assert!(!debug.contains("junk"));
    }
}

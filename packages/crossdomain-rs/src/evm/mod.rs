//! EVM / OP-stack implementation
//!
//! - [`contracts`] - sol! bindings and L2 predeploy addresses
//! - [`network`] - L1 contract presets per network
//! - [`signer`] - [`EvmSigner`], the alloy-backed [`crate::traits::ChainSigner`]
//! - [`messenger`] - [`OpStackMessenger`], the alloy-backed [`crate::traits::BridgeMessenger`]

pub mod contracts;
pub mod messenger;
pub mod network;
pub mod signer;

pub use messenger::{challenge_status, OpStackMessenger, PortalKind, DEFAULT_MIN_GAS_LIMIT};
pub use network::{L1Contracts, Network};
pub use signer::{resolve_signers, EvmSigner};

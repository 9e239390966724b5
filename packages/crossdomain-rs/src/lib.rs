//! Crossdomain-RS: L1 <-> optimistic L2 bridge client core
//!
//! Moves ETH and ERC20 tokens between Ethereum and an OP-stack rollup and
//! follows the cross-domain message until it is relayed:
//!
//! - **Signer Provider** - One credential resolved into an L1 and an L2 signer
//! - **Balance Reporter** - Explicit balance snapshots of both chains
//! - **Transfer Executor** - Deposit / withdrawal / finalization submission
//! - **Status Poller** - Bounded, cancellable polling for a target status
//! - **Orchestrator** - Full deposit and withdrawal flows with checkpoints
//! - **EVM Module** - alloy-backed OP-stack signer and messenger
//! - **Testing Module** - Scripted mocks and assertions
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! crossdomain-rs = { path = "../crossdomain-rs" }
//! ```
//!
//! ## Feature Flags
//!
//! - `evm` - Enable the alloy-backed OP-stack implementation (default)
//! - `testing` - Enable mocks and assertions for dependent crates' tests
//! - `full` - Enable all features

// Core modules (always available)
pub mod balance;
pub mod cancel;
pub mod checkpoint;
pub mod credential;
pub mod error;
pub mod executor;
pub mod hash;
pub mod orchestrator;
pub mod poller;
pub mod redact;
pub mod retry;
pub mod traits;
pub mod types;

// Chain-specific modules (feature-gated)
#[cfg(feature = "evm")]
pub mod evm;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items at the crate root
pub use balance::BalanceReporter;
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use credential::Credential;
pub use error::{classify_error, BridgeError, ErrorClass};
pub use executor::{TransferExecutor, DEFAULT_INCLUSION_TIMEOUT};
pub use orchestrator::{BridgeOrchestrator, FlowFailure, FlowSettings, LastKnownState, TransferReport};
pub use poller::{PollConfig, StatusPoller};
pub use redact::Redacted;
pub use retry::{with_retry, with_retry_until, RetryConfig};
pub use traits::{BridgeMessenger, ChainSigner, Inclusion};
pub use types::{
    format_amount, Asset, BalanceDelta, BalanceSnapshot, ChainEndpoint, CrossDomainMessage,
    Direction, MessageStatus, TransferHandle, TransferRequest, TransferStage,
    WithdrawalTransaction,
};

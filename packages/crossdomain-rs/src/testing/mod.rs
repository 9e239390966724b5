//! Testing Utilities Module
//!
//! Scripted fakes for the capability traits plus common assertions, used by
//! this crate's unit tests and by dependents that enable the `testing`
//! feature.
//!
//! ## Submodules
//!
//! - `mocks` - [`MockSigner`] and [`MockMessenger`]
//! - `assertions` - Balance and status assertions

pub mod assertions;
pub mod mocks;

pub use assertions::*;
pub use mocks::*;

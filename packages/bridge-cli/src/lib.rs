//! xdomain-bridge: command-line front end for `crossdomain-rs`
//!
//! The binary lives in `main.rs`; configuration loading and console output
//! are exposed here so they can be tested without a live chain.

pub mod config;
pub mod report;
pub mod shutdown;

pub use config::{credential_from_env, ChainConfig, Config, FlowConfig};

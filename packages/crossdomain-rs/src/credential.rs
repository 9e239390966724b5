//! Signing credentials
//!
//! A credential is either a BIP-39 mnemonic with an account index (derived on
//! `m/44'/60'/0'/0/{index}`) or a raw secp256k1 private key in hex. Both L1
//! and L2 signers are built from the same credential, so the account address
//! is identical on the two chains.

use std::fmt;

use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};

use crate::error::BridgeError;
use crate::redact::Redacted;

/// Secret material used to derive the bridge account
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// BIP-39 phrase plus account index
    Mnemonic { phrase: Redacted<String>, index: u32 },
    /// Hex private key, with or without `0x`
    PrivateKey(Redacted<String>),
}

impl Credential {
    pub fn mnemonic(phrase: impl Into<String>, index: u32) -> Self {
        Credential::Mnemonic {
            phrase: Redacted(phrase.into()),
            index,
        }
    }

    pub fn private_key(key: impl Into<String>) -> Self {
        Credential::PrivateKey(Redacted(key.into()))
    }

    /// Short label safe for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Mnemonic { .. } => "mnemonic",
            Credential::PrivateKey(_) => "private_key",
        }
    }

    /// Decode into a local signing key
    ///
    /// Error messages never include the secret itself.
    pub fn to_local_signer(&self) -> Result<PrivateKeySigner, BridgeError> {
        match self {
            Credential::Mnemonic { phrase, index } => {
                let normalized = normalize_phrase(phrase.expose());
                bip39::Mnemonic::parse_normalized(&normalized).map_err(|e| {
                    BridgeError::Credential(format!("invalid mnemonic: {}", e))
                })?;

                MnemonicBuilder::<English>::default()
                    .phrase(normalized)
                    .index(*index)
                    .map_err(|e| {
                        BridgeError::Credential(format!("invalid derivation index {}: {}", index, e))
                    })?
                    .build()
                    .map_err(|e| BridgeError::Credential(format!("key derivation failed: {}", e)))
            }
            Credential::PrivateKey(key) => {
                let trimmed = key.expose().trim();
                let hex_key = trimmed.strip_prefix("0x").unwrap_or(trimmed);
                if hex_key.len() != 64 {
                    return Err(BridgeError::Credential(format!(
                        "private key must be 32 bytes of hex, got {} characters",
                        hex_key.len()
                    )));
                }
                hex_key
                    .parse::<PrivateKeySigner>()
                    .map_err(|_| BridgeError::Credential("private key is not valid hex".to_string()))
            }
        }
    }
}

fn normalize_phrase(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Mnemonic { phrase, index } => f
                .debug_struct("Mnemonic")
                .field("phrase", phrase)
                .field("index", index)
                .finish(),
            Credential::PrivateKey(key) => f.debug_tuple("PrivateKey").field(key).finish(),
        }
    }
}

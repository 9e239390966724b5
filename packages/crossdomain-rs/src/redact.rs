//! Secret redaction for credentials in logs and debug output.
//!
//! Wrap mnemonics and private keys in [`Redacted`] before they reach a
//! `tracing` field, an error message or a `Debug` impl. The wrapped value is
//! never exposed through `Debug`, `Display` or `Serialize`; all of them
//! print `"<redacted>"`.

use std::fmt::{self, Debug, Display};

/// Wrapper that hides its inner value when formatted or serialized.
///
/// # Example
///
/// ```ignore
/// use crossdomain_rs::redact::Redacted;
///
/// let phrase = "test test test ...";
/// tracing::info!(mnemonic = %Redacted(phrase), "Resolving signers");
/// // Logs: mnemonic = <redacted>
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    /// Access the secret. Callers must not log the result.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}

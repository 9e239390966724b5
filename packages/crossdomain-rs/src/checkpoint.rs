//! Resume checkpoints
//!
//! A single JSON file recording the in-flight transfer, its stage and the
//! last observed status. Writes go to a sibling temp file that is renamed
//! over the target, so a crash never leaves a half-written checkpoint.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BridgeError;
use crate::types::{BalanceSnapshot, MessageStatus, TransferHandle, TransferStage};

/// Persisted state of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub handle: TransferHandle,
    pub stage: TransferStage,
    #[serde(default)]
    pub last_status: Option<MessageStatus>,
    /// Balances taken before submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<BalanceSnapshot>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        handle: TransferHandle,
        stage: TransferStage,
        last_status: Option<MessageStatus>,
        before: Option<BalanceSnapshot>,
    ) -> Self {
        Self {
            handle,
            stage,
            last_status,
            before,
            updated_at: Utc::now(),
        }
    }
}

/// File-backed checkpoint storage
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write the checkpoint, replacing any previous one
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), BridgeError> {
        let json = serde_json::to_vec_pretty(checkpoint)?;
        let temp = self.temp_path();

        fs::write(&temp, json).map_err(|e| {
            BridgeError::Checkpoint(format!("write {}: {}", temp.display(), e))
        })?;
        fs::rename(&temp, &self.path).map_err(|e| {
            BridgeError::Checkpoint(format!("rename to {}: {}", self.path.display(), e))
        })?;

        debug!(
            path = %self.path.display(),
            stage = %checkpoint.stage,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Read the checkpoint; `None` when there is none
    pub fn load(&self) -> Result<Option<Checkpoint>, BridgeError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BridgeError::Checkpoint(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Remove the checkpoint; no-op if absent
    pub fn clear(&self) -> Result<(), BridgeError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Checkpoint(format!(
                "remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

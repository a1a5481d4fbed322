//! Core traits and error types for the harvest pipelines.
//!
//! - Ledger records via [`LedgerEntry`]
//! - Pipeline stages via [`HarvestSource`]
//! - Standardized error handling via [`HarvestError`] and [`LedgerError`]

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::path::PathBuf;
use thiserror::Error;

use crate::model::{MailEntry, PhotoEntry};
use crate::traits::{MailError, Status, StorageError};

// ============================================================================
// Ledger Entry Trait
// ============================================================================

/// A record that can be kept in a [`Ledger`](crate::harvest::Ledger).
///
/// Every entry carries a dedup key that is unique within its ledger; the
/// ledger document is kept sorted by that key.
pub trait LedgerEntry: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Key: Ord + Clone + Display + Debug + Send + Sync;

    fn key(&self) -> Self::Key;
}

impl LedgerEntry for MailEntry {
    type Key = u32;

    fn key(&self) -> u32 {
        self.id
    }
}

impl LedgerEntry for PhotoEntry {
    type Key = String;

    fn key(&self) -> String {
        self.filename.clone()
    }
}

// ============================================================================
// Pipeline Trait
// ============================================================================

/// One side of the harvest: discovers work items and turns each into a
/// ledger entry.
///
/// The [`HarvestPipeline`](crate::harvest::HarvestPipeline) does the rest:
/// it diffs discovered keys against the ledger, paces the pending items and
/// persists the results.
#[async_trait]
pub trait HarvestSource: Send {
    type Entry: LedgerEntry;

    /// Short name used in logs, e.g. `"mail"`.
    fn stage_name(&self) -> &'static str;

    /// Plural noun for the work items, e.g. `"email messages"`.
    fn item_noun(&self) -> &'static str;

    /// Lists every candidate key currently available.
    async fn discover(&mut self) -> Result<BTreeSet<<Self::Entry as LedgerEntry>::Key>, HarvestError>;

    /// Performs the work for one key.
    ///
    /// `Ok(None)` means the item failed in a way the source has already
    /// logged and isolated; it stays pending for the next run.
    ///
    /// # Errors
    ///
    /// Any `Err` aborts the whole harvest.
    async fn process(
        &mut self,
        key: &<Self::Entry as LedgerEntry>::Key,
    ) -> Result<Option<Self::Entry>, HarvestError>;
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while reading or writing a ledger document.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Cannot access ledger '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that abort a harvest run.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The server answered a command with something other than OK
    #[error("{command} returned {status}, expected OK")]
    ProtocolViolation {
        command: &'static str,
        status: Status,
    },

    /// Raw message bytes could not be parsed as MIME
    #[error("Message {id} could not be parsed")]
    MalformedMessage { id: u32 },

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A blocking ledger task panicked or was cancelled
    #[error("Ledger task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Filesystem error with the associated path
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl HarvestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Turns a non-OK protocol status into a [`HarvestError::ProtocolViolation`].
pub fn ensure_ok(command: &'static str, status: Status) -> Result<(), HarvestError> {
    match status {
        Status::Ok => Ok(()),
        status => Err(HarvestError::ProtocolViolation { command, status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_ok() {
        assert!(ensure_ok("SEARCH", Status::Ok).is_ok());

        let err = ensure_ok("FETCH", Status::No).unwrap_err();
        assert!(matches!(
            err,
            HarvestError::ProtocolViolation {
                command: "FETCH",
                status: Status::No
            }
        ));
        assert_eq!(err.to_string(), "FETCH returned NO, expected OK");
    }

    #[test]
    fn test_entry_keys() {
        let mail = MailEntry::new(42);
        assert_eq!(mail.key(), 42);

        let photo = PhotoEntry {
            filename: "IMG_0001.JPG".to_string(),
            size: "1.0KiB".to_string(),
            created: 0.0,
            processed: crate::model::now(),
        };
        assert_eq!(photo.key(), "IMG_0001.JPG");
    }
}

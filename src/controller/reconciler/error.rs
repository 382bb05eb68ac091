//! # Reconciler Errors

use crate::provider::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Unexpected store-side error while reading or writing
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Another writer created or changed the secret between our read and write
    #[error("secret was modified concurrently (check-and-set version {cas} no longer current)")]
    Conflict { cas: u64 },

    /// Write succeeded but the secret was not there on re-read
    #[error("secret missing on re-read after write")]
    MissingAfterWrite,

    /// Write succeeded but the re-read bundle lacks required keys
    #[error("secret version {version} incomplete on re-read, missing {missing:?}")]
    IncompleteAfterWrite {
        version: u64,
        missing: Vec<&'static str>,
    },

    /// Desired bundle is malformed
    #[error("invalid secret bundle: {0}")]
    InvalidBundle(String),

    #[error("reconciliation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("reconciliation gave up after {attempts} attempt(s), last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ReconcileError {
    /// Error class used for metrics labels
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Store(StoreError::Network(_) | StoreError::Unavailable { .. }) => {
                "store_unavailable"
            }
            ReconcileError::Store(_) => "other_store_error",
            ReconcileError::Conflict { .. } => "conflict",
            ReconcileError::MissingAfterWrite | ReconcileError::IncompleteAfterWrite { .. } => {
                "unconfirmed_write"
            }
            ReconcileError::InvalidBundle(_) => "unexpected_error",
            ReconcileError::Cancelled { .. } => "cancelled",
            ReconcileError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

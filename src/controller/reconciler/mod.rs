//! # Reconciler
//!
//! Ensures the JWT secret bundle exists in the store, writing it at most once
//! per Creating cycle and never rewriting a complete bundle.

mod error;
mod reconcile;
mod types;

pub use error::ReconcileError;
pub use reconcile::{ReconcileReport, Reconciler, SecretTarget};
pub use types::{
    is_complete, missing_keys, scrub_data, ReconcileOutcome, ReconcileState, SecretBundle,
    REQUIRED_KEYS,
};

//! # Types
//!
//! Core types for the reconciler.

use crate::constants::{INTERNAL_API_KEY, KEY_INTERNAL_API_KEY, KEY_ISSUER, KEY_SECRET};
use crate::controller::reconciler::ReconcileError;
use crate::provider::SecretData;
use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Keys every written bundle must carry, non-null
pub const REQUIRED_KEYS: [&str; 3] = [KEY_SECRET, KEY_ISSUER, KEY_INTERNAL_API_KEY];

/// Wipe every string in `data`, nested values included
pub fn scrub_data(data: &mut SecretData) {
    data.values_mut().for_each(scrub_value);
}

fn scrub_value(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(scrub_value),
        Value::Object(map) => map.values_mut().for_each(scrub_value),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// The three-field secret record written to the store
///
/// Built from environment-supplied values; the internal API key is fixed.
/// Secret material is wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretBundle {
    secret: String,
    issuer: String,
    internal_api_key: String,
}

impl std::fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBundle")
            .field("secret", &"***")
            .field("issuer", &self.issuer)
            .field("internal_api_key", &"***")
            .finish()
    }
}

impl SecretBundle {
    /// Bundle with the fixed internal API key
    ///
    /// # Errors
    /// [`ReconcileError::InvalidBundle`] if `secret` or `issuer` is blank.
    pub fn new(
        secret: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Result<Self, ReconcileError> {
        let secret = secret.into();
        let issuer = issuer.into();
        if secret.trim().is_empty() {
            return Err(ReconcileError::InvalidBundle(format!("'{KEY_SECRET}' is empty")));
        }
        if issuer.trim().is_empty() {
            return Err(ReconcileError::InvalidBundle(format!("'{KEY_ISSUER}' is empty")));
        }
        Ok(Self {
            secret,
            issuer,
            internal_api_key: INTERNAL_API_KEY.to_string(),
        })
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Payload written to the store
    ///
    /// The returned map holds plain copies of the secret values and is not
    /// wiped on drop; pass it to [`scrub_data`] once it has been written.
    #[must_use]
    pub fn to_data(&self) -> SecretData {
        let mut data = SecretData::new();
        data.insert(KEY_SECRET.to_string(), Value::String(self.secret.clone()));
        data.insert(KEY_ISSUER.to_string(), Value::String(self.issuer.clone()));
        data.insert(
            KEY_INTERNAL_API_KEY.to_string(),
            Value::String(self.internal_api_key.clone()),
        );
        data
    }

    /// Whether `data` holds exactly the values of this bundle
    #[must_use]
    pub fn matches(&self, data: &SecretData) -> bool {
        let has =
            |key: &str, expected: &str| data.get(key).and_then(Value::as_str) == Some(expected);
        has(KEY_SECRET, &self.secret)
            && has(KEY_ISSUER, &self.issuer)
            && has(KEY_INTERNAL_API_KEY, &self.internal_api_key)
    }
}

/// Required keys absent or `null` in `data`
#[must_use]
pub fn missing_keys(data: &SecretData) -> Vec<&'static str> {
    REQUIRED_KEYS
        .into_iter()
        .filter(|key| data.get(*key).is_none_or(Value::is_null))
        .collect()
}

/// All required keys present and non-null
#[must_use]
pub fn is_complete(data: &SecretData) -> bool {
    missing_keys(data).is_empty()
}

/// Reconciler state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Reading the secret
    Checking,
    /// Writing the desired bundle guarded by `cas`, then re-reading it
    Creating { cas: u64 },
    /// Bundle confirmed present
    Done,
}

impl std::fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileState::Checking => f.write_str("checking"),
            ReconcileState::Creating { .. } => f.write_str("creating"),
            ReconcileState::Done => f.write_str("done"),
        }
    }
}

/// Result of one reconcile attempt, or of the whole loop
///
/// The loop only ever returns `AlreadyPresent`, `Created` or `FatalError`.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Complete bundle found; nothing written
    AlreadyPresent,
    /// Bundle written and confirmed at `version`
    Created { version: u64 },
    /// Attempt failed; retry after backoff
    RetryableError(ReconcileError),
    /// Loop stopped without confirming the bundle
    FatalError(ReconcileError),
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::AlreadyPresent | ReconcileOutcome::Created { .. }
        )
    }

    /// Metric/log label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::AlreadyPresent => "already_present",
            ReconcileOutcome::Created { .. } => "created",
            ReconcileOutcome::RetryableError(_) => "retryable_error",
            ReconcileOutcome::FatalError(_) => "fatal_error",
        }
    }
}

//! # Reconcile
//!
//! The Checking → Creating → Done state machine.
//!
//! Each attempt reads the secret. A complete bundle ends the loop untouched.
//! A missing secret is written with check-and-set version 0 (an incomplete or
//! soft-deleted one with the version that was read) and then re-read to
//! confirm. Anything else is logged and retried from Checking after the
//! fixed backoff.

use super::types::{missing_keys, scrub_data, ReconcileOutcome, ReconcileState, SecretBundle};
use super::ReconcileError;
use crate::controller::backoff::{until_cancelled, RetryPolicy, RetryStop};
use crate::observability::metrics;
use crate::provider::{SecretStore, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

/// Where the bundle lives in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretTarget {
    pub mount: String,
    pub path: String,
}

impl Default for SecretTarget {
    fn default() -> Self {
        Self {
            mount: crate::constants::SECRET_MOUNT.to_string(),
            path: crate::constants::SECRET_PATH.to_string(),
        }
    }
}

impl std::fmt::Display for SecretTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.mount, self.path)
    }
}

/// Final result of a reconcile loop
#[derive(Debug)]
pub struct ReconcileReport {
    /// `AlreadyPresent`, `Created` or `FatalError`
    pub outcome: ReconcileOutcome,
    pub attempts: u32,
}

/// Ensures the desired [`SecretBundle`] exists at a [`SecretTarget`]
#[derive(Debug)]
pub struct Reconciler {
    target: SecretTarget,
    desired: SecretBundle,
    policy: RetryPolicy,
    span: Span,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        target: SecretTarget,
        desired: SecretBundle,
        policy: RetryPolicy,
        span: Span,
    ) -> Self {
        Self {
            target,
            desired,
            policy,
            span,
        }
    }

    #[must_use]
    pub fn target(&self) -> &SecretTarget {
        &self.target
    }

    /// Run attempts until the bundle is confirmed, the invocation is
    /// cancelled, or the attempt cap is reached.
    pub async fn reconcile<S>(&self, store: &S, cancel: &CancellationToken) -> ReconcileReport
    where
        S: SecretStore + ?Sized,
    {
        self.reconcile_loop(store, cancel)
            .instrument(self.span.clone())
            .await
    }

    async fn reconcile_loop<S>(&self, store: &S, cancel: &CancellationToken) -> ReconcileReport
    where
        S: SecretStore + ?Sized,
    {
        let mut backoff = self.policy.backoff();

        loop {
            backoff.record_attempt();
            metrics::increment_reconcile_attempts();

            let Some(outcome) = until_cancelled(cancel, self.attempt(store)).await else {
                let attempts = backoff.attempts();
                return self.fatal(ReconcileError::Cancelled { attempts }, attempts);
            };

            let err = match outcome {
                ReconcileOutcome::RetryableError(err) => err,
                terminal => {
                    metrics::increment_reconcile_outcome(terminal.as_str());
                    return ReconcileReport {
                        outcome: terminal,
                        attempts: backoff.attempts(),
                    };
                }
            };

            if !backoff.is_exhausted() {
                info!(
                    attempt = backoff.attempts(),
                    error.kind = err.kind(),
                    "Retrying in {} seconds...",
                    backoff.next_backoff().as_secs()
                );
            }

            match backoff.wait(cancel).await {
                Ok(()) => {}
                Err(RetryStop::Cancelled { attempts }) => {
                    return self.fatal(ReconcileError::Cancelled { attempts }, attempts);
                }
                Err(RetryStop::Exhausted { attempts }) => {
                    return self.fatal(
                        ReconcileError::RetriesExhausted {
                            attempts,
                            last_error: err.to_string(),
                        },
                        attempts,
                    );
                }
            }
        }
    }

    fn fatal(&self, err: ReconcileError, attempts: u32) -> ReconcileReport {
        error!(kv.location = %self.target, error = %err, "Secret reconciliation stopped");
        let outcome = ReconcileOutcome::FatalError(err);
        metrics::increment_reconcile_outcome(outcome.as_str());
        ReconcileReport { outcome, attempts }
    }

    /// One pass through the state machine, starting at Checking
    pub async fn attempt<S>(&self, store: &S) -> ReconcileOutcome
    where
        S: SecretStore + ?Sized,
    {
        debug!(state = %ReconcileState::Checking, kv.location = %self.target, "Reading secret");

        let existing = match store.read_secret(&self.target.mount, &self.target.path).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "Error reading secrets: {}", e);
                return ReconcileOutcome::RetryableError(e.into());
            }
        };

        let cas = match existing {
            Some(secret) => {
                let missing = missing_keys(&secret.data);
                if missing.is_empty() {
                    if !self.desired.matches(&secret.data) {
                        debug!(
                            version = secret.version,
                            "Stored bundle differs from configured values, leaving it untouched"
                        );
                    }
                    info!(version = secret.version, "Secrets already present.");
                    return ReconcileOutcome::AlreadyPresent;
                }
                warn!(
                    version = secret.version,
                    missing = ?missing,
                    "Secret exists but is incomplete, replacing version {}",
                    secret.version
                );
                secret.version
            }
            None => {
                info!(kv.location = %self.target, "Secret not found, creating it");
                0
            }
        };

        debug!(state = %ReconcileState::Creating { cas }, cas, "Writing secret");
        match self.create(store, cas).await {
            Ok(version) => {
                debug!(state = %ReconcileState::Done, version, "Secret confirmed");
                info!(version, "Secrets written successfully.");
                ReconcileOutcome::Created { version }
            }
            Err(e @ ReconcileError::Conflict { .. }) => {
                info!(error = %e, "Secret changed underneath us, re-checking");
                ReconcileOutcome::RetryableError(e)
            }
            Err(e) => {
                error!(error = %e, "Unexpected error: {}", e);
                ReconcileOutcome::RetryableError(e)
            }
        }
    }

    /// Creating: guarded write of the desired bundle, then re-read
    async fn create<S>(&self, store: &S, cas: u64) -> Result<u64, ReconcileError>
    where
        S: SecretStore + ?Sized,
    {
        let mut data = self.desired.to_data();
        let written = store
            .write_secret(&self.target.mount, &self.target.path, &data, Some(cas))
            .await;
        scrub_data(&mut data);
        written.map_err(|e| match e {
            StoreError::CasMismatch(_) => ReconcileError::Conflict { cas },
            other => ReconcileError::Store(other),
        })?;
        metrics::increment_secret_writes();

        let mut reread = store
            .read_secret(&self.target.mount, &self.target.path)
            .await?
            .ok_or(ReconcileError::MissingAfterWrite)?;

        let missing = missing_keys(&reread.data);
        scrub_data(&mut reread.data);
        if missing.is_empty() {
            Ok(reread.version)
        } else {
            Err(ReconcileError::IncompleteAfterWrite {
                version: reread.version,
                missing,
            })
        }
    }
}

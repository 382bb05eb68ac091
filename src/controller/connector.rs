//! # Connector
//!
//! Establishes an authenticated client to the secrets store, retrying with a
//! fixed backoff until it succeeds, the attempt cap is hit, or the
//! invocation is cancelled.
//!
//! An empty or malformed address fails each attempt immediately and is
//! retried like an unreachable store, unless fail-fast is configured.

use crate::controller::backoff::{until_cancelled, RetryPolicy, RetryStop};
use crate::observability::metrics;
use crate::provider::{StoreConnector, StoreEndpoint, StoreError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument, Span};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("store connection cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("store connection gave up after {attempts} attempt(s), last error: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("store endpoint is invalid: {0}")]
    InvalidEndpoint(#[source] StoreError),
}

/// A connected client and the number of attempts it took
#[derive(Debug)]
pub struct Connected<S> {
    pub store: S,
    pub attempts: u32,
}

/// Retrying wrapper around a [`StoreConnector`]
///
/// Log lines are emitted inside the injected `span`, so the host decides
/// which invocation they belong to.
#[derive(Debug)]
pub struct Connector<'a, C> {
    connector: &'a C,
    policy: RetryPolicy,
    fail_fast_on_invalid_endpoint: bool,
    span: Span,
}

impl<'a, C: StoreConnector> Connector<'a, C> {
    #[must_use]
    pub fn new(connector: &'a C, policy: RetryPolicy, span: Span) -> Self {
        Self {
            connector,
            policy,
            fail_fast_on_invalid_endpoint: false,
            span,
        }
    }

    #[must_use]
    pub fn fail_fast_on_invalid_endpoint(mut self, enabled: bool) -> Self {
        self.fail_fast_on_invalid_endpoint = enabled;
        self
    }

    /// Connect, retrying on any error
    ///
    /// # Errors
    /// Only when cancelled, when the attempt cap is reached, or (with
    /// fail-fast enabled) when the endpoint is invalid.
    pub async fn connect(
        &self,
        endpoint: &StoreEndpoint,
        cancel: &CancellationToken,
    ) -> Result<Connected<C::Store>, ConnectError> {
        self.connect_loop(endpoint, cancel)
            .instrument(self.span.clone())
            .await
    }

    async fn connect_loop(
        &self,
        endpoint: &StoreEndpoint,
        cancel: &CancellationToken,
    ) -> Result<Connected<C::Store>, ConnectError> {
        let mut backoff = self.policy.backoff();

        loop {
            backoff.record_attempt();
            metrics::increment_connect_attempts();

            let Some(result) = until_cancelled(cancel, self.connector.try_connect(endpoint)).await
            else {
                return Err(ConnectError::Cancelled {
                    attempts: backoff.attempts(),
                });
            };

            let err = match result {
                Ok(store) => {
                    info!(
                        vault.address = %endpoint.address,
                        attempts = backoff.attempts(),
                        "Vault client initialized successfully."
                    );
                    return Ok(Connected {
                        store,
                        attempts: backoff.attempts(),
                    });
                }
                Err(err) => err,
            };

            metrics::increment_connect_failures();

            if err.is_invalid_endpoint() && self.fail_fast_on_invalid_endpoint {
                error!(error = %err, "Vault endpoint is invalid, not retrying (fail-fast enabled)");
                return Err(ConnectError::InvalidEndpoint(err));
            }

            if backoff.is_exhausted() {
                warn!(
                    attempt = backoff.attempts(),
                    error = %err,
                    "Vault is not available, giving up: {}",
                    err
                );
            } else {
                warn!(
                    attempt = backoff.attempts(),
                    error = %err,
                    "Vault is not available yet. Retrying in {} seconds... {}",
                    backoff.next_backoff().as_secs(),
                    err
                );
            }

            match backoff.wait(cancel).await {
                Ok(()) => {}
                Err(RetryStop::Cancelled { attempts }) => {
                    return Err(ConnectError::Cancelled { attempts })
                }
                Err(RetryStop::Exhausted { attempts }) => {
                    return Err(ConnectError::Exhausted {
                        attempts,
                        last_error: err.to_string(),
                    })
                }
            }
        }
    }
}

//! # Invocation
//!
//! One triggered run of the initializer: resolve the endpoint, connect,
//! reconcile. Invocations within a process are serialized; a trigger that
//! arrives while another invocation is running is rejected as busy.

use crate::config::InitializerConfig;
use crate::controller::connector::{ConnectError, Connector};
use crate::controller::reconciler::{ReconcileOutcome, Reconciler};
use crate::observability::metrics;
use crate::provider::{StoreConnector, StoreEndpoint};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

/// Why an invocation was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerSource {
    /// Process start
    Startup,
    /// Periodic timer
    Timer,
    /// `POST /api/initialize`
    Http,
    /// `vault-initializer once`
    Cli,
}

impl TriggerSource {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Startup => "startup",
            TriggerSource::Timer => "timer",
            TriggerSource::Http => "http",
            TriggerSource::Cli => "cli",
        }
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("an initialization is already in progress")]
    Busy,
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    AlreadyPresent,
    Created { version: u64 },
    Failed { reason: String, timed_out: bool },
}

impl InvocationOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, InvocationOutcome::Failed { .. })
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationOutcome::AlreadyPresent => "already_present",
            InvocationOutcome::Created { .. } => "created",
            InvocationOutcome::Failed { timed_out: true, .. } => "timed_out",
            InvocationOutcome::Failed { .. } => "failed",
        }
    }
}

/// Summary of a finished invocation
#[derive(Debug, Clone, Serialize)]
pub struct InvocationReport {
    pub id: u64,
    pub trigger: TriggerSource,
    pub outcome: InvocationOutcome,
    pub connect_attempts: u32,
    pub reconcile_attempts: u32,
    pub elapsed_ms: u64,
}

/// Runs invocations against stores produced by `C`
#[derive(Debug)]
pub struct Initializer<C> {
    connector: C,
    config: Arc<InitializerConfig>,
    in_flight: AsyncMutex<()>,
    next_id: AtomicU64,
}

impl<C: StoreConnector> Initializer<C> {
    #[must_use]
    pub fn new(connector: C, config: Arc<InitializerConfig>) -> Self {
        Self {
            connector,
            config,
            in_flight: AsyncMutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    #[must_use]
    pub fn config(&self) -> &InitializerConfig {
        &self.config
    }

    /// Whether an invocation is currently running
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Configured endpoint, with the address replaced by a non-blank override
    #[must_use]
    pub fn resolve_endpoint(&self, address_override: Option<&str>) -> StoreEndpoint {
        match address_override.map(str::trim).filter(|a| !a.is_empty()) {
            Some(address) => self.config.endpoint.with_address(address),
            None => self.config.endpoint.clone(),
        }
    }

    /// Run one invocation to completion
    ///
    /// `shutdown` cancels the invocation; the configured invocation timeout
    /// cancels it as well and is reported as `timed_out`.
    ///
    /// # Errors
    /// [`InvocationError::Busy`] if another invocation holds the lock.
    pub async fn run(
        &self,
        trigger: TriggerSource,
        address_override: Option<&str>,
        shutdown: &CancellationToken,
    ) -> Result<InvocationReport, InvocationError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            metrics::increment_trigger_rejections(trigger.as_str());
            return Err(InvocationError::Busy);
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let endpoint = self.resolve_endpoint(address_override);
        let span = info_span!(
            "invocation",
            invocation.id = id,
            trigger = trigger.as_str(),
            vault.address = %endpoint.address
        );
        span.in_scope(|| {
            info!(
                "Vault initializer triggered ({}) at: {}",
                trigger.as_str(),
                chrono::Utc::now().to_rfc3339()
            );
        });
        metrics::increment_invocations(trigger.as_str());

        let start = Instant::now();
        let cancel = shutdown.child_token();
        let (outcome, connect_attempts, reconcile_attempts) = self
            .run_with_timeout(&endpoint, &cancel, span.clone())
            .await;

        let elapsed = start.elapsed();
        metrics::observe_invocation(outcome.as_str(), elapsed.as_secs_f64());
        span.in_scope(|| {
            if outcome.is_success() {
                info!(
                    outcome = outcome.as_str(),
                    elapsed_ms = millis(elapsed),
                    "Invocation finished"
                );
            } else {
                warn!(
                    outcome = ?outcome,
                    elapsed_ms = millis(elapsed),
                    "Invocation did not complete"
                );
            }
        });

        Ok(InvocationReport {
            id,
            trigger,
            outcome,
            connect_attempts,
            reconcile_attempts,
            elapsed_ms: millis(elapsed),
        })
    }

    async fn run_with_timeout(
        &self,
        endpoint: &StoreEndpoint,
        cancel: &CancellationToken,
        span: tracing::Span,
    ) -> (InvocationOutcome, u32, u32) {
        let work = self.execute(endpoint, cancel, span);
        let Some(timeout) = self.config.invocation_timeout else {
            return work.await;
        };

        tokio::pin!(work);
        tokio::select! {
            result = &mut work => result,
            () = tokio::time::sleep(timeout) => {
                cancel.cancel();
                let (outcome, connect_attempts, reconcile_attempts) = work.await;
                let outcome = match outcome {
                    InvocationOutcome::Failed { reason, .. } => InvocationOutcome::Failed {
                        reason: format!("timed out after {}s: {reason}", timeout.as_secs()),
                        timed_out: true,
                    },
                    finished => finished,
                };
                (outcome, connect_attempts, reconcile_attempts)
            }
        }
    }

    /// Connector then Reconciler
    async fn execute(
        &self,
        endpoint: &StoreEndpoint,
        cancel: &CancellationToken,
        span: tracing::Span,
    ) -> (InvocationOutcome, u32, u32) {
        let connector = Connector::new(&self.connector, self.config.retry, span.clone())
            .fail_fast_on_invalid_endpoint(self.config.fail_fast_on_invalid_endpoint);

        let connected = match connector.connect(endpoint, cancel).await {
            Ok(connected) => connected,
            Err(err) => {
                let attempts = match &err {
                    ConnectError::Cancelled { attempts }
                    | ConnectError::Exhausted { attempts, .. } => *attempts,
                    ConnectError::InvalidEndpoint(_) => 1,
                };
                return (failed(&err), attempts, 0);
            }
        };

        let reconciler = Reconciler::new(
            self.config.target.clone(),
            self.config.desired.clone(),
            self.config.retry,
            span,
        );
        let report = reconciler.reconcile(&connected.store, cancel).await;

        let outcome = match report.outcome {
            ReconcileOutcome::AlreadyPresent => InvocationOutcome::AlreadyPresent,
            ReconcileOutcome::Created { version } => InvocationOutcome::Created { version },
            ReconcileOutcome::RetryableError(err) | ReconcileOutcome::FatalError(err) => {
                failed(&err)
            }
        };
        (outcome, connected.attempts, report.attempts)
    }
}

fn failed(err: &dyn std::error::Error) -> InvocationOutcome {
    InvocationOutcome::Failed {
        reason: err.to_string(),
        timed_out: false,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

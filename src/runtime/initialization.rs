//! # Initialization
//!
//! Runtime startup: rustls setup, tracing, metrics, HTTP server, the startup
//! invocation, then the timer loop.

use crate::config::InitializerConfig;
use crate::constants::DEFAULT_SERVER_STARTUP_TIMEOUT_SECS;
use crate::controller::invocation::{
    Initializer, InvocationError, InvocationReport, TriggerSource,
};
use crate::observability;
use crate::provider::vault::VaultConnector;
use crate::provider::StoreConnector;
use crate::runtime::{scheduler, signals};
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SERVER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configure the rustls crypto provider. Must run before any TLS client is built.
pub fn install_crypto_provider() {
    // Err means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Process-level setup shared by every command
///
/// # Errors
/// Configuration or logging setup failures.
pub fn bootstrap() -> Result<InitializerConfig> {
    install_crypto_provider();

    let config = InitializerConfig::from_env().context("Failed to load configuration")?;
    observability::logging::init_logging(config.log_format)?;
    observability::metrics::register_metrics().context("Failed to register metrics")?;

    info!(
        "Starting vault-initializer v{} (target {}, retry every {}s)",
        env!("CARGO_PKG_VERSION"),
        config.target,
        config.retry.interval().as_secs()
    );
    Ok(config)
}

/// Build the initializer for a loaded configuration
#[must_use]
pub fn build_initializer(config: InitializerConfig) -> Arc<Initializer<VaultConnector>> {
    let connector = VaultConnector::new(config.tls.clone(), config.request_timeout);
    Arc::new(Initializer::new(connector, Arc::new(config)))
}

/// Run a single invocation and return its report (`once` command)
///
/// # Errors
/// Returns an error if another invocation is already running.
pub async fn run_once(
    config: InitializerConfig,
    address_override: Option<&str>,
) -> Result<InvocationReport> {
    let shutdown = CancellationToken::new();
    let signal_handle = signals::spawn_shutdown_listener(shutdown.clone());

    let initializer = build_initializer(config);
    let report = initializer
        .run(TriggerSource::Cli, address_override, &shutdown)
        .await
        .context("Invocation rejected")?;

    signal_handle.abort();
    Ok(report)
}

/// Serve until SIGINT/SIGTERM: HTTP server, startup invocation, timer loop
///
/// # Errors
/// Returns an error if the HTTP server fails to start or exits with an error.
pub async fn serve(config: InitializerConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    signals::spawn_shutdown_listener(shutdown.clone());

    let port = config.http_port;
    let schedule_interval = config.schedule_interval;
    let initializer = build_initializer(config);
    let server_state = Arc::new(ServerState::new(Arc::clone(&initializer), shutdown.clone()));

    let server_handle = {
        let state = Arc::clone(&server_state);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = start_server(port, state, shutdown.clone()).await;
            if let Err(e) = &result {
                error!("HTTP server error: {}", e);
                shutdown.cancel();
            }
            result
        })
    };

    wait_for_server_ready(&server_state, &server_handle).await?;

    startup_invocation(&initializer, &shutdown).await;
    server_state.is_ready.store(true, Ordering::Relaxed);
    info!("Startup complete, scheduling runs every {}s", schedule_interval.as_secs());

    scheduler::run_scheduler(initializer, schedule_interval, shutdown.clone()).await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    server_handle
        .await
        .context("HTTP server task panicked")?
        .context("HTTP server failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Run the startup invocation against the configured address
///
/// Skipped when no address is configured, leaving the HTTP trigger free to
/// supply one. Returns the report when the invocation ran.
pub async fn startup_invocation<C: StoreConnector>(
    initializer: &Initializer<C>,
    shutdown: &CancellationToken,
) -> Option<InvocationReport> {
    if !initializer.config().endpoint.has_address() {
        warn!(
            "Startup initialization skipped: no Vault address configured; \
             POST /api/initialize with 'vaultIp' to initialize"
        );
        return None;
    }

    match initializer.run(TriggerSource::Startup, None, shutdown).await {
        Ok(report) => {
            if !report.outcome.is_success() {
                warn!(
                    "Startup initialization did not complete ({}); the timer will retry",
                    report.outcome.as_str()
                );
            }
            Some(report)
        }
        Err(InvocationError::Busy) => {
            info!("Startup initialization skipped: an HTTP-triggered run is already in progress");
            None
        }
    }
}

/// Wait for the HTTP server to bind before proceeding
async fn wait_for_server_ready<C>(
    server_state: &Arc<ServerState<C>>,
    server_handle: &tokio::task::JoinHandle<Result<()>>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_listening.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(SERVER_POLL_INTERVAL).await;
    }
}

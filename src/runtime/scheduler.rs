//! # Scheduler
//!
//! Timer trigger. Fires every `period`, first tick one period after start.
//! A tick that lands while an invocation is still running is skipped, as is a
//! tick with no store address configured.

use crate::controller::invocation::{Initializer, InvocationError, TriggerSource};
use crate::provider::StoreConnector;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run timer invocations until `shutdown` is cancelled. Returns the number of
/// invocations that actually ran.
pub async fn run_scheduler<C: StoreConnector>(
    initializer: Arc<Initializer<C>>,
    period: Duration,
    shutdown: CancellationToken,
) -> u64 {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut runs = 0;

    info!("Scheduler started, period {}s", period.as_secs());

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !initializer.config().endpoint.has_address() {
            warn!("Scheduled run skipped: no Vault address configured");
            continue;
        }

        match initializer.run(TriggerSource::Timer, None, &shutdown).await {
            Ok(report) => {
                runs += 1;
                debug!(
                    invocation.id = report.id,
                    outcome = report.outcome.as_str(),
                    "Scheduled run finished"
                );
            }
            Err(InvocationError::Busy) => {
                info!("Scheduled run skipped: an initialization is already in progress");
            }
        }
    }

    info!("Scheduler stopped");
    runs
}

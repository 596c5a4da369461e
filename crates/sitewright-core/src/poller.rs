//! Timer-driven trigger source.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use crate::coordinator::{BuildCoordinator, TriggerSource};
use crate::shutdown::ShutdownSignal;

/// Trigger a build every `every` until `shutdown` fires.
///
/// The first tick is one full interval after the call; the startup build
/// covers time zero.
pub async fn run_poller(
    coordinator: Arc<BuildCoordinator>,
    every: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = every.as_secs(), "poller started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("polling stopped due to shutdown");
                return;
            }
            _ = ticker.tick() => {
                info!("polling for changes");
                coordinator.trigger(TriggerSource::Poll);
            }
        }
    }
}

//! Background session GC.
//!
//! Periodically asks a provider to sweep expired sessions.

use crate::traits::SessionProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Spawn a task that calls [`SessionProvider::gc`] every `every`.
///
/// The first sweep happens one full interval after spawning. Abort the
/// returned handle to stop the task.
pub fn spawn_gc_task(
    provider: Arc<dyn SessionProvider>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first immediate tick
        ticker.tick().await;

        let mut sweeps: u64 = 0;
        loop {
            ticker.tick().await;
            provider.gc().await;
            sweeps += 1;
            debug!(sweeps = sweeps, "Session GC sweep finished");
        }
    })
}

use std::sync::Arc;
use std::time::Duration;

use parley_core::negotiation::registry::SessionRegistry;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Periodically expires sessions idle for longer than `ttl`.
pub fn spawn(registry: Arc<SessionRegistry>, ttl: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let swept = registry.sweep_idle(ttl);
            debug!(
                event_name = "system.sweeper.tick",
                swept = swept.len(),
                live_sessions = registry.len(),
                "idle session sweep finished"
            );
        }
    })
}

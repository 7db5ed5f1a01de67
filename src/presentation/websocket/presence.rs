//! Periodic log of who is online on this gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::registry::ConnectionRegistry;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Log the online users once. Returns the number of connections logged.
pub fn log_online_users(registry: &ConnectionRegistry) -> usize {
    let mut total = 0;
    for (channel, users) in registry.online_users() {
        total += users.len();
        tracing::info!(channel = %channel, users = ?users, "Online users");
    }
    total
}

/// Log the online users every `period` until the task is aborted.
pub fn spawn_presence_logger(registry: Arc<ConnectionRegistry>, period: Duration) -> JoinHandle<()> {
    if period < MIN_PERIOD {
        tracing::warn!(?period, "Presence log interval too short, using one second");
    }
    let period = period.max(MIN_PERIOD);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let total = log_online_users(&registry);
            tracing::debug!(connections = total, "Presence logged");
        }
    })
}

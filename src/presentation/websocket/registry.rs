//! Connection Registry
//!
//! Per-process map of live connections: channel -> (user -> connection).
//!
//! The top-level [`DashMap`] is only touched to find or create a channel
//! entry. Each channel guards its users with its own lock; broadcasts clone
//! the handles under a read lock and write with the lock released, so a slow
//! connection never blocks joins in the same channel.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::OutboundFrame;
use crate::infrastructure::metrics;

/// The connection's writer task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// Handle to one live client connection.
///
/// Cloning is cheap; all clones address the same writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    sender: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame for the writer task.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), ConnectionClosed> {
        self.sender.send(frame).map_err(|_| ConnectionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

#[derive(Default)]
struct ChannelConnections {
    users: RwLock<HashMap<String, ConnectionHandle>>,
}

impl ChannelConnections {
    fn snapshot(&self) -> Vec<(String, ConnectionHandle)> {
        self.users
            .read()
            .iter()
            .map(|(user, handle)| (user.clone(), handle.clone()))
            .collect()
    }
}

/// Registry of local connections, shared by the ingress loops and the fan-out
/// consumers of one gateway process.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: DashMap<String, Arc<ChannelConnections>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> Option<Arc<ChannelConnections>> {
        self.channels.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn ensure_channel(&self, name: &str) -> Arc<ChannelConnections> {
        if let Some(existing) = self.channel(name) {
            return existing;
        }
        Arc::clone(self.channels.entry(name.to_string()).or_default().value())
    }

    /// Create an empty channel entry. Returns `false` if it already existed.
    pub fn add_channel(&self, name: &str) -> bool {
        if self.channels.contains_key(name) {
            return false;
        }
        let mut created = false;
        self.channels.entry(name.to_string()).or_insert_with(|| {
            created = true;
            Arc::default()
        });
        if created {
            tracing::debug!(channel = %name, "Channel added to registry");
        }
        created
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Register `handle` as the connection of `user` in `channel`.
    ///
    /// A previous connection of the same user in the channel is replaced and
    /// told to close.
    pub fn join(&self, channel: &str, user: &str, handle: ConnectionHandle) {
        let entry = self.ensure_channel(channel);
        let displaced = entry.users.write().insert(user.to_string(), handle);

        if let Some(old) = displaced {
            tracing::info!(channel = %channel, user = %user, "Replacing existing connection");
            let _ = old.send(OutboundFrame::Close);
        } else {
            tracing::info!(channel = %channel, user = %user, "User joined");
        }
        metrics::set_websocket_connections(self.connection_count());
    }

    /// Remove the user's slot, whatever connection holds it.
    pub fn leave(&self, channel: &str, user: &str) -> Option<ConnectionHandle> {
        let removed = self.channel(channel)?.users.write().remove(user);
        if removed.is_some() {
            tracing::info!(channel = %channel, user = %user, "User left");
            metrics::set_websocket_connections(self.connection_count());
        }
        removed
    }

    /// Remove the user's slot only if it still holds `connection_id`.
    ///
    /// A closing connection uses this so it never evicts its own replacement.
    pub fn release(&self, channel: &str, user: &str, connection_id: Uuid) -> bool {
        let Some(entry) = self.channel(channel) else {
            return false;
        };
        let released = {
            let mut users = entry.users.write();
            let holds = users
                .get(user)
                .is_some_and(|current| current.id() == connection_id);
            holds && users.remove(user).is_some()
        };
        if released {
            tracing::info!(channel = %channel, user = %user, "User left");
            metrics::set_websocket_connections(self.connection_count());
        }
        released
    }

    /// Call `f` for every connection of `channel`, over a snapshot taken at
    /// call time. Returns `None` when the channel is unknown.
    pub fn for_each_connection<F>(&self, channel: &str, mut f: F) -> Option<usize>
    where
        F: FnMut(&str, &ConnectionHandle),
    {
        let snapshot = self.channel(channel)?.snapshot();
        for (user, handle) in &snapshot {
            f(user, handle);
        }
        Some(snapshot.len())
    }

    pub fn lookup(&self, channel: &str, user: &str) -> Option<ConnectionHandle> {
        self.channel(channel)?.users.read().get(user).cloned()
    }

    /// Send `frame` to every connection of `channel`.
    ///
    /// Failed writes are logged and skipped. Returns `None` when the channel is
    /// unknown.
    pub fn broadcast(&self, channel: &str, frame: &OutboundFrame) -> Option<DeliveryReport> {
        let mut report = DeliveryReport::default();
        self.for_each_connection(channel, |user, handle| match handle.send(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(channel = %channel, user = %user, error = %e, "Write to client failed");
            }
        })?;

        if report.failed > 0 {
            metrics::record_fanout_failures(report.failed);
        }
        Some(report)
    }

    /// Send `frame` to every connection in every channel.
    pub fn broadcast_all(&self, frame: &OutboundFrame) -> DeliveryReport {
        let mut total = DeliveryReport::default();
        for channel in self.channel_names() {
            if let Some(report) = self.broadcast(&channel, frame) {
                total.merge(report);
            }
        }
        total
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn connection_count(&self) -> usize {
        self.channels
            .iter()
            .map(|entry| entry.value().users.read().len())
            .sum()
    }

    /// Users with a live connection, per channel.
    pub fn online_users(&self) -> Vec<(String, Vec<String>)> {
        self.channel_names()
            .into_iter()
            .filter_map(|name| {
                let entry = self.channel(&name)?;
                let mut users: Vec<String> = entry.users.read().keys().cloned().collect();
                users.sort();
                Some((name, users))
            })
            .collect()
    }
}

//! Redis Streams backend.
//!
//! Layout on the broker:
//!
//! - one stream per routing key, `{stream_prefix}{routing_key}`, entries carry
//!   the encoded payload in a single `payload` field
//! - a work queue is a consumer group named after the queue; every process
//!   binding the same name competes for entries
//! - a broadcast queue is a consumer group named `broadcast-<uuid>`, created at
//!   `$` and destroyed when the subscription shuts down or is dropped
//!
//! An entry belongs to the consumer that read it until that consumer acks it.
//! A handler's [`Ack::Retry`] leaves the entry pending and the same consumer
//! claims it back after `redelivery_delay_ms`. Entries of a consumer idle for
//! `dead_consumer_ms` are claimed by a live consumer of the group. Either way
//! an entry delivered `max_deliveries` times is acknowledged and dropped.
//! Broadcast groups whose consumers are all dead are destroyed by the next
//! subscriber of the stream.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamInfoConsumersReply, StreamInfoGroupsReply, StreamMaxlen,
    StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dispatch, Ack, BusError, BusEvent, EventHandler, MessageBus, QueueSpec, RoutingKey,
    Subscription,
};
use crate::config::{BusSettings, RedisSettings};
use crate::infrastructure::metrics;

const PAYLOAD_FIELD: &str = "payload";

/// Name prefix of the per-subscriber groups behind broadcast queues.
pub const BROADCAST_GROUP_PREFIX: &str = "broadcast-";

/// Back-off after a failed read so a dead broker does not spin the loop.
const READ_ERROR_BACKOFF_MS: u64 = 1_000;

/// Message bus on Redis Streams.
#[derive(Clone)]
pub struct RedisStreamBus {
    client: Client,
    publisher: ConnectionManager,
    settings: BusSettings,
}

impl RedisStreamBus {
    /// Connect to the broker. Fails if Redis is unreachable.
    #[instrument(skip_all, fields(url = %redis.url))]
    pub async fn connect(redis: &RedisSettings, settings: BusSettings) -> Result<Self, BusError> {
        info!("Connecting to message bus...");
        let client = Client::open(redis.url.as_str())?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        info!(prefix = %settings.stream_prefix, "Message bus connection established");
        Ok(Self {
            client,
            publisher,
            settings,
        })
    }

    pub fn stream_key(&self, routing_key: RoutingKey) -> String {
        format!("{}{}", self.settings.stream_prefix, routing_key.as_str())
    }

    /// Destroy broadcast groups left behind by subscribers that died without
    /// shutting down.
    async fn sweep_stale_broadcast_groups(
        &self,
        conn: &mut ConnectionManager,
        stream: &str,
        own_group: &str,
    ) -> Result<usize, BusError> {
        let groups: StreamInfoGroupsReply = conn.xinfo_groups(stream).await?;
        let mut destroyed = 0;

        for group in groups.groups {
            if group.name == own_group || !group.name.starts_with(BROADCAST_GROUP_PREFIX) {
                continue;
            }
            let consumers: StreamInfoConsumersReply =
                conn.xinfo_consumers(stream, &group.name).await?;
            let idle: Vec<u64> = consumers.consumers.iter().map(|c| c.idle as u64).collect();
            if !is_stale_broadcast_group(&idle, &self.settings) {
                continue;
            }

            let removed: i64 = conn.xgroup_destroy(stream, &group.name).await?;
            if removed > 0 {
                info!(stream = %stream, group = %group.name, "Removed stale broadcast group");
                destroyed += 1;
            }
        }

        Ok(destroyed)
    }
}

/// Create the consumer group, tolerating one that already exists.
async fn ensure_group(conn: &mut ConnectionManager, stream: &str, group: &str) -> Result<(), BusError> {
    let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "$").await;
    match created {
        Ok(()) => {
            debug!(stream = %stream, group = %group, "Consumer group created");
            Ok(())
        }
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
        Err(e) => Err(BusError::Subscribe(e.to_string())),
    }
}

/// Register the consumer right away so a fresh broadcast group never looks
/// abandoned to another subscriber's sweep.
async fn create_consumer(
    conn: &mut ConnectionManager,
    stream: &str,
    group: &str,
    consumer: &str,
) -> Result<(), BusError> {
    redis::cmd("XGROUP")
        .arg("CREATECONSUMER")
        .arg(stream)
        .arg(group)
        .arg(consumer)
        .query_async::<i64>(conn)
        .await
        .map(|_| ())
        .map_err(|e| BusError::Subscribe(e.to_string()))
}

async fn destroy_group(mut conn: ConnectionManager, stream: &str, group: &str) {
    let destroyed: redis::RedisResult<i64> = conn.xgroup_destroy(stream, group).await;
    match destroyed {
        Ok(_) => debug!(stream = %stream, group = %group, "Broadcast group deleted"),
        Err(e) => warn!(group = %group, error = %e, "Failed to delete broadcast group"),
    }
}

#[async_trait]
impl MessageBus for RedisStreamBus {
    async fn publish(&self, event: &BusEvent) -> Result<(), BusError> {
        let routing_key = event.routing_key();
        let payload = event.encode()?;
        let stream = self.stream_key(routing_key);

        let mut conn = self.publisher.clone();
        let added: redis::RedisResult<String> = conn
            .xadd_maxlen(
                &stream,
                StreamMaxlen::Approx(self.settings.stream_max_len),
                "*",
                &[(PAYLOAD_FIELD, payload.as_slice())],
            )
            .await;

        match added {
            Ok(id) => {
                metrics::record_bus_publish(routing_key.as_str(), "ok");
                debug!(stream = %stream, id = %id, "Event published");
                Ok(())
            }
            Err(e) => {
                metrics::record_bus_publish(routing_key.as_str(), "error");
                Err(BusError::Publish(e.to_string()))
            }
        }
    }

    async fn subscribe(
        &self,
        routing_key: RoutingKey,
        queue: QueueSpec,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, BusError> {
        let stream = self.stream_key(routing_key);
        let broadcast = queue == QueueSpec::Broadcast;
        let group = match &queue {
            QueueSpec::Broadcast => format!("{BROADCAST_GROUP_PREFIX}{}", Uuid::new_v4()),
            QueueSpec::WorkQueue(name) => name.clone(),
        };
        let name = format!("consumer-{}", Uuid::new_v4());

        // Blocking reads get a connection of their own.
        let mut conn = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        ensure_group(&mut conn, &stream, &group).await?;
        create_consumer(&mut conn, &stream, &group, &name).await?;

        if let Err(e) = self.sweep_stale_broadcast_groups(&mut conn, &stream, &group).await {
            warn!(stream = %stream, error = %e, "Stale broadcast group sweep failed");
        }

        let consumer = StreamConsumer {
            conn,
            routing_key,
            stream: stream.clone(),
            group: group.clone(),
            name,
            broadcast,
            handler,
            settings: self.settings.clone(),
            retried: HashSet::new(),
            unacked: HashSet::new(),
        };

        info!(
            routing_key = %routing_key,
            queue = %queue.label(),
            group = %consumer.group,
            "Subscribed"
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(consumer.run(stop_rx));
        let subscription = Subscription::new(routing_key, queue, stop_tx, task);

        if !broadcast {
            return Ok(subscription);
        }
        let conn = self.publisher.clone();
        Ok(subscription.with_drop_cleanup(Box::new(move || {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { destroy_group(conn, &stream, &group).await });
            }
        })))
    }
}

/// What the redelivery pass does with one pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingAction {
    /// Someone is (or may still be) working on it.
    Leave,
    /// Claim it and hand it to the handler again.
    Redeliver,
    /// Delivered too often: acknowledge and drop.
    GiveUp,
}

/// Who holds a pending entry, as seen by the consumer running the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingOwner {
    /// This consumer. `retried` is set when its handler answered `Retry`.
    Me { retried: bool },
    /// Another consumer of the group; `idle_ms` is `None` once it has left.
    Other { idle_ms: Option<u64> },
}

pub(crate) fn is_dead_consumer(idle_ms: u64, settings: &BusSettings) -> bool {
    idle_ms >= settings.dead_consumer_ms
}

/// Entries in the hands of a live consumer are never taken away from it.
pub(crate) fn pending_action(
    owner: PendingOwner,
    entry_idle_ms: u64,
    times_delivered: u64,
    settings: &BusSettings,
) -> PendingAction {
    let claimable = match owner {
        PendingOwner::Me { retried } => retried && entry_idle_ms >= settings.redelivery_delay_ms,
        PendingOwner::Other { idle_ms } => {
            idle_ms.map_or(true, |idle| is_dead_consumer(idle, settings))
                && entry_idle_ms >= settings.dead_consumer_ms
        }
    };

    if !claimable {
        PendingAction::Leave
    } else if times_delivered >= u64::from(settings.max_deliveries) {
        PendingAction::GiveUp
    } else {
        PendingAction::Redeliver
    }
}

/// A broadcast group with no live consumer can never be read again.
pub(crate) fn is_stale_broadcast_group(consumer_idle_ms: &[u64], settings: &BusSettings) -> bool {
    consumer_idle_ms
        .iter()
        .all(|&idle| is_dead_consumer(idle, settings))
}

/// One consumer in one group, driving a handler.
struct StreamConsumer {
    conn: ConnectionManager,
    routing_key: RoutingKey,
    stream: String,
    group: String,
    name: String,
    broadcast: bool,
    handler: Arc<dyn EventHandler>,
    settings: BusSettings,
    /// Entries this consumer answered `Retry` for and still owns.
    retried: HashSet<String>,
    /// Entries handled but whose XACK failed.
    unacked: HashSet<String>,
}

impl StreamConsumer {
    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        let mut last_reclaim = Instant::now();

        loop {
            let read = tokio::select! {
                biased;
                _ = &mut stop => break,
                read = self.read_new() => read,
            };

            match read {
                Ok(entries) => {
                    for entry in entries {
                        if !self.still_owned(&entry.id).await {
                            debug!(id = %entry.id, group = %self.group, "Entry claimed by another consumer, skipping");
                            continue;
                        }
                        self.process(&entry).await;
                    }
                }
                Err(e) if e.to_string().contains("NOGROUP") => {
                    warn!(stream = %self.stream, group = %self.group, "Consumer group vanished, recreating");
                    if let Err(e) = self.rejoin().await {
                        warn!(group = %self.group, error = %e, "Failed to recreate consumer group");
                        tokio::time::sleep(Duration::from_millis(READ_ERROR_BACKOFF_MS)).await;
                    }
                }
                Err(e) => {
                    warn!(
                        stream = %self.stream,
                        group = %self.group,
                        error = %e,
                        "Stream read failed"
                    );
                    tokio::time::sleep(Duration::from_millis(READ_ERROR_BACKOFF_MS)).await;
                }
            }

            if last_reclaim.elapsed() >= self.settings.redelivery_delay() {
                if let Err(e) = self.redeliver_pending().await {
                    warn!(stream = %self.stream, group = %self.group, error = %e, "Redelivery pass failed");
                }
                last_reclaim = Instant::now();
            }
        }

        if self.broadcast {
            destroy_group(self.conn.clone(), &self.stream, &self.group).await;
        }
        debug!(stream = %self.stream, group = %self.group, "Consumer stopped");
    }

    async fn rejoin(&mut self) -> Result<(), BusError> {
        ensure_group(&mut self.conn, &self.stream, &self.group).await?;
        create_consumer(&mut self.conn, &self.stream, &self.group, &self.name).await
    }

    async fn read_new(&mut self) -> Result<Vec<StreamId>, BusError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.name)
            .count(self.settings.batch_size)
            .block(self.settings.block().as_millis() as usize);

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await?;

        Ok(reply
            .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default())
    }

    /// Whether the entry is still pending under this consumer. A consumer
    /// that stalled past `dead_consumer_ms` may have lost the rest of its
    /// batch to another consumer.
    async fn still_owned(&mut self, id: &str) -> bool {
        let pending: redis::RedisResult<StreamPendingCountReply> = self
            .conn
            .xpending_consumer_count(&self.stream, &self.group, id, id, 1, &self.name)
            .await;
        match pending {
            Ok(reply) => !reply.ids.is_empty(),
            Err(e) => {
                warn!(id = %id, error = %e, "Ownership check failed, processing anyway");
                true
            }
        }
    }

    /// Re-ack, redeliver own retries and take over entries of dead consumers.
    async fn redeliver_pending(&mut self) -> Result<(), BusError> {
        for id in std::mem::take(&mut self.unacked) {
            self.ack(&id).await;
        }

        let consumers: StreamInfoConsumersReply =
            self.conn.xinfo_consumers(&self.stream, &self.group).await?;
        let idle: HashMap<String, u64> = consumers
            .consumers
            .iter()
            .map(|c| (c.name.clone(), c.idle as u64))
            .collect();

        if !self.retried.is_empty() {
            let name = self.name.clone();
            self.reclaim_from(&name, &idle).await?;
        }

        for consumer in &consumers.consumers {
            if consumer.name == self.name || !is_dead_consumer(consumer.idle as u64, &self.settings) {
                continue;
            }
            if consumer.pending > 0 {
                self.reclaim_from(&consumer.name, &idle).await?;
            } else {
                let removed: redis::RedisResult<i64> = self
                    .conn
                    .xgroup_delconsumer(&self.stream, &self.group, &consumer.name)
                    .await;
                match removed {
                    Ok(_) => info!(group = %self.group, consumer = %consumer.name, "Removed dead consumer"),
                    Err(e) => warn!(consumer = %consumer.name, error = %e, "Failed to remove dead consumer"),
                }
            }
        }

        Ok(())
    }

    async fn reclaim_from(&mut self, owner: &str, idle: &HashMap<String, u64>) -> Result<(), BusError> {
        let pending: StreamPendingCountReply = self
            .conn
            .xpending_consumer_count(
                &self.stream,
                &self.group,
                "-",
                "+",
                self.settings.batch_size,
                owner,
            )
            .await?;

        for entry in pending.ids {
            let whose = if owner == self.name {
                PendingOwner::Me {
                    retried: self.retried.contains(&entry.id),
                }
            } else {
                PendingOwner::Other {
                    idle_ms: idle.get(owner).copied(),
                }
            };

            let action = pending_action(
                whose,
                entry.last_delivered_ms as u64,
                entry.times_delivered as u64,
                &self.settings,
            );
            match action {
                PendingAction::Leave => {}
                PendingAction::GiveUp => {
                    error!(
                        routing_key = %self.routing_key,
                        group = %self.group,
                        id = %entry.id,
                        deliveries = entry.times_delivered,
                        "Giving up on message after repeated retries"
                    );
                    metrics::record_bus_delivery(self.routing_key.as_str(), "dead");
                    self.retried.remove(&entry.id);
                    self.ack(&entry.id).await;
                }
                PendingAction::Redeliver => {
                    let min_idle = match whose {
                        PendingOwner::Me { .. } => self.settings.redelivery_delay_ms,
                        PendingOwner::Other { .. } => self.settings.dead_consumer_ms,
                    };
                    // XCLAIM re-checks the idle time, so two consumers racing
                    // for the same entry cannot both win.
                    let claimed: StreamClaimReply = self
                        .conn
                        .xclaim(&self.stream, &self.group, &self.name, min_idle as usize, &[&entry.id])
                        .await?;

                    for message in claimed.ids {
                        debug!(id = %message.id, from = %owner, attempt = entry.times_delivered + 1, "Redelivering");
                        self.process(&message).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn process(&mut self, entry: &StreamId) {
        let ack = match entry.get::<Vec<u8>>(PAYLOAD_FIELD) {
            Some(payload) => dispatch(self.routing_key, &payload, self.handler.as_ref()).await,
            None => {
                error!(id = %entry.id, stream = %self.stream, "Entry without payload field, dropping");
                Ack::Accept
            }
        };

        match ack {
            Ack::Accept => {
                self.retried.remove(&entry.id);
                self.ack(&entry.id).await;
            }
            Ack::Retry => {
                self.retried.insert(entry.id.clone());
            }
        }
    }

    async fn ack(&mut self, id: &str) {
        let acked: redis::RedisResult<i64> = self.conn.xack(&self.stream, &self.group, &[id]).await;
        if let Err(e) = acked {
            warn!(id = %id, group = %self.group, error = %e, "XACK failed, retrying on the next pass");
            self.unacked.insert(id.to_string());
        }
    }
}

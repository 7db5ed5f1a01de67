//! In-process bus backend.
//!
//! Same routing and acknowledgement rules as the Redis backend, without a
//! broker. Used by the integration tests and for single-process development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::{debug, error, info};

use super::{
    dispatch, Ack, BusError, BusEvent, EventHandler, MessageBus, QueueSpec, RoutingKey,
    Subscription,
};
use crate::infrastructure::metrics;

const DEFAULT_MAX_DELIVERIES: u32 = 10;

#[derive(Debug, Clone)]
struct Delivery {
    payload: Arc<[u8]>,
    attempt: u32,
}

type SharedReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<Delivery>>>;

/// A durable named queue; consumers share the receiver.
struct WorkQueue {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: SharedReceiver,
}

impl WorkQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
        }
    }
}

#[derive(Default)]
struct Route {
    broadcast: Vec<mpsc::UnboundedSender<Delivery>>,
    queues: HashMap<String, WorkQueue>,
}

/// Message bus living entirely inside one process.
#[derive(Clone)]
pub struct InMemoryBus {
    routes: Arc<Mutex<HashMap<RoutingKey, Route>>>,
    max_deliveries: u32,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_max_deliveries(DEFAULT_MAX_DELIVERIES)
    }

    pub fn with_max_deliveries(max_deliveries: u32) -> Self {
        Self {
            routes: Arc::new(Mutex::new(HashMap::new())),
            max_deliveries: max_deliveries.max(1),
        }
    }

    /// Live broadcast queues bound to a routing key.
    pub fn broadcast_subscribers(&self, routing_key: RoutingKey) -> usize {
        self.routes
            .lock()
            .get(&routing_key)
            .map_or(0, |route| route.broadcast.iter().filter(|tx| !tx.is_closed()).count())
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, event: &BusEvent) -> Result<(), BusError> {
        let routing_key = event.routing_key();
        let delivery = Delivery {
            payload: event.encode()?.into(),
            attempt: 1,
        };

        let mut routes = self.routes.lock();
        let Some(route) = routes.get_mut(&routing_key) else {
            debug!(routing_key = %routing_key, "No queue bound, message discarded");
            metrics::record_bus_publish(routing_key.as_str(), "ok");
            return Ok(());
        };

        route.broadcast.retain(|tx| tx.send(delivery.clone()).is_ok());
        for (name, queue) in &route.queues {
            if queue.sender.send(delivery.clone()).is_err() {
                metrics::record_bus_publish(routing_key.as_str(), "error");
                return Err(BusError::Publish(format!("work queue {name} is closed")));
            }
        }

        metrics::record_bus_publish(routing_key.as_str(), "ok");
        Ok(())
    }

    async fn subscribe(
        &self,
        routing_key: RoutingKey,
        queue: QueueSpec,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, BusError> {
        let (sender, receiver) = {
            let mut routes = self.routes.lock();
            let route = routes.entry(routing_key).or_default();
            match &queue {
                QueueSpec::Broadcast => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    route.broadcast.push(tx.clone());
                    (tx, Arc::new(AsyncMutex::new(rx)))
                }
                QueueSpec::WorkQueue(name) => {
                    let queue = route.queues.entry(name.clone()).or_insert_with(WorkQueue::new);
                    (queue.sender.clone(), queue.receiver.clone())
                }
            }
        };

        info!(routing_key = %routing_key, queue = %queue.label(), "Subscribed");

        let consumer = QueueConsumer {
            routing_key,
            receiver,
            requeue: sender,
            handler,
            max_deliveries: self.max_deliveries,
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(consumer.run(stop_rx));
        Ok(Subscription::new(routing_key, queue, stop_tx, task))
    }
}

struct QueueConsumer {
    routing_key: RoutingKey,
    receiver: SharedReceiver,
    requeue: mpsc::UnboundedSender<Delivery>,
    handler: Arc<dyn EventHandler>,
    max_deliveries: u32,
}

impl QueueConsumer {
    async fn run(self, mut stop: oneshot::Receiver<()>) {
        loop {
            let next = tokio::select! {
                biased;
                _ = &mut stop => break,
                next = async { self.receiver.lock().await.recv().await } => next,
            };
            let Some(delivery) = next else { break };

            let ack = dispatch(self.routing_key, &delivery.payload, self.handler.as_ref()).await;
            if ack == Ack::Retry {
                self.retry(delivery);
            }
        }
        debug!(routing_key = %self.routing_key, "Consumer stopped");
    }

    fn retry(&self, delivery: Delivery) {
        if delivery.attempt >= self.max_deliveries {
            error!(
                routing_key = %self.routing_key,
                deliveries = delivery.attempt,
                "Giving up on message after repeated retries"
            );
            metrics::record_bus_delivery(self.routing_key.as_str(), "dead");
            return;
        }
        let redelivery = Delivery {
            payload: delivery.payload,
            attempt: delivery.attempt + 1,
        };
        if self.requeue.send(redelivery).is_err() {
            debug!(routing_key = %self.routing_key, "Queue closed before redelivery");
        }
    }
}

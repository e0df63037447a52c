//! In-process, topic-keyed publish/subscribe.
//!
//! Publishing is synchronous: the publisher takes a snapshot of the topic's
//! handlers under a read lock, releases the lock and calls every handler in
//! turn. A panicking handler is logged and skipped so that it can neither
//! take down the publisher nor starve its siblings. Handlers that need to do
//! unbounded work must hand it off to their own task.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, error, warn};

/// A message that can travel over the [`SignalBus`].
pub trait Event: Any + Send + Sync + 'static {
    const TOPIC: &'static str;
}

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    name: String,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    topics: HashMap<&'static str, BTreeMap<u64, Subscriber>>,
    closed: bool,
}

/// Handle returned by [`SignalBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    topic: &'static str,
    id: u64,
}

impl SubscriptionId {
    pub fn topic(&self) -> &'static str {
        self.topic
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("signal bus is closed")]
    Closed,
}

#[derive(Default)]
pub struct SignalBus {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every event of type `E`.
    ///
    /// `subscriber` is only used in log lines.
    pub fn subscribe<E, F>(&self, subscriber: &str, handler: F) -> Result<SubscriptionId, BusError>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let name = if subscriber.is_empty() {
            "unknown".to_string()
        } else {
            subscriber.to_string()
        };

        let wrapped: Handler = {
            let name = name.clone();
            Arc::new(move |event: &dyn Any| match event.downcast_ref::<E>() {
                Some(event) => handler(event),
                None => warn!(
                    topic = E::TOPIC,
                    subscriber = %name,
                    "event type mismatch on topic, dropping"
                ),
            })
        };

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.closed {
            warn!(topic = E::TOPIC, subscriber = %name, "subscribe rejected: bus is closed");
            return Err(BusError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handlers = registry.topics.entry(E::TOPIC).or_default();
        handlers.insert(
            id,
            Subscriber {
                name: name.clone(),
                handler: wrapped,
            },
        );
        debug!(
            topic = E::TOPIC,
            subscriber = %name,
            id,
            total = handlers.len(),
            "subscribed"
        );

        Ok(SubscriptionId {
            topic: E::TOPIC,
            id,
        })
    }

    /// Deliver `event` to every current subscriber of its topic.
    pub fn publish<E: Event>(&self, event: E) {
        let snapshot: Vec<Subscriber> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            if registry.closed {
                warn!(topic = E::TOPIC, "publish dropped: bus is closed");
                return;
            }
            match registry.topics.get(E::TOPIC) {
                Some(handlers) => handlers.values().cloned().collect(),
                None => return,
            }
        };

        for subscriber in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(&event)));
            if let Err(panic) = outcome {
                error!(
                    topic = E::TOPIC,
                    subscriber = %subscriber.name,
                    panic = %panic_message(panic.as_ref()),
                    "event handler panicked"
                );
            }
        }
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.closed {
            return;
        }
        let Some(handlers) = registry.topics.get_mut(subscription.topic) else {
            return;
        };
        if let Some(removed) = handlers.remove(&subscription.id) {
            debug!(
                topic = subscription.topic,
                subscriber = %removed.name,
                id = subscription.id,
                "unsubscribed"
            );
        }
        if handlers.is_empty() {
            registry.topics.remove(subscription.topic);
        }
    }

    /// Drop every subscriber. Later subscriptions fail and later publications
    /// are discarded.
    pub fn close(&self) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.closed {
            warn!("close called on an already closed bus");
            return;
        }
        let total: usize = registry.topics.values().map(BTreeMap::len).sum();
        let topics = registry.topics.len();
        registry.topics.clear();
        registry.closed = true;
        debug!(subscribers = total, topics, "bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .get(topic)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

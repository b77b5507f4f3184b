//! Queue observers
//!
//! Listeners run synchronously inside the drain step that produced the event,
//! after the queue's lock is released, in the order they were registered.
//! Broadcast subscribers are served after every listener.

use crate::models::DeliveryItem;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Progress of a queue after an attempt, or once it drains
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// Items not yet terminal
    pub pending: usize,
    /// `pending` × the provider's pacing delay, rounded up
    pub estimated_seconds_remaining: u64,
}

/// Event emitted by a delivery queue
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Progress(ProgressSnapshot),
    /// An item reached `sent` or `failed`
    ItemCompleted(DeliveryItem),
}

/// Observer of a delivery queue
///
/// Both callbacks default to doing nothing. They run on the queue's task, so
/// a slow listener slows the queue down.
pub trait QueueListener: Send + Sync {
    fn on_progress(&self, _progress: &ProgressSnapshot) {}

    fn on_item_completed(&self, _item: &DeliveryItem) {}
}

pub(crate) struct EventHub {
    listeners: RwLock<Vec<Arc<dyn QueueListener>>>,
    channel: broadcast::Sender<QueueEvent>,
}

impl EventHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            channel,
        }
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn QueueListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.channel.subscribe()
    }

    pub(crate) fn dispatch(&self, events: Vec<QueueEvent>) {
        if events.is_empty() {
            return;
        }

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for event in events {
            for listener in &listeners {
                match &event {
                    QueueEvent::Progress(progress) => listener.on_progress(progress),
                    QueueEvent::ItemCompleted(item) => listener.on_item_completed(item),
                }
            }
            // No receivers is fine
            let _ = self.channel.send(event);
        }
    }
}

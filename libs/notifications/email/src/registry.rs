//! Per-session queue lookup
//!
//! Each bulk-send session gets its own [`DeliveryQueue`]. All queues share
//! one provider, and therefore one provider quota.

use crate::provider::EmailProvider;
use crate::queue::{DeliveryQueue, DeliveryQueueConfig};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

pub struct QueueRegistry {
    provider: Arc<dyn EmailProvider>,
    config: DeliveryQueueConfig,
    queues: RwLock<HashMap<String, DeliveryQueue>>,
}

impl QueueRegistry {
    pub fn new(provider: Arc<dyn EmailProvider>, config: DeliveryQueueConfig) -> Self {
        Self {
            provider,
            config,
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Queue for `session_id`, created on first use.
    pub fn get_or_create(&self, session_id: &str) -> DeliveryQueue {
        if let Some(queue) = self.get(session_id) {
            return queue;
        }

        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session_id, provider = self.provider.name(), "Creating delivery queue");
                DeliveryQueue::new(session_id, self.provider.clone(), self.config.clone())
            })
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<DeliveryQueue> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Drop a session's queue. The queue is cleared first so nothing scheduled keeps sending.
    pub fn remove(&self, session_id: &str) -> Option<DeliveryQueue> {
        let queue = self
            .queues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)?;
        queue.clear();
        Some(queue)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queues.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutboundEmail;
    use crate::provider::MockProvider;
    use crate::queue::QueueState;

    fn registry() -> QueueRegistry {
        QueueRegistry::new(Arc::new(MockProvider::new()), DeliveryQueueConfig::default())
    }

    #[tokio::test]
    async fn test_same_session_shares_queue() {
        let registry = registry();
        let first = registry.get_or_create("campaign-1");
        first.add_items([OutboundEmail::new("a@example.com", "Hi").with_text("x")]);

        let second = registry.get_or_create("campaign-1");
        assert_eq!(second.status().total, 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = registry();
        registry
            .get_or_create("a")
            .add_items([OutboundEmail::new("a@example.com", "Hi").with_text("x")]);

        assert_eq!(registry.get_or_create("b").status().total, 0);
        let mut ids = registry.session_ids();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_remove_clears_queue() {
        let registry = registry();
        let queue = registry.get_or_create("gone");
        queue.add_items([OutboundEmail::new("a@example.com", "Hi").with_text("x")]);

        let removed = registry.remove("gone").unwrap();
        assert_eq!(removed.status().total, 0);
        assert_eq!(removed.status().status, QueueState::Paused);
        assert!(registry.get("gone").is_none());
        assert!(registry.is_empty());
    }
}

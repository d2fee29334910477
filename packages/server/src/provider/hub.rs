//! In-process pub/sub hub for the realtime relay.
//!
//! One broadcast channel per resource. Producers are the upstream change-feed
//! listeners; consumers are SSE connections and local live subscriptions.
//! Payloads are `serde_json::Value` so the hub stays schema-agnostic.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish a value to a resource topic. No-op without subscribers.
    ///
    /// Synchronous so the upstream socket task can call it from its
    /// change callback.
    pub fn publish(&self, resource: &str, value: serde_json::Value) {
        let channels = self.channels.read().expect("hub lock poisoned");
        if let Some(tx) = channels.get(resource) {
            // Ignore send errors (no active receivers)
            let _ = tx.send(value);
        }
    }

    /// Subscribe to a resource topic. Creates the channel if needed.
    pub fn subscribe(&self, resource: &str) -> broadcast::Receiver<serde_json::Value> {
        let mut channels = self.channels.write().expect("hub lock poisoned");
        let tx = channels
            .entry(resource.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        tx.subscribe()
    }

    /// Live receivers on a topic right now.
    pub fn receiver_count(&self, resource: &str) -> usize {
        let channels = self.channels.read().expect("hub lock poisoned");
        channels
            .get(resource)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop channels nobody listens to anymore (housekeeping).
    pub fn cleanup(&self) {
        let mut channels = self.channels.write().expect("hub lock poisoned");
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

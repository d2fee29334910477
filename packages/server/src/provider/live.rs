//! Live provider: realtime row-change subscriptions.
//!
//! One upstream change-feed channel is opened per resource and fanned out
//! through the [`StreamHub`]. Local subscribers get a callback per change and
//! a handle that must be torn down (or dropped) when the consumer goes away;
//! housekeeping closes upstream channels once their last subscriber is gone.

use std::collections::HashMap;

use serde_json::{json, Value};
use supabase::{ChangeEvent, ChangeKind, ChannelHandle, Realtime};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use super::hub::StreamHub;
use crate::common::ApiError;

pub struct LiveProvider {
    realtime: Realtime,
    hub: StreamHub,
    upstream: Mutex<HashMap<String, ChannelHandle>>,
}

impl LiveProvider {
    pub fn new(realtime: Realtime) -> Self {
        Self {
            realtime,
            hub: StreamHub::new(),
            upstream: Mutex::new(HashMap::new()),
        }
    }

    /// Raw hub receiver for a resource; used by the SSE relay route.
    /// Opens the upstream channel on first use.
    pub async fn receiver(
        &self,
        resource: &str,
    ) -> Result<broadcast::Receiver<Value>, ApiError> {
        // Subscribe before opening upstream so housekeeping never sees an
        // active channel with zero receivers.
        let rx = self.hub.subscribe(resource);
        self.ensure_upstream(resource).await?;
        Ok(rx)
    }

    /// Invoke `callback` for every row change on a resource until the
    /// returned subscription is torn down.
    pub async fn subscribe<F>(
        &self,
        resource: &str,
        callback: F,
    ) -> Result<LiveSubscription, ApiError>
    where
        F: Fn(ChangeEvent) + Send + 'static,
    {
        let mut rx = self.receiver(resource).await?;
        let resource_name = resource.to_string();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(value) => {
                        if let Some(event) = relayed_change(&value) {
                            callback(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            resource = %resource_name,
                            missed,
                            "live subscription lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(LiveSubscription {
            resource: resource.to_string(),
            task,
        })
    }

    async fn ensure_upstream(&self, resource: &str) -> Result<(), ApiError> {
        let mut upstream = self.upstream.lock().await;
        if upstream.contains_key(resource) {
            return Ok(());
        }

        let hub = self.hub.clone();
        let topic = resource.to_string();
        let handle = self
            .realtime
            .subscribe("public", resource, move |event| {
                hub.publish(&topic, relay_payload(&topic, &event));
            })
            .await?;

        tracing::info!(resource, "opened upstream change feed");
        upstream.insert(resource.to_string(), handle);
        Ok(())
    }

    /// Close upstream channels whose topics have no subscribers left.
    pub async fn housekeeping(&self) {
        let mut upstream = self.upstream.lock().await;
        let idle: Vec<String> = upstream
            .keys()
            .filter(|resource| self.hub.receiver_count(resource) == 0)
            .cloned()
            .collect();
        for resource in idle {
            if let Some(handle) = upstream.remove(&resource) {
                tracing::info!(resource = %resource, "closing idle upstream change feed");
                handle.leave();
            }
        }
        self.hub.cleanup();
    }
}

/// A live subscription. The task stops when this is unsubscribed or dropped;
/// without that discipline the listener would outlive its consumer.
pub struct LiveSubscription {
    resource: String,
    task: JoinHandle<()>,
}

impl LiveSubscription {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Wire shape pushed through the hub and out the SSE relay.
fn relay_payload(resource: &str, event: &ChangeEvent) -> Value {
    json!({
        "type": event.kind.as_str(),
        "resource": resource,
        "record": event.record,
        "old_record": event.old_record,
    })
}

fn relayed_change(value: &Value) -> Option<ChangeEvent> {
    let kind = match value.get("type").and_then(Value::as_str)? {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        _ => return None,
    };
    Some(ChangeEvent {
        kind,
        record: value.get("record").filter(|v| !v.is_null()).cloned(),
        old_record: value.get("old_record").filter(|v| !v.is_null()).cloned(),
    })
}

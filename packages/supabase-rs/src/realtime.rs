//! Client for the backend's realtime change feed.
//!
//! The feed speaks Phoenix-channel frames over a websocket: a `phx_join` on
//! `realtime:{schema}:{table}` opens the per-table feed, `heartbeat` frames
//! keep it alive, and row changes arrive as INSERT/UPDATE/DELETE events.
//! The socket loop runs in a task owned by the returned handle; dropping the
//! handle (or calling `leave()`) tears the channel down.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::SupabaseError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// What happened to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn from_event(event: &str) -> Option<Self> {
        match event {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// A single row change delivered on a channel.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// The row after the change. Absent for deletes.
    pub record: Option<Value>,
    /// The row before the change, when the backend replicates it.
    pub old_record: Option<Value>,
}

#[derive(Clone)]
pub struct Realtime {
    ws_url: Url,
}

impl Realtime {
    pub(crate) fn new(base: &Url, anon_key: &str) -> Result<Self, SupabaseError> {
        let mut ws_url = base.join("realtime/v1/websocket")?;
        let scheme = if ws_url.scheme() == "https" { "wss" } else { "ws" };
        ws_url
            .set_scheme(scheme)
            .map_err(|_| SupabaseError::Realtime("cannot derive websocket scheme".into()))?;
        ws_url
            .query_pairs_mut()
            .append_pair("apikey", anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(Self { ws_url })
    }

    /// Open the change feed for one table and invoke `on_change` for every
    /// row change until the channel is left.
    pub async fn subscribe<F>(
        &self,
        schema: &str,
        table: &str,
        on_change: F,
    ) -> Result<ChannelHandle, SupabaseError>
    where
        F: Fn(ChangeEvent) + Send + 'static,
    {
        let topic = format!("realtime:{}:{}", schema, table);

        let (stream, _response) = tokio_tungstenite::connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| SupabaseError::Realtime(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        sink.send(Message::Text(frame(&topic, "phx_join", json!({}), 1)))
            .await
            .map_err(|e| SupabaseError::Realtime(e.to_string()))?;

        let (leave_tx, mut leave_rx) = oneshot::channel::<()>();
        let task_topic = topic.clone();
        let task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            let mut msg_ref: u64 = 1;
            loop {
                tokio::select! {
                    _ = &mut leave_rx => {
                        msg_ref += 1;
                        let _ = sink
                            .send(Message::Text(frame(&task_topic, "phx_leave", json!({}), msg_ref)))
                            .await;
                        let _ = sink.close().await;
                        break;
                    }
                    _ = heartbeat.tick() => {
                        msg_ref += 1;
                        if sink
                            .send(Message::Text(frame("phoenix", "heartbeat", json!({}), msg_ref)))
                            .await
                            .is_err()
                        {
                            tracing::warn!(topic = %task_topic, "realtime heartbeat failed, closing channel");
                            break;
                        }
                    }
                    message = source.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                dispatch(&task_topic, &text, &on_change);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::warn!(topic = %task_topic, "realtime channel closed by backend");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(topic = %task_topic, error = %e, "realtime channel error");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(ChannelHandle {
            topic,
            leave: Some(leave_tx),
            task,
        })
    }
}

/// Owns the socket task for one channel.
///
/// `leave()` says goodbye to the backend and lets the task drain; dropping
/// the handle without leaving aborts the task outright. Either way the
/// channel does not outlive its owner.
pub struct ChannelHandle {
    topic: String,
    leave: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ChannelHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Leave the channel: sends `phx_leave`, closes the socket, ends the task.
    pub fn leave(mut self) {
        if let Some(tx) = self.leave.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if self.leave.is_some() {
            self.task.abort();
        }
    }
}

fn frame(topic: &str, event: &str, payload: Value, msg_ref: u64) -> String {
    json!({
        "topic": topic,
        "event": event,
        "payload": payload,
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

fn dispatch<F>(topic: &str, text: &str, on_change: &F)
where
    F: Fn(ChangeEvent),
{
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        tracing::warn!(topic = %topic, "realtime frame was not JSON");
        return;
    };
    if value.get("topic").and_then(Value::as_str) == Some("phoenix") {
        return;
    }
    if value.get("event").and_then(Value::as_str) == Some("phx_reply") {
        let status = value
            .pointer("/payload/status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        if status != "ok" {
            tracing::warn!(topic = %topic, status = %status, "channel join rejected");
        }
        return;
    }
    if let Some(event) = parse_change(topic, &value) {
        on_change(event);
    }
}

fn parse_change(topic: &str, value: &Value) -> Option<ChangeEvent> {
    if value.get("topic").and_then(Value::as_str) != Some(topic) {
        return None;
    }
    let kind = ChangeKind::from_event(value.get("event").and_then(Value::as_str)?)?;
    let payload = value.get("payload")?;
    let record = payload.get("record").filter(|v| !v.is_null()).cloned();
    let old_record = payload.get("old_record").filter(|v| !v.is_null()).cloned();
    Some(ChangeEvent {
        kind,
        record,
        old_record,
    })
}

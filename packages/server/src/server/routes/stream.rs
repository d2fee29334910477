//! SSE relay endpoint.
//!
//! GET /streams/:resource
//!
//! Forwards the resource's change feed to the browser as SSE events. The
//! route sits inside the guarded subtree, so the session guard has already
//! vetted the caller. The hub receiver is dropped with the connection, which
//! is what lets housekeeping close idle upstream channels.

use std::convert::Infallible;

use axum::extract::{Extension, Path};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::common::ApiError;
use crate::server::app::AppState;

const STREAMABLE: &[&str] = &["blog_posts", "categories"];

pub async fn stream_handler(
    Extension(state): Extension<AppState>,
    Path(resource): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !STREAMABLE.contains(&resource.as_str()) {
        return Err(ApiError::NotFound(format!("unknown stream: {}", resource)));
    }

    let rx = state.live.receiver(&resource).await?;

    // Stream with connected event and lag handling
    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = BroadcastStream::new(rx).filter_map(|result| async {
        match result {
            Ok(value) => {
                let event_name = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("message")
                    .to_string();
                Event::default()
                    .event(event_name)
                    .json_data(&value)
                    .ok()
                    .map(Ok)
            }
            Err(BroadcastStreamRecvError::Lagged(n)) => Event::default()
                .event("lagged")
                .json_data(&serde_json::json!({ "missed": n }))
                .ok()
                .map(Ok),
        }
    });

    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}

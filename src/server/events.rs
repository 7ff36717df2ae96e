//! Server-sent event stream of state snapshots.
//!
//! The first event on every connection is the full current state. After that
//! the client gets a `snapshot` event per mutation and a `heartbeat` event on
//! a fixed interval.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    routing::get,
    Router,
};
use futures::stream::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::server::state::{GuardedUpdateBroadcaster, ServerState};
use crate::updates::UpdateMessage;

fn to_event(message: &UpdateMessage) -> Option<Event> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Event::default().event(message.event_name()).data(json)),
        Err(e) => {
            warn!("Failed to serialize update: {}", e);
            None
        }
    }
}

/// Stream the initial snapshot followed by live updates.
///
/// A receiver that lags behind skips the missed messages; the next snapshot
/// carries the full state anyway.
pub fn update_stream(
    updates: &GuardedUpdateBroadcaster,
) -> Result<impl Stream<Item = Result<Event, Infallible>> + Send + 'static, ServiceError> {
    let subscription = updates.subscribe()?;
    let initial = to_event(&UpdateMessage::Snapshot(subscription.initial));

    let live = BroadcastStream::new(subscription.receiver).filter_map(|result| match result {
        Ok(message) => to_event(&message),
        Err(e) => {
            debug!("SSE subscriber lagged: {}", e);
            None
        }
    });

    Ok(tokio_stream::iter(initial).chain(live).map(Ok))
}

/// GET /events
async fn events(State(updates): State<GuardedUpdateBroadcaster>) -> impl IntoResponse {
    match update_stream(&updates) {
        Ok(stream) => {
            debug!(
                "New update subscriber ({} connected)",
                updates.subscriber_count()
            );
            Sse::new(stream).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub fn event_routes() -> Router<ServerState> {
    Router::new().route("/events", get(events))
}

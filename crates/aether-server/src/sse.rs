//! Bridges run event channels onto Server-Sent Events.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::broadcast::error::RecvError;

use aether_core::events::RunEvent;
use aether_core::ids::RunId;

use crate::server::AppState;

/// GET /api/run/{id}/stream
///
/// Subscribers receive events published after they connect; nothing is
/// replayed. The stream closes after the run's terminal event, or when
/// the channel is removed.
pub async fn stream_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let run_id = RunId::from_raw(id);
    let rx = state.orchestrator.subscribe(&run_id);
    tracing::info!(run_id = %run_id, "event stream opened");

    let stream = futures::stream::unfold((rx, false), |(mut rx, done)| async move {
        if done {
            return None;
        }
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = event.is_terminal();
                    return Some((sse_event(&event), (rx, done)));
                }
                // A lagged subscriber skips dropped events rather than
                // erroring out of the stream.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &RunEvent) -> Result<Event, Infallible> {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Ok(Event::default().event(event.event_type()).data(data))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{error::RecvError, Receiver};

use super::session_error;
use crate::{
    metrics::SSE_CONNECTIONS_ACTIVE,
    models::timer::{TimerEvent, TimerTick},
    services::AppState,
};

/// SSE endpoint for timer events
/// GET /api/v1/sessions/{id}/stream
pub async fn session_stream(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (snapshot, events) = state
        .sessions
        .subscribe(&session_id)
        .await
        .map_err(session_error)?;

    tracing::info!(
        "Client connected to SSE stream: session={}, remaining={}s",
        session_id,
        snapshot.remaining_seconds
    );

    Ok(Sse::new(timer_stream(snapshot, events)).keep_alive(KeepAlive::default()))
}

struct ConnectionGuard;

impl ConnectionGuard {
    fn new() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

struct StreamState {
    pending: Option<TimerEvent>,
    events: Receiver<TimerEvent>,
    finished: bool,
    _guard: ConnectionGuard,
}

/// Current snapshot first, then live events until the session is finalized
/// or its event channel closes.
fn timer_stream(
    snapshot: TimerTick,
    events: Receiver<TimerEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let state = StreamState {
        pending: Some(TimerEvent::TimerTick(snapshot)),
        events,
        finished: false,
        _guard: ConnectionGuard::new(),
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let event = match state.pending.take() {
            Some(event) => event,
            None => loop {
                match state.events.recv().await {
                    Ok(event) => break event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("SSE client lagged, skipped {} timer events", skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            },
        };

        if let TimerEvent::SessionFinalized(finalized) = &event {
            tracing::info!("Closing SSE stream: session={}", finalized.session_id);
            state.finished = true;
        }

        let sse = Event::default()
            .event(event.event_name())
            .data(event.to_sse_data());
        Some((Ok(sse), state))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::timer::SessionFinalized;
    use crate::models::SessionStatus;
    use chrono::Utc;
    use futures::StreamExt;
    use tokio::sync::broadcast;

    fn tick(remaining: u32) -> TimerTick {
        TimerTick {
            session_id: "s-1".to_string(),
            remaining_seconds: remaining,
            elapsed_seconds: 60 - remaining,
            total_seconds: 60,
            violation_count: 0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stream_ends_after_session_finalized() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(TimerEvent::TimerTick(tick(59))).unwrap();
        tx.send(TimerEvent::SessionFinalized(SessionFinalized {
            session_id: "s-1".to_string(),
            status: Some(SessionStatus::Completed),
            percentage: Some(100),
            timestamp: Utc::now(),
        }))
        .unwrap();
        tx.send(TimerEvent::TimerTick(tick(58))).unwrap();

        let events: Vec<_> = timer_stream(tick(60), rx).collect().await;
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn stream_ends_when_channel_closes() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(TimerEvent::TimerTick(tick(59))).unwrap();
        drop(tx);

        let events: Vec<_> = timer_stream(tick(60), rx).collect().await;
        assert_eq!(events.len(), 2);
    }
}

//! Live-Update Channel
//!
//! WebSocket sessions that stream card events to browsers.
//!
//! Each session owns the receiving half of a bounded channel; the sending
//! half is wrapped in a [`ChannelSink`] and handed to the broadcaster. The
//! registry holds the only sender, so removing a sink from the registry
//! closes the channel and the session winds down on its own.
//!
//! Frame order on every session: welcome, snapshot (if any), live events.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::AppState;
use crate::application::services::WelcomeFrame;
use crate::domain::registry::{Frame, Sink, SinkError};

/// Frames queued ahead of the first live event (welcome and snapshot).
const MIN_SINK_CAPACITY: usize = 2;

// =============================================================================
// Channel Sink
// =============================================================================

/// Sink backed by a bounded channel drained by a WebSocket session.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
}

impl ChannelSink {
    /// Create a sink and the receiver its session drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(MIN_SINK_CAPACITY));
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn deliver(&self, frame: &Frame) -> Result<(), SinkError> {
        self.tx.try_send(Arc::clone(frame)).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

// =============================================================================
// Session
// =============================================================================

/// `GET /ws` upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut frames) = ChannelSink::channel(state.live.sink_capacity);

    match WelcomeFrame::new(&state.team_id).encode() {
        Ok(frame) => {
            if let Err(e) = sink.deliver(&frame) {
                tracing::warn!(error = %e, "Failed to queue welcome frame");
                return;
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to encode welcome frame"),
    }

    let sink_id = match state.broadcaster.attach(Arc::new(sink)) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to attach live subscriber");
            return;
        }
    };
    tracing::info!(
        sink_id,
        subscribers = state.broadcaster.subscriber_count(),
        "Live subscriber connected"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = tokio::time::interval(state.live.ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the immediate first tick
    ping.tick().await;

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    tracing::debug!(sink_id, "Subscriber removed by broadcaster");
                    break;
                };
                if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(sink_id, error = %e, "Live socket error");
                    break;
                }
                // Client text, binary and pong frames carry no meaning here.
                Some(Ok(_)) => {}
            },
        }
    }

    state.broadcaster.detach(sink_id);
    tracing::info!(sink_id, "Live subscriber disconnected");
}

use super::state::AppState;
use crate::error::EventBusError;
use crate::events::{EventFilter, EventReceiver};
use crate::mobile::ClientClassification;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct RelayParams {
    /// Comma separated message kinds; all kinds when absent
    #[serde(default)]
    pub events: Option<String>,
}

/// Upgrade to a WebSocket that relays every push message as
/// `{"event": kind, "data": payload}` frames.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    classification: ClientClassification,
    Query(params): Query<RelayParams>,
    State(state): State<AppState>,
) -> Response {
    let ping_every = state.config.mobile.ping_interval(classification.is_mobile);
    let filter = EventFilter::from_kinds(params.events.as_deref().unwrap_or(""));
    let receiver = EventReceiver::new(state.event_bus.subscribe(), filter, "websocket");
    let shutdown = state.shutdown.clone();

    info!(
        "WebSocket client connected (mobile: {}, ping every {:?})",
        classification.is_mobile, ping_every
    );

    ws.on_upgrade(move |socket| relay(socket, receiver, ping_every, shutdown))
}

async fn relay(
    socket: WebSocket,
    mut events: EventReceiver,
    ping_every: Duration,
    shutdown: CancellationToken,
) {
    let (mut sender, mut incoming) = socket.split();
    let mut ping = interval_at(Instant::now() + ping_every, ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut relayed = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            message = events.recv() => match message {
                Ok(message) => {
                    let frame = match serde_json::to_string(&message) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Failed to encode {}: {}", message.kind(), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                    relayed += 1;
                }
                Err(EventBusError::Lagged { skipped }) => {
                    warn!("WebSocket client missed {} messages", skipped);
                }
                Err(_) => break,
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    info!("WebSocket client disconnected after {} messages", relayed);
}

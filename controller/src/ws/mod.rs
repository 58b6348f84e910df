//! Real-time notification bus: per-user and broadcast events pushed to
//! authenticated WebSocket subscribers. Best-effort, at-most-once — a failed
//! write drops the channel silently and consumers reconcile over REST.

use std::collections::HashMap;
use std::sync::Mutex;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use common_events::Event;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::AppState;

#[derive(Default)]
pub struct NotificationBus {
    /// Subscriber multimap; the lock guards both insertion and delivery
    /// iteration.
    channels: Mutex<HashMap<i64, Vec<UnboundedSender<String>>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a channel for a user and returns its receiving half.
    pub fn subscribe(&self, user_id: i64) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        self.channels
            .lock()
            .expect("subscriber map poisoned")
            .entry(user_id)
            .or_default()
            .push(tx);
        rx
    }

    /// Delivers one event: to the owning user's channels, or to every open
    /// channel for broadcast events. Dead channels are dropped on the way.
    pub fn publish(&self, event: &Event) {
        let frame = event.frame().to_string();
        let mut channels = self.channels.lock().expect("subscriber map poisoned");
        match event.user_id() {
            Some(user_id) => {
                if let Some(senders) = channels.get_mut(&user_id) {
                    senders.retain(|sender| sender.send(frame.clone()).is_ok());
                    if senders.is_empty() {
                        channels.remove(&user_id);
                    }
                }
            }
            None => {
                channels.retain(|_, senders| {
                    senders.retain(|sender| sender.send(frame.clone()).is_ok());
                    !senders.is_empty()
                });
            }
        }
    }

    pub fn publish_all(&self, events: &[Event]) {
        for event in events {
            self.publish(event);
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Waits for the mandatory `auth` frame, attaches the channel and then pumps
/// bus frames out until either side goes away.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let user_id = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Some(user_id) = parse_auth(&text) {
                    break user_id;
                }
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            _ => {}
        }
    };

    let ack = json!({
        "type": "auth:success",
        "data": { "userId": user_id },
        "timestamp": Utc::now().to_rfc3339(),
    });
    if sink.send(Message::Text(ack.to_string())).await.is_err() {
        return;
    }

    let mut rx = state.bus.subscribe(user_id);
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    // Past auth, inbound frames carry nothing actionable.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

fn parse_auth(text: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("type").and_then(|t| t.as_str()) != Some("auth") {
        return None;
    }
    let user_id = value.get("userId")?;
    user_id
        .as_i64()
        .or_else(|| user_id.as_str().and_then(|raw| raw.parse().ok()))
}

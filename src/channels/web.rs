//! Web chat channel: WebSocket-based real-time chat for browsers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channels::normalize;
use crate::channels::{Channel, EventStream, OutboundMessage};
use crate::conversation::{ChoiceOption, ContactDetails, Event, InboundEvent, MessageRef, UserId};
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "web";

// ── JSON Protocol ───────────────────────────────────────────────────────

/// Message from browser client → server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Start a conversation, optionally leaving contact details up front.
    Start {
        #[serde(flatten)]
        contact: ContactDetails,
    },
    Cancel,
    Message {
        content: String,
    },
    /// A pressed button; `message_id` is the id of the choice message.
    Button {
        data: String,
        #[serde(default)]
        message_id: Option<String>,
    },
}

/// Message from server → browser client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    /// First frame on every connection.
    Connected { user_id: String },
    Message {
        id: String,
        text: String,
    },
    Choice {
        id: String,
        prompt: String,
        options: Vec<ChoiceOption>,
    },
    Edit {
        message_id: String,
        text: String,
    },
    Error {
        message: String,
    },
}

impl ClientMessage {
    /// Conversation events for this frame, in delivery order.
    fn into_events(self, connection_id: &str) -> Vec<Event> {
        match self {
            Self::Start { contact } => {
                let mut events = vec![Event::StartRequested];
                if let Some(contact) = contact.non_empty() {
                    events.push(Event::ContactProvided { contact });
                }
                events
            }
            Self::Cancel => vec![Event::CancelRequested],
            Self::Message { content } => vec![normalize::text_event(&content)],
            Self::Button { data, message_id } => vec![normalize::button_event(
                &data,
                message_id.map(|id| MessageRef::new(connection_id, id)),
            )],
        }
    }
}

// ── Shared State ────────────────────────────────────────────────────────

/// Internal state shared between the channel and WS handlers.
struct WebChatInner {
    /// Sender for incoming events (WS handler → Channel::start stream).
    incoming_tx: mpsc::UnboundedSender<InboundEvent>,
    /// Per-connection outgoing queues, keyed by connection id.
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<ServerMessage>>>,
    next_message_id: AtomicU64,
}

impl WebChatInner {
    fn next_id(&self) -> String {
        self.next_message_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn to_server_message(&self, message: OutboundMessage) -> ServerMessage {
        match message {
            OutboundMessage::Text { text }
            | OutboundMessage::Edit {
                message_ref: None,
                text,
            } => ServerMessage::Message {
                id: self.next_id(),
                text,
            },
            OutboundMessage::Choice { prompt, options } => ServerMessage::Choice {
                id: self.next_id(),
                prompt,
                options,
            },
            OutboundMessage::Edit {
                message_ref: Some(message_ref),
                text,
            } => ServerMessage::Edit {
                message_id: message_ref.message_id,
                text,
            },
        }
    }
}

/// Axum handler state (cloneable).
#[derive(Clone)]
struct WsState {
    inner: Arc<WebChatInner>,
}

// ── WebChatChannel ──────────────────────────────────────────────────────

/// A WebSocket-based channel for browser chat.
///
/// Architecture:
/// - Every WS connection is one user, `web:<uuid>`.
/// - `start()` returns a stream backed by an mpsc receiver. WS handlers push
///   `InboundEvent`s into the mpsc sender when clients send JSON frames.
/// - `send()` looks up the user's connection and queues a `ServerMessage`
///   for that socket only.
pub struct WebChatChannel {
    inner: Arc<WebChatInner>,
    /// Receiver side of the incoming channel, consumed once in `start()`.
    incoming_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
}

impl Default for WebChatChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl WebChatChannel {
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(WebChatInner {
            incoming_tx,
            connections: RwLock::new(HashMap::new()),
            next_message_id: AtomicU64::new(1),
        });

        Self {
            inner,
            incoming_rx: Mutex::new(Some(incoming_rx)),
        }
    }

    /// Build an Axum router with the `/ws/chat` endpoint.
    ///
    /// Call this once and merge with the main app router.
    pub fn router(&self) -> Router {
        let state = WsState {
            inner: Arc::clone(&self.inner),
        };

        Router::new()
            .route("/ws/chat", get(ws_chat_handler))
            .with_state(state)
    }
}

#[async_trait]
impl Channel for WebChatChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let rx = self
            .incoming_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: "start() already called".to_string(),
            })?;

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, user: &UserId, message: OutboundMessage) -> Result<(), ChannelError> {
        let tx = self
            .inner
            .connections
            .read()
            .await
            .get(&user.id)
            .cloned()
            .ok_or_else(|| ChannelError::NotConnected(user.to_string()))?;

        tx.send(self.inner.to_server_message(message))
            .map_err(|_| ChannelError::NotConnected(user.to_string()))
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        self.inner.connections.write().await.clear();
        Ok(())
    }
}

// ── WebSocket Handler ───────────────────────────────────────────────────

async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
) -> impl IntoResponse {
    debug!("Web chat client connecting");
    ws.on_upgrade(|socket| handle_chat_socket(socket, state.inner))
}

async fn handle_chat_socket(mut socket: WebSocket, inner: Arc<WebChatInner>) {
    let connection_id = Uuid::new_v4().to_string();
    let user = UserId::new(CHANNEL_NAME, connection_id.clone());
    info!(user = %user, "Web chat client connected");

    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel();
    inner
        .connections
        .write()
        .await
        .insert(connection_id.clone(), outgoing_tx.clone());

    let _ = outgoing_tx.send(ServerMessage::Connected {
        user_id: user.to_string(),
    });

    loop {
        tokio::select! {
            // Forward server messages to this WS client
            Some(msg) = outgoing_rx.recv() => {
                if let Ok(json) = serde_json::to_string(&msg) {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        debug!(user = %user, "Web chat client disconnected during send");
                        break;
                    }
                }
            }

            // Receive frames from the browser
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let delivered = client_msg
                                    .into_events(&connection_id)
                                    .into_iter()
                                    .all(|event| {
                                        inner.incoming_tx.send(InboundEvent::new(user.clone(), event)).is_ok()
                                    });
                                if !delivered {
                                    warn!("Web chat incoming channel closed");
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, text = %text, "Invalid JSON from web chat client");
                                let _ = outgoing_tx.send(ServerMessage::Error {
                                    message: format!("invalid frame: {e}"),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(user = %user, "Web chat client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Web chat WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    inner.connections.write().await.remove(&connection_id);
    // The connection id is never reused, so its session goes too.
    let _ = inner
        .incoming_tx
        .send(InboundEvent::new(user.clone(), Event::Disconnected));
    debug!(user = %user, "Web chat connection closed");
}

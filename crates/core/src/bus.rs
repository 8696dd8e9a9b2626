//! The message bus — the seam between channels and the agent loop.
//!
//! Channel adapters publish inbound messages; the agent loop consumes them,
//! and emits outbound messages the adapters deliver. A single unbounded
//! queue per direction preserves per-(channel, chat) emit order.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// A message arriving from a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Which channel produced this (e.g., "discord", "cli")
    pub channel: String,

    /// Chat/conversation identifier within the channel
    pub chat_id: String,

    /// Stable identifier of the sender, used to bind per-user memory
    #[serde(default)]
    pub sender_id: String,

    /// The message text
    pub content: String,

    /// Attachment paths or URLs, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            sender_id: String::new(),
            content: content.into(),
            media: Vec::new(),
        }
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }
}

/// A message the agent wants delivered to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
}

/// Process-wide inbound/outbound queues.
///
/// Constructed once at startup and injected by reference into every
/// component that needs it. Receivers are single-reader: each side takes
/// its receiver once and drains it from one task.
pub struct MessageBus {
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<OutboundMessage>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    /// Publish a message from a channel adapter toward the agent loop.
    pub fn publish_inbound(&self, message: InboundMessage) {
        // A closed receiver means shutdown is underway; dropping is fine.
        let _ = self.inbound_tx.send(message);
    }

    /// Publish a message from the agent loop toward channel adapters.
    pub fn publish_outbound(&self, message: OutboundMessage) {
        let _ = self.outbound_tx.send(message);
    }

    /// A sender handle for components that only emit outbound messages.
    pub fn outbound_sender(&self) -> mpsc::UnboundedSender<OutboundMessage> {
        self.outbound_tx.clone()
    }

    /// Take the inbound receiver. Returns `None` if already taken.
    pub async fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundMessage>> {
        self.inbound_rx.lock().await.take()
    }

    /// Take the outbound receiver. Returns `None` if already taken.
    pub async fn take_outbound(&self) -> Option<mpsc::UnboundedReceiver<OutboundMessage>> {
        self.outbound_rx.lock().await.take()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

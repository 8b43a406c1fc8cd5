//! Wire protocol for the chat relay
//!
//! Two layers share these types: the client-facing WebSocket frames (JSON
//! text messages tagged by `event`, matching the original browser client)
//! and the envelope published on the store's notification channel between
//! server instances.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single chat message, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Display name of the sender
    pub author: String,
    /// Message body
    pub text: String,
    /// Send time in seconds since UNIX epoch; doubles as the history score
    pub sent_at: i64,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new<A: Into<String>, T: Into<String>>(author: A, text: T) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            sent_at: crate::current_timestamp(),
        }
    }

    /// Serialize to the canonical JSON form stored and relayed everywhere
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a message from its canonical JSON form
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Envelope published on the notification channel between instances
///
/// The `origin` tag lets each relay skip announcements made by its own
/// process; locally-originated messages are already delivered through the
/// local broadcaster, so forwarding them again would double-deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Instance id of the announcing process
    pub origin: String,
    /// The announced message
    pub message: Message,
}

impl Envelope {
    pub fn new<O: Into<String>>(origin: O, message: Message) -> Self {
        Self {
            origin: origin.into(),
            message,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Frames a client may send to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    /// A new chat message from this client
    #[serde(rename = "chat message")]
    Chat(Message),
}

impl ClientFrame {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Frames the server sends to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerFrame {
    /// A chat message to display
    #[serde(rename = "chat message")]
    Chat(Message),
    /// Newline-joined serialized records spanning the retention window,
    /// sent once per connection immediately after join
    #[serde(rename = "chat history")]
    History(String),
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

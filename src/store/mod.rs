//! Shared backing store: durable history plus cross-instance notification
//!
//! The store is the only thing server instances share. It keeps two distinct
//! structures per room, deliberately decoupled:
//!
//! - a time-ordered keyed collection of serialized messages (history),
//!   supporting range retrieval by send time, and
//! - a publish/subscribe channel of the same name, used purely for fan-out
//!   (at-most-once per subscriber, no replay for late joiners).
//!
//! Payloads are opaque strings to the store; it indexes by score, never by
//! content.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;

use crate::error::Result;

/// Durable history plus notification channel shared by all instances
#[async_trait]
pub trait Store: Send + Sync {
    /// Durably record a payload under the given score. Side effect only;
    /// never notifies subscribers.
    async fn append(&self, room: &str, score: i64, payload: &str) -> Result<()>;

    /// All recorded payloads with `since <= score <= until`, ascending
    async fn history(&self, room: &str, since: i64, until: i64) -> Result<Vec<String>>;

    /// Publish a payload to every current subscriber of the room's channel
    async fn announce(&self, room: &str, payload: &str) -> Result<()>;

    /// Open a long-lived subscription to the room's channel. Only payloads
    /// announced after this call are observed.
    async fn subscribe(&self, room: &str) -> Result<Box<dyn Subscription>>;
}

/// A live subscription to a room's notification channel
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next announced payload. Suspends indefinitely between
    /// announcements; an error means the subscription is dead and must be
    /// reopened via [`Store::subscribe`].
    async fn next(&mut self) -> Result<String>;
}

//! Multi-instance chat relay
//!
//! This library implements a realtime group chat that can run as several
//! independent server processes behind a load balancer while appearing to
//! clients as one logical room. Instances coordinate exclusively through a
//! shared store (Redis in production): durable history lives in a sorted set
//! keyed by send time, and cross-instance delivery rides the store's pub/sub
//! channel.
//!
//! Per process:
//! - one [`session`] task per connected WebSocket,
//! - one [`publisher::Publisher`] task writing and announcing local messages,
//! - one [`relay::Relay`] task feeding foreign announcements into the local
//!   fan-out,
//! - one [`broadcast::LocalBroadcaster`] registry shared by all of the above.

pub mod bot;
pub mod broadcast;
pub mod error;
pub mod protocol;
pub mod publisher;
pub mod relay;
pub mod server;
pub mod session;
pub mod store;

pub use error::{RelayError, Result};
pub use protocol::Message;
pub use server::RelayServer;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in seconds since UNIX epoch
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Relay server configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Port the HTTP/WebSocket listener binds to
    pub port: u16,
    /// Unique identifier for this process, used to tag announcements
    pub instance_id: String,
    /// Address of the shared Redis store
    pub redis_addr: String,
    /// Optional Redis password
    pub redis_password: Option<String>,
    /// Room name; doubles as the history key and the pub/sub channel name
    pub room: String,
    /// How far back history replay reaches for new joiners
    pub retention: Duration,
    /// How long shutdown waits for queued messages to finish appending
    pub shutdown_timeout: Duration,
    /// Consecutive relay subscription failures tolerated before giving up
    pub relay_max_retries: u32,
    /// Initial backoff between relay reconnect attempts (doubles per retry)
    pub relay_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            instance_id: uuid::Uuid::new_v4().to_string(),
            redis_addr: "127.0.0.1:6379".to_string(),
            redis_password: None,
            room: "chat".to_string(),
            retention: Duration::from_secs(100 * 3600), // 100 hours
            shutdown_timeout: Duration::from_secs(5),
            relay_max_retries: 8,
            relay_backoff: Duration::from_millis(200),
        }
    }
}

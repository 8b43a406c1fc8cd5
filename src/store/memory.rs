//! In-process store backend
//!
//! Mirrors the Redis backend's semantics without leaving the process:
//! history is a BTreeMap keyed by `(score, insertion seq)` so equal scores
//! keep insertion order, and the notification channel is a tokio broadcast
//! channel per room. Two server instances handed clones of the same
//! `Arc<MemoryStore>` behave like two processes sharing one Redis, which is
//! exactly how the integration tests exercise cross-instance delivery.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{Store, Subscription};
use crate::error::{RelayError, Result};

/// Capacity of each room's broadcast channel
const CHANNEL_CAPACITY: usize = 1024;

/// In-memory store with Redis-equivalent semantics
pub struct MemoryStore {
    /// Per-room history: (score, insertion seq) -> payload
    history: Mutex<HashMap<String, BTreeMap<(i64, u64), String>>>,
    /// Per-room notification channels
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    /// Monotonic insertion counter for score tie-breaking
    seq: AtomicU64,
    /// When set, `append` fails as if the store were unreachable
    append_outage: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            append_outage: AtomicBool::new(false),
        }
    }

    /// Simulate a store outage affecting `append` calls
    pub fn set_append_outage(&self, failing: bool) {
        self.append_outage.store(failing, Ordering::SeqCst);
    }

    /// Number of records held for a room
    pub fn len(&self, room: &str) -> usize {
        self.history
            .lock()
            .expect("history lock poisoned")
            .get(room)
            .map(|h| h.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, room: &str) -> bool {
        self.len(room) == 0
    }

    fn sender(&self, room: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock().expect("channels lock poisoned");
        channels
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append(&self, room: &str, score: i64, payload: &str) -> Result<()> {
        if self.append_outage.load(Ordering::SeqCst) {
            return Err(RelayError::store("append failed: store unreachable"));
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut history = self.history.lock().expect("history lock poisoned");
        history
            .entry(room.to_string())
            .or_default()
            .insert((score, seq), payload.to_string());
        Ok(())
    }

    async fn history(&self, room: &str, since: i64, until: i64) -> Result<Vec<String>> {
        let history = self.history.lock().expect("history lock poisoned");
        let Some(room_history) = history.get(room) else {
            return Ok(Vec::new());
        };
        Ok(room_history
            .range((since, 0)..=(until, u64::MAX))
            .map(|(_, payload)| payload.clone())
            .collect())
    }

    async fn announce(&self, room: &str, payload: &str) -> Result<()> {
        // A send error only means no subscriber is listening right now,
        // which matches PUBLISH against a channel with no subscribers.
        let _ = self.sender(room).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, room: &str) -> Result<Box<dyn Subscription>> {
        Ok(Box::new(MemorySubscription {
            rx: self.sender(room).subscribe(),
        }))
    }
}

/// Subscription backed by a broadcast receiver
struct MemorySubscription {
    rx: broadcast::Receiver<String>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<String> {
        self.rx
            .recv()
            .await
            .map_err(|e| RelayError::store(format!("subscription lost: {}", e)))
    }
}

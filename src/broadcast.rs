//! Per-process fan-out to locally connected sessions
//!
//! The broadcaster is the one shared-mutable structure in each process: a
//! registry mapping connection ids to their outbound queues. Sessions join
//! on connect and leave on disconnect; the publisher-side session path and
//! the relay both push frames through `broadcast`. Delivery is best-effort
//! per connection: a dead outbound queue gets that connection evicted and
//! never blocks delivery to the others.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::ServerFrame;

/// Unique identifier for one client connection
pub type ConnectionId = Uuid;

/// Registry of active connections for the room on this process
pub struct LocalBroadcaster {
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerFrame>>>,
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection's outbound queue
    pub async fn join(&self, id: ConnectionId, tx: mpsc::UnboundedSender<ServerFrame>) {
        self.connections.write().await.insert(id, tx);
        debug!("Connection {} joined local broadcast group", id);
    }

    /// Remove a connection; triggered by disconnect detection, not by any
    /// protocol message
    pub async fn leave(&self, id: ConnectionId) {
        if self.connections.write().await.remove(&id).is_some() {
            debug!("Connection {} left local broadcast group", id);
        }
    }

    /// Deliver a frame to every registered connection except the optionally
    /// excluded one. Returns how many connections were handed the frame.
    pub async fn broadcast(&self, frame: ServerFrame, excluding: Option<ConnectionId>) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;

        {
            let connections = self.connections.read().await;
            for (id, tx) in connections.iter() {
                if Some(*id) == excluding {
                    continue;
                }
                if tx.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }

        // Evict connections whose session has already gone away
        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for id in dead {
                warn!("Dropping connection {} after failed delivery", id);
                connections.remove(&id);
            }
        }

        delivered
    }

    /// Number of currently registered connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for LocalBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

//! Durable write + announce task for locally-originated messages
//!
//! Exactly one publisher task runs per process, consuming a FIFO queue fed
//! by every session on that process. One task, not a pool: per-publisher
//! FIFO ordering survives end-to-end only if append+announce pairs are
//! processed in submission order.
//!
//! For each message the store append happens strictly before the announce.
//! A failed append suppresses the announce for that message, otherwise a
//! remote client could see a message that a concurrently joining client's
//! history fetch misses. A failed announce is non-fatal: the message is
//! durable and local peers already have it, so the loss is confined to
//! remote instances and logged as delivery degradation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::protocol::{Envelope, Message};
use crate::store::Store;

/// Background task that records and announces local messages
pub struct Publisher {
    store: Arc<dyn Store>,
    room: String,
    origin: String,
    rx: mpsc::UnboundedReceiver<Message>,
    shutdown: CancellationToken,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn Store>,
        room: String,
        origin: String,
        rx: mpsc::UnboundedReceiver<Message>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            room,
            origin,
            rx,
            shutdown,
        }
    }

    /// Consume the queue until shutdown, then drain what is already queued
    /// so no accepted message is left without a durable record.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    match msg {
                        Some(msg) => self.publish(msg).await,
                        None => break, // all senders gone
                    }
                }
                _ = self.shutdown.cancelled() => {
                    self.rx.close();
                    while let Ok(msg) = self.rx.try_recv() {
                        self.publish(msg).await;
                    }
                    break;
                }
            }
        }
        debug!("Publisher task stopped");
    }

    /// Append then announce one message, in that order
    async fn publish(&self, msg: Message) {
        let payload = match msg.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize message from {}: {}", msg.author, e);
                return;
            }
        };

        if let Err(e) = self.store.append(&self.room, msg.sent_at, &payload).await {
            // The sender already saw its own echo; losing the distributed
            // path degrades delivery to this process only.
            error!("Append failed, dropping message from distributed path: {}", e);
            return;
        }

        let envelope = Envelope::new(&self.origin, msg);
        match envelope.to_json() {
            Ok(announcement) => {
                if let Err(e) = self.store.announce(&self.room, &announcement).await {
                    warn!("Announce failed, remote delivery degraded: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize envelope: {}", e),
        }
    }
}

//! Cross-instance relay task
//!
//! Exactly one relay runs per process. It holds a long-lived subscription to
//! the room's notification channel and forwards every foreign-origin
//! envelope into the local broadcaster. It never originates messages.
//!
//! Announcements tagged with this process's own instance id are skipped:
//! local sessions already delivered those messages through the broadcaster,
//! and forwarding the looped-back announcement would double-deliver.
//!
//! A dead subscription is reopened with exponential backoff. Once the retry
//! budget is exhausted the task returns an error, which the server treats as
//! fatal: a permanently dead relay silently partitions this process's
//! clients from the rest of the cluster, and crash-and-restart beats
//! limping along isolated.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcast::LocalBroadcaster;
use crate::error::{RelayError, Result};
use crate::protocol::{Envelope, ServerFrame};
use crate::store::Store;

/// Cap on the delay between reconnect attempts
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Background task forwarding foreign announcements into local delivery
pub struct Relay {
    store: Arc<dyn Store>,
    broadcaster: Arc<LocalBroadcaster>,
    room: String,
    origin: String,
    max_retries: u32,
    backoff: Duration,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(
        store: Arc<dyn Store>,
        broadcaster: Arc<LocalBroadcaster>,
        room: String,
        origin: String,
        max_retries: u32,
        backoff: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            broadcaster,
            room,
            origin,
            max_retries,
            backoff,
            shutdown,
        }
    }

    /// Subscribe and forward until shutdown. Returns an error only when the
    /// subscription could not be kept alive within the retry budget.
    pub async fn run(self) -> Result<()> {
        let mut failures: u32 = 0;

        loop {
            let mut subscription = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                res = self.store.subscribe(&self.room) => match res {
                    Ok(sub) => {
                        info!("Relay subscribed to channel {}", self.room);
                        sub
                    }
                    Err(e) => {
                        failures += 1;
                        self.check_budget(failures, &e)?;
                        warn!(
                            "Relay subscribe failed (attempt {}/{}): {}",
                            failures, self.max_retries, e
                        );
                        tokio::time::sleep(self.delay(failures)).await;
                        continue;
                    }
                },
            };

            loop {
                let payload = tokio::select! {
                    _ = self.shutdown.cancelled() => return Ok(()),
                    res = subscription.next() => res,
                };

                match payload {
                    Ok(raw) => {
                        failures = 0;
                        self.forward(&raw).await;
                    }
                    Err(e) => {
                        failures += 1;
                        self.check_budget(failures, &e)?;
                        warn!(
                            "Relay subscription lost (attempt {}/{}): {}",
                            failures, self.max_retries, e
                        );
                        tokio::time::sleep(self.delay(failures)).await;
                        break; // reopen the subscription
                    }
                }
            }
        }
    }

    /// Push one announced payload into local delivery
    async fn forward(&self, raw: &str) {
        let envelope = match Envelope::from_json(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring malformed announcement: {}", e);
                return;
            }
        };

        if envelope.origin == self.origin {
            debug!("Skipping announcement looped back from this instance");
            return;
        }

        let delivered = self
            .broadcaster
            .broadcast(ServerFrame::Chat(envelope.message), None)
            .await;
        debug!("Relayed foreign message to {} local connections", delivered);
    }

    fn check_budget(&self, failures: u32, cause: &RelayError) -> Result<()> {
        if failures > self.max_retries {
            error!(
                "Relay gave up after {} consecutive failures; this instance \
                 would be partitioned from the cluster",
                failures
            );
            return Err(RelayError::store(format!(
                "relay subscription unrecoverable after {} attempts: {}",
                failures, cause
            )));
        }
        Ok(())
    }

    fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let delay = self.backoff.saturating_mul(1u32 << exp);
        delay.min(MAX_BACKOFF)
    }
}

//! Per-connection session handling
//!
//! Each WebSocket gets one session task with a `Connecting -> Joined ->
//! Closed` lifecycle. On join the session registers with the local
//! broadcaster and replays the retention window of history, once. After
//! that it reacts to exactly two triggers: an inbound client frame and
//! socket close. Malformed frames are dropped with the connection left
//! open; a close (or write failure) deregisters the connection.
//!
//! An accepted message goes three ways: echoed to the sender's own queue,
//! broadcast to same-process peers with the sender excluded, and handed to
//! the publisher queue for the durable write and cross-instance announce.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bot;
use crate::broadcast::ConnectionId;
use crate::current_timestamp;
use crate::error::Result;
use crate::protocol::{ClientFrame, Message, ServerFrame};
use crate::server::RelayContext;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Joined,
    Closed,
}

/// One client connection's session
struct Session {
    id: ConnectionId,
    ctx: Arc<RelayContext>,
    out_tx: mpsc::UnboundedSender<ServerFrame>,
    state: SessionState,
}

impl Session {
    fn new(ctx: Arc<RelayContext>, out_tx: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ctx,
            out_tx,
            state: SessionState::Connecting,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug!("Connection {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    /// Register with the local broadcaster and build the history frame
    async fn join(&mut self) -> ServerFrame {
        self.ctx
            .broadcaster
            .join(self.id, self.out_tx.clone())
            .await;
        self.advance(SessionState::Joined);

        let until = current_timestamp();
        let since = until - self.ctx.config.retention.as_secs() as i64;
        match self
            .ctx
            .store
            .history(&self.ctx.config.room, since, until)
            .await
        {
            Ok(records) => ServerFrame::History(records.join("\n")),
            Err(e) => {
                // Degraded join: the client still gets the history event,
                // just with nothing in it.
                error!("History fetch failed for {}: {}", self.id, e);
                ServerFrame::History(String::new())
            }
        }
    }

    /// Decode one inbound frame and run it through the delivery paths
    async fn handle_frame(&self, raw: &str) -> Result<()> {
        let ClientFrame::Chat(msg) = ClientFrame::from_json(raw)?;
        debug!("Connection {} sent message from {}", self.id, msg.author);
        self.deliver(msg).await;
        Ok(())
    }

    /// Deliver a message locally and hand it to the publisher; when the
    /// text is a bot command, the synthesized reply re-enters this same
    /// path as if a client had sent it.
    async fn deliver(&self, msg: Message) {
        let mut pending = Some(msg);
        while let Some(msg) = pending {
            // Self-echo straight onto this connection's queue
            let _ = self.out_tx.send(ServerFrame::Chat(msg.clone()));

            // Same-process peers, sender excluded to avoid a double echo
            self.ctx
                .broadcaster
                .broadcast(ServerFrame::Chat(msg.clone()), Some(self.id))
                .await;

            // Durable write + announce for the other instances
            if self.ctx.publisher_tx.send(msg.clone()).is_err() {
                warn!("Publisher queue closed; message stays local-only");
            }

            pending = bot::wiki_reply(&self.ctx.http, &msg.text).await;
        }
    }

    async fn close(&mut self) {
        self.ctx.broadcaster.leave(self.id).await;
        self.advance(SessionState::Closed);
    }
}

/// Drive one WebSocket connection for its whole lifetime
pub async fn handle(socket: WebSocket, ctx: Arc<RelayContext>) {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(ctx, out_tx);
    info!("New connection {}", session.id);

    let history = session.join().await;
    let (mut sink, mut stream) = socket.split();

    // History batch goes out first, before any live traffic
    match history.to_json() {
        Ok(json) => {
            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                session.close().await;
                return;
            }
        }
        Err(e) => error!("Failed to serialize history frame: {}", e),
    }

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                // The session keeps its own sender for self-echo, so the
                // queue cannot close before teardown.
                let Some(frame) = frame else { break };
                let json = match frame.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Skipping unserializable frame: {}", e);
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(json.into())).await.is_err() {
                    debug!("Write failed on connection {}", session.id);
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Err(e) = session.handle_frame(text.as_str()).await {
                            // Drop the frame, keep the connection
                            warn!("Dropping malformed frame on {}: {}", session.id, e);
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                    Some(Err(e)) => {
                        debug!("Read failed on connection {}: {}", session.id, e);
                        break;
                    }
                }
            }
        }
    }

    session.close().await;
    info!("Connection {} closed", session.id);
}

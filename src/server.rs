//! Relay server: HTTP surface plus the per-process background tasks
//!
//! `RelayServer::start` wires one process together: connect the store,
//! spawn the publisher and relay tasks, then serve the axum router
//! (WebSocket upgrade, liveness endpoint, static client bundle) until
//! ctrl-c or a fatal relay failure. Shutdown cancels the background tasks
//! and gives the publisher a bounded window to drain in-flight appends.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::broadcast::LocalBroadcaster;
use crate::error::{RelayError, Result};
use crate::protocol::Message;
use crate::publisher::Publisher;
use crate::relay::Relay;
use crate::session;
use crate::store::{RedisStore, Store};
use crate::RelayConfig;

/// Process-scoped context handed to every session task
///
/// Everything a session needs lives here explicitly; there is no
/// package-level singleton, so lifecycle and shutdown ordering stay visible
/// in `RelayServer::start`.
pub struct RelayContext {
    pub config: RelayConfig,
    pub store: Arc<dyn Store>,
    pub broadcaster: Arc<LocalBroadcaster>,
    pub publisher_tx: mpsc::UnboundedSender<Message>,
    pub http: reqwest::Client,
}

/// One relay server process
pub struct RelayServer {
    config: RelayConfig,
    store: Option<Arc<dyn Store>>,
}

impl RelayServer {
    /// Server that connects to the Redis store named in the configuration
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Server over a pre-built store; lets tests run several instances
    /// against one shared in-memory store
    pub fn with_store(config: RelayConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store: Some(store),
        }
    }

    /// Run the process until ctrl-c or a fatal relay failure
    pub async fn start(self) -> Result<()> {
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(RedisStore::connect(&self.config).await?) as Arc<dyn Store>,
        };

        let shutdown = CancellationToken::new();
        let broadcaster = Arc::new(LocalBroadcaster::new());
        let (publisher_tx, publisher_rx) = mpsc::unbounded_channel();

        let publisher = Publisher::new(
            store.clone(),
            self.config.room.clone(),
            self.config.instance_id.clone(),
            publisher_rx,
            shutdown.clone(),
        );
        let publisher_handle = tokio::spawn(publisher.run());

        let relay = Relay::new(
            store.clone(),
            broadcaster.clone(),
            self.config.room.clone(),
            self.config.instance_id.clone(),
            self.config.relay_max_retries,
            self.config.relay_backoff,
            shutdown.clone(),
        );
        let mut relay_handle = tokio::spawn(relay.run());

        let ctx = Arc::new(RelayContext {
            config: self.config.clone(),
            store,
            broadcaster,
            publisher_tx,
            http: reqwest::Client::new(),
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(addr).await?;
        info!(
            "Server {} up at {}",
            self.config.instance_id,
            listener.local_addr()?
        );

        // ctrl-c becomes a cancellation, shared with the background tasks
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                signal_token.cancel();
            }
        });

        let serve_token = shutdown.clone();
        let serve = axum::serve(listener, router(ctx))
            .with_graceful_shutdown(async move { serve_token.cancelled().await })
            .into_future();

        let mut relay_failure: Option<RelayError> = None;
        tokio::select! {
            res = serve => {
                res.map_err(|e| RelayError::network(format!("server error: {}", e)))?;
            }
            res = &mut relay_handle => {
                // A dead relay silently isolates this instance; crash and
                // let the orchestrator restart us.
                relay_failure = Some(match res {
                    Ok(Err(e)) => e,
                    Ok(Ok(())) => RelayError::internal("relay task exited unexpectedly"),
                    Err(e) => RelayError::internal(format!("relay task panicked: {}", e)),
                });
            }
        }

        shutdown.cancel();

        // Best-effort drain: let queued messages finish their appends
        if tokio::time::timeout(self.config.shutdown_timeout, publisher_handle)
            .await
            .is_err()
        {
            warn!("Publisher did not drain within the shutdown timeout");
        }

        match relay_failure {
            Some(e) => {
                error!("Fatal: {}", e);
                Err(e)
            }
            None => {
                info!("Server {} stopped", self.config.instance_id);
                Ok(())
            }
        }
    }
}

fn router(ctx: Arc<RelayContext>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/ws", get(ws_upgrade))
        .fallback_service(ServeDir::new("public"))
        .with_state(ctx)
}

/// Liveness endpoint
async fn status() -> &'static str {
    "ok"
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<Arc<RelayContext>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::handle(socket, ctx))
}

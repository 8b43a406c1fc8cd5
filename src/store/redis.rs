//! Redis store backend
//!
//! History lives in a sorted set per room (`ZADD` on append, `ZRANGEBYSCORE`
//! for windowed retrieval, score = send time in Unix seconds) and
//! announcements ride a pub/sub channel named after the room. Commands go
//! through a `ConnectionManager`, which transparently re-establishes the
//! connection; each subscription gets its own dedicated connection because
//! a Redis connection in subscriber mode can do nothing else.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use tracing::{debug, info};

use super::{Store, Subscription};
use crate::error::{RelayError, Result};
use crate::RelayConfig;

/// Store backed by a shared Redis server
pub struct RedisStore {
    client: redis::Client,
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis server named in the configuration
    pub async fn connect(config: &RelayConfig) -> Result<Self> {
        let url = redis_url(&config.redis_addr, config.redis_password.as_deref());
        info!("Dialing redis at {}", config.redis_addr);

        let client = redis::Client::open(url)?;
        let mut conn = redis::aio::ConnectionManager::new(client.clone()).await?;

        // Fail fast on bad credentials or an unreachable server
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        debug!("Redis connection established");

        Ok(Self { client, conn })
    }
}

/// Build a redis connection URL from an address and optional password
fn redis_url(addr: &str, password: Option<&str>) -> String {
    let addr = addr.strip_prefix("redis://").unwrap_or(addr);
    match password {
        Some(password) if !password.is_empty() => format!("redis://:{}@{}", password, addr),
        _ => format!("redis://{}", addr),
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn append(&self, room: &str, score: i64, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.zadd(room, payload, score).await?;
        Ok(())
    }

    async fn history(&self, room: &str, since: i64, until: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let records: Vec<String> = conn.zrangebyscore(room, since, until).await?;
        Ok(records)
    }

    async fn announce(&self, room: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        // The receiver count is irrelevant; zero subscribers is not an error.
        let _: i64 = conn.publish(room, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, room: &str) -> Result<Box<dyn Subscription>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(room).await?;
        debug!("Subscribed to channel {}", room);
        Ok(Box::new(RedisSubscription {
            messages: Box::pin(pubsub.into_on_message()),
        }))
    }
}

/// Subscription over a dedicated Redis pub/sub connection
struct RedisSubscription {
    messages: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next(&mut self) -> Result<String> {
        let msg = self
            .messages
            .next()
            .await
            .ok_or_else(|| RelayError::store("pub/sub connection closed"))?;
        Ok(msg.get_payload::<String>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url_without_password() {
        assert_eq!(redis_url("127.0.0.1:6379", None), "redis://127.0.0.1:6379");
        assert_eq!(redis_url("127.0.0.1:6379", Some("")), "redis://127.0.0.1:6379");
    }

    #[test]
    fn test_redis_url_with_password() {
        assert_eq!(
            redis_url("10.0.0.5:6379", Some("hunter2")),
            "redis://:hunter2@10.0.0.5:6379"
        );
    }

    #[test]
    fn test_redis_url_keeps_single_scheme() {
        assert_eq!(
            redis_url("redis://cache.internal:6379", None),
            "redis://cache.internal:6379"
        );
    }
}

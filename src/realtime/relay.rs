//! Cross-instance relay for activity frames.
//!
//! A relay carries serialized frames on named channels. Every hub instance
//! publishes its clients' frames and subscribes to the whole channel family,
//! so a frame reaches clients connected to any instance.

use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("relay did not answer within {0:?}")]
    Timeout(Duration),
    #[error("relay closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub channel: String,
    pub payload: String,
}

pub trait Relay: Send + Sync {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a str,
    ) -> BoxFuture<'a, Result<(), RelayError>>;

    /// Messages of every channel matching `pattern`, for as long as the
    /// relay stays up.
    fn subscribe<'a>(
        &'a self,
        pattern: &'a str,
    ) -> BoxFuture<'a, Result<BoxStream<'static, RelayMessage>, RelayError>>;
}

/// Glob match supporting a single trailing `*`, the only form channel
/// patterns take here.
pub fn channel_matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

/* =========================
Redis
========================= */

pub struct RedisRelay {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisRelay {
    /// Opens a connection and probes it with `PING`; fails when the server
    /// does not answer within `connect_timeout`.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, RelayError> {
        let client = redis::Client::open(url)?;
        let probe = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await?;
            Ok::<_, RelayError>(conn)
        };
        let conn = timeout(connect_timeout, probe)
            .await
            .map_err(|_| RelayError::Timeout(connect_timeout))??;
        info!("Connected to Redis relay");
        Ok(Self { client, conn })
    }
}

impl Relay for RedisRelay {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a str,
    ) -> BoxFuture<'a, Result<(), RelayError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.publish::<_, _, ()>(channel, payload).await?;
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        pattern: &'a str,
    ) -> BoxFuture<'a, Result<BoxStream<'static, RelayMessage>, RelayError>> {
        Box::pin(async move {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.psubscribe(pattern).await?;
            let messages = pubsub.into_on_message().filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(RelayMessage {
                        channel: msg.get_channel_name().to_string(),
                        payload,
                    }),
                    Err(e) => {
                        warn!(error = %e, "Dropping undecodable relay message");
                        None
                    }
                }
            });
            Ok(messages.boxed())
        })
    }
}

/* =========================
In-process
========================= */

/// Relay shared by hubs living in one process. Lets several hubs exchange
/// frames the way separate instances do through Redis.
#[derive(Clone)]
pub struct InProcessRelay {
    tx: broadcast::Sender<RelayMessage>,
}

impl InProcessRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for InProcessRelay {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Relay for InProcessRelay {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a str,
    ) -> BoxFuture<'a, Result<(), RelayError>> {
        let message = RelayMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        // No subscriber is not an error, same as PUBLISH returning 0.
        let _ = self.tx.send(message);
        Box::pin(async { Ok(()) })
    }

    fn subscribe<'a>(
        &'a self,
        pattern: &'a str,
    ) -> BoxFuture<'a, Result<BoxStream<'static, RelayMessage>, RelayError>> {
        let rx = self.tx.subscribe();
        let pattern = pattern.to_string();
        Box::pin(async move {
            let messages = stream::unfold(rx, |mut rx| async move {
                loop {
                    match rx.recv().await {
                        Ok(message) => return Some((message, rx)),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(missed = n, "In-process relay subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            })
            .filter(move |m| std::future::ready(channel_matches(&pattern, &m.channel)));
            Ok(messages.boxed())
        })
    }
}

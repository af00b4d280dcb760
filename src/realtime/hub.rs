use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use super::relay::{RedisRelay, Relay, RelayError, RelayMessage};
use crate::config::Config;

/// Pattern covering every per-identity channel.
pub const CHANNEL_PATTERN: &str = "stream:*";

/// Frames waiting for a slow client before new ones are dropped.
pub const OUTBOUND_CAPACITY: usize = 64;

const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(30);

pub type Frame = Map<String, Value>;

pub fn channel_for(identity: &str) -> String {
    format!("stream:{identity}")
}

/// Adds the sender's identity and makes sure `timestamp` is present.
pub fn stamp(mut frame: Frame, identity: &str) -> Frame {
    frame.insert("user".to_string(), Value::String(identity.to_string()));
    frame.entry("timestamp").or_insert(Value::Null);
    frame
}

struct Subscriber {
    identity: String,
    outbound: mpsc::Sender<String>,
}

/// Connections currently open on this instance.
#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    members: Mutex<HashMap<u64, Subscriber>>,
}

impl Registry {
    fn members(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Subscriber>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, identity: String, outbound: mpsc::Sender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.members().insert(id, Subscriber { identity, outbound });
        id
    }

    fn remove(&self, id: u64) {
        self.members().remove(&id);
    }

    fn len(&self) -> usize {
        self.members().len()
    }

    /// Queues `payload` for every member except `skip`. A full or closed
    /// queue costs that member the frame and nothing else. Returns how many
    /// members got it.
    fn broadcast(&self, payload: &str, skip: Option<u64>) -> usize {
        let members = self.members();
        let mut delivered = 0;
        for (id, member) in members.iter() {
            if Some(*id) == skip {
                continue;
            }
            match member.outbound.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection = id, identity = %member.identity, "Outbound queue full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection = id, "Connection already closing");
                }
            }
        }
        delivered
    }
}

/// Membership of one connection. Dropping it removes the connection from the
/// registry.
pub struct Registration {
    id: u64,
    registry: Arc<Registry>,
}

impl Registration {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        debug!(connection = self.id, "Deregistered");
    }
}

/// How forwarded frames leave a connection.
#[derive(Clone)]
enum Fanout {
    /// Straight to the other connections of this instance.
    Direct,
    /// Published on the sender's channel; a subscriber task feeds everything
    /// on the channel family back into the local registry.
    Relay(Arc<dyn Relay>),
}

#[derive(Clone)]
pub struct Hub {
    registry: Arc<Registry>,
    fanout: Fanout,
    throttle: Duration,
}

impl Hub {
    pub fn direct(throttle: Duration) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            fanout: Fanout::Direct,
            throttle,
        }
    }

    /// Subscribes to [`CHANNEL_PATTERN`] and spawns the task that re-broadcasts
    /// relay traffic to this instance's connections for the life of the
    /// process. A subscription that ends is re-established with backoff.
    pub async fn relayed(
        relay: Arc<dyn Relay>,
        throttle: Duration,
    ) -> Result<Self, RelayError> {
        let messages = relay.subscribe(CHANNEL_PATTERN).await?;
        let registry = Arc::new(Registry::default());

        tokio::spawn(rebroadcast(
            Arc::clone(&relay),
            messages,
            Arc::clone(&registry),
        ));

        Ok(Self {
            registry,
            fanout: Fanout::Relay(relay),
            throttle,
        })
    }

    /// Probes the configured relay once. An absent or unreachable relay
    /// means direct broadcast for the life of the process.
    pub async fn start(config: &Config) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            info!("No relay configured, using direct broadcast");
            return Self::direct(config.realtime_throttle);
        };

        let relay = match RedisRelay::connect(url, config.relay_connect_timeout).await {
            Ok(relay) => relay,
            Err(e) => {
                warn!(error = %e, "Relay unreachable, using direct broadcast");
                return Self::direct(config.realtime_throttle);
            }
        };
        match Self::relayed(Arc::new(relay), config.realtime_throttle).await {
            Ok(hub) => hub,
            Err(e) => {
                warn!(error = %e, "Relay subscription failed, using direct broadcast");
                Self::direct(config.realtime_throttle)
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn register(&self, identity: &str) -> (Registration, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let id = self.registry.insert(identity.to_string(), tx);
        info!(connection = id, identity, "Realtime connection registered");
        (
            Registration {
                id,
                registry: Arc::clone(&self.registry),
            },
            rx,
        )
    }

    /// Sends one stamped frame on its way. Relay failures are logged and the
    /// frame is dropped.
    pub async fn forward(&self, from: u64, identity: &str, frame: Frame) {
        let payload = match serde_json::to_string(&stamp(frame, identity)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(connection = from, error = %e, "Frame not serializable");
                return;
            }
        };

        match &self.fanout {
            Fanout::Direct => {
                let delivered = self.registry.broadcast(&payload, Some(from));
                debug!(connection = from, delivered, "Broadcast frame");
            }
            Fanout::Relay(relay) => {
                if let Err(e) = relay.publish(&channel_for(identity), &payload).await {
                    warn!(connection = from, error = %e, "Relay publish failed, frame dropped");
                }
            }
        }
    }

    /// Forwards queued frames of one connection, at most one per throttle
    /// interval. Ends when the inbound queue closes.
    pub async fn pump(&self, from: u64, identity: String, mut inbound: mpsc::Receiver<Frame>) {
        let mut last: Option<Instant> = None;
        while let Some(frame) = inbound.recv().await {
            if let Some(last) = last {
                sleep_until(last + self.throttle).await;
            }
            self.forward(from, &identity, frame).await;
            last = Some(Instant::now());
        }
    }
}

async fn rebroadcast(
    relay: Arc<dyn Relay>,
    mut messages: BoxStream<'static, RelayMessage>,
    registry: Arc<Registry>,
) {
    loop {
        while let Some(message) = messages.next().await {
            let delivered = registry.broadcast(&message.payload, None);
            debug!(channel = %message.channel, delivered, "Relayed frame");
        }
        warn!("Relay subscription ended, resubscribing");

        let mut backoff = RESUBSCRIBE_BACKOFF;
        messages = loop {
            sleep(backoff).await;
            match relay.subscribe(CHANNEL_PATTERN).await {
                Ok(messages) => {
                    info!("Relay subscription restored");
                    break messages;
                }
                Err(e) => {
                    backoff = (backoff * 2).min(MAX_RESUBSCRIBE_BACKOFF);
                    warn!(error = %e, retry_in = ?backoff, "Relay resubscribe failed");
                }
            }
        };
    }
}

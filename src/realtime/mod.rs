//! Live activity streaming: authenticated WebSocket clients publish JSON
//! frames that are fanned out to the other clients, through a relay when one
//! is reachable.

pub mod hub;
pub mod relay;
pub mod session;
pub mod ws;

pub use hub::{Hub, Registration};
pub use relay::{InProcessRelay, RedisRelay, Relay, RelayError, RelayMessage};

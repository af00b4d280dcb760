//! One realtime connection from handshake to close, independent of the
//! transport carrying it.

use std::pin::pin;

use futures::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::hub::{Frame, Hub};
use crate::auth::jwt::verify_token;
use crate::models::TokenType;

pub const CLOSE_MISSING_TOKEN: u16 = 4001;
pub const CLOSE_INVALID_TOKEN: u16 = 4002;
/// Standard "invalid frame payload data" close code.
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
}

impl HandshakeError {
    pub fn close_code(&self) -> u16 {
        match self {
            HandshakeError::MissingToken => CLOSE_MISSING_TOKEN,
            HandshakeError::InvalidToken => CLOSE_INVALID_TOKEN,
        }
    }
}

/// Verifies the connection token and returns the identity frames are
/// stamped with.
pub fn authenticate(token: Option<&str>, secret: &str) -> Result<String, HandshakeError> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(HandshakeError::MissingToken)?;
    let claims = verify_token(token, secret).map_err(|_| HandshakeError::InvalidToken)?;
    if claims.token_type != TokenType::Access || claims.sub.is_empty() {
        return Err(HandshakeError::InvalidToken);
    }
    Ok(claims.sub)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not JSON")]
    NotJson,
    #[error("frame is not a JSON object")]
    NotObject,
}

pub fn parse_frame(text: &str) -> Result<Frame, FrameError> {
    match serde_json::from_str::<Value>(text).map_err(|_| FrameError::NotJson)? {
        Value::Object(frame) => Ok(frame),
        _ => Err(FrameError::NotObject),
    }
}

/// Frames accepted from a client but not yet forwarded. Further frames are
/// dropped until the pump catches up.
const INBOUND_CAPACITY: usize = 16;

/// Client traffic the session acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Ping(Vec<u8>),
    Close,
    Ignored,
}

#[derive(Debug, Error)]
#[error("client is gone")]
pub struct ClientGone;

/// Write half of a client connection.
#[allow(async_fn_in_trait)]
pub trait ClientSink {
    async fn text(&mut self, payload: String) -> Result<(), ClientGone>;

    async fn pong(&mut self, payload: &[u8]) -> Result<(), ClientGone>;

    /// `None` is a normal closure.
    async fn close(&mut self, reason: Option<(u16, String)>);
}

/// Serves an authenticated connection, or closes it with the handshake
/// failure's code.
pub async fn connect<K, S>(
    hub: Hub,
    handshake: Result<String, HandshakeError>,
    mut client: K,
    incoming: S,
) where
    K: ClientSink,
    S: Stream<Item = Incoming>,
{
    match handshake {
        Ok(identity) => serve(hub, identity, client, incoming).await,
        Err(e) => {
            debug!(reason = %e, "Realtime handshake refused");
            client.close(Some((e.close_code(), e.to_string()))).await;
        }
    }
}

/// Registers the connection and runs it until either side closes. The
/// connection leaves the registry as soon as the loop ends, even while a
/// throttled frame is still waiting.
pub async fn serve<K, S>(hub: Hub, identity: String, mut client: K, incoming: S)
where
    K: ClientSink,
    S: Stream<Item = Incoming>,
{
    let mut incoming = pin!(incoming);
    let (registration, mut outbound) = hub.register(&identity);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(INBOUND_CAPACITY);
    let pump = hub.pump(registration.id(), identity.clone(), inbound_rx);
    tokio::pin!(pump);

    let close_with = loop {
        tokio::select! {
            msg = incoming.next() => match msg {
                Some(Incoming::Text(text)) => match parse_frame(&text) {
                    Ok(frame) => {
                        if inbound_tx.try_send(frame).is_err() {
                            debug!(connection = registration.id(), "Inbound queue full, frame dropped");
                        }
                    }
                    Err(e) => break Some((CLOSE_INVALID_PAYLOAD, e.to_string())),
                },
                Some(Incoming::Ping(bytes)) => {
                    if client.pong(&bytes).await.is_err() {
                        break None;
                    }
                }
                Some(Incoming::Close) | None => break None,
                Some(Incoming::Ignored) => {}
            },
            Some(payload) = outbound.recv() => {
                if client.text(payload).await.is_err() {
                    break None;
                }
            }
            // Only finishes once `inbound_tx` is gone, which ends the loop first.
            () = &mut pump => break None,
        }
    };

    drop(registration);
    info!(identity = %identity, "Realtime connection closed");
    client.close(close_with).await;
}

use actix_web::{HttpRequest, HttpResponse, rt, web};
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::warn;
use utoipa::IntoParams;

use super::hub::Hub;
use super::session::{
    CLOSE_INVALID_PAYLOAD, ClientGone, ClientSink, Incoming, authenticate, connect,
};
use crate::config::Config;

#[derive(Debug, Deserialize, IntoParams)]
pub struct WsParams {
    /// Access token of the connecting user
    pub token: Option<String>,
}

/// Activity stream endpoint
#[utoipa::path(
    get,
    path = "/realtime/ws",
    params(WsParams),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol. Closes with 4001 when the token is missing and 4002 when it is invalid or expired."),
        (status = 400, description = "Not a WebSocket upgrade request")
    ),
    tag = "Realtime"
)]
pub async fn realtime_ws(
    req: HttpRequest,
    body: web::Payload,
    params: web::Query<WsParams>,
    hub: web::Data<Hub>,
    config: web::Data<Config>,
) -> actix_web::Result<HttpResponse> {
    let (response, session, stream) = actix_ws::handle(&req, body)?;
    let handshake = authenticate(params.token.as_deref(), &config.jwt_secret);

    rt::spawn(connect(
        hub.get_ref().clone(),
        handshake,
        session,
        incoming(stream),
    ));

    Ok(response)
}

fn incoming(stream: MessageStream) -> impl Stream<Item = Incoming> {
    stream.map(|msg| match msg {
        Ok(Message::Text(text)) => Incoming::Text(text.to_string()),
        Ok(Message::Ping(bytes)) => Incoming::Ping(bytes.to_vec()),
        Ok(Message::Close(_)) => Incoming::Close,
        Ok(_) => Incoming::Ignored,
        Err(e) => {
            warn!(error = %e, "Realtime protocol error");
            Incoming::Close
        }
    })
}

fn close_code(code: u16) -> CloseCode {
    match code {
        CLOSE_INVALID_PAYLOAD => CloseCode::Invalid,
        other => CloseCode::Other(other),
    }
}

impl ClientSink for Session {
    async fn text(&mut self, payload: String) -> Result<(), ClientGone> {
        Session::text(self, payload).await.map_err(|_| ClientGone)
    }

    async fn pong(&mut self, payload: &[u8]) -> Result<(), ClientGone> {
        Session::pong(self, payload).await.map_err(|_| ClientGone)
    }

    async fn close(&mut self, reason: Option<(u16, String)>) {
        let reason = reason.map(|(code, description)| CloseReason {
            code: close_code(code),
            description: Some(description),
        });
        let _ = Session::close(self.clone(), reason).await;
    }
}

//! WebSocket plumbing shared by the handshake and the receive loop.
//!
//! The Miniserver speaks plain RFC 6455 at `/ws/rfc6455`. Control commands
//! are text frames; replies come back as text, usually preceded by a
//! binary header which the text helpers here skip over.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

/// Path of the WebSocket endpoint on the Miniserver.
pub const WS_PATH: &str = "/ws/rfc6455";

/// The concrete socket produced by [`connect`].
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Any duplex WebSocket message channel.
///
/// Implemented for every tungstenite stream, client or server side, so the
/// handshake can be driven against a scripted peer in tests.
pub trait MessageStream:
    Stream<Item = Result<Message, tungstenite::Error>>
    + Sink<Message, Error = tungstenite::Error>
    + Unpin
    + Send
{
}

impl<T> MessageStream for T where
    T: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin
        + Send
{
}

/// Build the WebSocket URL for a Miniserver `host` (`"192.168.0.222"` or
/// `"miniserver.local:8080"`).
pub fn ws_url(host: &str) -> Result<Url, Error> {
    Ok(Url::parse(&format!("ws://{host}{WS_PATH}"))?)
}

/// Open the WebSocket connection.
pub async fn connect(url: &Url) -> Result<WsStream, Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");
    Ok(ws_stream)
}

/// Send one control command as a text frame.
pub async fn send_command<S: MessageStream>(ws: &mut S, command: &str) -> Result<(), Error> {
    ws.send(Message::text(command.to_owned()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

/// Wait for the next text message, skipping binary headers and pings.
///
/// `waiting_for` names the reply in timeout errors.
pub async fn recv_text<S: MessageStream>(
    ws: &mut S,
    timeout: Duration,
    waiting_for: &'static str,
) -> Result<String, Error> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next())
            .await
            .map_err(|_| Error::Timeout {
                waiting_for,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?;

        match frame {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((1005, String::new()), |cf| {
                    (u16::from(cf.code), cf.reason.as_str().to_owned())
                });
                return Err(Error::WebSocketClosed { code, reason });
            }
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "stream ended".into(),
                });
            }
            Some(Ok(other)) => {
                tracing::trace!(kind = message_kind(&other), "Skipping non-text frame");
            }
        }
    }
}

/// Short label for a message variant, for logs.
pub fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

//! Socket.IO WebSocket connection and frame handling

use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use url::Url;

use super::events::{ClientEvent, ServerEvent};
use super::frames::{self, OpenInfo, Packet};
use crate::error::ClientError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Used until the server tells us its heartbeat settings.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ChatSocket {
    stream: WsStream,
    open: OpenInfo,
}

/// A raw frame as read off the WebSocket.
pub type Frame = Option<Result<Message, tungstenite::Error>>;

/// What one frame meant for the session.
#[derive(Debug)]
pub enum Inbound {
    Event(ServerEvent),
    /// Heartbeat, control frame or an event nobody listens for.
    Idle,
    Closed,
}

/// Build the Engine.IO WebSocket endpoint from the broker's base URL.
pub fn socket_endpoint(base: &str) -> Result<String> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid socket URL {}", base))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("Unsupported socket URL scheme '{}'", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("Cannot use scheme {} for {}", scheme, base))?;
    url.set_path("/socket.io/");
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url.to_string())
}

impl ChatSocket {
    /// Connect, complete the Engine.IO and Socket.IO handshakes, then join
    /// the user's own room.
    pub async fn connect(base_url: &str, user_id: &str, token: Option<&str>) -> Result<Self> {
        let ws_url = socket_endpoint(base_url)?;
        tracing::info!("Connecting WebSocket to {}", ws_url);

        let (stream, response) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| ClientError::Network(format!("WebSocket connection failed: {}", e)))?;
        tracing::debug!("WebSocket connected (status={})", response.status());

        let mut stream = stream;
        let open = match tokio::time::timeout(HANDSHAKE_TIMEOUT, next_text(&mut stream)).await {
            Ok(Ok(Some(text))) => match frames::decode(&text) {
                Packet::Open(info) => info,
                other => bail!("Expected Engine.IO open packet, got {:?}", other),
            },
            Ok(Ok(None)) => bail!("Connection closed before handshake"),
            Ok(Err(e)) => return Err(e),
            Err(_) => bail!(ClientError::Network("Handshake timed out".to_string())),
        };
        tracing::debug!(
            "Engine.IO open: sid={} ping={}ms",
            open.sid,
            open.ping_interval
        );

        let mut socket = Self { stream, open };

        let auth = token.map(|t| serde_json::json!({ "token": t }));
        socket.send_text(&frames::encode_connect(auth.as_ref())).await?;
        socket.await_namespace_connect().await?;

        socket
            .emit(&ClientEvent::Join {
                user_id: user_id.to_string(),
            })
            .await?;
        tracing::info!("Joined room {}", user_id);

        Ok(socket)
    }

    async fn await_namespace_connect(&mut self) -> Result<()> {
        loop {
            let text = tokio::time::timeout(HANDSHAKE_TIMEOUT, self.recv_frame())
                .await
                .map_err(|_| ClientError::Network("Namespace connect timed out".to_string()))??
                .context("Connection closed during namespace connect")?;
            match frames::decode(&text) {
                Packet::Connect => return Ok(()),
                Packet::ConnectError(reason) => {
                    bail!(ClientError::Auth(format!("Socket rejected: {}", reason)))
                }
                Packet::Ping | Packet::Noop => {}
                other => tracing::debug!("Ignoring {:?} before connect", other),
            }
        }
    }

    /// Engine.IO session id.
    pub fn sid(&self) -> &str {
        &self.open.sid
    }

    /// If nothing (not even a ping) arrives within this window, the link is dead.
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.open.ping_interval + self.open.ping_timeout)
    }

    /// Send a text frame.
    async fn send_text(&mut self, msg: &str) -> Result<()> {
        tracing::debug!("WS send: {}", msg);
        self.stream
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| ClientError::Network(format!("Failed to send WebSocket message: {}", e)))?;
        Ok(())
    }

    /// Emit a chat event.
    pub async fn emit(&mut self, event: &ClientEvent) -> Result<()> {
        let frame = event.encode()?;
        self.send_text(&frame).await
    }

    /// Receive the next text frame, answering Engine.IO pings on the way.
    async fn recv_frame(&mut self) -> Result<Option<String>> {
        loop {
            let Some(text) = next_text(&mut self.stream).await? else {
                return Ok(None);
            };
            if text == "2" {
                tracing::trace!("Engine.IO ping");
                self.send_text(frames::PONG).await?;
                continue;
            }
            return Ok(Some(text));
        }
    }

    /// Wait for the next WebSocket frame. Nothing is consumed if the future
    /// is dropped, so this can sit in a `select!`.
    pub async fn next_frame(&mut self) -> Frame {
        self.stream.next().await
    }

    /// Act on a frame from `next_frame`: answer pings and decode events.
    /// Must run to completion, outside any `select!`.
    pub async fn handle_frame(&mut self, frame: Frame) -> Result<Inbound> {
        let text = match frame {
            None => return Ok(Inbound::Closed),
            Some(Err(e)) => {
                return Err(ClientError::Network(format!("WebSocket receive error: {}", e)).into())
            }
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Ping(data))) => {
                self.stream
                    .send(Message::Pong(data))
                    .await
                    .context("Failed to send pong")?;
                return Ok(Inbound::Idle);
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!("WebSocket closed: {:?}", frame);
                return Ok(Inbound::Closed);
            }
            Some(Ok(other)) => {
                tracing::debug!("WS frame (ignored): {:?}", other);
                return Ok(Inbound::Idle);
            }
        };
        tracing::debug!("WS recv: {}", text);

        match frames::decode(&text) {
            Packet::Ping => {
                tracing::trace!("Engine.IO ping");
                self.send_text(frames::PONG).await?;
            }
            Packet::Event { name, data } => match ServerEvent::parse(&name, data) {
                Ok(Some(event)) => return Ok(Inbound::Event(event)),
                Ok(None) => tracing::debug!("Ignoring event '{}'", name),
                Err(e) => tracing::warn!("Dropping event '{}': {:#}", name, e),
            },
            Packet::Close | Packet::Disconnect => {
                tracing::info!("Server ended the socket session");
                return Ok(Inbound::Closed);
            }
            Packet::Pong | Packet::Noop | Packet::Connect => {}
            other => tracing::debug!("Ignoring packet {:?}", other),
        }
        Ok(Inbound::Idle)
    }

    /// Leave the namespace and close the WebSocket.
    pub async fn close(mut self) {
        if let Err(e) = self.send_text("41").await {
            tracing::debug!("Disconnect packet not sent: {:#}", e);
        }
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close failed: {}", e);
        }
    }
}

/// Next text frame from the stream, handling WebSocket-level control frames.
async fn next_text(stream: &mut WsStream) -> Result<Option<String>> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                tracing::debug!("WS recv: {}", text);
                return Ok(Some(text));
            }
            Some(Ok(Message::Ping(data))) => {
                stream
                    .send(Message::Pong(data))
                    .await
                    .context("Failed to send pong")?;
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!("WebSocket closed: {:?}", frame);
                return Ok(None);
            }
            Some(Ok(other)) => {
                tracing::debug!("WS frame (ignored): {:?}", other);
            }
            Some(Err(e)) => {
                return Err(ClientError::Network(format!("WebSocket receive error: {}", e)).into());
            }
            None => {
                return Ok(None);
            }
        }
    }
}

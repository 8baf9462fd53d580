//! Real-time chat channel (Socket.IO over WebSocket)
//!
//! Keeps a broker connection alive for the signed-in user, re-joining the
//! user's own room after every reconnect. Missed events are not replayed;
//! a thread history fetch is the only way to recover them.

pub mod events;
pub mod frames;
pub mod websocket;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};
use tokio::time;

use crate::error::ClientError;
use crate::models::Message;
use events::{ClientEvent, ServerEvent};
use websocket::{ChatSocket, Inbound};

/// Cap for the reconnect delay.
const MAX_BACKOFF_SECS: u64 = 30;

/// A connection that lasted this long counts as stable and resets backoff.
const STABILITY_THRESHOLD: Duration = Duration::from_secs(60);

/// Capacity of the event fan-out channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What the channel reports to subscribers.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Connected,
    Disconnected(String),
    Server(ServerEvent),
}

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: String,
    pub user_id: String,
}

/// Supplies the bearer token for each connection attempt. Tokens expire, so
/// the reconnect loop asks again every time.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> BoxFuture<'_, Result<Option<String>>>;
}

/// Handle to the background connection task. Dropping it (and every clone of
/// its command sender) shuts the task down.
pub struct RealtimeHandle {
    cmd_tx: mpsc::UnboundedSender<ClientEvent>,
    events_tx: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHandle {
    /// Subscribe to connection state and server events.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events_tx.subscribe()
    }

    /// Queue an event for the broker. Queued events are flushed after a
    /// reconnect if the link is currently down.
    pub fn emit(&self, event: ClientEvent) {
        if self.cmd_tx.send(event).is_err() {
            tracing::error!("Realtime task gone -- event dropped");
        }
    }
}

/// Start the connection task.
pub fn spawn(config: RealtimeConfig, tokens: Arc<dyn TokenSource>) -> RealtimeHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(run_with_reconnect(config, tokens, cmd_rx, events_tx.clone()));

    RealtimeHandle { cmd_tx, events_tx }
}

/// Reason the inner session loop exited.
enum DisconnectReason {
    /// All handles dropped. Do not reconnect.
    Shutdown,
    /// Error or server-initiated close. Should reconnect.
    Error(anyhow::Error),
}

/// Keep a session running, reconnecting with exponential backoff
/// (1s, 2s, 4s, ... capped at 30s). Backoff resets after a stable session.
async fn run_with_reconnect(
    config: RealtimeConfig,
    tokens: Arc<dyn TokenSource>,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientEvent>,
    events_tx: broadcast::Sender<RealtimeEvent>,
) {
    let mut backoff = 1u64;

    loop {
        let started = Instant::now();
        let reason = match connect(&config, tokens.as_ref()).await {
            Ok(socket) => {
                let _ = events_tx.send(RealtimeEvent::Connected);
                run_session(socket, &mut cmd_rx, &events_tx).await
            }
            Err(e) => DisconnectReason::Error(e),
        };

        let err = match reason {
            DisconnectReason::Shutdown => {
                tracing::info!("Realtime channel shut down");
                return;
            }
            DisconnectReason::Error(e) => e,
        };

        if started.elapsed() >= STABILITY_THRESHOLD {
            backoff = 1;
        }
        tracing::warn!("Realtime disconnected: {:#}. Reconnecting in {}s...", err, backoff);
        let _ = events_tx.send(RealtimeEvent::Disconnected(format!("{:#}", err)));

        // Every handle is gone; nobody will send or listen again.
        if cmd_rx.is_closed() {
            return;
        }
        time::sleep(Duration::from_secs(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
    }
}

/// Connect with a freshly fetched token.
async fn connect(config: &RealtimeConfig, tokens: &dyn TokenSource) -> Result<ChatSocket> {
    let token = tokens.token().await?;
    ChatSocket::connect(&config.url, &config.user_id, token.as_deref()).await
}

/// Pump one connected session until it fails or the handle is dropped.
///
/// Only cancel-safe futures sit in the `select!`; frames are handled (and
/// pings answered) in the branch body.
async fn run_session(
    mut socket: ChatSocket,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    events_tx: &broadcast::Sender<RealtimeEvent>,
) -> DisconnectReason {
    tracing::info!("Realtime session {} established", socket.sid());

    let heartbeat = socket.heartbeat_deadline();
    let silence = time::sleep(heartbeat);
    tokio::pin!(silence);

    loop {
        tokio::select! {
            frame = socket.next_frame() => {
                silence.as_mut().reset(time::Instant::now() + heartbeat);
                match socket.handle_frame(frame).await {
                    Ok(Inbound::Event(event)) => {
                        // No subscribers is fine; nobody is looking right now.
                        let _ = events_tx.send(RealtimeEvent::Server(event));
                    }
                    Ok(Inbound::Idle) => {}
                    Ok(Inbound::Closed) => {
                        return DisconnectReason::Error(anyhow::anyhow!("Socket closed by server"));
                    }
                    Err(e) => return DisconnectReason::Error(e),
                }
            }
            _ = &mut silence => {
                return DisconnectReason::Error(
                    ClientError::Network("Heartbeat timed out".to_string()).into(),
                );
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(event) => {
                    if let Err(e) = socket.emit(&event).await {
                        return DisconnectReason::Error(e);
                    }
                }
                None => {
                    socket.close().await;
                    return DisconnectReason::Shutdown;
                }
            },
        }
    }
}

/// Send a single message over a short-lived connection.
pub async fn send_once(
    config: &RealtimeConfig,
    token: Option<&str>,
    message: &Message,
) -> Result<()> {
    let mut socket = ChatSocket::connect(&config.url, &config.user_id, token).await?;
    socket
        .emit(&ClientEvent::SendMessage(message.clone()))
        .await?;
    socket.close().await;
    Ok(())
}

/// Print chat events until Ctrl-C.
pub async fn listen(config: RealtimeConfig, tokens: Arc<dyn TokenSource>) -> Result<()> {
    let handle = spawn(config, tokens);
    let mut events = handle.subscribe();

    println!("Listening for chat events... (Ctrl-C to stop)");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(RealtimeEvent::Connected) => println!("[connected]"),
                Ok(RealtimeEvent::Disconnected(reason)) => println!("[disconnected] {}", reason),
                Ok(RealtimeEvent::Server(ServerEvent::ReceiveMessage(msg))) => {
                    println!(
                        "[{}] {} -> {}: {}",
                        msg.timestamp.format("%Y-%m-%d %H:%M"),
                        msg.sender_id,
                        msg.receiver_id,
                        msg.content
                    );
                }
                Ok(RealtimeEvent::Server(ServerEvent::Typing(notice))) => {
                    println!("[typing] {}", notice.sender_id);
                }
                Ok(RealtimeEvent::Server(ServerEvent::StopTyping(notice))) => {
                    println!("[stopped typing] {}", notice.sender_id);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Skipped {} events (slow consumer)", n);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                return Ok(());
            }
        }
    }
}

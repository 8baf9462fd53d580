//! Async backend: runs REST fetches off the UI task.
//!
//! Uses an mpsc channel pair. The TUI sends `BackendCommand` values, and a
//! background tokio task executes them and sends `BackendResponse` values back.
//! Fetch tickets travel with the request so the reconciler can drop responses
//! that arrive after the user moved on.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::api::{chat, profile, ApiClient};
use crate::models::{Contact, Message, UserProfile};
use crate::sync::{RosterTicket, ThreadTicket};

/// Commands sent from the TUI event loop to the async backend.
pub enum BackendCommand {
    LoadContacts { ticket: RosterTicket },
    LoadThread { ticket: ThreadTicket },
    LoadProfile,
}

/// Responses from the async backend to the TUI.
pub enum BackendResponse {
    Contacts {
        ticket: RosterTicket,
        result: Result<Vec<Contact>>,
    },
    Thread {
        ticket: ThreadTicket,
        result: Result<Vec<Message>>,
    },
    Profile(Result<UserProfile>),
}

/// Handle for interacting with the backend from the TUI side.
pub struct Backend {
    cmd_tx: mpsc::UnboundedSender<BackendCommand>,
    resp_rx: mpsc::UnboundedReceiver<BackendResponse>,
}

impl Backend {
    /// Start the backend. Spawns a tokio task that processes commands.
    pub fn start(client: Arc<ApiClient>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();

        tokio::spawn(backend_loop(client, cmd_rx, resp_tx));

        Self { cmd_tx, resp_rx }
    }

    /// Send a command to the backend (non-blocking).
    pub fn send(&self, cmd: BackendCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::error!("Backend channel closed -- command dropped");
        }
    }

    /// Receive a response from the backend.
    ///
    /// Returns `None` only when the backend task is gone. Designed to be used
    /// inside `tokio::select!`.
    pub async fn recv(&mut self) -> Option<BackendResponse> {
        self.resp_rx.recv().await
    }
}

/// Background loop that processes commands, one task per command.
async fn backend_loop(
    client: Arc<ApiClient>,
    mut cmd_rx: mpsc::UnboundedReceiver<BackendCommand>,
    resp_tx: mpsc::UnboundedSender<BackendResponse>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let client = Arc::clone(&client);
        let resp_tx = resp_tx.clone();

        tokio::spawn(async move {
            let response = match cmd {
                BackendCommand::LoadContacts { ticket } => BackendResponse::Contacts {
                    ticket,
                    result: chat::fetch_contacts(&client).await,
                },
                BackendCommand::LoadThread { ticket } => {
                    let result = chat::fetch_history(&client, &ticket.peer_id).await;
                    BackendResponse::Thread { ticket, result }
                }
                BackendCommand::LoadProfile => {
                    BackendResponse::Profile(profile::sync_own_profile(&client).await)
                }
            };
            // The UI may already be gone.
            let _ = resp_tx.send(response);
        });
    }
    tracing::debug!("Backend loop finished");
}

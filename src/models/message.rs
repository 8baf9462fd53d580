//! Chat message models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A one-to-one chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "sender")]
    pub sender_id: String,
    #[serde(alias = "receiver")]
    pub receiver_id: String,
    pub content: String,
    #[serde(alias = "createdAt", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Minted by the sending client; lets the sender recognise its own echo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
}

impl Message {
    /// Build a new outgoing message stamped now.
    pub fn outgoing(sender_id: &str, receiver_id: &str, content: &str) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            client_id: Some(Uuid::new_v4()),
        }
    }

    /// The participant that is not `me`.
    pub fn peer_of<'a>(&'a self, me: &str) -> &'a str {
        if self.sender_id == me {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }
}

/// Typing indicator payload (`typing` / `stop_typing`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub sender_id: String,
    pub receiver_id: String,
}

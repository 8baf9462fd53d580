//! Chat events carried over the real-time channel

use anyhow::{Context, Result};
use serde_json::Value;

use super::frames;
use crate::models::{Message, TypingNotice};

pub const JOIN: &str = "join";
pub const SEND_MESSAGE: &str = "send_message";
pub const RECEIVE_MESSAGE: &str = "receive_message";
pub const TYPING: &str = "typing";
pub const STOP_TYPING: &str = "stop_typing";

/// Event pushed by the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ReceiveMessage(Message),
    Typing(TypingNotice),
    StopTyping(TypingNotice),
}

impl ServerEvent {
    /// Parse a named event. Unknown names yield `Ok(None)`.
    pub fn parse(name: &str, data: Value) -> Result<Option<Self>> {
        let event = match name {
            RECEIVE_MESSAGE => Self::ReceiveMessage(
                serde_json::from_value(data).context("Malformed receive_message payload")?,
            ),
            TYPING => Self::Typing(
                serde_json::from_value(data).context("Malformed typing payload")?,
            ),
            STOP_TYPING => Self::StopTyping(
                serde_json::from_value(data).context("Malformed stop_typing payload")?,
            ),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Event emitted by this client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Join our own notification room (the user id).
    Join { user_id: String },
    SendMessage(Message),
    Typing(TypingNotice),
    StopTyping(TypingNotice),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => JOIN,
            ClientEvent::SendMessage(_) => SEND_MESSAGE,
            ClientEvent::Typing(_) => TYPING,
            ClientEvent::StopTyping(_) => STOP_TYPING,
        }
    }

    pub fn payload(&self) -> Result<Value> {
        let value = match self {
            ClientEvent::Join { user_id } => Value::String(user_id.clone()),
            ClientEvent::SendMessage(msg) => serde_json::to_value(msg)?,
            ClientEvent::Typing(notice) | ClientEvent::StopTyping(notice) => {
                serde_json::to_value(notice)?
            }
        };
        Ok(value)
    }

    /// Encode as a Socket.IO event frame.
    pub fn encode(&self) -> Result<String> {
        Ok(frames::encode_event(self.name(), &self.payload()?))
    }
}

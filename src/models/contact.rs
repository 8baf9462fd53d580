//! Conversation roster entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conversation peer in the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(alias = "_id", alias = "userId")]
    pub id: String,
    #[serde(alias = "name", default)]
    pub display_name: String,
    #[serde(alias = "avatar", alias = "profilePicture", default)]
    pub avatar_ref: Option<String>,
    #[serde(alias = "lastMessage", default)]
    pub last_message_text: Option<String>,
    #[serde(alias = "lastMessageTime", default)]
    pub last_message_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Contact {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
            last_message_text: None,
            last_message_timestamp: None,
            unread_count: 0,
        }
    }

    /// Name to show, falling back to the peer id.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_from_backend_aliases() {
        let json = r#"{
            "_id": "u-7",
            "name": "Priya",
            "lastMessage": "see you tomorrow",
            "lastMessageTime": "2024-03-01T10:00:00Z"
        }"#;
        let contact: Contact = serde_json::from_str(json).unwrap();
        assert_eq!(contact.id, "u-7");
        assert_eq!(contact.label(), "Priya");
        assert_eq!(contact.unread_count, 0);
        assert_eq!(
            contact.last_message_text.as_deref(),
            Some("see you tomorrow")
        );
        assert!(contact.last_message_timestamp.is_some());
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let contact = Contact::new("u-9", "  ");
        assert_eq!(contact.label(), "u-9");
    }
}

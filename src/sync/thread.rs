//! Message thread for the single open peer.

use crate::models::Message;

/// Append-only message list scoped to exactly one peer.
#[derive(Debug, Default)]
pub struct ThreadStore {
    peer: Option<String>,
    messages: Vec<Message>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard current content and load `history` for `peer_id`.
    pub fn replace(&mut self, peer_id: &str, history: Vec<Message>) {
        self.peer = Some(peer_id.to_string());
        self.messages = history;
    }

    /// Add to the end in arrival order.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drop everything, leaving no peer open.
    pub fn close(&mut self) {
        self.peer = None;
        self.messages.clear();
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_arrival_order() {
        let mut thread = ThreadStore::new();
        thread.replace("a", Vec::new());
        for text in ["one", "two", "two", "three"] {
            thread.append(Message::outgoing("a", "me", text));
        }
        let contents: Vec<&str> = thread.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "two", "three"]);
    }

    #[test]
    fn test_replace_discards_previous_peer() {
        let mut thread = ThreadStore::new();
        thread.replace("a", vec![Message::outgoing("a", "me", "old")]);
        thread.append(Message::outgoing("me", "a", "unflushed"));

        thread.replace("b", vec![Message::outgoing("b", "me", "fresh")]);
        assert_eq!(thread.peer(), Some("b"));
        assert_eq!(thread.len(), 1);
        assert_eq!(thread.messages()[0].content, "fresh");

        thread.close();
        assert!(thread.peer().is_none());
        assert!(thread.is_empty());
    }
}

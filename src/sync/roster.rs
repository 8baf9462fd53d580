//! Contact roster: ordered conversation peers, most recently active first.

use std::collections::HashSet;

use crate::models::{Contact, Message};

/// Result of applying a message event to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// Peer found, metadata updated and moved to the front.
    Updated,
    /// Peer not in the roster; the caller must refetch the full list.
    UnknownPeer,
}

/// Authoritative in-memory roster for the signed-in user.
#[derive(Debug, Default)]
pub struct RosterStore {
    contacts: Vec<Contact>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster wholesale. Duplicate ids keep their first entry.
    pub fn load(&mut self, initial: Vec<Contact>) {
        let mut seen = HashSet::new();
        self.contacts = initial
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .collect();
    }

    /// Apply a message event for `me`.
    ///
    /// The unread badge is left alone when `is_self` (the current user sent
    /// it) or when the peer's thread is the one currently open.
    pub fn upsert_from_event(
        &mut self,
        event: &Message,
        me: &str,
        current_open_peer_id: Option<&str>,
        is_self: bool,
    ) -> Upsert {
        let peer = event.peer_of(me);
        let Some(pos) = self.contacts.iter().position(|c| c.id == peer) else {
            return Upsert::UnknownPeer;
        };

        let mut contact = self.contacts.remove(pos);
        contact.last_message_text = Some(event.content.clone());
        contact.last_message_timestamp = Some(event.timestamp);
        if !is_self && current_open_peer_id != Some(peer) {
            contact.unread_count = contact.unread_count.saturating_add(1);
        }
        self.contacts.insert(0, contact);
        Upsert::Updated
    }

    /// Reset a peer's unread badge (thread opened).
    pub fn clear_unread(&mut self, peer_id: &str) {
        if let Some(contact) = self.contacts.iter_mut().find(|c| c.id == peer_id) {
            contact.unread_count = 0;
        }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn get(&self, peer_id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == peer_id)
    }

    pub fn position(&self, peer_id: &str) -> Option<usize> {
        self.contacts.iter().position(|c| c.id == peer_id)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn total_unread(&self) -> u32 {
        self.contacts.iter().map(|c| c.unread_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(ids: &[&str]) -> RosterStore {
        let mut store = RosterStore::new();
        store.load(ids.iter().map(|id| Contact::new(*id, id.to_uppercase())).collect());
        store
    }

    fn ids(store: &RosterStore) -> Vec<&str> {
        store.contacts().iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_load_replaces_and_dedups() {
        let mut store = roster(&["a", "b"]);
        store.load(vec![
            Contact::new("c", "C"),
            Contact::new("d", "D"),
            Contact::new("c", "C again"),
        ]);
        assert_eq!(ids(&store), vec!["c", "d"]);
        assert_eq!(store.get("c").unwrap().display_name, "C");
    }

    #[test]
    fn test_inbound_moves_to_front_and_counts() {
        let mut store = roster(&["a", "b", "c"]);
        let msg = Message::outgoing("c", "me", "ping");

        assert_eq!(store.upsert_from_event(&msg, "me", None, false), Upsert::Updated);
        assert_eq!(ids(&store), vec!["c", "a", "b"]);
        let c = store.get("c").unwrap();
        assert_eq!(c.unread_count, 1);
        assert_eq!(c.last_message_text.as_deref(), Some("ping"));
        assert_eq!(c.last_message_timestamp, Some(msg.timestamp));
    }

    #[test]
    fn test_self_sent_never_raises_badge() {
        let mut store = roster(&["a", "b"]);
        let msg = Message::outgoing("me", "b", "hello");

        store.upsert_from_event(&msg, "me", None, true);
        assert_eq!(ids(&store), vec!["b", "a"]);
        assert_eq!(store.get("b").unwrap().unread_count, 0);
    }

    #[test]
    fn test_open_thread_keeps_badge() {
        let mut store = roster(&["a"]);
        let msg = Message::outgoing("a", "me", "hi");

        store.upsert_from_event(&msg, "me", Some("a"), false);
        assert_eq!(store.get("a").unwrap().unread_count, 0);
    }

    #[test]
    fn test_unknown_peer_leaves_roster_alone() {
        let mut store = roster(&["a", "b"]);
        let msg = Message::outgoing("z", "me", "who am i");

        assert_eq!(
            store.upsert_from_event(&msg, "me", None, false),
            Upsert::UnknownPeer
        );
        assert_eq!(ids(&store), vec!["a", "b"]);
        assert_eq!(store.total_unread(), 0);
    }

    #[test]
    fn test_clear_unread() {
        let mut store = roster(&["a", "b"]);
        for _ in 0..3 {
            store.upsert_from_event(&Message::outgoing("b", "me", "x"), "me", None, false);
        }
        assert_eq!(store.get("b").unwrap().unread_count, 3);
        assert_eq!(store.total_unread(), 3);

        store.clear_unread("b");
        assert_eq!(store.get("b").unwrap().unread_count, 0);
        store.clear_unread("missing");
    }
}

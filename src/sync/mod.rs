//! Chat synchronizer: reconciles the fetched roster and thread history with
//! the real-time event stream.
//!
//! All mutation happens on one task, one event at a time. Async fetches are
//! tagged with tickets so a late response for a peer (or roster generation)
//! that is no longer current is dropped instead of overwriting newer state.

pub mod roster;
pub mod thread;
pub mod typing;

use std::time::Instant;

use anyhow::Result;

use crate::error::ClientError;
use crate::models::{Contact, Message};
use crate::realtime::events::ServerEvent;

use roster::{RosterStore, Upsert};
use thread::ThreadStore;
use typing::PeerTyping;

/// Upper bound on locally sent messages still waiting for their echo.
const MAX_PENDING_ECHOES: usize = 64;

/// Side effect the caller must carry out after a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The open thread grew; scroll to the newest message.
    ScrollToLatest,
    /// An event referenced a peer missing from the roster; refetch it.
    RefreshRoster,
    /// A peer started or stopped typing.
    TypingChanged,
}

/// Tag for an in-flight thread history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadTicket {
    pub peer_id: String,
    generation: u64,
}

/// Tag for an in-flight roster fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterTicket {
    generation: u64,
}

#[derive(Debug)]
struct PendingEcho {
    client_id: Option<uuid::Uuid>,
    receiver_id: String,
    content: String,
}

/// Session-scoped chat state for the signed-in user.
#[derive(Debug)]
pub struct ChatSync {
    me: String,
    roster: RosterStore,
    thread: ThreadStore,
    open_peer: Option<String>,
    thread_loading: bool,
    typing: PeerTyping,
    pending_echoes: Vec<PendingEcho>,
    /// Messages appended to the open thread while its history was loading.
    arrived_while_loading: Vec<Message>,
    thread_generation: u64,
    roster_generation: u64,
}

impl ChatSync {
    pub fn new(me: impl Into<String>) -> Self {
        Self {
            me: me.into(),
            roster: RosterStore::new(),
            thread: ThreadStore::new(),
            open_peer: None,
            thread_loading: false,
            typing: PeerTyping::default(),
            pending_echoes: Vec::new(),
            arrived_while_loading: Vec::new(),
            thread_generation: 0,
            roster_generation: 0,
        }
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    pub fn thread(&self) -> &ThreadStore {
        &self.thread
    }

    pub fn open_peer(&self) -> Option<&str> {
        self.open_peer.as_deref()
    }

    pub fn is_thread_loading(&self) -> bool {
        self.thread_loading
    }

    // -- Roster fetches ------------------------------------------------------

    /// Start a roster fetch; only the most recent ticket will be applied.
    pub fn begin_roster_refresh(&mut self) -> RosterTicket {
        self.roster_generation += 1;
        RosterTicket {
            generation: self.roster_generation,
        }
    }

    /// Apply a fetched roster. Returns false if a newer fetch superseded it.
    pub fn apply_roster(&mut self, ticket: RosterTicket, contacts: Vec<Contact>) -> bool {
        if ticket.generation != self.roster_generation {
            tracing::debug!(
                "Dropping stale roster response (gen {} < {})",
                ticket.generation,
                self.roster_generation
            );
            return false;
        }
        self.roster.load(contacts);
        if let Some(ref peer) = self.open_peer {
            self.roster.clear_unread(peer);
        }
        true
    }

    // -- Thread selection ----------------------------------------------------

    /// Open the thread with `peer_id`: discard the previous thread, clear the
    /// peer's badge and hand back a ticket for the history fetch.
    pub fn select_peer(&mut self, peer_id: &str) -> ThreadTicket {
        self.thread_generation += 1;
        self.open_peer = Some(peer_id.to_string());
        self.thread.replace(peer_id, Vec::new());
        self.thread_loading = true;
        self.arrived_while_loading.clear();
        self.roster.clear_unread(peer_id);
        tracing::debug!("Opened thread with {} (gen {})", peer_id, self.thread_generation);
        ThreadTicket {
            peer_id: peer_id.to_string(),
            generation: self.thread_generation,
        }
    }

    /// Apply fetched history. Returns false if the user has since moved on.
    ///
    /// Messages that arrived or were sent while the fetch was in flight are
    /// kept after the history unless the history already contains them.
    pub fn apply_history(&mut self, ticket: &ThreadTicket, history: Vec<Message>) -> bool {
        let current = self.open_peer.as_deref() == Some(ticket.peer_id.as_str())
            && ticket.generation == self.thread_generation;
        if !current {
            tracing::debug!("Dropping stale history for {}", ticket.peer_id);
            return false;
        }
        let arrived = std::mem::take(&mut self.arrived_while_loading);
        let missing: Vec<Message> = arrived
            .into_iter()
            .filter(|m| !history.iter().any(|h| same_message(h, m)))
            .collect();
        if !missing.is_empty() {
            tracing::debug!(
                "Keeping {} message(s) received during history load for {}",
                missing.len(),
                ticket.peer_id
            );
        }
        self.thread.replace(&ticket.peer_id, history);
        for msg in missing {
            self.thread.append(msg);
        }
        self.thread_loading = false;
        true
    }

    /// Mark a history fetch as finished without data (fetch failed).
    pub fn abandon_history(&mut self, ticket: &ThreadTicket) {
        if ticket.generation == self.thread_generation {
            self.thread_loading = false;
            self.arrived_while_loading.clear();
        }
    }

    pub fn close_thread(&mut self) {
        self.thread_generation += 1;
        self.open_peer = None;
        self.thread_loading = false;
        self.arrived_while_loading.clear();
        self.thread.close();
    }

    /// Append to the open thread, remembering the message if history is
    /// still loading.
    fn append_to_thread(&mut self, msg: Message) {
        if self.thread_loading {
            self.arrived_while_loading.push(msg.clone());
        }
        self.thread.append(msg);
    }

    // -- Events --------------------------------------------------------------

    /// Single entry point for inbound real-time events.
    pub fn apply_event(&mut self, event: &ServerEvent, now: Instant) -> Vec<Effect> {
        match event {
            ServerEvent::ReceiveMessage(msg) => self.apply_message(msg),
            ServerEvent::Typing(notice) => {
                if notice.receiver_id != self.me {
                    return Vec::new();
                }
                self.typing.mark(&notice.sender_id, now);
                vec![Effect::TypingChanged]
            }
            ServerEvent::StopTyping(notice) => {
                if notice.receiver_id != self.me {
                    return Vec::new();
                }
                if self.typing.clear(&notice.sender_id) {
                    vec![Effect::TypingChanged]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn apply_message(&mut self, msg: &Message) -> Vec<Effect> {
        if msg.sender_id != self.me && msg.receiver_id != self.me {
            tracing::warn!(
                "Ignoring message not addressed to us ({} -> {})",
                msg.sender_id,
                msg.receiver_id
            );
            return Vec::new();
        }
        if msg.content.trim().is_empty() {
            tracing::warn!("Ignoring empty message from {}", msg.sender_id);
            return Vec::new();
        }
        if self.take_echo(msg) {
            tracing::debug!("Ignoring echo of our own message to {}", msg.receiver_id);
            return Vec::new();
        }

        let is_self = msg.is_from(&self.me);
        let peer = msg.peer_of(&self.me).to_string();
        let mut effects = Vec::new();

        if !is_self && self.typing.clear(&peer) {
            effects.push(Effect::TypingChanged);
        }

        if self
            .roster
            .upsert_from_event(msg, &self.me, self.open_peer.as_deref(), is_self)
            == Upsert::UnknownPeer
        {
            tracing::info!("Message from unknown peer {}, refreshing roster", peer);
            effects.push(Effect::RefreshRoster);
        }

        if self.open_peer.as_deref() == Some(peer.as_str()) {
            self.append_to_thread(msg.clone());
            effects.push(Effect::ScrollToLatest);
        }

        effects
    }

    /// Build a message to `peer_id`, append it locally and remember it so the
    /// server's echo is not shown twice.
    pub fn compose_outgoing(
        &mut self,
        peer_id: &str,
        content: &str,
    ) -> Result<(Message, Vec<Effect>)> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::Validation("message is empty".to_string()).into());
        }
        if peer_id == self.me {
            return Err(ClientError::Validation("cannot message yourself".to_string()).into());
        }

        let msg = Message::outgoing(&self.me, peer_id, content);
        let mut effects = Vec::new();

        if self
            .roster
            .upsert_from_event(&msg, &self.me, self.open_peer.as_deref(), true)
            == Upsert::UnknownPeer
        {
            effects.push(Effect::RefreshRoster);
        }
        if self.open_peer.as_deref() == Some(peer_id) {
            self.append_to_thread(msg.clone());
            effects.push(Effect::ScrollToLatest);
        }

        if self.pending_echoes.len() >= MAX_PENDING_ECHOES {
            self.pending_echoes.remove(0);
        }
        self.pending_echoes.push(PendingEcho {
            client_id: msg.client_id,
            receiver_id: msg.receiver_id.clone(),
            content: msg.content.clone(),
        });

        Ok((msg, effects))
    }

    fn take_echo(&mut self, msg: &Message) -> bool {
        if msg.sender_id != self.me {
            return false;
        }
        let pos = match msg.client_id {
            Some(id) => self
                .pending_echoes
                .iter()
                .position(|p| p.client_id == Some(id)),
            None => self
                .pending_echoes
                .iter()
                .position(|p| p.receiver_id == msg.receiver_id && p.content == msg.content),
        };
        match pos {
            Some(i) => {
                self.pending_echoes.remove(i);
                true
            }
            None => false,
        }
    }

    // -- Typing --------------------------------------------------------------

    pub fn is_peer_typing(&self, peer_id: &str, now: Instant) -> bool {
        self.typing.is_typing(peer_id, now)
    }

    /// Expire stale typing flags. Returns true if the display should change.
    pub fn expire_typing(&mut self, now: Instant) -> bool {
        self.typing.expire(now)
    }
}

/// Whether a fetched history entry and a live message are the same message.
fn same_message(a: &Message, b: &Message) -> bool {
    match (a.client_id, b.client_id) {
        (Some(x), Some(y)) => x == y,
        _ => {
            a.sender_id == b.sender_id
                && a.receiver_id == b.receiver_id
                && a.content == b.content
                && a.timestamp == b.timestamp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TypingNotice;

    fn sync_with(ids: &[&str]) -> ChatSync {
        let mut sync = ChatSync::new("me");
        let ticket = sync.begin_roster_refresh();
        assert!(sync.apply_roster(
            ticket,
            ids.iter().map(|id| Contact::new(*id, *id)).collect()
        ));
        sync
    }

    fn inbound(from: &str, text: &str) -> ServerEvent {
        ServerEvent::ReceiveMessage(Message {
            sender_id: from.to_string(),
            receiver_id: "me".to_string(),
            content: text.to_string(),
            timestamp: chrono::Utc::now(),
            client_id: None,
        })
    }

    fn unread(sync: &ChatSync, id: &str) -> u32 {
        sync.roster().get(id).unwrap().unread_count
    }

    #[test]
    fn test_inbound_with_no_thread_open() {
        let mut sync = sync_with(&["A"]);
        let effects = sync.apply_event(&inbound("A", "hi"), Instant::now());

        assert!(effects.is_empty());
        assert_eq!(unread(&sync, "A"), 1);
        assert_eq!(sync.roster().position("A"), Some(0));
        assert!(sync.thread().is_empty());
    }

    #[test]
    fn test_inbound_for_open_thread_appends() {
        let mut sync = sync_with(&["A"]);
        let ticket = sync.select_peer("A");
        assert!(sync.apply_history(&ticket, Vec::new()));

        let effects = sync.apply_event(&inbound("A", "hi"), Instant::now());
        assert_eq!(effects, vec![Effect::ScrollToLatest]);
        assert_eq!(sync.thread().len(), 1);
        assert_eq!(sync.thread().messages()[0].content, "hi");
        assert_eq!(unread(&sync, "A"), 0);
    }

    #[test]
    fn test_unknown_peer_requests_refresh() {
        let mut sync = sync_with(&["A"]);
        let effects = sync.apply_event(&inbound("Z", "hello?"), Instant::now());

        assert_eq!(effects, vec![Effect::RefreshRoster]);
        assert_eq!(sync.roster().len(), 1);
        assert_eq!(unread(&sync, "A"), 0);
    }

    #[test]
    fn test_switching_peer_replaces_thread() {
        let mut sync = sync_with(&["A", "B"]);
        let a = sync.select_peer("A");
        sync.apply_history(&a, vec![Message::outgoing("A", "me", "from A")]);
        sync.apply_event(&inbound("A", "live"), Instant::now());
        assert_eq!(sync.thread().len(), 2);

        let b = sync.select_peer("B");
        assert_eq!(sync.thread().peer(), Some("B"));
        assert!(sync.thread().is_empty());
        assert!(sync.is_thread_loading());

        assert!(sync.apply_history(&b, vec![Message::outgoing("B", "me", "from B")]));
        assert_eq!(sync.thread().len(), 1);
        assert_eq!(sync.thread().messages()[0].content, "from B");
        assert!(!sync.is_thread_loading());
    }

    #[test]
    fn test_late_history_for_previous_peer_is_dropped() {
        let mut sync = sync_with(&["A", "B"]);
        let a = sync.select_peer("A");
        let b = sync.select_peer("B");

        assert!(!sync.apply_history(&a, vec![Message::outgoing("A", "me", "stale")]));
        assert!(sync.thread().is_empty());
        assert!(sync.apply_history(&b, Vec::new()));

        // Reopening A issues a new generation; the old A ticket stays stale.
        let _a2 = sync.select_peer("A");
        assert!(!sync.apply_history(&a, vec![Message::outgoing("A", "me", "stale")]));
    }

    #[test]
    fn test_stale_roster_response_is_dropped() {
        let mut sync = ChatSync::new("me");
        let first = sync.begin_roster_refresh();
        let second = sync.begin_roster_refresh();

        assert!(sync.apply_roster(second, vec![Contact::new("new", "New")]));
        assert!(!sync.apply_roster(first, vec![Contact::new("old", "Old")]));
        assert!(sync.roster().get("old").is_none());
        assert!(sync.roster().get("new").is_some());
    }

    #[test]
    fn test_thread_length_matches_events_for_open_peer() {
        let mut sync = sync_with(&["A", "B", "C"]);
        let ticket = sync.select_peer("B");
        sync.apply_history(&ticket, Vec::new());

        let senders = ["A", "B", "C", "B", "B", "A", "B"];
        for (i, from) in senders.iter().enumerate() {
            sync.apply_event(&inbound(from, &format!("m{}", i)), Instant::now());
        }

        let expected: Vec<String> = senders
            .iter()
            .enumerate()
            .filter(|(_, from)| **from == "B")
            .map(|(i, _)| format!("m{}", i))
            .collect();
        let got: Vec<String> = sync
            .thread()
            .messages()
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(got, expected);
        assert_eq!(unread(&sync, "A"), 2);
        assert_eq!(unread(&sync, "B"), 0);
        assert_eq!(unread(&sync, "C"), 1);
        assert_eq!(sync.roster().position("A"), Some(0));
    }

    #[test]
    fn test_self_sent_from_other_device_never_raises_badge() {
        let mut sync = sync_with(&["A", "B"]);
        let other_device = ServerEvent::ReceiveMessage(Message {
            sender_id: "me".to_string(),
            receiver_id: "B".to_string(),
            content: "sent from phone".to_string(),
            timestamp: chrono::Utc::now(),
            client_id: None,
        });

        sync.apply_event(&other_device, Instant::now());
        assert_eq!(unread(&sync, "B"), 0);
        assert_eq!(sync.roster().position("B"), Some(0));
    }

    #[test]
    fn test_send_appends_locally_and_ignores_echo() {
        let mut sync = sync_with(&["A"]);
        let ticket = sync.select_peer("A");
        sync.apply_history(&ticket, Vec::new());

        let (msg, effects) = sync.compose_outgoing("A", "  hello  ").unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(effects, vec![Effect::ScrollToLatest]);
        assert_eq!(sync.thread().len(), 1);

        let echo = ServerEvent::ReceiveMessage(msg.clone());
        assert!(sync.apply_event(&echo, Instant::now()).is_empty());
        assert_eq!(sync.thread().len(), 1);

        // A second copy is no longer pending and is shown as a self event.
        sync.apply_event(&echo, Instant::now());
        assert_eq!(sync.thread().len(), 2);
        assert_eq!(unread(&sync, "A"), 0);
    }

    #[test]
    fn test_echo_without_client_id_matches_on_content() {
        let mut sync = sync_with(&["A"]);
        let ticket = sync.select_peer("A");
        sync.apply_history(&ticket, Vec::new());
        let (mut msg, _) = sync.compose_outgoing("A", "ping").unwrap();

        msg.client_id = None;
        assert!(sync
            .apply_event(&ServerEvent::ReceiveMessage(msg), Instant::now())
            .is_empty());
        assert_eq!(sync.thread().len(), 1);
    }

    #[test]
    fn test_send_to_closed_thread_updates_roster_only() {
        let mut sync = sync_with(&["A", "B"]);
        let (_, effects) = sync.compose_outgoing("B", "later").unwrap();

        assert!(effects.is_empty());
        assert!(sync.thread().is_empty());
        let b = sync.roster().get("B").unwrap();
        assert_eq!(b.last_message_text.as_deref(), Some("later"));
        assert_eq!(b.unread_count, 0);
        assert_eq!(sync.roster().position("B"), Some(0));
    }

    #[test]
    fn test_empty_send_is_rejected() {
        let mut sync = sync_with(&["A"]);
        let err = sync.compose_outgoing("A", "   ").unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(ClientError::Validation(_))
        ));
        assert!(sync.compose_outgoing("me", "hi").is_err());
    }

    #[test]
    fn test_opening_thread_clears_badge() {
        let mut sync = sync_with(&["A"]);
        sync.apply_event(&inbound("A", "1"), Instant::now());
        sync.apply_event(&inbound("A", "2"), Instant::now());
        assert_eq!(unread(&sync, "A"), 2);

        sync.select_peer("A");
        assert_eq!(unread(&sync, "A"), 0);
    }

    #[test]
    fn test_typing_flag_lifecycle() {
        let now = Instant::now();
        let mut sync = sync_with(&["A"]);
        let notice = TypingNotice {
            sender_id: "A".to_string(),
            receiver_id: "me".to_string(),
        };

        assert_eq!(
            sync.apply_event(&ServerEvent::Typing(notice.clone()), now),
            vec![Effect::TypingChanged]
        );
        assert!(sync.is_peer_typing("A", now));

        // A message from the peer ends its typing state.
        let effects = sync.apply_event(&inbound("A", "done"), now);
        assert!(effects.contains(&Effect::TypingChanged));
        assert!(!sync.is_peer_typing("A", now));

        sync.apply_event(&ServerEvent::Typing(notice.clone()), now);
        assert_eq!(
            sync.apply_event(&ServerEvent::StopTyping(notice.clone()), now),
            vec![Effect::TypingChanged]
        );
        assert!(sync
            .apply_event(&ServerEvent::StopTyping(notice), now)
            .is_empty());
    }

    fn contents(sync: &ChatSync) -> Vec<&str> {
        sync.thread()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect()
    }

    #[test]
    fn test_inbound_during_history_load_survives() {
        let mut sync = sync_with(&["A"]);
        let ticket = sync.select_peer("A");
        sync.apply_event(&inbound("A", "live"), Instant::now());

        let mut old = Message::outgoing("A", "me", "old");
        old.client_id = None;
        assert!(sync.apply_history(&ticket, vec![old]));
        assert_eq!(contents(&sync), vec!["old", "live"]);
        assert!(!sync.is_thread_loading());
    }

    #[test]
    fn test_send_during_history_load_survives_echo() {
        let mut sync = sync_with(&["A"]);
        let ticket = sync.select_peer("A");
        let (msg, _) = sync.compose_outgoing("A", "mine").unwrap();

        assert!(sync.apply_history(&ticket, Vec::new()));
        assert_eq!(contents(&sync), vec!["mine"]);

        let echo = ServerEvent::ReceiveMessage(msg);
        assert!(sync.apply_event(&echo, Instant::now()).is_empty());
        assert_eq!(contents(&sync), vec!["mine"]);
    }

    #[test]
    fn test_history_already_holding_live_message_is_not_duplicated() {
        let mut sync = sync_with(&["A"]);
        let ticket = sync.select_peer("A");
        let live = Message::outgoing("A", "me", "both");
        sync.apply_event(&ServerEvent::ReceiveMessage(live.clone()), Instant::now());

        // The server stored it before answering the history request.
        assert!(sync.apply_history(&ticket, vec![live]));
        assert_eq!(contents(&sync), vec!["both"]);
    }

    #[test]
    fn test_buffer_does_not_leak_into_next_peer() {
        let mut sync = sync_with(&["A", "B"]);
        let _a = sync.select_peer("A");
        sync.apply_event(&inbound("A", "for A"), Instant::now());

        let b = sync.select_peer("B");
        assert!(sync.apply_history(&b, Vec::new()));
        assert!(sync.thread().is_empty());
    }

    #[test]
    fn test_stop_typing_for_someone_else_is_ignored() {
        let now = Instant::now();
        let mut sync = sync_with(&["A"]);
        sync.apply_event(
            &ServerEvent::Typing(TypingNotice {
                sender_id: "A".to_string(),
                receiver_id: "me".to_string(),
            }),
            now,
        );

        let stray = ServerEvent::StopTyping(TypingNotice {
            sender_id: "A".to_string(),
            receiver_id: "B".to_string(),
        });
        assert!(sync.apply_event(&stray, now).is_empty());
        assert!(sync.is_peer_typing("A", now));
    }

    #[test]
    fn test_empty_inbound_message_is_ignored() {
        let mut sync = sync_with(&["A"]);
        let ticket = sync.select_peer("A");
        sync.apply_history(&ticket, Vec::new());

        assert!(sync.apply_event(&inbound("A", "  "), Instant::now()).is_empty());
        assert!(sync.thread().is_empty());
        assert!(sync.roster().get("A").unwrap().last_message_text.is_none());
    }

    #[test]
    fn test_message_for_someone_else_is_ignored() {
        let mut sync = sync_with(&["A"]);
        let stray = ServerEvent::ReceiveMessage(Message::outgoing("A", "B", "not yours"));
        assert!(sync.apply_event(&stray, Instant::now()).is_empty());
        assert_eq!(unread(&sync, "A"), 0);
    }
}

//! Typing indicators: transient, never persisted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a typing flag or keystroke burst stays alive without activity.
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(2);

/// Which peers are currently typing to us.
#[derive(Debug, Default)]
pub struct PeerTyping {
    last_seen: HashMap<String, Instant>,
}

impl PeerTyping {
    pub fn mark(&mut self, peer_id: &str, now: Instant) {
        self.last_seen.insert(peer_id.to_string(), now);
    }

    /// Explicit stop. Returns true if the peer was flagged.
    pub fn clear(&mut self, peer_id: &str) -> bool {
        self.last_seen.remove(peer_id).is_some()
    }

    pub fn is_typing(&self, peer_id: &str, now: Instant) -> bool {
        self.last_seen
            .get(peer_id)
            .is_some_and(|seen| now.saturating_duration_since(*seen) < TYPING_TIMEOUT)
    }

    /// Drop flags older than the timeout. Returns true if any were dropped.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.last_seen.len();
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < TYPING_TIMEOUT);
        self.last_seen.len() != before
    }
}

/// Outbound typing signal to emit on the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Debounces local keystrokes into start/stop signals.
#[derive(Debug, Default)]
pub struct TypingDebouncer {
    last_keystroke: Option<Instant>,
}

impl TypingDebouncer {
    /// Record a keystroke. Emits `Start` only at the beginning of a burst.
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let started = self.last_keystroke.is_none();
        self.last_keystroke = Some(now);
        started.then_some(TypingSignal::Start)
    }

    /// Emits `Stop` once the burst has been idle for the timeout.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        let last = self.last_keystroke?;
        if now.saturating_duration_since(last) >= TYPING_TIMEOUT {
            self.last_keystroke = None;
            Some(TypingSignal::Stop)
        } else {
            None
        }
    }

    /// End the burst immediately (message sent, peer switched).
    pub fn reset(&mut self) -> Option<TypingSignal> {
        self.last_keystroke.take().map(|_| TypingSignal::Stop)
    }

    pub fn is_active(&self) -> bool {
        self.last_keystroke.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_flag_expires() {
        let t0 = Instant::now();
        let mut typing = PeerTyping::default();
        typing.mark("a", t0);

        assert!(typing.is_typing("a", t0 + Duration::from_millis(1500)));
        assert!(!typing.is_typing("a", t0 + TYPING_TIMEOUT));
        assert!(!typing.is_typing("b", t0));

        assert!(!typing.expire(t0 + Duration::from_secs(1)));
        assert!(typing.expire(t0 + Duration::from_secs(3)));
        assert!(!typing.clear("a"));
    }

    #[test]
    fn test_peer_flag_refreshed_by_new_signal() {
        let t0 = Instant::now();
        let mut typing = PeerTyping::default();
        typing.mark("a", t0);
        typing.mark("a", t0 + Duration::from_millis(1800));
        assert!(typing.is_typing("a", t0 + Duration::from_millis(3000)));

        assert!(typing.clear("a"));
        assert!(!typing.is_typing("a", t0 + Duration::from_millis(3000)));
    }

    #[test]
    fn test_debouncer_burst() {
        let t0 = Instant::now();
        let mut deb = TypingDebouncer::default();

        assert_eq!(deb.keystroke(t0), Some(TypingSignal::Start));
        assert_eq!(deb.keystroke(t0 + Duration::from_millis(500)), None);
        assert_eq!(deb.poll(t0 + Duration::from_millis(2000)), None);
        assert_eq!(
            deb.poll(t0 + Duration::from_millis(2500)),
            Some(TypingSignal::Stop)
        );
        assert_eq!(deb.poll(t0 + Duration::from_secs(10)), None);

        // New burst starts again.
        assert_eq!(
            deb.keystroke(t0 + Duration::from_secs(11)),
            Some(TypingSignal::Start)
        );
        assert_eq!(deb.reset(), Some(TypingSignal::Stop));
        assert_eq!(deb.reset(), None);
        assert!(!deb.is_active());
    }
}

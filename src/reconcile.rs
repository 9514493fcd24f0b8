//! Reconciliation of optimistic and confirmed messages
//!
//! Merges the store's confirmed feed with the locally held pending set into
//! one duplicate-free, correctly ordered view. Promotion is keyed on the
//! exact client id, so it is O(1) and unambiguous even for two
//! near-simultaneous identical messages. This is a pure merge structure: it
//! never raises errors.

use crate::models::{Message, MessageStatus};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct Reconciler {
    // client_id -> optimistic message, status Sending or Failed
    pending: HashMap<String, Message>,
    confirmed: Vec<Message>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold an optimistic message until its confirmed counterpart appears.
    pub fn track(&mut self, message: Message) {
        self.pending.insert(message.message_id.clone(), message);
    }

    /// Take the latest confirmed snapshot and promote: every pending entry
    /// whose id now appears in the snapshot is retired, since the confirmed
    /// copy supersedes it.
    pub fn observe(&mut self, confirmed: Vec<Message>) {
        for message in &confirmed {
            self.pending.remove(&message.message_id);
        }
        self.confirmed = confirmed;
    }

    /// Flip a pending entry to `Failed`. It stays in the set, visible and
    /// ordered in place, until retried or discarded.
    pub fn mark_failed(&mut self, client_id: &str) -> bool {
        match self.pending.get_mut(client_id) {
            Some(message) => {
                message.status = MessageStatus::Failed;
                true
            }
            None => false,
        }
    }

    /// Flip a failed entry back to `Sending` for a retry attempt.
    pub fn mark_sending(&mut self, client_id: &str) -> bool {
        match self.pending.get_mut(client_id) {
            Some(message) => {
                message.status = MessageStatus::Sending;
                true
            }
            None => false,
        }
    }

    pub fn pending(&self, client_id: &str) -> Option<&Message> {
        self.pending.get(client_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop a pending entry without sending it.
    pub fn discard(&mut self, client_id: &str) -> Option<Message> {
        self.pending.remove(client_id)
    }

    /// Confirmed ∪ pending, de-duplicated by message id keeping the confirmed
    /// copy, sorted newest first. The id tie-break keeps equal-timestamp
    /// messages in a stable order.
    pub fn merged(&self) -> Vec<Message> {
        let mut seen = HashSet::new();
        let mut merged: Vec<Message> = Vec::with_capacity(self.confirmed.len() + self.pending.len());

        for message in self.confirmed.iter().chain(self.pending.values()) {
            if seen.insert(message.message_id.clone()) {
                merged.push(message.clone());
            }
        }

        merged.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.message_id.cmp(&a.message_id))
        });
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: &str, created_at: i64) -> Message {
        let mut m = Message::compose("c", "alice", "bob", "hello", id, None).unwrap();
        m.created_at = created_at;
        m
    }

    fn confirmed(id: &str, created_at: i64) -> Message {
        let mut m = pending(id, created_at);
        m.status = MessageStatus::Sent;
        m
    }

    #[test]
    fn confirmation_promotes_pending_entries() {
        let mut reconciler = Reconciler::new();
        reconciler.track(pending("m1", 10));
        assert_eq!(reconciler.pending_count(), 1);

        reconciler.observe(vec![confirmed("m1", 10)]);
        assert_eq!(reconciler.pending_count(), 0);

        let merged = reconciler.merged();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, MessageStatus::Sent);
    }

    #[test]
    fn merged_view_never_duplicates_or_drops_a_message() {
        let mut reconciler = Reconciler::new();
        reconciler.track(pending("m1", 10));

        // The feed refreshing repeatedly must not change the outcome.
        for _ in 0..3 {
            reconciler.observe(vec![confirmed("m1", 10)]);
            let merged = reconciler.merged();
            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].message_id, "m1");
        }
    }

    #[test]
    fn confirmed_copy_wins_when_both_exist() {
        let mut reconciler = Reconciler::new();
        // Safety net: a pending entry that promotion somehow missed.
        reconciler.track(pending("m1", 10));
        reconciler.confirmed = vec![confirmed("m1", 10)];

        let merged = reconciler.merged();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, MessageStatus::Sent);
    }

    #[test]
    fn merge_orders_newest_first_with_stable_tie_break() {
        let mut reconciler = Reconciler::new();
        reconciler.observe(vec![confirmed("a", 20), confirmed("b", 20), confirmed("c", 30)]);
        reconciler.track(pending("d", 25));

        let merged = reconciler.merged();
        let ids: Vec<&str> = merged.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "b", "a"]);
    }

    #[test]
    fn failed_entry_stays_in_place_until_discarded() {
        let mut reconciler = Reconciler::new();
        reconciler.track(pending("m1", 10));
        assert!(reconciler.mark_failed("m1"));

        reconciler.observe(vec![confirmed("m2", 20)]);
        let merged = reconciler.merged();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].message_id, "m1");
        assert_eq!(merged[1].status, MessageStatus::Failed);

        assert!(reconciler.discard("m1").is_some());
        assert_eq!(reconciler.merged().len(), 1);
    }

    #[test]
    fn retry_flips_failed_back_to_sending() {
        let mut reconciler = Reconciler::new();
        reconciler.track(pending("m1", 10));
        reconciler.mark_failed("m1");
        assert!(reconciler.mark_sending("m1"));
        assert_eq!(reconciler.pending("m1").unwrap().status, MessageStatus::Sending);

        assert!(!reconciler.mark_sending("ghost"));
    }
}

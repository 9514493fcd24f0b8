//! In-process reference store
//!
//! Implements both collaborator traits over a single mutex-guarded document
//! tree, which gives every operation the per-batch atomicity the contracts
//! ask for. Feeds are republished after each mutation.

use crate::error::{Error, Result};
use crate::models::{Conversation, LastMessage, Message, MessageStatus};
use crate::store::{ConversationDirectory, MessageFeed, MessageStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::watch;

struct ConversationFeed {
    conversation_id: String,
    limit: usize,
    tx: watch::Sender<Vec<Message>>,
}

struct InboundFeed {
    recipient_id: String,
    limit: usize,
    tx: watch::Sender<Vec<Message>>,
}

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    // conversation_id -> message_id -> message
    messages: HashMap<String, HashMap<String, Message>>,
    conversation_feeds: Vec<ConversationFeed>,
    inbound_feeds: Vec<InboundFeed>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages of one conversation, newest first, stable under equal timestamps.
fn conversation_snapshot(inner: &Inner, conversation_id: &str) -> Vec<Message> {
    let mut messages: Vec<Message> = inner
        .messages
        .get(conversation_id)
        .map(|docs| docs.values().cloned().collect())
        .unwrap_or_default();
    messages.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.message_id.cmp(&a.message_id))
    });
    messages
}

/// Inbound messages still at `sent` for one recipient, across conversations.
fn inbound_snapshot(inner: &Inner, recipient_id: &str, limit: usize) -> Vec<Message> {
    let mut messages: Vec<Message> = inner
        .messages
        .values()
        .flat_map(|docs| docs.values())
        .filter(|m| m.recipient_id == recipient_id && m.status == MessageStatus::Sent)
        .cloned()
        .collect();
    messages.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.message_id.cmp(&a.message_id))
    });
    messages.truncate(limit);
    messages
}

/// Push fresh snapshots to every live subscriber touched by a mutation in
/// `conversation_id`. Closed feeds are pruned on the way.
fn publish(inner: &mut Inner, conversation_id: &str) {
    inner.conversation_feeds.retain(|f| !f.tx.is_closed());
    inner.inbound_feeds.retain(|f| !f.tx.is_closed());

    let full = conversation_snapshot(inner, conversation_id);
    for feed in inner
        .conversation_feeds
        .iter()
        .filter(|f| f.conversation_id == conversation_id)
    {
        let mut snapshot = full.clone();
        snapshot.truncate(feed.limit);
        feed.tx.send_replace(snapshot);
    }

    for feed in inner.inbound_feeds.iter() {
        let snapshot = inbound_snapshot(inner, &feed.recipient_id, feed.limit);
        feed.tx.send_replace(snapshot);
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock();

        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(Error::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }

        let conversation_id = message.conversation_id.clone();
        let docs = inner.messages.entry(conversation_id.clone()).or_default();

        // Monotonic upsert: a duplicate write must not pull back a status a
        // sweep has already advanced.
        match docs.get(&message.message_id) {
            Some(existing) if existing.status.rank() > message.status.rank() => {}
            _ => {
                docs.insert(message.message_id.clone(), message.clone());
            }
        }

        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .expect("checked above");
        if message.created_at >= conversation.last_message_at.unwrap_or(i64::MIN) {
            conversation.last_message = Some(LastMessage {
                body: message.preview(),
                sender_id: message.sender_id.clone(),
                created_at: message.created_at,
            });
            conversation.last_message_at = Some(message.created_at);
        }

        publish(&mut inner, &conversation_id);
        Ok(())
    }

    async fn replace(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock();

        let conversation_id = message.conversation_id.clone();
        let docs = inner
            .messages
            .get_mut(&conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))?;
        if !docs.contains_key(&message.message_id) {
            return Err(Error::NotFound(format!("message {}", message.message_id)));
        }
        docs.insert(message.message_id.clone(), message);

        publish(&mut inner, &conversation_id);
        Ok(())
    }

    async fn get(&self, conversation_id: &str, message_id: &str) -> Result<Option<Message>> {
        let inner = self.inner.lock();
        Ok(inner
            .messages
            .get(conversation_id)
            .and_then(|docs| docs.get(message_id))
            .cloned())
    }

    async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let inner = self.inner.lock();
        let mut snapshot = conversation_snapshot(&inner, conversation_id);
        snapshot.truncate(limit);
        Ok(snapshot)
    }

    async fn update_status_batch(
        &self,
        conversation_id: &str,
        message_ids: &[String],
        status: MessageStatus,
        at: i64,
    ) -> Result<()> {
        let mut inner = self.inner.lock();

        let Some(docs) = inner.messages.get_mut(conversation_id) else {
            // Nothing to transition; idempotent batches treat this as a no-op.
            return Ok(());
        };

        let mut changed = false;
        for message_id in message_ids {
            let Some(message) = docs.get_mut(message_id) else {
                continue;
            };
            if !message.status.can_advance_to(status) {
                continue;
            }
            message.status = status;
            if message.delivered_at.is_none() && status.rank() >= MessageStatus::Delivered.rank() {
                message.delivered_at = Some(at);
            }
            if message.seen_at.is_none() && status == MessageStatus::Seen {
                message.seen_at = Some(at);
            }
            changed = true;
        }

        if changed {
            publish(&mut inner, conversation_id);
        }
        Ok(())
    }

    fn watch_conversation(&self, conversation_id: &str, limit: usize) -> MessageFeed {
        let mut inner = self.inner.lock();
        let mut snapshot = conversation_snapshot(&inner, conversation_id);
        snapshot.truncate(limit);
        let (tx, rx) = watch::channel(snapshot);
        inner.conversation_feeds.push(ConversationFeed {
            conversation_id: conversation_id.to_string(),
            limit,
            tx,
        });
        rx
    }

    fn watch_inbound(&self, recipient_id: &str, limit: usize) -> MessageFeed {
        let mut inner = self.inner.lock();
        let snapshot = inbound_snapshot(&inner, recipient_id, limit);
        let (tx, rx) = watch::channel(snapshot);
        inner.inbound_feeds.push(InboundFeed {
            recipient_id: recipient_id.to_string(),
            limit,
            tx,
        });
        rx
    }
}

#[async_trait]
impl ConversationDirectory for MemoryStore {
    async fn ensure(&self, conversation: Conversation) -> Result<String> {
        let mut inner = self.inner.lock();
        let conversation_id = conversation.conversation_id.clone();

        match inner.conversations.entry(conversation_id.clone()) {
            Entry::Occupied(mut entry) => {
                // Re-ensure refreshes membership and profiles only.
                let existing = entry.get_mut();
                existing.members = conversation.members;
                existing.member_profiles = conversation.member_profiles;
            }
            Entry::Vacant(entry) => {
                entry.insert(conversation);
            }
        }

        Ok(conversation_id)
    }

    async fn list_for(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let inner = self.inner.lock();
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.members.iter().any(|m| m == user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(conversations)
    }
}

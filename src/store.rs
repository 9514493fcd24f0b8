//! Storage collaborator contracts
//!
//! The tracker is storage and transport agnostic: any document-oriented
//! store with per-conversation subscriptions and batched atomic status
//! updates satisfies these traits. Live feeds are `tokio::sync::watch`
//! receivers carrying the latest snapshot, newest first; dropping the
//! receiver is the unsubscribe.

use crate::error::Result;
use crate::models::{Conversation, Message, MessageStatus};
use async_trait::async_trait;
use tokio::sync::watch;

/// Latest confirmed snapshot of a message query, most recent first.
pub type MessageFeed = watch::Receiver<Vec<Message>>;

/// Durable, ordered collection of messages per conversation.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Upsert a message keyed by (`conversation_id`, `message_id`) and
    /// atomically refresh the owning conversation's `last_message` cache if
    /// this message is the newest. A reader must never observe the message
    /// without the cache update, or vice versa.
    ///
    /// A duplicate append with the same id (a retry that missed the first
    /// acknowledgment) overwrites in place and must not regress a status
    /// that has already advanced past `sent`.
    async fn append(&self, message: Message) -> Result<()>;

    /// Replace an existing message without touching the conversation cache.
    /// Errors with `NotFound` if the message does not exist.
    async fn replace(&self, message: Message) -> Result<()>;

    async fn get(&self, conversation_id: &str, message_id: &str) -> Result<Option<Message>>;

    /// Most recent messages of a conversation, newest first.
    async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// Batch status transition. A message is modified only if its current
    /// status rank is strictly below the target rank, so redundant and
    /// out-of-order sweeps are no-ops. `delivered_at` is set once when rank
    /// first reaches delivered-or-later, `seen_at` once at seen. Unknown ids
    /// are skipped.
    async fn update_status_batch(
        &self,
        conversation_id: &str,
        message_ids: &[String],
        status: MessageStatus,
        at: i64,
    ) -> Result<()>;

    /// Subscribe to a conversation's confirmed messages.
    fn watch_conversation(&self, conversation_id: &str, limit: usize) -> MessageFeed;

    /// Subscribe to messages addressed to `recipient_id` that are still at
    /// `sent`, across all conversations. Drives the global delivery sweep.
    fn watch_inbound(&self, recipient_id: &str, limit: usize) -> MessageFeed;
}

/// Maps a pair of participants to a canonical conversation record.
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    /// Idempotent upsert: creates the conversation if absent, otherwise
    /// merges `members` and `member_profiles` into the existing record
    /// without touching the `last_message` cache.
    async fn ensure(&self, conversation: Conversation) -> Result<String>;

    /// Conversations the given user participates in, most recent first.
    async fn list_for(&self, user_id: &str) -> Result<Vec<Conversation>>;
}

//! Message delivery state machine
//!
//! Owns the per-message lifecycle (sending → sent → delivered → seen, with a
//! failed branch) and the transition operations over the store collaborators.
//! The durable write itself is the sent-confirmation boundary: there is no
//! separate "sending" record on the store side.

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::models::{now_millis, Conversation, Message, MessageStatus, Reaction};
use crate::store::{ConversationDirectory, MessageStore};
use std::sync::Arc;

pub struct DeliveryTracker {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn ConversationDirectory>,
    config: TrackerConfig,
}

impl DeliveryTracker {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn ConversationDirectory>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn ConversationDirectory> {
        &self.directory
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Durably write an outgoing message at status `Sent`, ensuring the
    /// conversation record first. The message keeps its client-assigned id
    /// and compose-time `created_at`, so a retry that races a missed
    /// acknowledgment degenerates into an idempotent overwrite.
    ///
    /// Store failures are returned to the caller; the session layer flips
    /// the optimistic copy to `Failed` and waits for an explicit retry.
    pub async fn send(&self, conversation: &Conversation, mut message: Message) -> Result<String> {
        let body = message.body.trim().to_string();
        if body.is_empty() {
            return Err(Error::EmptyBody);
        }
        if message.sender_id.is_empty() {
            return Err(Error::MissingId("sender_id"));
        }
        if message.recipient_id.is_empty() {
            return Err(Error::MissingId("recipient_id"));
        }
        if message.message_id.is_empty() {
            return Err(Error::MissingId("message_id"));
        }

        message.body = body;
        message.conversation_id = conversation.conversation_id.clone();
        message.status = MessageStatus::Sent;

        let message_id = message.message_id.clone();
        self.directory.ensure(conversation.clone()).await?;
        self.store.append(message).await?;

        tracing::debug!(message_id = %message_id, conversation = %conversation.conversation_id, "message sent");
        Ok(message_id)
    }

    /// Batch `sent → delivered` transition for messages addressed to
    /// `recipient_id`. Redundant and overlapping calls are no-ops; messages
    /// already at `delivered` or `seen` are never touched.
    pub async fn mark_delivered(
        &self,
        conversation_id: &str,
        recipient_id: &str,
        message_ids: &[String],
    ) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            conversation = %conversation_id,
            recipient = %recipient_id,
            count = message_ids.len(),
            "marking delivered"
        );
        self.store
            .update_status_batch(
                conversation_id,
                message_ids,
                MessageStatus::Delivered,
                now_millis(),
            )
            .await
    }

    /// Transition every message in the conversation addressed to `viewer_id`
    /// and currently at `sent` or `delivered` to `seen`. Safe to call with
    /// nothing eligible. Seen dominates: a message can jump straight from
    /// `sent` to `seen` and a late delivery sweep will not downgrade it.
    pub async fn mark_seen(&self, conversation_id: &str, viewer_id: &str) -> Result<()> {
        let recent = self
            .store
            .recent(conversation_id, self.config.seen_scan_limit)
            .await?;

        let eligible: Vec<String> = recent
            .iter()
            .filter(|m| {
                m.recipient_id == viewer_id
                    && matches!(m.status, MessageStatus::Sent | MessageStatus::Delivered)
            })
            .map(|m| m.message_id.clone())
            .collect();

        if eligible.is_empty() {
            return Ok(());
        }

        self.store
            .update_status_batch(conversation_id, &eligible, MessageStatus::Seen, now_millis())
            .await
    }

    /// Toggle a reaction: no existing reaction by the user adds one, the same
    /// emoji again removes it, a different emoji replaces it. At most one
    /// reaction per user. Rejected on deleted messages.
    pub async fn react(
        &self,
        conversation_id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let mut message = self
            .store
            .get(conversation_id, message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))?;

        if message.deleted {
            return Err(Error::MessageDeleted(message_id.to_string()));
        }

        let existing = message.reaction_of(user_id).map(|r| r.emoji.clone());
        message.reactions.retain(|r| r.user_id != user_id);
        if existing.as_deref() != Some(emoji) {
            message.reactions.push(Reaction {
                user_id: user_id.to_string(),
                emoji: emoji.to_string(),
                reacted_at: now_millis(),
            });
        }

        self.store.replace(message).await
    }

    /// Soft-delete by the original sender only. Clears body and reactions,
    /// leaves `status` untouched; the marker is terminal, so a repeat delete
    /// is a no-op.
    pub async fn delete(
        &self,
        conversation_id: &str,
        message_id: &str,
        requester_id: &str,
    ) -> Result<()> {
        let mut message = self
            .store
            .get(conversation_id, message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))?;

        if message.sender_id != requester_id {
            return Err(Error::NotAuthorized {
                message_id: message_id.to_string(),
                requester_id: requester_id.to_string(),
            });
        }
        if message.deleted {
            return Ok(());
        }

        message.body.clear();
        message.reactions.clear();
        message.deleted = true;
        message.deleted_by = Some(requester_id.to_string());
        message.deleted_at = Some(now_millis());

        self.store.replace(message).await
    }
}

//! Per-conversation chat session
//!
//! Owns the optimistic-pending working set and the store subscription for
//! one open conversation: created at conversation-open, torn down at close,
//! never ambient. The UI renders `messages()` and the `status` field of each
//! entry for delivery ticks.

use crate::error::{Error, Result};
use crate::models::{
    new_client_id, Conversation, MemberProfile, Message, MessageStatus, ReplyRef,
};
use crate::reconcile::Reconciler;
use crate::store::MessageFeed;
use crate::tracker::DeliveryTracker;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct ChatSession {
    tracker: Arc<DeliveryTracker>,
    conversation: Conversation,
    me: String,
    peer: String,
    feed: MessageFeed,
    reconciler: Mutex<Reconciler>,
}

impl ChatSession {
    /// Open a session between `me` and `peer`, idempotently creating the
    /// conversation record and subscribing to its confirmed feed.
    pub async fn open(
        tracker: Arc<DeliveryTracker>,
        me: MemberProfile,
        peer: MemberProfile,
    ) -> Result<Self> {
        let me_id = me.user_id.clone();
        let peer_id = peer.user_id.clone();
        let conversation = Conversation::dm(me, peer);

        tracker.directory().ensure(conversation.clone()).await?;
        let feed = tracker
            .store()
            .watch_conversation(&conversation.conversation_id, tracker.config().feed_limit);

        Ok(Self {
            tracker,
            conversation,
            me: me_id,
            peer: peer_id,
            feed,
            reconciler: Mutex::new(Reconciler::new()),
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation.conversation_id
    }

    /// Send a message optimistically: it enters the local working set at
    /// `Sending` before the write, flips to `Failed` if the write fails, and
    /// is promoted out once the confirmed feed reports it. The sender never
    /// waits for confirmation before the message appears.
    pub async fn send(&self, body: &str, reply_to: Option<ReplyRef>) -> Result<String> {
        let message = Message::compose(
            &self.conversation.conversation_id,
            &self.me,
            &self.peer,
            body,
            &new_client_id(),
            reply_to,
        )?;
        let client_id = message.message_id.clone();

        self.reconciler.lock().track(message.clone());

        match self.tracker.send(&self.conversation, message).await {
            Ok(message_id) => Ok(message_id),
            Err(e) => {
                self.reconciler.lock().mark_failed(&client_id);
                Err(e)
            }
        }
    }

    /// Resubmit a failed pending message unchanged: same client id, same
    /// content, same compose-time `created_at`, so ordering is stable and a
    /// write that actually landed the first time is overwritten in place
    /// rather than duplicated.
    pub async fn retry(&self, client_id: &str) -> Result<String> {
        let message = {
            let mut reconciler = self.reconciler.lock();
            let message = reconciler
                .pending(client_id)
                .cloned()
                .ok_or_else(|| Error::UnknownPending(client_id.to_string()))?;
            reconciler.mark_sending(client_id);
            message
        };

        match self.tracker.send(&self.conversation, message).await {
            Ok(message_id) => Ok(message_id),
            Err(e) => {
                self.reconciler.lock().mark_failed(client_id);
                Err(e)
            }
        }
    }

    /// Drop a failed pending message without sending it.
    pub fn discard(&self, client_id: &str) -> bool {
        self.reconciler.lock().discard(client_id).is_some()
    }

    /// The merged conversation view: latest confirmed snapshot reconciled
    /// with the pending set, newest first.
    pub fn messages(&self) -> Vec<Message> {
        let snapshot = self.feed.borrow().clone();
        let mut reconciler = self.reconciler.lock();
        reconciler.observe(snapshot);
        reconciler.merged()
    }

    /// Inbound messages not yet seen, for badge rendering.
    pub fn unread_count(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| {
                m.recipient_id == self.me && !m.deleted && m.status.rank() < MessageStatus::Seen.rank()
            })
            .count()
    }

    /// Mark everything inbound in this conversation seen, as on focus.
    pub async fn mark_seen(&self) -> Result<()> {
        self.tracker
            .mark_seen(&self.conversation.conversation_id, &self.me)
            .await
    }

    /// A fresh receiver on the confirmed feed, for watcher wiring.
    pub fn watch(&self) -> MessageFeed {
        self.feed.clone()
    }
}

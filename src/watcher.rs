//! Delivery and seen propagation
//!
//! Long-lived observation tasks multiplexed onto the runtime: a global sweep
//! that advances inbound `sent` messages to `delivered` while a client is
//! live, and a per-conversation watcher that marks inbound messages `seen`
//! while the conversation is in view. Batch failures are logged and left for
//! the next observation cycle to heal; they are never escalated.

use crate::models::MessageStatus;
use crate::tracker::DeliveryTracker;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Handle to a spawned watcher task. Dropping it cancels the task, so a
/// backgrounded client cannot leak a live subscription that keeps firing
/// writes.
pub struct WatcherHandle {
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Global sweep: observe all messages addressed to `user_id` still at
/// `sent`, batch them by conversation, and mark each batch delivered. The
/// batch updates are idempotent, so overlapping sweeps are safe.
pub fn spawn_delivery_sweep(tracker: Arc<DeliveryTracker>, user_id: &str) -> WatcherHandle {
    let user_id = user_id.to_string();
    let mut feed = tracker
        .store()
        .watch_inbound(&user_id, tracker.config().sweep_limit);

    let task = tokio::spawn(async move {
        loop {
            let snapshot = feed.borrow_and_update().clone();

            let mut by_conversation: HashMap<String, Vec<String>> = HashMap::new();
            for message in snapshot.iter().filter(|m| m.status == MessageStatus::Sent) {
                by_conversation
                    .entry(message.conversation_id.clone())
                    .or_default()
                    .push(message.message_id.clone());
            }

            let sweeps = by_conversation.into_iter().map(|(conversation_id, ids)| {
                let tracker = tracker.clone();
                let user_id = user_id.clone();
                async move {
                    if let Err(e) = tracker.mark_delivered(&conversation_id, &user_id, &ids).await {
                        tracing::warn!(
                            conversation = %conversation_id,
                            error = %e,
                            "delivery sweep batch failed, retried on next cycle"
                        );
                    }
                }
            });
            join_all(sweeps).await;

            if feed.changed().await.is_err() {
                break;
            }
        }
    });

    WatcherHandle { task }
}

/// Scoped variant of the delivery sweep watching a single conversation's
/// feed, for embedders that only keep one conversation subscription open.
pub fn spawn_conversation_delivery_watcher(
    tracker: Arc<DeliveryTracker>,
    conversation_id: &str,
    recipient_id: &str,
) -> WatcherHandle {
    let conversation_id = conversation_id.to_string();
    let recipient_id = recipient_id.to_string();
    let mut feed = tracker
        .store()
        .watch_conversation(&conversation_id, tracker.config().feed_limit);

    let task = tokio::spawn(async move {
        loop {
            let eligible: Vec<String> = feed
                .borrow_and_update()
                .iter()
                .filter(|m| m.recipient_id == recipient_id && m.status == MessageStatus::Sent)
                .map(|m| m.message_id.clone())
                .collect();

            if !eligible.is_empty() {
                if let Err(e) = tracker
                    .mark_delivered(&conversation_id, &recipient_id, &eligible)
                    .await
                {
                    tracing::warn!(
                        conversation = %conversation_id,
                        error = %e,
                        "conversation delivery watcher failed, retried on next cycle"
                    );
                }
            }

            if feed.changed().await.is_err() {
                break;
            }
        }
    });

    WatcherHandle { task }
}

/// Per-conversation focus: mark the conversation seen immediately and again
/// on every subsequent arrival, so new inbound messages are marked seen
/// without the viewer leaving and re-entering. Runs until the handle drops.
pub fn spawn_seen_watcher(
    tracker: Arc<DeliveryTracker>,
    conversation_id: &str,
    viewer_id: &str,
) -> WatcherHandle {
    let conversation_id = conversation_id.to_string();
    let viewer_id = viewer_id.to_string();
    let mut feed = tracker
        .store()
        .watch_conversation(&conversation_id, tracker.config().feed_limit);

    let task = tokio::spawn(async move {
        loop {
            {
                // Consume the snapshot; mark_seen rescans the store itself.
                let _ = feed.borrow_and_update();
            }
            if let Err(e) = tracker.mark_seen(&conversation_id, &viewer_id).await {
                tracing::warn!(
                    conversation = %conversation_id,
                    error = %e,
                    "seen sweep failed, retried on next cycle"
                );
            }

            if feed.changed().await.is_err() {
                break;
            }
        }
    });

    WatcherHandle { task }
}

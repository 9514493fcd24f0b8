//! Data models for Courier

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Current wall-clock time in milliseconds since the epoch.
///
/// Optimistic messages keep the compose-time reading as their permanent
/// `created_at`, so ordering is identical before and after confirmation.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a client-assigned message id.
///
/// The same id is reused verbatim as the stored `message_id`, which is what
/// makes de-duplication an exact-match lookup instead of a heuristic.
pub fn new_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Deterministic, order-independent id for a two-party conversation.
/// Both participants derive the same id without a lookup round-trip.
pub fn dm_conversation_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Seen,
    Failed,
}

impl Default for MessageStatus {
    fn default() -> Self {
        Self::Sending
    }
}

impl MessageStatus {
    /// Monotonic rank along sending < sent < delivered < seen.
    ///
    /// `Sending` and `Failed` are client-local states and share rank 0: a
    /// failed message re-enters the machine at the bottom on retry.
    pub fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending | MessageStatus::Failed => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Seen => 3,
        }
    }

    /// A status transition is valid only if it strictly increases rank.
    pub fn can_advance_to(self, target: MessageStatus) -> bool {
        target.rank() > self.rank()
    }
}

/// Denormalized snapshot of a replied-to message. Not a live pointer, so it
/// survives deletion of the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: String,
    pub emoji: String,
    pub reacted_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub created_at: i64,
    pub status: MessageStatus,
    pub delivered_at: Option<i64>,
    pub seen_at: Option<i64>,
    pub reply_to: Option<ReplyRef>,
    pub reactions: Vec<Reaction>,
    pub deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<i64>,
}

impl Message {
    /// Build an optimistic outgoing message at status `Sending`.
    ///
    /// Validates before any I/O: the trimmed body must be non-empty and all
    /// identifiers present. `created_at` is the local clock reading and is
    /// kept verbatim once the message is confirmed.
    pub fn compose(
        conversation_id: &str,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
        client_id: &str,
        reply_to: Option<ReplyRef>,
    ) -> Result<Self> {
        let body = body.trim();
        if body.is_empty() {
            return Err(Error::EmptyBody);
        }
        if conversation_id.is_empty() {
            return Err(Error::MissingId("conversation_id"));
        }
        if sender_id.is_empty() {
            return Err(Error::MissingId("sender_id"));
        }
        if recipient_id.is_empty() {
            return Err(Error::MissingId("recipient_id"));
        }
        if client_id.is_empty() {
            return Err(Error::MissingId("client_id"));
        }

        Ok(Self {
            message_id: client_id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            body: body.to_string(),
            created_at: now_millis(),
            status: MessageStatus::Sending,
            delivered_at: None,
            seen_at: None,
            reply_to,
            reactions: Vec::new(),
            deleted: false,
            deleted_by: None,
            deleted_at: None,
        })
    }

    /// Short body preview for the conversation list cache.
    pub fn preview(&self) -> String {
        self.body.chars().take(60).collect()
    }

    pub fn reaction_of(&self, user_id: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.user_id == user_id)
    }
}

// ============================================================================
// Conversations
// ============================================================================

/// Display info per member, snapshotted at creation/refresh time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberProfile {
    pub user_id: String,
    pub name: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Denormalized cache of a conversation's most recent message, kept in sync
/// atomically with the message append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub body: String,
    pub sender_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub members: Vec<String>,
    pub member_profiles: Vec<MemberProfile>,
    pub last_message: Option<LastMessage>,
    pub last_message_at: Option<i64>,
    pub created_at: i64,
}

impl Conversation {
    /// Canonical two-party conversation record for a pair of profiles.
    /// Member order is normalized so both sides build the same record.
    pub fn dm(a: MemberProfile, b: MemberProfile) -> Self {
        let conversation_id = dm_conversation_id(&a.user_id, &b.user_id);
        let (first, second) = if a.user_id <= b.user_id { (a, b) } else { (b, a) };

        Self {
            conversation_id,
            members: vec![first.user_id.clone(), second.user_id.clone()],
            member_profiles: vec![first, second],
            last_message: None,
            last_message_at: None,
            created_at: now_millis(),
        }
    }

    /// Profile of the member that is not `user_id`, for list rendering.
    pub fn peer_of(&self, user_id: &str) -> Option<&MemberProfile> {
        self.member_profiles.iter().find(|p| p.user_id != user_id)
    }
}

//! Courier Core Library
//!
//! Backend-agnostic message delivery tracking for two-party chat: the
//! sending → sent → delivered → seen state machine, optimistic-message
//! reconciliation against a confirmed store feed, and background
//! delivery/seen propagation. Storage and transport are collaborator traits;
//! any document store with per-conversation subscriptions and batched atomic
//! updates satisfies them.

pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod tracker;
pub mod watcher;

pub use config::TrackerConfig;
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use models::*;
pub use reconcile::Reconciler;
pub use session::ChatSession;
pub use store::{ConversationDirectory, MessageFeed, MessageStore};
pub use tracker::DeliveryTracker;
pub use watcher::{
    spawn_conversation_delivery_watcher, spawn_delivery_sweep, spawn_seen_watcher, WatcherHandle,
};

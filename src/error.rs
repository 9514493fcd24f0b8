//! Error types for Courier Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Message body is empty")]
    EmptyBody,

    #[error("Missing identifier: {0}")]
    MissingId(&'static str),

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User {requester_id} is not allowed to delete message {message_id}")]
    NotAuthorized {
        message_id: String,
        requester_id: String,
    },

    #[error("Message is deleted: {0}")]
    MessageDeleted(String),

    #[error("No pending message with client id: {0}")]
    UnknownPending(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Validation errors are rejected before any I/O and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::EmptyBody | Error::MissingId(_))
    }
}

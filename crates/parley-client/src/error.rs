use parley_shared::{ImageError, ModelError, ThreadId, UserId};
use parley_store::StoreError;
use thiserror::Error;

use crate::summary::SummarySyncReport;

/// Coarse classification used for user-facing messaging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments. Fails fast, never retried.
    InvalidInput,
    /// A referenced entity is absent. Surfaced, never retried.
    NotFound,
    /// Network or store hiccup. Retried where a retry policy applies.
    TransientStore,
    /// External upload exceeded its deadline.
    Timeout,
    /// Image pipeline failure. Deterministic, never retried.
    Compression,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing chat context: {0}")]
    MissingContext(&'static str),

    #[error("Thread not found: {0}")]
    ThreadNotFound(ThreadId),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Chat summary update failed for {}", join_users(.failed))]
    SummaryUpdateFailed {
        failed: Vec<UserId>,
        report: SummarySyncReport,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Upload timed out after {0} seconds")]
    Timeout(u64),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidInput(_) | ClientError::MissingContext(_) => ErrorKind::InvalidInput,
            ClientError::ThreadNotFound(_) | ClientError::UserNotFound(_) => ErrorKind::NotFound,
            ClientError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            ClientError::Store(StoreError::Malformed { .. }) => ErrorKind::InvalidInput,
            ClientError::Store(_)
            | ClientError::SummaryUpdateFailed { .. }
            | ClientError::Upload(_)
            | ClientError::Task(_) => ErrorKind::TransientStore,
            ClientError::Timeout(_) => ErrorKind::Timeout,
            ClientError::Image(ImageError::InvalidFile(_))
            | ClientError::Image(ImageError::InvalidOptions(_)) => ErrorKind::InvalidInput,
            ClientError::Image(_) => ErrorKind::Compression,
        }
    }

    /// Whether a bounded retry may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Short text suitable for a transient error notification.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::MissingContext(what) => {
                format!("Missing required chat data ({what}). Please try again.")
            }
            ClientError::Image(ImageError::InvalidFile(_)) => {
                "Invalid image file. Max size: 5MB".to_string()
            }
            ClientError::SummaryUpdateFailed { .. } => {
                "Message delivered, but the chat list may be out of date.".to_string()
            }
            ClientError::Timeout(_) => "Upload timed out. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ModelError> for ClientError {
    fn from(e: ModelError) -> Self {
        ClientError::InvalidInput(e.to_string())
    }
}

fn join_users(users: &[UserId]) -> String {
    users
        .iter()
        .map(UserId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ClientError::MissingContext("thread").kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            ClientError::ThreadNotFound(ThreadId::from("t")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ClientError::Store(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::TransientStore
        );
        assert_eq!(ClientError::Timeout(30).kind(), ErrorKind::Timeout);
        assert_eq!(
            ClientError::Image(ImageError::InvalidFile("big".into())).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_only_transient_store_errors_retry() {
        assert!(ClientError::Store(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!ClientError::Store(StoreError::not_found("chats", "u1")).is_retryable());
        assert!(!ClientError::InvalidInput("x".into()).is_retryable());
    }
}

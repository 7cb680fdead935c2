//! Document models persisted in the external document store.
//!
//! Field names follow the stored schema (`sId`, `chatsData`, `messageSeen`
//! ...), so every struct carries explicit serde renames. Timestamps are
//! stored as Unix epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{IMAGE_PREVIEW, PREVIEW_ELLIPSIS};
use crate::error::ModelError;
use crate::types::{MessageId, ThreadId, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Delivery state of a message as seen by the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Inserted locally, not yet confirmed by a snapshot.
    Pending,
    /// Persisted in the thread document.
    #[default]
    Sent,
}

/// Exactly one content variant per message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    /// Compressed image embedded as a `data:` URL.
    Image { image: String },
}

/// One entry in a thread. Content is immutable once appended; only `read`
/// may change later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "sId")]
    pub sender_id: UserId,
    #[serde(flatten)]
    pub content: MessageContent,
    /// Client-assigned; monotonic per sender only.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    pub fn text(sender_id: UserId, text: impl Into<String>) -> Self {
        Self::with_content(
            sender_id,
            MessageContent::Text { text: text.into() },
        )
    }

    pub fn image(sender_id: UserId, data_url: impl Into<String>) -> Self {
        Self::with_content(
            sender_id,
            MessageContent::Image {
                image: data_url.into(),
            },
        )
    }

    fn with_content(sender_id: UserId, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            sender_id,
            content,
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
            read: false,
        }
    }

    /// Check the invariants a message must satisfy before it is appended.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.sender_id.is_empty() {
            return Err(ModelError::MissingSender);
        }
        match &self.content {
            MessageContent::Text { text } if text.trim().is_empty() => Err(ModelError::EmptyText),
            MessageContent::Image { image } if image.is_empty() => Err(ModelError::EmptyImage),
            _ => Ok(()),
        }
    }

    /// Text shown in the chat list for this message, before truncation.
    pub fn preview(&self) -> &str {
        match &self.content {
            MessageContent::Text { text } => text,
            MessageContent::Image { .. } => IMAGE_PREVIEW,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.content, MessageContent::Image { .. })
    }
}

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// Body of a thread document. Created once, at first contact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Append order, oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Denormalized copy of a peer's display fields kept in a summary entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerProfile {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A user profile document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    /// Lowercase handle used for search.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
}

impl UserProfile {
    /// Skeleton profile written on first login.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            username: String::new(),
            name: String::new(),
            avatar: None,
            bio: None,
            last_seen: Utc::now(),
        }
    }

    /// A profile is complete once it has both a display name and an avatar.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && self.avatar.is_some()
    }

    pub fn to_peer(&self) -> PeerProfile {
        PeerProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat summary
// ---------------------------------------------------------------------------

/// One conversation's preview inside a user's chat list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummaryEntry {
    /// Thread this entry mirrors.
    pub message_id: ThreadId,
    /// The peer ("receiver id" from the owner's point of view).
    pub rid: UserId,
    pub user_data: PeerProfile,
    #[serde(default)]
    pub last_message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_seen: bool,
    #[serde(default)]
    pub last_sender_id: Option<UserId>,
}

impl ChatSummaryEntry {
    /// Fresh entry written when a thread is created. Starts seen, with an
    /// empty preview.
    pub fn new(thread_id: ThreadId, peer: PeerProfile, now: DateTime<Utc>) -> Self {
        Self {
            message_id: thread_id,
            rid: peer.id.clone(),
            user_data: peer,
            last_message: String::new(),
            updated_at: now,
            message_seen: true,
            last_sender_id: None,
        }
    }

    /// Rewrite the preview fields for a new message, as seen by `owner`.
    /// The sender always sees their own message.
    pub fn record_message(
        &mut self,
        owner: &UserId,
        sender: &UserId,
        preview: String,
        now: DateTime<Utc>,
    ) {
        self.last_message = preview;
        self.updated_at = now;
        self.message_seen = owner == sender;
        self.last_sender_id = Some(sender.clone());
    }
}

/// Body of a user's chat summary document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChatSummary {
    #[serde(rename = "chatsData", default)]
    pub chats_data: Vec<ChatSummaryEntry>,
}

impl ChatSummary {
    pub fn position(&self, thread_id: &ThreadId) -> Option<usize> {
        self.chats_data
            .iter()
            .position(|entry| &entry.message_id == thread_id)
    }

    pub fn entry(&self, thread_id: &ThreadId) -> Option<&ChatSummaryEntry> {
        self.chats_data
            .iter()
            .find(|entry| &entry.message_id == thread_id)
    }

    pub fn entry_for_peer(&self, peer: &UserId) -> Option<&ChatSummaryEntry> {
        self.chats_data.iter().find(|entry| &entry.rid == peer)
    }

    /// Entries ordered for display, most recently updated first.
    pub fn sorted_by_recency(mut self) -> Vec<ChatSummaryEntry> {
        self.chats_data
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.chats_data
    }

    pub fn unread_count(&self) -> usize {
        self.chats_data
            .iter()
            .filter(|entry| !entry.message_seen)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Cut `text` to at most `max_chars` characters, appending an ellipsis when
/// anything was cut. Counts characters, not bytes.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], PREVIEW_ELLIPSIS),
        None => text.to_string(),
    }
}

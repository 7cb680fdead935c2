use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient, user-facing notification (a toast in a UI).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub emitted_at: DateTime<Utc>,
}

/// Fan-out of notices to whoever is listening. Emitting with no listener
/// is fine; the notice is only logged.
#[derive(Clone)]
pub struct Notices {
    tx: broadcast::Sender<Notice>,
}

impl Notices {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn info(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Info, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Error, text.into());
    }

    fn emit(&self, level: NoticeLevel, text: String) {
        match level {
            NoticeLevel::Info => tracing::info!(notice = %text, "Notice"),
            NoticeLevel::Error => tracing::warn!(notice = %text, "Error notice"),
        }
        let notice = Notice {
            level,
            text,
            emitted_at: Utc::now(),
        };
        if self.tx.send(notice).is_err() {
            tracing::trace!("No notice listeners");
        }
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}

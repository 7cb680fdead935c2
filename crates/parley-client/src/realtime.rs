//! Live subscriptions to thread and chat summary documents.
//!
//! Each subscription is a tokio task draining the store's change stream
//! into user callbacks. A [`Subscription`] handle owns the task: cancelling
//! or dropping it stops delivery. The active flag is checked before every
//! callback, so nothing fires once `cancel` has returned, not even for a
//! change the task had already pulled off the stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use parley_shared::constants::{SUMMARIES_COLLECTION, THREADS_COLLECTION};
use parley_shared::{ChatSummary, ChatSummaryEntry, Message, Thread, ThreadId, UserId};
use parley_store::{DocumentStore, Snapshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::directory::UserDirectory;
use crate::error::{ClientError, Result};
use crate::events::Notices;
use crate::summary::SummarySynchronizer;

/// Handle to one live subscription.
pub struct Subscription {
    label: String,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    fn new(label: String, active: Arc<AtomicBool>, task: JoinHandle<()>) -> Self {
        debug!(subscription = %label, "Subscribed");
        Self {
            label,
            active,
            task: Some(task),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn cancel(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(subscription = %self.label, "Unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Slot holding at most one subscription. Switching always tears down the
/// old one before the new one starts.
#[derive(Debug, Default)]
pub struct Watcher {
    current: Option<Subscription>,
}

impl Watcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switch_to(&mut self, start: impl FnOnce() -> Subscription) {
        self.cancel();
        self.current = Some(start());
    }

    pub fn cancel(&mut self) {
        if let Some(mut previous) = self.current.take() {
            previous.cancel();
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.current.as_ref().map(Subscription::label)
    }

    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(Subscription::is_active)
    }
}

/// Starts subscriptions against the document store.
#[derive(Clone)]
pub struct RealtimeSubscriber {
    store: Arc<dyn DocumentStore>,
    summaries: SummarySynchronizer,
    directory: UserDirectory,
    notices: Notices,
}

impl RealtimeSubscriber {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        summaries: SummarySynchronizer,
        directory: UserDirectory,
        notices: Notices,
    ) -> Self {
        Self {
            store,
            summaries,
            directory,
            notices,
        }
    }

    /// Follow a thread's messages, oldest first. An absent thread reads as
    /// an empty list.
    pub fn watch_thread<F, E>(&self, thread_id: &ThreadId, on_change: F, on_error: E) -> Subscription
    where
        F: Fn(Vec<Message>) + Send + Sync + 'static,
        E: Fn(ClientError) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let mut stream = self.store.watch(THREADS_COLLECTION, thread_id.as_str());
        let notices = self.notices.clone();
        let thread = thread_id.clone();

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let decoded = item
                    .and_then(|snap| snap.decode::<Thread>())
                    .map_err(ClientError::from);
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                match decoded {
                    Ok(doc) => on_change(doc.map(|t| t.messages).unwrap_or_default()),
                    Err(e) => {
                        error!(thread = %thread, error = %e, "Thread subscription error");
                        notices.error(e.user_message());
                        on_error(e);
                    }
                }
            }
        });

        Subscription::new(format!("thread:{thread_id}"), active, task)
    }

    /// Follow a user's chat list, most recent first, with peer display
    /// fields refreshed from their profiles. A missing summary document is
    /// created empty.
    pub fn watch_summary<F, E>(&self, user: &UserId, on_change: F, on_error: E) -> Subscription
    where
        F: Fn(Vec<ChatSummaryEntry>) + Send + Sync + 'static,
        E: Fn(ClientError) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let mut stream = self.store.watch(SUMMARIES_COLLECTION, user.as_str());
        let this = self.clone();
        let owner = user.clone();

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                let resolved = this.resolve_summary(&owner, item).await;
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                match resolved {
                    Ok(entries) => on_change(entries),
                    Err(e) => {
                        error!(user = %owner, error = %e, "Chat list subscription error");
                        this.notices.error(e.user_message());
                        on_error(e);
                    }
                }
            }
        });

        Subscription::new(format!("summary:{user}"), active, task)
    }

    async fn resolve_summary(
        &self,
        owner: &UserId,
        item: parley_store::Result<Snapshot>,
    ) -> Result<Vec<ChatSummaryEntry>> {
        let Some(summary) = item?.decode::<ChatSummary>()? else {
            self.summaries.ensure_document(owner).await?;
            return Ok(Vec::new());
        };
        let mut entries = summary.sorted_by_recency();
        self.refresh_peers(&mut entries).await;
        Ok(entries)
    }

    /// Replace cached peer names and avatars with the live profile. A failed
    /// or empty lookup keeps the cached copy.
    async fn refresh_peers(&self, entries: &mut [ChatSummaryEntry]) {
        let lookups = entries.iter().map(|e| self.directory.profile(&e.rid));
        let profiles = join_all(lookups).await;

        for (entry, profile) in entries.iter_mut().zip(profiles) {
            match profile {
                Ok(Some(profile)) => entry.user_data = profile.to_peer(),
                Ok(None) => debug!(peer = %entry.rid, "No profile for peer, keeping cached data"),
                Err(e) => warn!(peer = %entry.rid, error = %e, "Peer lookup failed, keeping cached data"),
            }
        }
    }
}

//! Service handles wired together.
//!
//! [`ChatClient`] owns one handle per concern (ledger, summaries, profiles,
//! realtime, notices) and exposes the operations a chat UI calls. It keeps
//! no view state; see [`crate::session::ChatSession`] for that.

use std::sync::Arc;

use chrono::Utc;
use parley_shared::image::{CompressOptions, ImageFile};
use parley_shared::{ChatSummaryEntry, Message, ThreadId, UserId};
use parley_store::{DocumentStore, SqliteStore};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::directory::UserDirectory;
use crate::error::{ClientError, Result};
use crate::events::Notices;
use crate::files;
use crate::ledger::MessageLedger;
use crate::realtime::{RealtimeSubscriber, Subscription};
use crate::summary::{SummarySyncReport, SummarySynchronizer};
use crate::upload::{HttpImageHost, ImageHost};

#[derive(Clone)]
pub struct ChatClient {
    ledger: MessageLedger,
    summaries: SummarySynchronizer,
    directory: UserDirectory,
    realtime: RealtimeSubscriber,
    notices: Notices,
}

impl ChatClient {
    /// Build a client over `store`. An image host is attached when the
    /// config names one.
    pub fn new(store: Arc<dyn DocumentStore>, config: &ClientConfig) -> Self {
        let host = config.image_host_url.as_ref().map(|url| {
            Arc::new(HttpImageHost::new(
                url.clone(),
                config.upload_preset.clone(),
                config.upload_timeout,
            )) as Arc<dyn ImageHost>
        });
        Self::with_image_host(store, config, host)
    }

    pub fn with_image_host(
        store: Arc<dyn DocumentStore>,
        config: &ClientConfig,
        image_host: Option<Arc<dyn ImageHost>>,
    ) -> Self {
        let notices = Notices::new();
        let ledger = MessageLedger::new(store.clone());
        let summaries =
            SummarySynchronizer::new(store.clone(), config.summary_retry, config.preview_chars);
        let directory = UserDirectory::new(store.clone(), image_host);
        let realtime = RealtimeSubscriber::new(
            store,
            summaries.clone(),
            directory.clone(),
            notices.clone(),
        );
        Self {
            ledger,
            summaries,
            directory,
            realtime,
            notices,
        }
    }

    /// Open the SQLite store named by the config (or the platform default)
    /// and build a client over it.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let store = match &config.db_path {
            Some(path) => SqliteStore::open_at(path)?,
            None => SqliteStore::open()?,
        };
        info!(path = ?store.path(), "Document store opened");
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn ledger(&self) -> &MessageLedger {
        &self.ledger
    }

    pub fn summaries(&self) -> &SummarySynchronizer {
        &self.summaries
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn realtime(&self) -> &RealtimeSubscriber {
        &self.realtime
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    // -- Sending -------------------------------------------------------------

    /// Send a text message. The receiver is the peer recorded in the
    /// sender's chat list entry for the thread.
    pub async fn send_text(
        &self,
        thread_id: &ThreadId,
        sender: &UserId,
        text: &str,
    ) -> Result<SummarySyncReport> {
        let receiver = self.peer_of(sender, thread_id).await?;
        self.send_text_to(thread_id, sender, &receiver, text).await
    }

    pub async fn send_text_to(
        &self,
        thread_id: &ThreadId,
        sender: &UserId,
        receiver: &UserId,
        text: &str,
    ) -> Result<SummarySyncReport> {
        let message = Message::text(sender.clone(), text.trim());
        self.deliver(thread_id, sender, receiver, &message).await
    }

    /// Compress and send an image. Invalid files are rejected before
    /// anything is written.
    pub async fn send_image(
        &self,
        thread_id: &ThreadId,
        sender: &UserId,
        file: ImageFile,
    ) -> Result<SummarySyncReport> {
        let receiver = self.peer_of(sender, thread_id).await?;
        self.send_image_to(thread_id, sender, &receiver, file).await
    }

    pub async fn send_image_to(
        &self,
        thread_id: &ThreadId,
        sender: &UserId,
        receiver: &UserId,
        file: ImageFile,
    ) -> Result<SummarySyncReport> {
        let compressed = files::compress(file, CompressOptions::default()).await?;
        let message = Message::image(sender.clone(), compressed.data_url);
        self.deliver(thread_id, sender, receiver, &message).await
    }

    /// Append, then mirror the preview into both chat lists. A summary
    /// failure does not undo the append.
    pub(crate) async fn deliver(
        &self,
        thread_id: &ThreadId,
        sender: &UserId,
        receiver: &UserId,
        message: &Message,
    ) -> Result<SummarySyncReport> {
        self.ledger.append(thread_id, message).await?;
        self.summaries
            .upsert_summary(thread_id, sender, receiver, message.preview())
            .await
    }

    async fn peer_of(&self, user: &UserId, thread_id: &ThreadId) -> Result<UserId> {
        self.summaries
            .entry(user, thread_id)
            .await?
            .map(|entry| entry.rid)
            .ok_or_else(|| ClientError::ThreadNotFound(thread_id.clone()))
    }

    // -- Chat list -----------------------------------------------------------

    pub async fn mark_summary_seen(&self, user: &UserId, thread_id: &ThreadId) -> Result<bool> {
        self.summaries.mark_seen(user, thread_id).await
    }

    /// Open a conversation between `user` and `peer`. Returns the existing
    /// thread when `user` already lists one with `peer`, after making sure
    /// `peer` lists it too.
    pub async fn start_chat(&self, user: &UserId, peer: &UserId) -> Result<ThreadId> {
        if user == peer {
            return Err(ClientError::InvalidInput("cannot start a chat with yourself".into()));
        }
        let me = self
            .directory
            .profile(user)
            .await?
            .ok_or_else(|| ClientError::UserNotFound(user.clone()))?;

        if let Some(existing) = self.summaries.find_by_peer(user, peer).await? {
            // A previous attempt may have stopped after the first entry.
            self.summaries
                .add_entry(
                    peer,
                    ChatSummaryEntry::new(
                        existing.message_id.clone(),
                        me.to_peer(),
                        existing.updated_at,
                    ),
                )
                .await?;
            info!(user = %user, peer = %peer, thread = %existing.message_id, "Chat already exists");
            self.notices.info("Chat already exists!");
            return Ok(existing.message_id);
        }

        let them = self
            .directory
            .profile(peer)
            .await?
            .ok_or_else(|| ClientError::UserNotFound(peer.clone()))?;

        let thread_id = self.ledger.create_thread().await?;
        let now = Utc::now();
        self.summaries
            .add_entry(user, ChatSummaryEntry::new(thread_id.clone(), them.to_peer(), now))
            .await?;
        self.summaries
            .add_entry(peer, ChatSummaryEntry::new(thread_id.clone(), me.to_peer(), now))
            .await?;

        info!(user = %user, peer = %peer, thread = %thread_id, "Chat started");
        Ok(thread_id)
    }

    /// Remove the thread from `user`'s chat list only. The thread and the
    /// peer's entry stay.
    pub async fn delete_chat(&self, user: &UserId, thread_id: &ThreadId) -> Result<bool> {
        self.summaries.remove_entry(user, thread_id).await
    }

    pub async fn list_chats(&self, user: &UserId) -> Result<Vec<ChatSummaryEntry>> {
        self.summaries.entries(user).await
    }

    // -- Subscriptions -------------------------------------------------------

    pub fn subscribe_thread<F>(&self, thread_id: &ThreadId, on_change: F) -> Subscription
    where
        F: Fn(Vec<Message>) + Send + Sync + 'static,
    {
        let thread = thread_id.clone();
        self.realtime.watch_thread(thread_id, on_change, move |e| {
            warn!(thread = %thread, error = %e, "Thread subscription error");
        })
    }

    pub fn subscribe_summary<F>(&self, user: &UserId, on_change: F) -> Subscription
    where
        F: Fn(Vec<ChatSummaryEntry>) + Send + Sync + 'static,
    {
        let owner = user.clone();
        self.realtime.watch_summary(user, on_change, move |e| {
            warn!(user = %owner, error = %e, "Chat list subscription error");
        })
    }
}

//! One signed-in user's live chat view.
//!
//! A [`ChatSession`] holds the observable state a UI renders (open thread,
//! chat list) and keeps it in sync: it follows auth changes, keeps exactly
//! one subscription per view, and applies optimistic sends that are rolled
//! back when delivery fails.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use parley_shared::image::{CompressOptions, ImageFile};
use parley_shared::{LocalId, Message, ThreadId, UserId};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::AuthProvider;
use crate::client::ChatClient;
use crate::error::{ClientError, Result};
use crate::files;
use crate::realtime::Watcher;
use crate::state::{Observable, SummaryState, ThreadState};

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenChat {
    thread_id: ThreadId,
    peer: UserId,
}

struct Inner {
    client: ChatClient,
    auth: Arc<dyn AuthProvider>,
    thread: Observable<ThreadState>,
    chats: Observable<SummaryState>,
    open_chat: Mutex<Option<OpenChat>>,
    thread_watch: Mutex<Watcher>,
    summary_watch: Mutex<Watcher>,
    auth_follower: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.auth_follower).take() {
            task.abort();
        }
    }
}

#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChatSession {
    pub fn new(client: ChatClient, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                auth,
                thread: Observable::new(ThreadState::default()),
                chats: Observable::new(SummaryState::default()),
                open_chat: Mutex::new(None),
                thread_watch: Mutex::new(Watcher::new()),
                summary_watch: Mutex::new(Watcher::new()),
                auth_follower: Mutex::new(None),
            }),
        }
    }

    pub fn client(&self) -> &ChatClient {
        &self.inner.client
    }

    /// The open thread's rows.
    pub fn thread(&self) -> Observable<ThreadState> {
        self.inner.thread.clone()
    }

    /// The signed-in user's chat list.
    pub fn chats(&self) -> Observable<SummaryState> {
        self.inner.chats.clone()
    }

    // -- Auth ----------------------------------------------------------------

    /// Track the auth provider: subscribe the chat list on sign-in, tear
    /// everything down on sign-out. Replaces any earlier follower.
    pub fn follow_auth(&self) {
        let mut rx = self.inner.auth.on_auth_change();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            let mut current = rx.borrow_and_update().clone();
            loop {
                let Some(inner) = weak.upgrade() else { break };
                ChatSession { inner }.apply_user(current).await;
                if rx.changed().await.is_err() {
                    break;
                }
                current = rx.borrow_and_update().clone();
            }
            debug!("Auth follower stopped");
        });

        if let Some(previous) = lock(&self.inner.auth_follower).replace(task) {
            previous.abort();
        }
    }

    /// Switch the session to `user` (or to signed-out on `None`).
    pub async fn apply_user(&self, user: Option<UserId>) {
        match user {
            Some(user) => self.sign_in(user).await,
            None => self.sign_out(),
        }
    }

    async fn sign_in(&self, user: UserId) {
        if let Err(e) = self.inner.client.directory().load_or_create(&user).await {
            warn!(user = %user, error = %e, "Could not load profile");
        }

        self.inner.chats.set(SummaryState {
            owner: Some(user.clone()),
            entries: Vec::new(),
        });

        let chats = self.inner.chats.clone();
        let owner = user.clone();
        let realtime = self.inner.client.realtime().clone();
        lock(&self.inner.summary_watch).switch_to(|| {
            realtime.watch_summary(
                &user,
                move |entries| {
                    chats.modify(|state| state.replace(&owner, entries));
                },
                |_| {},
            )
        });
        info!(user = %user, "Session started");
    }

    fn sign_out(&self) {
        lock(&self.inner.summary_watch).cancel();
        self.close_thread();
        self.inner.chats.set(SummaryState::default());
        info!("Session cleared");
    }

    // -- Open thread ---------------------------------------------------------

    /// Show `thread_id` (a conversation with `peer`). Any previously open
    /// thread is unsubscribed first. The chat is marked seen for the
    /// current user.
    pub async fn open_thread(&self, thread_id: ThreadId, peer: UserId) {
        *lock(&self.inner.open_chat) = Some(OpenChat {
            thread_id: thread_id.clone(),
            peer,
        });
        self.inner
            .thread
            .modify(|state| state.open(Some(thread_id.clone())));

        let thread = self.inner.thread.clone();
        let id = thread_id.clone();
        let realtime = self.inner.client.realtime().clone();
        lock(&self.inner.thread_watch).switch_to(|| {
            realtime.watch_thread(
                &thread_id,
                move |messages| {
                    thread.modify(|state| state.apply_snapshot(&id, messages));
                },
                |_| {},
            )
        });

        if let Some(user) = self.inner.auth.current_user() {
            if let Err(e) = self.inner.client.mark_summary_seen(&user, &thread_id).await {
                warn!(thread = %thread_id, error = %e, "Could not mark chat seen");
            }
        }
    }

    pub fn close_thread(&self) {
        lock(&self.inner.thread_watch).cancel();
        *lock(&self.inner.open_chat) = None;
        self.inner.thread.modify(|state| state.open(None));
    }

    // -- Sending -------------------------------------------------------------

    pub async fn submit_text(&self, text: &str) -> Result<()> {
        let (user, chat) = self.context()?;
        let message = Message::text(user.clone(), text.trim());
        message.validate()?;
        self.submit(&user, &chat, message).await
    }

    /// Compress, then send optimistically. A file the compressor rejects
    /// never shows up as a pending row.
    pub async fn submit_image(&self, file: ImageFile) -> Result<()> {
        let (user, chat) = self.context()?;
        let compressed = match files::compress(file, CompressOptions::default()).await {
            Ok(c) => c,
            Err(e) => {
                self.inner.client.notices().error(e.user_message());
                return Err(e);
            }
        };
        let message = Message::image(user.clone(), compressed.data_url);
        self.submit(&user, &chat, message).await
    }

    async fn submit(&self, user: &UserId, chat: &OpenChat, message: Message) -> Result<()> {
        let local_id = LocalId::new();
        self.inner
            .thread
            .modify(|state| state.insert_pending(local_id, message.clone()));
        debug!(thread = %chat.thread_id, pending = %local_id, "Pending message inserted");

        match self
            .inner
            .client
            .deliver(&chat.thread_id, user, &chat.peer, &message)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let removed = self.inner.thread.modify(|state| state.rollback(local_id));
                warn!(
                    thread = %chat.thread_id,
                    pending = %local_id,
                    removed,
                    error = %e,
                    "Send failed, pending message rolled back"
                );
                let text = match &e {
                    ClientError::SummaryUpdateFailed { .. } => e.user_message(),
                    _ => "Failed to send message".to_string(),
                };
                self.inner.client.notices().error(text);
                Err(e)
            }
        }
    }

    fn context(&self) -> Result<(UserId, OpenChat)> {
        let user = self
            .inner
            .auth
            .current_user()
            .ok_or(ClientError::MissingContext("current user"))?;
        let chat = lock(&self.inner.open_chat)
            .clone()
            .ok_or(ClientError::MissingContext("open thread"))?;
        if chat.peer.is_empty() {
            return Err(ClientError::MissingContext("peer"));
        }
        Ok((user, chat))
    }
}

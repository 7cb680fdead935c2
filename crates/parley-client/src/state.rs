//! Local, observable view state.
//!
//! Each entity the UI renders gets its own [`Observable`] instead of one
//! shared context object. Writers mutate through [`Observable::modify`];
//! readers either take a snapshot with [`Observable::get`] or subscribe to
//! a `tokio::sync::watch` receiver and re-render on change.

use std::sync::Arc;

use parley_shared::{ChatSummaryEntry, DeliveryStatus, LocalId, Message, ThreadId, UserId};
use tokio::sync::watch;

/// A value plus change notification.
pub struct Observable<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutate in place. Subscribers are notified only when `f` returns `true`.
    pub fn modify(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }
}

// ---------------------------------------------------------------------------
// Thread view
// ---------------------------------------------------------------------------

/// One row of the open thread. Pending rows carry the local key used to
/// roll them back.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEntry {
    pub message: Message,
    pub local_id: Option<LocalId>,
}

impl ThreadEntry {
    pub fn is_pending(&self) -> bool {
        self.local_id.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadState {
    pub thread_id: Option<ThreadId>,
    /// Oldest first, as stored.
    pub entries: Vec<ThreadEntry>,
}

impl ThreadState {
    /// Switch to another thread, dropping every row of the previous one.
    pub fn open(&mut self, thread_id: Option<ThreadId>) -> bool {
        if self.thread_id == thread_id && self.entries.is_empty() {
            return false;
        }
        self.thread_id = thread_id;
        self.entries.clear();
        true
    }

    /// Append a speculative row keyed by `local_id`. The message is marked
    /// pending.
    pub fn insert_pending(&mut self, local_id: LocalId, mut message: Message) -> bool {
        message.status = DeliveryStatus::Pending;
        self.entries.push(ThreadEntry {
            message,
            local_id: Some(local_id),
        });
        true
    }

    /// Remove the pending row inserted under `local_id`. Returns `false`
    /// when it is already gone (a snapshot replaced it).
    pub fn rollback(&mut self, local_id: LocalId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.local_id != Some(local_id));
        self.entries.len() != before
    }

    /// Replace every row with the stored messages of `thread_id`. Snapshots
    /// for a thread that is no longer open are ignored.
    pub fn apply_snapshot(&mut self, thread_id: &ThreadId, messages: Vec<Message>) -> bool {
        if self.thread_id.as_ref() != Some(thread_id) {
            return false;
        }
        self.entries = messages
            .into_iter()
            .map(|message| ThreadEntry {
                message,
                local_id: None,
            })
            .collect();
        true
    }

    pub fn has_pending(&self, local_id: LocalId) -> bool {
        self.entries.iter().any(|e| e.local_id == Some(local_id))
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    /// Rows in presentation order, newest first.
    pub fn newest_first(&self) -> Vec<&ThreadEntry> {
        self.entries.iter().rev().collect()
    }
}

// ---------------------------------------------------------------------------
// Chat list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryState {
    pub owner: Option<UserId>,
    /// Most recently updated first.
    pub entries: Vec<ChatSummaryEntry>,
}

impl SummaryState {
    pub fn replace(&mut self, owner: &UserId, entries: Vec<ChatSummaryEntry>) -> bool {
        if self.owner.as_ref() != Some(owner) {
            return false;
        }
        self.entries = entries;
        true
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.message_seen).count()
    }

    pub fn entry(&self, thread_id: &ThreadId) -> Option<&ChatSummaryEntry> {
        self.entries.iter().find(|e| &e.message_id == thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_thread(id: &str) -> ThreadState {
        let mut state = ThreadState::default();
        state.open(Some(ThreadId::from(id)));
        state
    }

    #[test]
    fn test_pending_insert_and_rollback() {
        let mut state = open_thread("t1");
        let keep = LocalId::new();
        let drop = LocalId::new();
        state.insert_pending(keep, Message::text(UserId::from("u1"), "one"));
        state.insert_pending(drop, Message::text(UserId::from("u1"), "two"));
        assert_eq!(state.pending_count(), 2);
        assert_eq!(state.entries[0].message.status, DeliveryStatus::Pending);

        assert!(state.rollback(drop));
        assert!(!state.has_pending(drop));
        assert!(state.has_pending(keep));
        assert!(!state.rollback(drop));
    }

    #[test]
    fn test_snapshot_replaces_pending_rows() {
        let mut state = open_thread("t1");
        let local = LocalId::new();
        state.insert_pending(local, Message::text(UserId::from("u1"), "hi"));

        let stored = vec![Message::text(UserId::from("u1"), "hi")];
        assert!(state.apply_snapshot(&ThreadId::from("t1"), stored));
        assert!(!state.has_pending(local));
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].message.status, DeliveryStatus::Sent);
    }

    #[test]
    fn test_snapshot_for_other_thread_ignored() {
        let mut state = open_thread("t1");
        assert!(!state.apply_snapshot(
            &ThreadId::from("t2"),
            vec![Message::text(UserId::from("u1"), "x")]
        ));
        assert!(state.entries.is_empty());
    }

    #[test]
    fn test_newest_first() {
        let mut state = open_thread("t1");
        state.apply_snapshot(
            &ThreadId::from("t1"),
            vec![
                Message::text(UserId::from("u1"), "first"),
                Message::text(UserId::from("u2"), "second"),
            ],
        );
        let order: Vec<_> = state
            .newest_first()
            .iter()
            .map(|e| e.message.preview().to_string())
            .collect();
        assert_eq!(order, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_observable_notifies_only_on_change() {
        let state = Observable::new(open_thread("t1"));
        let mut rx = state.subscribe();
        rx.borrow_and_update();

        let removed = state.modify(|s| s.rollback(LocalId::new()));
        assert!(!removed);
        assert!(!rx.has_changed().unwrap());

        state.modify(|s| s.insert_pending(LocalId::new(), Message::text(UserId::from("u1"), "hi")));
        assert!(rx.has_changed().unwrap());
        assert_eq!(state.get().pending_count(), 1);
    }

    #[test]
    fn test_summary_state_owner_guard() {
        let mut state = SummaryState {
            owner: Some(UserId::from("u1")),
            entries: Vec::new(),
        };
        assert!(!state.replace(&UserId::from("u2"), Vec::new()));
        assert!(state.replace(&UserId::from("u1"), Vec::new()));
        assert_eq!(state.unread_count(), 0);
    }
}

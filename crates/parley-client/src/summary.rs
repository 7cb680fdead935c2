//! Per-user chat summaries.
//!
//! Every participant owns a `chats/{user}` document listing one preview
//! entry per conversation. A new message rewrites the matching entry in both
//! participants' documents. The two rewrites are independent branches: each
//! retries on its own, and one failing never undoes the other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_shared::constants::{CHATS_DATA_FIELD, SUMMARIES_COLLECTION};
use parley_shared::{truncate_preview, ChatSummary, ChatSummaryEntry, ThreadId, UserId};
use parley_store::{DocumentStore, DocumentStoreExt, StoreError};
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;

/// Why a branch left a summary untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The summary document did not exist; an empty one was created.
    MissingDocument,
    /// The document has no entry for the thread.
    MissingEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    Updated,
    Skipped(SkipReason),
    /// Attempts exhausted or a permanent error; carries the last error text.
    Failed(String),
}

impl BranchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, BranchOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReport {
    pub user_id: UserId,
    pub outcome: BranchOutcome,
}

/// Result of one dual-summary upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySyncReport {
    pub thread_id: ThreadId,
    pub sender: BranchReport,
    pub receiver: BranchReport,
}

impl SummarySyncReport {
    pub fn failed_users(&self) -> Vec<UserId> {
        [&self.sender, &self.receiver]
            .into_iter()
            .filter(|b| b.outcome.is_failed())
            .map(|b| b.user_id.clone())
            .collect()
    }

    pub fn all_updated(&self) -> bool {
        self.sender.outcome == BranchOutcome::Updated
            && self.receiver.outcome == BranchOutcome::Updated
    }
}

enum EntryWrite {
    Written,
    Unchanged(SkipReason),
}

/// Read-modify-write access to `chats/{user}` documents.
#[derive(Clone)]
pub struct SummarySynchronizer {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    preview_chars: usize,
}

impl SummarySynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy, preview_chars: usize) -> Self {
        Self {
            store,
            policy,
            preview_chars,
        }
    }

    /// Rewrite the thread's entry in both participants' summaries.
    ///
    /// Both branches run concurrently. A branch whose entry is missing is
    /// skipped with a warning. If either branch fails after its retries the
    /// call returns [`ClientError::SummaryUpdateFailed`]; whatever the other
    /// branch wrote stays written.
    pub async fn upsert_summary(
        &self,
        thread_id: &ThreadId,
        sender: &UserId,
        receiver: &UserId,
        preview: &str,
    ) -> Result<SummarySyncReport> {
        let preview = truncate_preview(preview, self.preview_chars);
        let now = Utc::now();

        let (sender_outcome, receiver_outcome) = tokio::join!(
            self.sync_branch(thread_id, sender, sender, &preview, now),
            self.sync_branch(thread_id, receiver, sender, &preview, now),
        );

        let report = SummarySyncReport {
            thread_id: thread_id.clone(),
            sender: BranchReport {
                user_id: sender.clone(),
                outcome: sender_outcome,
            },
            receiver: BranchReport {
                user_id: receiver.clone(),
                outcome: receiver_outcome,
            },
        };

        let failed = report.failed_users();
        if failed.is_empty() {
            Ok(report)
        } else {
            Err(ClientError::SummaryUpdateFailed { failed, report })
        }
    }

    async fn sync_branch(
        &self,
        thread_id: &ThreadId,
        owner: &UserId,
        sender: &UserId,
        preview: &str,
        now: DateTime<Utc>,
    ) -> BranchOutcome {
        let rewrite = |entry: &mut ChatSummaryEntry| {
            entry.record_message(owner, sender, preview.to_string(), now);
        };
        let rewrite = &rewrite;
        let this = self;

        let result = self
            .policy
            .run(move |_| this.modify_entry(owner, thread_id, rewrite))
            .await;

        match result {
            Ok(EntryWrite::Written) => {
                debug!(user = %owner, thread = %thread_id, "Chat summary updated");
                BranchOutcome::Updated
            }
            Ok(EntryWrite::Unchanged(reason)) => {
                warn!(
                    user = %owner,
                    thread = %thread_id,
                    ?reason,
                    "No chat summary entry for thread, skipping"
                );
                BranchOutcome::Skipped(reason)
            }
            Err(e) => {
                error!(
                    user = %owner,
                    thread = %thread_id,
                    attempts = self.policy.max_attempts,
                    error = %e,
                    "Chat summary update failed"
                );
                BranchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Apply `f` to the owner's entry for `thread_id` and write the whole
    /// entry array back.
    async fn modify_entry<F>(&self, owner: &UserId, thread_id: &ThreadId, f: &F) -> Result<EntryWrite>
    where
        F: Fn(&mut ChatSummaryEntry) + Sync,
    {
        let Some(mut summary) = self.load(owner).await? else {
            self.create_empty(owner).await?;
            return Ok(EntryWrite::Unchanged(SkipReason::MissingDocument));
        };
        let Some(index) = summary.position(thread_id) else {
            return Ok(EntryWrite::Unchanged(SkipReason::MissingEntry));
        };

        f(&mut summary.chats_data[index]);

        self.store
            .update_field(
                SUMMARIES_COLLECTION,
                owner.as_str(),
                CHATS_DATA_FIELD,
                &summary.chats_data,
            )
            .await?;
        Ok(EntryWrite::Written)
    }

    /// Flag the owner's entry for `thread_id` as seen. Returns `false` when
    /// there was no such entry.
    pub async fn mark_seen(&self, owner: &UserId, thread_id: &ThreadId) -> Result<bool> {
        let mark = |entry: &mut ChatSummaryEntry| entry.message_seen = true;
        let mark = &mark;
        let this = self;
        let written = self
            .policy
            .run(move |_| this.modify_entry(owner, thread_id, mark))
            .await?;
        match written {
            EntryWrite::Written => {
                debug!(user = %owner, thread = %thread_id, "Chat marked seen");
                Ok(true)
            }
            EntryWrite::Unchanged(reason) => {
                warn!(user = %owner, thread = %thread_id, ?reason, "Nothing to mark seen");
                Ok(false)
            }
        }
    }

    /// Add an entry to the owner's summary, creating the document if needed.
    /// An entry already present for the same thread is left alone.
    pub async fn add_entry(&self, owner: &UserId, entry: ChatSummaryEntry) -> Result<()> {
        let this = self;
        let entry = &entry;
        let added = self
            .policy
            .run(move |_| async move {
                match this.load(owner).await? {
                    None => {
                        let summary = ChatSummary {
                            chats_data: vec![entry.clone()],
                        };
                        this.store
                            .set_as(SUMMARIES_COLLECTION, owner.as_str(), &summary)
                            .await?;
                    }
                    Some(summary) if summary.position(&entry.message_id).is_some() => {
                        return Ok(false);
                    }
                    Some(_) => {
                        let value = serde_json::to_value(entry).map_err(StoreError::from)?;
                        this.store
                            .append_to_array_field(
                                SUMMARIES_COLLECTION,
                                owner.as_str(),
                                CHATS_DATA_FIELD,
                                value,
                            )
                            .await?;
                    }
                }
                Ok(true)
            })
            .await?;

        if added {
            info!(user = %owner, thread = %entry.message_id, peer = %entry.rid, "Summary entry added");
        } else {
            debug!(user = %owner, thread = %entry.message_id, "Summary entry already present");
        }
        Ok(())
    }

    /// Drop the owner's entry for `thread_id`. Returns `true` if it existed.
    pub async fn remove_entry(&self, owner: &UserId, thread_id: &ThreadId) -> Result<bool> {
        let this = self;
        self.policy
            .run(move |_| async move {
                let Some(mut summary) = this.load(owner).await? else {
                    return Ok(false);
                };
                let before = summary.chats_data.len();
                summary.chats_data.retain(|e| &e.message_id != thread_id);
                if summary.chats_data.len() == before {
                    return Ok(false);
                }
                this.store
                    .update_field(
                        SUMMARIES_COLLECTION,
                        owner.as_str(),
                        CHATS_DATA_FIELD,
                        &summary.chats_data,
                    )
                    .await?;
                info!(user = %owner, thread = %thread_id, "Summary entry removed");
                Ok(true)
            })
            .await
    }

    /// The owner's entries, most recently updated first. A missing document
    /// reads as an empty list.
    pub async fn entries(&self, owner: &UserId) -> Result<Vec<ChatSummaryEntry>> {
        Ok(self
            .load(owner)
            .await?
            .map(ChatSummary::sorted_by_recency)
            .unwrap_or_default())
    }

    pub async fn find_by_peer(
        &self,
        owner: &UserId,
        peer: &UserId,
    ) -> Result<Option<ChatSummaryEntry>> {
        Ok(self
            .load(owner)
            .await?
            .and_then(|s| s.entry_for_peer(peer).cloned()))
    }

    /// The owner's entry for one thread, if any.
    pub async fn entry(
        &self,
        owner: &UserId,
        thread_id: &ThreadId,
    ) -> Result<Option<ChatSummaryEntry>> {
        Ok(self
            .load(owner)
            .await?
            .and_then(|s| s.entry(thread_id).cloned()))
    }

    /// Create an empty summary document for the owner if there is none.
    pub async fn ensure_document(&self, owner: &UserId) -> Result<()> {
        if self.load(owner).await?.is_none() {
            self.create_empty(owner).await?;
        }
        Ok(())
    }

    async fn load(&self, owner: &UserId) -> Result<Option<ChatSummary>> {
        Ok(self
            .store
            .get_as(SUMMARIES_COLLECTION, owner.as_str())
            .await?)
    }

    async fn create_empty(&self, owner: &UserId) -> Result<()> {
        self.store
            .set_as(SUMMARIES_COLLECTION, owner.as_str(), &ChatSummary::default())
            .await?;
        info!(user = %owner, "Created empty chat summary");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fast_policy, peer, FlakyStore};
    use chrono::Duration;
    use parley_store::SqliteStore;

    fn synchronizer(store: Arc<dyn DocumentStore>) -> SummarySynchronizer {
        SummarySynchronizer::new(store, fast_policy(), 30)
    }

    async fn seed(sync: &SummarySynchronizer, thread: &ThreadId, a: &str, b: &str) {
        let now = Utc::now();
        sync.add_entry(
            &UserId::from(a),
            ChatSummaryEntry::new(thread.clone(), peer(b), now),
        )
        .await
        .unwrap();
        sync.add_entry(
            &UserId::from(b),
            ChatSummaryEntry::new(thread.clone(), peer(a), now),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_upsert_updates_both_sides() {
        let sync = synchronizer(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let thread = ThreadId::from("t1");
        seed(&sync, &thread, "u1", "u2").await;

        let report = sync
            .upsert_summary(&thread, &UserId::from("u1"), &UserId::from("u2"), "hello")
            .await
            .unwrap();
        assert!(report.all_updated());

        let mine = sync.entry(&UserId::from("u1"), &thread).await.unwrap().unwrap();
        assert!(mine.message_seen);
        assert_eq!(mine.last_sender_id, Some(UserId::from("u1")));
        assert_eq!(mine.last_message, "hello");

        let theirs = sync.entry(&UserId::from("u2"), &thread).await.unwrap().unwrap();
        assert!(!theirs.message_seen);
        assert_eq!(theirs.last_message, "hello");
        assert_eq!(theirs.last_sender_id, Some(UserId::from("u1")));
    }

    #[tokio::test]
    async fn test_long_preview_is_truncated() {
        let sync = synchronizer(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let thread = ThreadId::from("t1");
        seed(&sync, &thread, "u1", "u2").await;

        let text = "abcdefghij".repeat(4) + "klmno";
        assert_eq!(text.chars().count(), 45);
        sync.upsert_summary(&thread, &UserId::from("u1"), &UserId::from("u2"), &text)
            .await
            .unwrap();

        let entry = sync.entry(&UserId::from("u2"), &thread).await.unwrap().unwrap();
        assert_eq!(entry.last_message, format!("{}...", &text[..30]));
    }

    #[tokio::test]
    async fn test_receiver_failure_is_partial() {
        let flaky = FlakyStore::new();
        let sync = synchronizer(flaky.clone());
        let thread = ThreadId::from("t1");
        seed(&sync, &thread, "u1", "u2").await;

        flaky.fail_updates_for(SUMMARIES_COLLECTION, "u2");
        let err = sync
            .upsert_summary(&thread, &UserId::from("u1"), &UserId::from("u2"), "hello")
            .await
            .unwrap_err();

        match err {
            ClientError::SummaryUpdateFailed { failed, report } => {
                assert_eq!(failed, vec![UserId::from("u2")]);
                assert_eq!(report.sender.outcome, BranchOutcome::Updated);
                assert!(report.receiver.outcome.is_failed());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(flaky.injected_failures(), 3);

        let mine = sync.entry(&UserId::from("u1"), &thread).await.unwrap().unwrap();
        assert_eq!(mine.last_message, "hello");
        let theirs = sync.entry(&UserId::from("u2"), &thread).await.unwrap().unwrap();
        assert_eq!(theirs.last_message, "");
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_budget() {
        let flaky = FlakyStore::new();
        let sync = synchronizer(flaky.clone());
        let thread = ThreadId::from("t1");
        seed(&sync, &thread, "u1", "u2").await;

        flaky.fail_next_updates(SUMMARIES_COLLECTION, "u2", 2);
        let report = sync
            .upsert_summary(&thread, &UserId::from("u1"), &UserId::from("u2"), "hi")
            .await
            .unwrap();
        assert!(report.all_updated());
        assert_eq!(flaky.injected_failures(), 2);
    }

    #[tokio::test]
    async fn test_missing_entry_is_skipped() {
        let sync = synchronizer(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let thread = ThreadId::from("t1");
        sync.add_entry(
            &UserId::from("u1"),
            ChatSummaryEntry::new(thread.clone(), peer("u2"), Utc::now()),
        )
        .await
        .unwrap();
        sync.ensure_document(&UserId::from("u2")).await.unwrap();

        let report = sync
            .upsert_summary(&thread, &UserId::from("u1"), &UserId::from("u2"), "hi")
            .await
            .unwrap();
        assert_eq!(report.sender.outcome, BranchOutcome::Updated);
        assert_eq!(
            report.receiver.outcome,
            BranchOutcome::Skipped(SkipReason::MissingEntry)
        );
    }

    #[tokio::test]
    async fn test_missing_document_is_created() {
        let sync = synchronizer(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let thread = ThreadId::from("t1");
        sync.add_entry(
            &UserId::from("u1"),
            ChatSummaryEntry::new(thread.clone(), peer("u2"), Utc::now()),
        )
        .await
        .unwrap();

        let report = sync
            .upsert_summary(&thread, &UserId::from("u1"), &UserId::from("u2"), "hi")
            .await
            .unwrap();
        assert_eq!(
            report.receiver.outcome,
            BranchOutcome::Skipped(SkipReason::MissingDocument)
        );
        assert!(sync.entries(&UserId::from("u2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_seen() {
        let sync = synchronizer(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let thread = ThreadId::from("t1");
        seed(&sync, &thread, "u1", "u2").await;
        sync.upsert_summary(&thread, &UserId::from("u1"), &UserId::from("u2"), "hi")
            .await
            .unwrap();

        assert!(sync.mark_seen(&UserId::from("u2"), &thread).await.unwrap());
        let entry = sync.entry(&UserId::from("u2"), &thread).await.unwrap().unwrap();
        assert!(entry.message_seen);
        assert_eq!(entry.last_message, "hi");

        assert!(!sync
            .mark_seen(&UserId::from("u2"), &ThreadId::from("other"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_add_entry_is_idempotent_and_remove() {
        let sync = synchronizer(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let owner = UserId::from("u1");
        let entry = ChatSummaryEntry::new(ThreadId::from("t1"), peer("u2"), Utc::now());

        sync.add_entry(&owner, entry.clone()).await.unwrap();
        sync.add_entry(&owner, entry).await.unwrap();
        assert_eq!(sync.entries(&owner).await.unwrap().len(), 1);

        assert!(sync.remove_entry(&owner, &ThreadId::from("t1")).await.unwrap());
        assert!(!sync.remove_entry(&owner, &ThreadId::from("t1")).await.unwrap());
        assert!(sync.entries(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_sorted_and_find_by_peer() {
        let sync = synchronizer(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let owner = UserId::from("u1");
        let now = Utc::now();

        sync.add_entry(
            &owner,
            ChatSummaryEntry::new(ThreadId::from("old"), peer("u2"), now - Duration::hours(1)),
        )
        .await
        .unwrap();
        sync.add_entry(
            &owner,
            ChatSummaryEntry::new(ThreadId::from("new"), peer("u3"), now),
        )
        .await
        .unwrap();

        let entries = sync.entries(&owner).await.unwrap();
        let order: Vec<_> = entries.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(order, vec!["new", "old"]);

        let found = sync
            .find_by_peer(&owner, &UserId::from("u2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.message_id, ThreadId::from("old"));
        assert!(sync
            .find_by_peer(&owner, &UserId::from("u9"))
            .await
            .unwrap()
            .is_none());
    }
}

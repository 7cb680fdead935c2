//! Fixtures shared by the client's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley_shared::{PeerProfile, UserId};
use parley_store::{DocumentStore, Result, SnapshotStream, SqliteStore, StoreError};
use serde_json::{Map, Value};

use crate::retry::RetryPolicy;

/// Same shape as the production default, with millisecond steps.
pub(crate) fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

pub(crate) fn peer(id: &str) -> PeerProfile {
    PeerProfile {
        id: UserId::from(id),
        name: format!("User {id}"),
        avatar: None,
    }
}

/// Remaining injected failures for one document. `None` fails forever.
type Budget = Option<u32>;

/// In-memory store that can be told to fail writes.
pub(crate) struct FlakyStore {
    inner: SqliteStore,
    failing_updates: Mutex<HashMap<(String, String), Budget>>,
    fail_appends: AtomicBool,
    injected: AtomicU32,
}

impl FlakyStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteStore::open_in_memory().expect("in-memory store"),
            failing_updates: Mutex::new(HashMap::new()),
            fail_appends: AtomicBool::new(false),
            injected: AtomicU32::new(0),
        })
    }

    /// Every `update` of this document fails with a transient error.
    pub(crate) fn fail_updates_for(&self, collection: &str, id: &str) {
        self.failing_updates
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), None);
    }

    /// The next `count` updates of this document fail, later ones succeed.
    pub(crate) fn fail_next_updates(&self, collection: &str, id: &str, count: u32) {
        self.failing_updates
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), Some(count));
    }

    pub(crate) fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn heal(&self) {
        self.failing_updates.lock().unwrap().clear();
        self.fail_appends(false);
    }

    /// Number of failures injected so far.
    pub(crate) fn injected_failures(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    fn should_fail_update(&self, collection: &str, id: &str) -> bool {
        let mut failing = self.failing_updates.lock().unwrap();
        let key = (collection.to_string(), id.to_string());
        let fail = match failing.get_mut(&key) {
            None => false,
            Some(None) => true,
            Some(Some(0)) => false,
            Some(Some(left)) => {
                *left -= 1;
                true
            }
        };
        if fail {
            self.injected.fetch_add(1, Ordering::SeqCst);
        }
        fail
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.inner.get(collection, id).await
    }

    async fn set(&self, collection: &str, id: &str, value: Value) -> Result<()> {
        self.inner.set(collection, id, value).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()> {
        if self.should_fail_update(collection, id) {
            return Err(StoreError::Unavailable(format!("injected failure on {collection}/{id}")));
        }
        self.inner.update(collection, id, fields).await
    }

    async fn append_to_array_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected append failure".into()));
        }
        self.inner
            .append_to_array_field(collection, id, field, value)
            .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        self.inner.delete(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        self.inner.list(collection).await
    }

    fn watch(&self, collection: &str, id: &str) -> SnapshotStream {
        self.inner.watch(collection, id)
    }
}

//! The document store contract consumed by the client.
//!
//! Documents are JSON objects addressed by `(collection, id)`. Every write
//! to a single document is atomic; nothing spans documents. Change
//! notifications are delivered at-least-once through [`DocumentStore::watch`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// One observed state of a document. `value` is `None` when the document
/// does not exist (yet, or any more).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub collection: String,
    pub id: String,
    pub value: Option<Value>,
}

impl Snapshot {
    /// Decode the snapshot body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.value
            .clone()
            .map(|v| decode_document(&self.collection, &self.id, v))
            .transpose()
    }
}

/// Stream of snapshots for one document. The first item is the current
/// state; later items follow every change. Dropping the stream cancels the
/// subscription.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` when absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Create or replace a document.
    async fn set(&self, collection: &str, id: &str, value: Value) -> Result<()>;

    /// Replace the given top-level fields of an existing document.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()>;

    /// Atomically append `value` to an array field unless an equal element
    /// is already present (set-union semantics). A missing field is treated
    /// as an empty array.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the document does not exist.
    async fn append_to_array_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<()>;

    /// Delete a document. Returns `true` if it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// All documents of a collection as `(id, body)` pairs.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>>;

    /// Subscribe to a single document.
    fn watch(&self, collection: &str, id: &str) -> SnapshotStream;
}

/// Typed helpers on top of any [`DocumentStore`]. Bodies are validated at
/// this boundary; a body that does not match `T` is reported as
/// [`StoreError::Malformed`].
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn get_as<T>(&self, collection: &str, id: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(collection, id).await? {
            Some(value) => decode_document(collection, id, value).map(Some),
            None => Ok(None),
        }
    }

    async fn set_as<T>(&self, collection: &str, id: &str, doc: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(doc)?;
        self.set(collection, id, value).await
    }

    async fn update_field<T>(&self, collection: &str, id: &str, field: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let mut fields = Map::new();
        fields.insert(field.to_string(), serde_json::to_value(value)?);
        self.update(collection, id, fields).await
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

pub(crate) fn decode_document<T: DeserializeOwned>(
    collection: &str,
    id: &str,
    value: Value,
) -> Result<T> {
    serde_json::from_value(value).map_err(|source| StoreError::Malformed {
        collection: collection.to_string(),
        id: id.to_string(),
        source,
    })
}

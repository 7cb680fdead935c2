//! Append-only message log per thread.

use std::sync::Arc;

use parley_shared::constants::{MESSAGES_FIELD, THREADS_COLLECTION};
use parley_shared::{Message, Thread, ThreadId};
use parley_store::{DocumentStore, DocumentStoreExt, StoreError};
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Writes and reads thread documents. Appends are atomic per message; no
/// ordering is guaranteed between concurrent appenders.
#[derive(Clone)]
pub struct MessageLedger {
    store: Arc<dyn DocumentStore>,
}

impl MessageLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create an empty thread under a fresh id.
    pub async fn create_thread(&self) -> Result<ThreadId> {
        let thread_id = ThreadId::generate();
        self.store
            .set_as(THREADS_COLLECTION, thread_id.as_str(), &Thread::new())
            .await?;
        info!(thread = %thread_id, "Thread created");
        Ok(thread_id)
    }

    /// Append one message to the thread's log.
    pub async fn append(&self, thread_id: &ThreadId, message: &Message) -> Result<()> {
        if thread_id.is_empty() {
            return Err(ClientError::InvalidInput("thread id is empty".into()));
        }
        message.validate()?;

        let value = serde_json::to_value(message).map_err(StoreError::from)?;
        match self
            .store
            .append_to_array_field(THREADS_COLLECTION, thread_id.as_str(), MESSAGES_FIELD, value)
            .await
        {
            Ok(()) => {
                debug!(thread = %thread_id, message = %message.id, "Message appended");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => Err(ClientError::ThreadNotFound(thread_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Messages of a thread, oldest first.
    pub async fn messages(&self, thread_id: &ThreadId) -> Result<Vec<Message>> {
        let thread: Option<Thread> = self
            .store
            .get_as(THREADS_COLLECTION, thread_id.as_str())
            .await?;
        thread
            .map(|t| t.messages)
            .ok_or_else(|| ClientError::ThreadNotFound(thread_id.clone()))
    }

    pub async fn delete_thread(&self, thread_id: &ThreadId) -> Result<bool> {
        Ok(self
            .store
            .delete(THREADS_COLLECTION, thread_id.as_str())
            .await?)
    }
}

//! SQLite-backed [`DocumentStore`].
//!
//! The [`SqliteStore`] owns a [`rusqlite::Connection`] behind a mutex, so
//! every operation on a single document is atomic. Each committed write is
//! published on a broadcast channel from inside the lock, which keeps the
//! notification order identical to the write order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use directories::ProjectDirs;
use futures::StreamExt;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::store::{DocumentStore, Snapshot, SnapshotStream};

/// Capacity of the change feed. Subscribers that fall further behind re-read
/// the document they watch.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Cheaply cloneable handle to a document database.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<Snapshot>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/parley/parley.db`
    /// - macOS:   `~/Library/Application Support/com.parley.parley/parley.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\parley\parley\data\parley.db`
    pub fn open() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "parley", "parley").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("parley.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database. Contents vanish with the handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                changes,
                path,
            }),
        })
    }

    /// Filesystem path of the open database, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner
            .conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))
    }

    fn read_doc(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        read_body(&conn, collection, id)
    }

    fn snapshot(&self, collection: &str, id: &str) -> Result<Snapshot> {
        Ok(Snapshot {
            collection: collection.to_string(),
            id: id.to_string(),
            value: self.read_doc(collection, id)?,
        })
    }

    /// Read-modify-write of one document under the connection lock.
    ///
    /// `modify` returns `Ok(false)` to leave the document untouched.
    fn modify_doc<F>(&self, collection: &str, id: &str, modify: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>) -> Result<bool>,
    {
        let conn = self.lock()?;
        let mut doc = match read_body(&conn, collection, id)? {
            Some(Value::Object(map)) => map,
            Some(_) | None => return Err(StoreError::not_found(collection, id)),
        };

        if modify(&mut doc)? {
            let value = Value::Object(doc);
            write_body(&conn, collection, id, &value)?;
            self.publish(collection, id, Some(value));
        }
        Ok(())
    }

    fn publish(&self, collection: &str, id: &str, value: Option<Value>) {
        // No receivers is the common case; nothing to report.
        let _ = self.inner.changes.send(Snapshot {
            collection: collection.to_string(),
            id: id.to_string(),
            value,
        });
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.read_doc(collection, id)
    }

    async fn set(&self, collection: &str, id: &str, value: Value) -> Result<()> {
        let conn = self.lock()?;
        write_body(&conn, collection, id, &value)?;
        self.publish(collection, id, Some(value));
        tracing::debug!(collection, id, "document set");
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()> {
        self.modify_doc(collection, id, |doc| {
            doc.extend(fields);
            Ok(true)
        })
    }

    async fn append_to_array_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.modify_doc(collection, id, |doc| {
            let slot = doc
                .entry(field.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            let items = slot.as_array_mut().ok_or_else(|| StoreError::NotAnArray {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
            })?;
            if items.contains(&value) {
                return Ok(false);
            }
            items.push(value);
            Ok(true)
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        if affected > 0 {
            self.publish(collection, id, None);
        }
        Ok(affected > 0)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, body FROM documents
             WHERE collection = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![collection], |row| {
            let id: String = row.get(0)?;
            let body: String = row.get(1)?;
            Ok((id, body))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            let value = parse_body(collection, &id, &body)?;
            docs.push((id, value));
        }
        Ok(docs)
    }

    fn watch(&self, collection: &str, id: &str) -> SnapshotStream {
        // Subscribe before reading so no write between the two is missed.
        let rx = self.inner.changes.subscribe();
        let initial = self.snapshot(collection, id);

        let key = (collection.to_string(), id.to_string());
        let store = self.clone();

        let updates = futures::stream::unfold((rx, store, key), |(mut rx, store, key)| async move {
            loop {
                match rx.recv().await {
                    Ok(snap) if snap.collection == key.0 && snap.id == key.1 => {
                        return Some((Ok(snap), (rx, store, key)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            collection = %key.0,
                            id = %key.1,
                            skipped,
                            "change feed lagged, re-reading document"
                        );
                        let snap = store.snapshot(&key.0, &key.1);
                        return Some((snap, (rx, store, key)));
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        futures::stream::once(async move { initial })
            .chain(updates)
            .boxed()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_body(conn: &Connection, collection: &str, id: &str) -> Result<Option<Value>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;

    body.map(|b| parse_body(collection, id, &b)).transpose()
}

fn write_body(conn: &Connection, collection: &str, id: &str, value: &Value) -> Result<()> {
    let body = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO documents (collection, id, body, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        params![collection, id, body, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn parse_body(collection: &str, id: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|source| StoreError::Malformed {
        collection: collection.to_string(),
        id: id.to_string(),
        source,
    })
}

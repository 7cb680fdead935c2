//! # parley-store
//!
//! Document storage for parley. The crate defines the [`DocumentStore`]
//! contract the client consumes (get / set / update / union-append / watch)
//! and ships [`SqliteStore`], a local implementation that keeps one JSON
//! document per row and publishes every committed write to its watchers.

pub mod database;
pub mod migrations;
pub mod store;

mod error;

pub use database::SqliteStore;
pub use error::{Result, StoreError};
pub use store::{DocumentStore, DocumentStoreExt, Snapshot, SnapshotStream};

//! # parley-client
//!
//! Client-side chat synchronization: the per-thread message ledger, the
//! per-user chat summaries kept in step with it, optimistic sends with
//! rollback, and live subscriptions that feed observable view state.

pub mod auth;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod files;
pub mod ledger;
pub mod realtime;
pub mod retry;
pub mod session;
pub mod state;
pub mod summary;
pub mod upload;

#[cfg(test)]
mod test_support;

use tracing_subscriber::{fmt, EnvFilter};

pub use auth::{AuthProvider, LocalAuth};
pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::{ClientError, ErrorKind, Result};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use session::ChatSession;
pub use summary::{BranchOutcome, SummarySyncReport};

/// Install the global tracing subscriber. `RUST_LOG` wins over
/// `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

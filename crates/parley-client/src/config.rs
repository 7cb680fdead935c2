//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so the demo binary and tests run with zero
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{
    PREVIEW_MAX_CHARS, SUMMARY_MAX_ATTEMPTS, SUMMARY_RETRY_BASE_DELAY_MS, UPLOAD_TIMEOUT_SECS,
};

use crate::retry::RetryPolicy;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SQLite database file.
    /// Env: `PARLEY_DB_PATH`
    /// Default: platform data directory (see `SqliteStore::open`).
    pub db_path: Option<PathBuf>,

    /// Endpoint of the hosted image upload service.
    /// Env: `PARLEY_IMAGE_HOST_URL`
    /// Default: none (avatar upload disabled).
    pub image_host_url: Option<String>,

    /// Unsigned upload preset sent with every avatar upload.
    /// Env: `PARLEY_UPLOAD_PRESET`
    /// Default: `"parley"`
    pub upload_preset: String,

    /// Deadline for one avatar upload.
    /// Env: `PARLEY_UPLOAD_TIMEOUT_SECS`
    /// Default: `30`
    pub upload_timeout: Duration,

    /// Bounded retry applied to each chat summary branch.
    /// Env: `PARLEY_SUMMARY_RETRIES`, `PARLEY_SUMMARY_RETRY_DELAY_MS`
    /// Default: 3 attempts, 1000 ms linear step.
    pub summary_retry: RetryPolicy,

    /// Characters kept in a chat list preview.
    /// Env: `PARLEY_PREVIEW_CHARS`
    /// Default: `30`
    pub preview_chars: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            image_host_url: None,
            upload_preset: "parley".to_string(),
            upload_timeout: Duration::from_secs(UPLOAD_TIMEOUT_SECS),
            summary_retry: RetryPolicy::new(
                SUMMARY_MAX_ATTEMPTS,
                Duration::from_millis(SUMMARY_RETRY_BASE_DELAY_MS),
            ),
            preview_chars: PREVIEW_MAX_CHARS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("PARLEY_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("PARLEY_IMAGE_HOST_URL") {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.image_host_url = Some(url);
            } else {
                tracing::warn!(value = %url, "Invalid PARLEY_IMAGE_HOST_URL, avatar upload disabled");
            }
        }

        if let Some(preset) = lookup("PARLEY_UPLOAD_PRESET") {
            config.upload_preset = preset;
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "PARLEY_UPLOAD_TIMEOUT_SECS") {
            config.upload_timeout = Duration::from_secs(secs);
        }

        if let Some(attempts) = parse_var::<u32>(&lookup, "PARLEY_SUMMARY_RETRIES") {
            if attempts == 0 {
                tracing::warn!("PARLEY_SUMMARY_RETRIES must be at least 1, using default");
            } else {
                config.summary_retry.max_attempts = attempts;
            }
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "PARLEY_SUMMARY_RETRY_DELAY_MS") {
            config.summary_retry.base_delay = Duration::from_millis(ms);
        }

        if let Some(chars) = parse_var::<usize>(&lookup, "PARLEY_PREVIEW_CHARS") {
            if chars == 0 {
                tracing::warn!("PARLEY_PREVIEW_CHARS must be at least 1, using default");
            } else {
                config.preview_chars = chars;
            }
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

//! User profiles: first-login bootstrap, edits, search and presence.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parley_shared::constants::{ONLINE_THRESHOLD_MINUTES, USERS_COLLECTION};
use parley_shared::image::ImageFile;
use parley_shared::{UserId, UserProfile};
use parley_store::{DocumentStore, DocumentStoreExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::upload::ImageHost;

/// Fields a user edits on the profile screen.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: String,
    pub bio: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    LastSeen(DateTime<Utc>),
}

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
    image_host: Option<Arc<dyn ImageHost>>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, image_host: Option<Arc<dyn ImageHost>>) -> Self {
        Self { store, image_host }
    }

    /// Profile for a user signing in. Creates a skeleton on first login and
    /// refreshes `lastSeen` on every later one.
    pub async fn load_or_create(&self, user: &UserId) -> Result<UserProfile> {
        if user.is_empty() {
            return Err(ClientError::InvalidInput("user id is empty".into()));
        }
        let now = Utc::now();
        match self.profile(user).await? {
            Some(mut profile) => {
                self.store
                    .update_field(USERS_COLLECTION, user.as_str(), "lastSeen", &now.timestamp_millis())
                    .await?;
                profile.last_seen = now;
                debug!(user = %user, "Profile loaded");
                Ok(profile)
            }
            None => {
                let mut profile = UserProfile::new(user.clone());
                profile.last_seen = now;
                self.store
                    .set_as(USERS_COLLECTION, user.as_str(), &profile)
                    .await?;
                info!(user = %user, "Profile created");
                Ok(profile)
            }
        }
    }

    pub async fn profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.store.get_as(USERS_COLLECTION, user.as_str()).await?)
    }

    /// Create a profile with a username, as a sign-up flow would.
    pub async fn register(&self, user: &UserId, username: &str, name: &str) -> Result<UserProfile> {
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(ClientError::InvalidInput("username is empty".into()));
        }
        let mut profile = self.load_or_create(user).await?;
        profile.username = username;
        profile.name = name.trim().to_string();
        self.store
            .set_as(USERS_COLLECTION, user.as_str(), &profile)
            .await?;
        info!(user = %user, username = %profile.username, "Profile registered");
        Ok(profile)
    }

    /// Apply a profile edit. A new avatar is uploaded first; a profile
    /// without any avatar is rejected.
    pub async fn save_profile(
        &self,
        user: &UserId,
        update: ProfileUpdate,
        avatar: Option<ImageFile>,
    ) -> Result<UserProfile> {
        let mut profile = self
            .profile(user)
            .await?
            .ok_or_else(|| ClientError::UserNotFound(user.clone()))?;

        if avatar.is_none() && profile.avatar.is_none() {
            return Err(ClientError::InvalidInput("please upload an avatar".into()));
        }

        if let Some(file) = avatar {
            let host = self
                .image_host
                .as_ref()
                .ok_or_else(|| ClientError::Upload("no image host configured".into()))?;
            profile.avatar = Some(host.upload(&file).await?);
        }
        profile.name = update.name.trim().to_string();
        profile.bio = Some(update.bio.trim().to_string()).filter(|b| !b.is_empty());

        self.store
            .set_as(USERS_COLLECTION, user.as_str(), &profile)
            .await?;
        info!(user = %user, "Profile updated");
        Ok(profile)
    }

    /// Users whose username starts with `term` (case-insensitive), minus
    /// `exclude`.
    pub async fn search(&self, term: &str, exclude: &UserId) -> Result<Vec<UserProfile>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: Vec<UserProfile> = self
            .store
            .list(USERS_COLLECTION)
            .await?
            .into_iter()
            .filter_map(|(id, body)| decode_profile(&id, body))
            .filter(|p| &p.id != exclude && p.username.to_lowercase().starts_with(&term))
            .collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(found)
    }
}

fn decode_profile(id: &str, body: Value) -> Option<UserProfile> {
    match serde_json::from_value(body) {
        Ok(profile) => Some(profile),
        Err(e) => {
            warn!(user = %id, error = %e, "Skipping malformed profile");
            None
        }
    }
}

pub fn presence(profile: &UserProfile, now: DateTime<Utc>) -> Presence {
    if now - profile.last_seen < Duration::minutes(ONLINE_THRESHOLD_MINUTES) {
        Presence::Online
    } else {
        Presence::LastSeen(profile.last_seen)
    }
}

/// Human-readable presence line for a last-seen timestamp.
pub fn format_last_seen(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - last_seen;
    if diff < Duration::zero() {
        return "Last seen recently".to_string();
    }

    let minutes = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();

    if minutes < ONLINE_THRESHOLD_MINUTES {
        "Online".to_string()
    } else if minutes < 60 {
        format!("Last seen {minutes} {} ago", plural("minute", minutes))
    } else if hours < 24 {
        format!("Last seen {hours} {} ago", plural("hour", hours))
    } else if days == 1 {
        format!("Last seen yesterday at {}", last_seen.format("%I:%M %p"))
    } else if days < 7 {
        format!("Last seen {days} days ago")
    } else {
        format!("Last seen on {}", last_seen.format("%b %-d, %Y"))
    }
}

fn plural(word: &str, n: i64) -> String {
    if n == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

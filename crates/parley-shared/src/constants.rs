/// Application name
pub const APP_NAME: &str = "Parley";

/// Collection holding one profile document per user
pub const USERS_COLLECTION: &str = "users";

/// Collection holding one thread document per conversation
pub const THREADS_COLLECTION: &str = "messages";

/// Collection holding one chat summary document per user
pub const SUMMARIES_COLLECTION: &str = "chats";

/// Array field of a thread document
pub const MESSAGES_FIELD: &str = "messages";

/// Array field of a chat summary document
pub const CHATS_DATA_FIELD: &str = "chatsData";

/// Maximum number of characters kept in a chat list preview
pub const PREVIEW_MAX_CHARS: usize = 30;

/// Suffix appended to a truncated preview
pub const PREVIEW_ELLIPSIS: &str = "...";

/// Preview shown in the chat list for image messages
pub const IMAGE_PREVIEW: &str = "📷 Image";

/// Maximum accepted image file size in bytes (5 MiB)
pub const MAX_IMAGE_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Image types accepted for embedding in a message
pub const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Image types accepted by the external image host (profile avatars)
pub const HOSTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Quality step used when re-encoding towards the size budget, in percent
pub const QUALITY_STEP_PERCENT: u8 = 10;

/// Quality never drops below this floor, in percent
pub const QUALITY_FLOOR_PERCENT: u8 = 10;

/// Summary updates: attempts per participant branch
pub const SUMMARY_MAX_ATTEMPTS: u32 = 3;

/// Summary updates: base delay multiplied by the attempt number, in milliseconds
pub const SUMMARY_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Image host request timeout in seconds
pub const UPLOAD_TIMEOUT_SECS: u64 = 30;

/// A user counts as online when seen within this many minutes
pub const ONLINE_THRESHOLD_MINUTES: i64 = 5;

//! Types shared by the parley crates: identifiers, persisted document
//! models, preview helpers and the image compression pipeline.

pub mod constants;
pub mod error;
pub mod image;
pub mod models;
pub mod types;

pub use error::{ImageError, ModelError};
pub use models::*;
pub use types::{LocalId, MessageId, ThreadId, UserId};

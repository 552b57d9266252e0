//! Types shared by every barista crate.

pub mod types;

pub use types::{InboundEvent, MediaAttachment, MediaKind, ReplyPayload};

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

//! Domain operations over the database pool.
//!
//! Handlers in [`crate::api`] validate request shapes and then call into these
//! modules; nothing here knows about HTTP.

pub mod access;
pub mod credentials;
pub mod documents;
mod error;
pub mod password_reset;
pub mod profile;
pub mod sessions;

pub use error::AuthError;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way every table stores it
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in storage format
pub fn now() -> String {
    timestamp(Utc::now())
}

/// True when a stored timestamp is at or before `now`. Unreadable timestamps
/// count as expired.
pub fn is_expired(stored: &str, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(stored) {
        Ok(at) => at.with_timezone(&Utc) <= now,
        Err(_) => true,
    }
}

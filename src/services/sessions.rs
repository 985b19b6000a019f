//! Opaque bearer sessions.
//!
//! A session is valid while a row with the token's SHA-256 digest exists and
//! its expiry lies in the future. Expired rows are removed when they are next
//! presented.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::{credentials, is_expired, profile, timestamp, AuthError};
use crate::crypto::{generate_token, hash_token, PasswordHashing, SESSION_TOKEN_BYTES};
use crate::db::{DbPool, Session, User};

/// A freshly issued session. The raw token exists only here.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Create a session for `user_id` lasting `ttl`
pub async fn issue(pool: &DbPool, user_id: i64, ttl: Duration) -> Result<IssuedSession, sqlx::Error> {
    let token = generate_token(SESSION_TOKEN_BYTES);
    let created_at = Utc::now();
    let expires_at = created_at + ttl;

    sqlx::query(
        "INSERT INTO sessions (user_id, token_hash, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(timestamp(created_at))
    .bind(timestamp(expires_at))
    .execute(pool)
    .await?;

    Ok(IssuedSession { token, expires_at })
}

/// Resolve a bearer token to its user
pub async fn authenticate(pool: &DbPool, token: &str) -> Result<User, AuthError> {
    let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = ?")
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    if is_expired(&session.expires_at, Utc::now()) {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session.id)
            .execute(pool)
            .await?;
        debug!(user_id = session.user_id, "Expired session removed");
        return Err(AuthError::Unauthenticated);
    }

    credentials::find_by_id(pool, session.user_id)
        .await?
        .ok_or(AuthError::Unauthenticated)
}

/// Verify credentials and open a session.
///
/// With the single-session preference on, a login while another unexpired
/// session exists signs the user out everywhere and fails; the next attempt
/// succeeds.
pub async fn login(
    pool: &DbPool,
    hashing: &PasswordHashing,
    email: &str,
    password: &str,
    ttl: Duration,
) -> Result<(User, IssuedSession), AuthError> {
    let user = credentials::verify(pool, hashing, email, password).await?;

    if profile::single_session_enabled(pool, user.id).await? && has_active(pool, user.id).await? {
        revoke_all(pool, user.id).await?;
        warn!(user_id = user.id, "Concurrent login refused; all sessions revoked");
        return Err(AuthError::SessionConflict);
    }

    let session = issue(pool, user.id, ttl).await?;
    info!(user_id = user.id, "User logged in");
    Ok((user, session))
}

/// Delete the session behind `token`, if any
pub async fn logout(pool: &DbPool, token: &str) -> Result<(), sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(pool)
        .await?;
    if result.rows_affected() > 0 {
        info!("Session logged out");
    }
    Ok(())
}

pub async fn revoke_all(pool: &DbPool, user_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Whether the user holds at least one unexpired session
pub async fn has_active(pool: &DbPool, user_id: i64) -> Result<bool, sqlx::Error> {
    let expiries: Vec<(String,)> = sqlx::query_as("SELECT expires_at FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    let now = Utc::now();
    Ok(expiries.iter().any(|(at,)| !is_expired(at, now)))
}

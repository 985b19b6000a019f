//! Single-use password reset tickets.

use chrono::{Duration, Utc};
use tracing::info;

use super::{credentials, is_expired, now, timestamp, AuthError};
use crate::crypto::{generate_token, hash_token, PasswordHashing, RESET_TOKEN_BYTES};
use crate::db::{DbPool, PasswordReset};

/// Open a reset ticket for `email`.
///
/// Returns the raw token for a known account and `None` otherwise. A token is
/// generated either way so both paths do the same work.
pub async fn request(pool: &DbPool, email: &str, ttl: Duration) -> Result<Option<String>, sqlx::Error> {
    let token = generate_token(RESET_TOKEN_BYTES);

    let Some(user) = credentials::find_by_email(pool, email).await? else {
        return Ok(None);
    };

    sqlx::query("INSERT INTO password_resets (user_id, token_hash, expires_at) VALUES (?, ?, ?)")
        .bind(user.id)
        .bind(hash_token(&token))
        .bind(timestamp(Utc::now() + ttl))
        .execute(pool)
        .await?;

    info!(user_id = user.id, "Password reset requested");
    Ok(Some(token))
}

/// Redeem a ticket: store the new password, mark the ticket used and sign the
/// user out everywhere, atomically.
pub async fn consume(
    pool: &DbPool,
    hashing: &PasswordHashing,
    token: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    let reset = sqlx::query_as::<_, PasswordReset>(
        "SELECT * FROM password_resets WHERE token_hash = ?",
    )
    .bind(hash_token(token))
    .fetch_optional(pool)
    .await?
    .ok_or(AuthError::InvalidResetToken)?;

    if reset.used_at.is_some() || is_expired(&reset.expires_at, Utc::now()) {
        return Err(AuthError::InvalidResetToken);
    }

    let password_hash = hashing.hash_blocking(new_password).await?;

    let mut tx = pool.begin().await?;

    // Guard against a concurrent redemption of the same ticket
    let claimed = sqlx::query(
        "UPDATE password_resets SET used_at = ? WHERE id = ? AND used_at IS NULL",
    )
    .bind(now())
    .bind(reset.id)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(AuthError::InvalidResetToken);
    }

    credentials::set_password(&mut tx, reset.user_id, &password_hash).await?;

    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(reset.user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(user_id = reset.user_id, "Password reset completed; sessions revoked");
    Ok(())
}

//! User identities and password verification.

use sqlx::sqlite::SqliteExecutor;
use sqlx::SqliteConnection;
use tracing::info;

use super::{access, now, AuthError};
use crate::crypto::PasswordHashing;
use crate::db::{DbPool, User, UserResponse, DEFAULT_SIGNUP_ROLE};

/// Canonical form of an email address used for storage and comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trimmed name; blank names become `None`
pub fn normalize_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

pub async fn find_by_id(
    db: impl SqliteExecutor<'_>,
    user_id: i64,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await
}

pub async fn find_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
}

async fn email_taken(
    db: impl SqliteExecutor<'_>,
    email: &str,
    except: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email = ? AND id != ?")
        .bind(email)
        .bind(except.unwrap_or(0))
        .fetch_optional(db)
        .await?;
    Ok(row.is_some())
}

/// Register a new account and grant it the default signup role
pub async fn create(
    pool: &DbPool,
    hashing: &PasswordHashing,
    email: &str,
    name: Option<&str>,
    password: &str,
) -> Result<User, AuthError> {
    let email = normalize_email(email);
    let name = normalize_name(name);

    if email_taken(pool, &email, None).await? {
        return Err(AuthError::EmailInUse);
    }

    let password_hash = hashing.hash_blocking(password).await?;

    let result = sqlx::query(
        "INSERT INTO users (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .bind(now())
    .execute(pool)
    .await
    .map_err(AuthError::from_insert)?;

    let user_id = result.last_insert_rowid();
    access::assign_role_by_name(pool, user_id, DEFAULT_SIGNUP_ROLE).await?;

    info!(user_id, "Account created");

    find_by_id(pool, user_id)
        .await?
        .ok_or(AuthError::Database(sqlx::Error::RowNotFound))
}

/// Check an email/password pair.
///
/// An unknown email still pays for one hash verification.
pub async fn verify(
    pool: &DbPool,
    hashing: &PasswordHashing,
    email: &str,
    password: &str,
) -> Result<User, AuthError> {
    let user = find_by_email(pool, email).await?;

    let valid = hashing
        .verify_blocking(password, user.as_ref().map(|u| u.password_hash.as_str()))
        .await;

    match user {
        Some(user) if valid => Ok(user),
        _ => Err(AuthError::InvalidCredentials),
    }
}

/// Change name and/or email. `None` keeps the current value; an empty email
/// counts as absent.
pub async fn update(
    pool: &DbPool,
    user_id: i64,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<User, AuthError> {
    let mut conn = pool.acquire().await?;
    update_on(&mut conn, user_id, name, email).await
}

/// [`update`] on a caller-held connection, so it can join a transaction
pub async fn update_on(
    conn: &mut SqliteConnection,
    user_id: i64,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<User, AuthError> {
    let current = find_by_id(&mut *conn, user_id)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    let email = email
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .unwrap_or(current.email);
    let name = match name {
        Some(name) => normalize_name(Some(name)),
        None => current.name,
    };

    if email_taken(&mut *conn, &email, Some(user_id)).await? {
        return Err(AuthError::EmailInUse);
    }

    sqlx::query("UPDATE users SET name = ?, email = ? WHERE id = ?")
        .bind(&name)
        .bind(&email)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(AuthError::from_insert)?;

    find_by_id(&mut *conn, user_id)
        .await?
        .ok_or(AuthError::Database(sqlx::Error::RowNotFound))
}

/// Replace the stored password hash inside an open transaction
pub async fn set_password(
    tx: &mut sqlx::SqliteConnection,
    user_id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(user_id)
        .execute(tx)
        .await?;
    Ok(())
}

/// All users, ordered by id
pub async fn list(pool: &DbPool) -> Result<Vec<UserResponse>, sqlx::Error> {
    sqlx::query_as::<_, UserResponse>("SELECT id, email, name FROM users ORDER BY id")
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_hashing;
    use crate::db;

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
        assert_eq!(normalize_name(Some("  ")), None);
        assert_eq!(normalize_name(Some(" Ana ")), Some("Ana".to_string()));
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let pool = db::init_memory().await.unwrap();
        let hashing = test_hashing();

        let user = create(&pool, &hashing, " Ana@Example.com", Some("Ana"), "pw1")
            .await
            .unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert!(user.password_hash.starts_with("$argon2id$"));

        let verified = verify(&pool, &hashing, "ANA@example.com", "pw1").await.unwrap();
        assert_eq!(verified.id, user.id);

        assert!(matches!(
            verify(&pool, &hashing, "ana@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            verify(&pool, &hashing, "nobody@example.com", "pw1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_email_collision_is_case_insensitive() {
        let pool = db::init_memory().await.unwrap();
        let hashing = test_hashing();

        create(&pool, &hashing, "a@b.c", None, "x").await.unwrap();
        let err = create(&pool, &hashing, "A@B.C", None, "y").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailInUse));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_signup_gets_default_role() {
        let pool = db::init_memory().await.unwrap();
        let user = create(&pool, &test_hashing(), "a@b.c", None, "x")
            .await
            .unwrap();

        let role: (String,) = sqlx::query_as(
            "SELECT roles.name FROM user_roles JOIN roles ON roles.id = user_roles.role_id WHERE user_id = ?",
        )
        .bind(user.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(role.0, DEFAULT_SIGNUP_ROLE);
    }

    #[tokio::test]
    async fn test_update_keeps_absent_fields() {
        let pool = db::init_memory().await.unwrap();
        let hashing = test_hashing();
        let ana = create(&pool, &hashing, "ana@x.io", Some("Ana"), "x").await.unwrap();
        create(&pool, &hashing, "bob@x.io", None, "x").await.unwrap();

        let updated = update(&pool, ana.id, None, Some(" ANA2@x.io")).await.unwrap();
        assert_eq!(updated.email, "ana2@x.io");
        assert_eq!(updated.name.as_deref(), Some("Ana"));

        let updated = update(&pool, ana.id, Some("Ana Clara"), None).await.unwrap();
        assert_eq!(updated.email, "ana2@x.io");
        assert_eq!(updated.name.as_deref(), Some("Ana Clara"));

        let err = update(&pool, ana.id, None, Some("BOB@x.io")).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailInUse));

        let users = list(&pool).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, ana.id);
    }
}

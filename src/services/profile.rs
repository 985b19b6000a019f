//! Profile and preference rows, upserted wholesale.

use sqlx::sqlite::SqliteExecutor;
use tracing::info;

use super::{credentials, now, AuthError};
use crate::db::{DbPool, Preferences, PreferencesRow, Profile, ProfileRow, User};

pub async fn get_profile(pool: &DbPool, user_id: i64) -> Result<Profile, sqlx::Error> {
    let row = sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT phone, team, role, timezone, phones, emails, addresses, comments
        FROM user_profiles WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Profile::from).unwrap_or_default())
}

pub async fn get_preferences(pool: &DbPool, user_id: i64) -> Result<Preferences, sqlx::Error> {
    let row = sqlx::query_as::<_, PreferencesRow>(
        r#"
        SELECT email_notifications, single_session, module_pipeline, module_finance,
               module_contacts, module_calendar, language, notify_mentions,
               notify_pipeline_updates, notify_finance_alerts, notify_weekly_summary,
               notify_product_updates
        FROM user_preferences WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Preferences::from).unwrap_or_default())
}

/// Whether the user opted into a single concurrent session
pub async fn single_session_enabled(pool: &DbPool, user_id: i64) -> Result<bool, sqlx::Error> {
    let row: Option<(bool,)> =
        sqlx::query_as("SELECT single_session FROM user_preferences WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(on,)| on).unwrap_or(false))
}

pub async fn save_profile(
    db: impl SqliteExecutor<'_>,
    user_id: i64,
    profile: &Profile,
) -> Result<(), sqlx::Error> {
    let timestamp = now();
    let encode = |list: &Vec<String>| serde_json::to_string(list).unwrap_or_else(|_| "[]".into());

    sqlx::query(
        r#"
        INSERT INTO user_profiles
            (user_id, phone, team, role, timezone, phones, emails, addresses, comments, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            phone = excluded.phone,
            team = excluded.team,
            role = excluded.role,
            timezone = excluded.timezone,
            phones = excluded.phones,
            emails = excluded.emails,
            addresses = excluded.addresses,
            comments = excluded.comments,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(&profile.phone)
    .bind(&profile.team)
    .bind(&profile.role)
    .bind(&profile.timezone)
    .bind(encode(&profile.phones))
    .bind(encode(&profile.emails))
    .bind(encode(&profile.addresses))
    .bind(encode(&profile.comments))
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn save_preferences(
    db: impl SqliteExecutor<'_>,
    user_id: i64,
    prefs: &Preferences,
) -> Result<(), sqlx::Error> {
    let timestamp = now();

    sqlx::query(
        r#"
        INSERT INTO user_preferences (
            user_id, email_notifications, single_session,
            module_pipeline, module_finance, module_contacts, module_calendar,
            language, notify_mentions, notify_pipeline_updates, notify_finance_alerts,
            notify_weekly_summary, notify_product_updates, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            email_notifications = excluded.email_notifications,
            single_session = excluded.single_session,
            module_pipeline = excluded.module_pipeline,
            module_finance = excluded.module_finance,
            module_contacts = excluded.module_contacts,
            module_calendar = excluded.module_calendar,
            language = excluded.language,
            notify_mentions = excluded.notify_mentions,
            notify_pipeline_updates = excluded.notify_pipeline_updates,
            notify_finance_alerts = excluded.notify_finance_alerts,
            notify_weekly_summary = excluded.notify_weekly_summary,
            notify_product_updates = excluded.notify_product_updates,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(prefs.email_notifications)
    .bind(prefs.single_session)
    .bind(prefs.module_pipeline)
    .bind(prefs.module_finance)
    .bind(prefs.module_contacts)
    .bind(prefs.module_calendar)
    .bind(&prefs.language)
    .bind(prefs.notify_mentions)
    .bind(prefs.notify_pipeline_updates)
    .bind(prefs.notify_finance_alerts)
    .bind(prefs.notify_weekly_summary)
    .bind(prefs.notify_product_updates)
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(db)
    .await?;
    Ok(())
}

/// Account fields, profile and preferences written as one unit: either all
/// of them change or none do
pub async fn save_all(
    pool: &DbPool,
    user_id: i64,
    name: Option<&str>,
    email: Option<&str>,
    profile: &Profile,
    prefs: &Preferences,
) -> Result<User, AuthError> {
    let mut tx = pool.begin().await?;

    let user = credentials::update_on(&mut tx, user_id, name, email).await?;
    save_profile(&mut *tx, user_id, profile).await?;
    save_preferences(&mut *tx, user_id, prefs).await?;

    tx.commit().await?;
    info!(user_id, "Profile updated");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_hashing;
    use crate::db;
    use crate::services::credentials;

    #[tokio::test]
    async fn test_absent_rows_use_defaults() {
        let pool = db::init_memory().await.unwrap();
        let user = credentials::create(&pool, &test_hashing(), "a@b.c", None, "x")
            .await
            .unwrap();

        assert_eq!(get_profile(&pool, user.id).await.unwrap(), Profile::default());
        assert_eq!(
            get_preferences(&pool, user.id).await.unwrap(),
            Preferences::default()
        );
        assert!(!single_session_enabled(&pool, user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_replaces_rows() {
        let pool = db::init_memory().await.unwrap();
        let user = credentials::create(&pool, &test_hashing(), "a@b.c", None, "x")
            .await
            .unwrap();

        let profile = Profile {
            phone: "123".into(),
            team: "Vendas".into(),
            phones: vec!["123".into(), "456".into()],
            comments: vec!["VIP".into()],
            ..Profile::default()
        };
        save_profile(&pool, user.id, &profile).await.unwrap();
        assert_eq!(get_profile(&pool, user.id).await.unwrap(), profile);

        let replacement = Profile {
            team: "Suporte".into(),
            ..Profile::default()
        };
        save_profile(&pool, user.id, &replacement).await.unwrap();
        assert_eq!(get_profile(&pool, user.id).await.unwrap(), replacement);

        let prefs = Preferences {
            single_session: true,
            module_finance: false,
            language: "en-US".into(),
            ..Preferences::default()
        };
        save_preferences(&pool, user.id, &prefs).await.unwrap();
        assert_eq!(get_preferences(&pool, user.id).await.unwrap(), prefs);
        assert!(single_session_enabled(&pool, user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_all_is_atomic() {
        let pool = db::init_memory().await.unwrap();
        let user = credentials::create(&pool, &test_hashing(), "a@b.c", Some("Ana"), "x")
            .await
            .unwrap();
        let profile = Profile {
            team: "Vendas".into(),
            ..Profile::default()
        };

        // Make the last of the three writes fail
        sqlx::query(
            "CREATE TRIGGER reject_prefs BEFORE INSERT ON user_preferences \
             BEGIN SELECT RAISE(ABORT, 'preferences unavailable'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = save_all(
            &pool,
            user.id,
            Some("Bia"),
            Some("new@b.c"),
            &profile,
            &Preferences::default(),
        )
        .await;
        assert!(matches!(result, Err(AuthError::Database(_))));

        let unchanged = credentials::find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(unchanged.email, "a@b.c");
        assert_eq!(unchanged.name.as_deref(), Some("Ana"));
        assert_eq!(get_profile(&pool, user.id).await.unwrap(), Profile::default());

        sqlx::query("DROP TRIGGER reject_prefs")
            .execute(&pool)
            .await
            .unwrap();
        let updated = save_all(
            &pool,
            user.id,
            Some("Bia"),
            Some("new@b.c"),
            &profile,
            &Preferences::default(),
        )
        .await
        .unwrap();
        assert_eq!(updated.email, "new@b.c");
        assert_eq!(get_profile(&pool, user.id).await.unwrap(), profile);
    }
}

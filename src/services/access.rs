//! Roles, user-role assignment, feature modules and invites.
//!
//! Lookups of a missing row return `Ok(None)`; callers decide whether that is
//! a 404.

use tracing::info;

use super::{credentials::normalize_email, now};
use crate::db::{
    DbPool, Invite, InviteWithRole, Module, Role, RoleWithMembers, INVITE_STATUS_PENDING,
};

pub async fn list_roles(pool: &DbPool) -> Result<Vec<RoleWithMembers>, sqlx::Error> {
    sqlx::query_as::<_, RoleWithMembers>(
        r#"
        SELECT roles.id, roles.name, COUNT(user_roles.user_id) AS members
        FROM roles
        LEFT JOIN user_roles ON user_roles.role_id = roles.id
        GROUP BY roles.id
        ORDER BY roles.id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Insert a role. A duplicate name surfaces as a UNIQUE violation.
pub async fn create_role(pool: &DbPool, name: &str) -> Result<Role, sqlx::Error> {
    let result = sqlx::query("INSERT INTO roles (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(Role {
        id: result.last_insert_rowid(),
        name: name.to_string(),
    })
}

pub async fn rename_role(pool: &DbPool, id: i64, name: &str) -> Result<Option<Role>, sqlx::Error> {
    let result = sqlx::query("UPDATE roles SET name = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(Role {
        id,
        name: name.to_string(),
    }))
}

/// Delete a role with its assignments. Invites pointing at it lose their role.
pub async fn delete_role(pool: &DbPool, id: i64) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM user_roles WHERE role_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE invites SET role_id = NULL WHERE role_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if result.rows_affected() > 0 {
        info!(role_id = id, "Role deleted");
    }
    Ok(result.rows_affected() > 0)
}

/// Grant the named role to a user if that role exists
pub async fn assign_role_by_name(
    pool: &DbPool,
    user_id: i64,
    role_name: &str,
) -> Result<(), sqlx::Error> {
    let role: Option<(i64,)> = sqlx::query_as("SELECT id FROM roles WHERE name = ?")
        .bind(role_name)
        .fetch_optional(pool)
        .await?;

    if let Some((role_id,)) = role {
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(role_id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn list_modules(pool: &DbPool) -> Result<Vec<Module>, sqlx::Error> {
    sqlx::query_as::<_, Module>("SELECT id, name, description, enabled FROM modules ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn set_module_enabled(
    pool: &DbPool,
    id: i64,
    enabled: bool,
) -> Result<Option<Module>, sqlx::Error> {
    sqlx::query("UPDATE modules SET enabled = ? WHERE id = ?")
        .bind(enabled)
        .bind(id)
        .execute(pool)
        .await?;

    sqlx::query_as::<_, Module>("SELECT id, name, description, enabled FROM modules WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Invites, newest first
pub async fn list_invites(pool: &DbPool) -> Result<Vec<InviteWithRole>, sqlx::Error> {
    sqlx::query_as::<_, InviteWithRole>(
        r#"
        SELECT invites.id, invites.email, invites.status, invites.created_at,
               roles.id AS role_id, roles.name AS role_name
        FROM invites
        LEFT JOIN roles ON roles.id = invites.role_id
        ORDER BY invites.id DESC
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Record a pending invite. A role id that names no role is stored as none.
pub async fn create_invite(
    pool: &DbPool,
    email: &str,
    role_id: Option<i64>,
) -> Result<Invite, sqlx::Error> {
    let email = normalize_email(email);

    let role_id = match role_id {
        Some(id) => sqlx::query_as::<_, (i64,)>("SELECT id FROM roles WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(|(id,)| id),
        None => None,
    };

    let created_at = now();
    let result = sqlx::query(
        "INSERT INTO invites (email, role_id, status, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&email)
    .bind(role_id)
    .bind(INVITE_STATUS_PENDING)
    .bind(&created_at)
    .execute(pool)
    .await?;

    info!(invite_id = result.last_insert_rowid(), "Invite created");

    Ok(Invite {
        id: result.last_insert_rowid(),
        email,
        role_id,
        status: INVITE_STATUS_PENDING.to_string(),
        created_at,
    })
}

pub async fn set_invite_status(
    pool: &DbPool,
    id: i64,
    status: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE invites SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

//! Database seeders for built-in data
//!
//! Default roles and feature modules are inserted only when their table is
//! empty, so edits made through the access API survive restarts.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Role assigned to every new signup
pub const DEFAULT_SIGNUP_ROLE: &str = "Administrador";

const DEFAULT_ROLES: [&str; 4] = [DEFAULT_SIGNUP_ROLE, "Gestor", "Analista", "Leitor"];

const DEFAULT_MODULES: [(&str, &str, bool); 4] = [
    ("Dashboard executivo", "KPIs e indicadores de acesso.", true),
    ("Gestao de usuarios", "Perfis, roles e permissao.", true),
    ("Convites e onboarding", "Fluxos de entrada.", true),
    ("Relatorios", "Exportacao e auditoria.", true),
];

/// Seed the built-in roles into an empty roles table
pub async fn seed_roles(pool: &SqlitePool) -> Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM roles")
        .fetch_one(pool)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }

    for name in DEFAULT_ROLES {
        sqlx::query("INSERT INTO roles (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
    }

    info!("Seeded {} default roles", DEFAULT_ROLES.len());
    Ok(())
}

/// Seed the built-in feature modules into an empty modules table
pub async fn seed_modules(pool: &SqlitePool) -> Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM modules")
        .fetch_one(pool)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }

    for (name, description, enabled) in DEFAULT_MODULES {
        sqlx::query("INSERT INTO modules (name, description, enabled) VALUES (?, ?, ?)")
            .bind(name)
            .bind(description)
            .bind(enabled)
            .execute(pool)
            .await?;
    }

    info!("Seeded {} default modules", DEFAULT_MODULES.len());
    Ok(())
}

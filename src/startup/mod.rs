//! Startup self-checks
//!
//! Run before the server starts accepting requests:
//! - Database connectivity and schema
//! - Data directory exists and is writable
//! - Configuration sanity for the selected mode

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::crypto::PasswordHashing;
use crate::DbPool;

/// Tables the server cannot run without
const ESSENTIAL_TABLES: [&str; 13] = [
    "users",
    "sessions",
    "password_resets",
    "roles",
    "user_roles",
    "modules",
    "invites",
    "user_profiles",
    "user_preferences",
    "pipeline_state",
    "pipeline_data",
    "finance_data",
    "user_storage",
];

/// Result of a single startup check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// Failure should abort startup
    pub critical: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            critical: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            passed: false,
            critical,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Aggregated startup check results
#[derive(Debug, Clone, Serialize)]
pub struct StartupCheckReport {
    pub checks: Vec<CheckResult>,
    pub all_critical_passed: bool,
    pub all_passed: bool,
    pub summary: String,
}

impl StartupCheckReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let all_critical_passed = checks.iter().filter(|c| c.critical).all(|c| c.passed);
        let all_passed = checks.iter().all(|c| c.passed);

        let failed_critical = checks.iter().filter(|c| c.critical && !c.passed).count();
        let failed_non_critical = checks.iter().filter(|c| !c.critical && !c.passed).count();
        let total = checks.len();
        let passed = checks.iter().filter(|c| c.passed).count();

        let summary = if all_passed {
            format!("All {} startup checks passed", total)
        } else if all_critical_passed {
            format!(
                "{}/{} checks passed ({} non-critical warnings)",
                passed, total, failed_non_critical
            )
        } else {
            format!(
                "{}/{} checks passed ({} critical failures)",
                passed, total, failed_critical
            )
        };

        Self {
            checks,
            all_critical_passed,
            all_passed,
            summary,
        }
    }
}

/// Run all startup self-checks
pub async fn run_startup_checks(config: &Config, db: &DbPool) -> StartupCheckReport {
    info!("Running startup self-checks...");

    let checks = vec![
        check_database_connectivity(db).await,
        check_database_schema(db).await,
        check_directory_writability(config),
        check_password_hashing(config),
        check_production_settings(config),
    ];

    let report = StartupCheckReport::new(checks);

    for check in &report.checks {
        if check.passed {
            info!(check = %check.name, message = %check.message, "Startup check PASSED");
        } else if check.critical {
            error!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (CRITICAL)"
            );
        } else {
            warn!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (non-critical)"
            );
        }
    }

    info!(
        summary = %report.summary,
        all_passed = report.all_passed,
        all_critical_passed = report.all_critical_passed,
        "Startup checks completed"
    );

    report
}

async fn check_database_connectivity(db: &DbPool) -> CheckResult {
    match sqlx::query("SELECT 1").fetch_one(db).await {
        Ok(_) => CheckResult::pass("database_connectivity", "Database connection successful"),
        Err(e) => CheckResult::fail("database_connectivity", "Failed to connect to database", true)
            .with_details(e.to_string()),
    }
}

async fn check_database_schema(db: &DbPool) -> CheckResult {
    let result: Result<Vec<(String,)>, _> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_all(db)
    .await;

    match result {
        Ok(tables) => {
            let table_names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
            let missing: Vec<&str> = ESSENTIAL_TABLES
                .iter()
                .filter(|t| !table_names.contains(*t))
                .copied()
                .collect();

            if missing.is_empty() {
                CheckResult::pass(
                    "database_schema",
                    format!("Database schema valid ({} tables)", tables.len()),
                )
            } else {
                CheckResult::fail("database_schema", "Missing essential database tables", true)
                    .with_details(format!("Missing: {}", missing.join(", ")))
            }
        }
        Err(e) => CheckResult::fail("database_schema", "Failed to query database schema", true)
            .with_details(e.to_string()),
    }
}

fn check_directory_writability(config: &Config) -> CheckResult {
    let data_dir = &config.server.data_dir;
    let test_file = data_dir.join(".superclient_write_test");

    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_file);
            CheckResult::pass("directory_writability", "Data directory is writable")
                .with_details(format!("Path: {}", data_dir.display()))
        }
        Err(e) => CheckResult::fail("directory_writability", "Data directory is not writable", true)
            .with_details(format!("{}: {}", data_dir.display(), e)),
    }
}

fn check_password_hashing(config: &Config) -> CheckResult {
    let argon2 = &config.auth.argon2;
    match PasswordHashing::new(argon2) {
        Ok(_) => CheckResult::pass("password_hashing", "Argon2id parameters accepted").with_details(
            format!(
                "memory={} KiB, iterations={}, parallelism={}",
                argon2.memory_kib, argon2.iterations, argon2.parallelism
            ),
        ),
        Err(e) => CheckResult::fail("password_hashing", "Invalid Argon2id parameters", true)
            .with_details(e.to_string()),
    }
}

/// Settings that are fine for development but unsafe in production
fn check_production_settings(config: &Config) -> CheckResult {
    if !config.server.production {
        return CheckResult::pass("production_settings", "Development mode");
    }

    let mut problems = Vec::new();
    if config.auth.expose_reset_token {
        problems.push("auth.expose_reset_token returns reset tokens to any caller".to_string());
    }
    let insecure: Vec<&str> = config
        .cors
        .allowed_origins
        .iter()
        .map(String::as_str)
        .filter(|origin| !origin.starts_with("https://"))
        .collect();
    if !insecure.is_empty() {
        problems.push(format!("non-https CORS origins: {}", insecure.join(", ")));
    }
    if config.auth.session_ttl_days <= 0 || config.auth.reset_ttl_minutes <= 0 {
        problems.push("session and reset lifetimes must be positive".to_string());
    }

    if problems.is_empty() {
        CheckResult::pass("production_settings", "Production settings look sane")
    } else {
        CheckResult::fail("production_settings", "Unsafe production settings", false)
            .with_details(problems.join("; "))
    }
}

pub mod api;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
pub mod services;
pub mod startup;
pub mod sync;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::crypto::PasswordHashing;
use crate::services::documents::{DocumentStore, SqliteDocumentStore};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub documents: Arc<dyn DocumentStore>,
    pub hashing: PasswordHashing,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> anyhow::Result<Self> {
        let hashing = PasswordHashing::new(&config.auth.argon2)?;
        Ok(Self::with_hashing(config, db, hashing))
    }

    fn with_hashing(config: Config, db: DbPool, hashing: PasswordHashing) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let documents = Arc::new(SqliteDocumentStore::new(db.clone()));
        Self {
            config,
            db,
            documents,
            hashing,
            rate_limiter,
        }
    }

    /// State backed by `db` with a cheap password hashing profile
    #[cfg(test)]
    pub(crate) fn for_tests(config: Config, db: DbPool) -> Self {
        Self::with_hashing(config, db, crypto::test_hashing())
    }
}

//! JSON document persistence.
//!
//! Documents are replaced wholesale on every write; the last writer wins.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::now;
use crate::db::{DbPool, DocumentKey};

/// Storage port for JSON documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stored value, or `None` when absent or unreadable
    async fn get(&self, key: &DocumentKey) -> Result<Option<Value>>;

    async fn put(&self, key: &DocumentKey, value: &Value) -> Result<()>;
}

/// Documents kept in the application database
pub struct SqliteDocumentStore {
    db: DbPool,
}

impl SqliteDocumentStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, key: &DocumentKey) -> Result<Option<Value>> {
        let row: Option<(String,)> = match key {
            DocumentKey::PipelineBoard => {
                sqlx::query_as("SELECT data_json FROM pipeline_state WHERE id = 1")
                    .fetch_optional(&self.db)
                    .await?
            }
            DocumentKey::PipelineData(user_id) => {
                sqlx::query_as("SELECT data_json FROM pipeline_data WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(&self.db)
                    .await?
            }
            DocumentKey::FinanceData(user_id) => {
                sqlx::query_as("SELECT data_json FROM finance_data WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(&self.db)
                    .await?
            }
            DocumentKey::UserStorage { user_id, key } => {
                sqlx::query_as(
                    "SELECT data_json FROM user_storage WHERE user_id = ? AND storage_key = ?",
                )
                .bind(user_id)
                .bind(key)
                .fetch_optional(&self.db)
                .await?
            }
        };

        let Some((json,)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(document = %key, "Stored document is not valid JSON: {}", e);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &DocumentKey, value: &Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let updated_at = now();

        match key {
            DocumentKey::PipelineBoard => {
                sqlx::query(
                    r#"
                    INSERT INTO pipeline_state (id, data_json, updated_at) VALUES (1, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        data_json = excluded.data_json,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&json)
                .bind(&updated_at)
                .execute(&self.db)
                .await?;
            }
            DocumentKey::PipelineData(user_id) | DocumentKey::FinanceData(user_id) => {
                let table = key.kind();
                let sql = format!(
                    r#"
                    INSERT INTO {table} (user_id, data_json, updated_at) VALUES (?, ?, ?)
                    ON CONFLICT(user_id) DO UPDATE SET
                        data_json = excluded.data_json,
                        updated_at = excluded.updated_at
                    "#
                );
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(&json)
                    .bind(&updated_at)
                    .execute(&self.db)
                    .await?;
            }
            DocumentKey::UserStorage { user_id, key } => {
                sqlx::query(
                    r#"
                    INSERT INTO user_storage (user_id, storage_key, data_json, updated_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(user_id, storage_key) DO UPDATE SET
                        data_json = excluded.data_json,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(user_id)
                .bind(key)
                .bind(&json)
                .bind(&updated_at)
                .execute(&self.db)
                .await?;
            }
        }

        debug!(document = %key, bytes = json.len(), "Document saved");
        Ok(())
    }
}

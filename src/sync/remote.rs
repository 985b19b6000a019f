//! Server side of the sync layer: the document endpoints of the API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use super::envelope::Envelope;

/// A synced document on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Workspace board shared by every user
    PipelineBoard,
    PipelineData,
    FinanceData,
    /// Keyed user storage, e.g. `finance_table_layout_v1`
    Storage(String),
}

impl Resource {
    pub fn path(&self) -> String {
        match self {
            Resource::PipelineBoard => "/api/pipeline/board".to_string(),
            Resource::PipelineData => "/api/pipeline/data".to_string(),
            Resource::FinanceData => "/api/finance/data".to_string(),
            Resource::Storage(key) => format!("/api/storage/{}", key),
        }
    }

    /// Local cache key for the resource
    pub fn cache_key(&self) -> &str {
        match self {
            Resource::PipelineBoard => "pipeline_board_v1",
            Resource::PipelineData => "pipeline_data_v1",
            Resource::FinanceData => "finance_data_v1",
            Resource::Storage(key) => key,
        }
    }

    fn response_field(&self) -> &'static str {
        match self {
            Resource::PipelineBoard => "pipeline",
            _ => "data",
        }
    }

    /// Request body for a push.
    ///
    /// The board is read by every client of the workspace and goes out as a
    /// bare `{columns}` document; everything else carries its envelope.
    pub fn wire_value(&self, envelope: &Envelope) -> Value {
        match self {
            Resource::PipelineBoard => envelope.payload.clone(),
            _ => json!({ "data": envelope.to_value() }),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_key())
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Stored value, or `None` when the server has nothing for the resource
    async fn fetch(&self, resource: &Resource) -> Result<Option<Value>>;

    /// Replace the stored value
    async fn push(&self, resource: &Resource, envelope: &Envelope) -> Result<()>;
}

/// [`RemoteStore`] over the HTTP API with a bearer session token
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: create_client(token)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, resource: &Resource) -> String {
        format!("{}{}", self.base_url, resource.path())
    }
}

/// HTTP client sending `token` as a bearer credential on every request
pub fn create_client(token: Option<&str>) -> Result<Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", token)
                .parse()
                .context("Invalid token format")?,
        );
    }

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch(&self, resource: &Resource) -> Result<Option<Value>> {
        let mut body: Value = self
            .client
            .get(self.url(resource))
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", resource))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Invalid response for {}", resource))?;

        let value = body
            .get_mut(resource.response_field())
            .map(Value::take)
            .filter(|v| !v.is_null());
        Ok(value)
    }

    async fn push(&self, resource: &Resource, envelope: &Envelope) -> Result<()> {
        self.client
            .put(self.url(resource))
            .json(&resource.wire_value(envelope))
            .send()
            .await
            .with_context(|| format!("Failed to push {}", resource))?
            .error_for_status()?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_paths_and_keys() {
        assert_eq!(Resource::FinanceData.path(), "/api/finance/data");
        assert_eq!(Resource::FinanceData.cache_key(), "finance_data_v1");
        assert_eq!(Resource::PipelineBoard.path(), "/api/pipeline/board");

        let storage = Resource::Storage("finance_table_layout_v1".to_string());
        assert_eq!(storage.path(), "/api/storage/finance_table_layout_v1");
        assert_eq!(storage.cache_key(), "finance_table_layout_v1");
    }

    #[test]
    fn test_wire_values() {
        let envelope = Envelope::new(2, json!({ "expenses": [] }));
        assert_eq!(
            Resource::FinanceData.wire_value(&envelope),
            json!({ "data": { "schemaVersion": 2, "payload": { "expenses": [] } } })
        );

        let board = Envelope::new(1, json!({ "columns": [] }));
        assert_eq!(
            Resource::PipelineBoard.wire_value(&board),
            json!({ "columns": [] })
        );
    }

    #[test]
    fn test_http_remote_trims_base_url() {
        let remote = HttpRemote::new("http://localhost:3001/", Some("tok")).unwrap();
        assert_eq!(
            remote.url(&Resource::FinanceData),
            "http://localhost:3001/api/finance/data"
        );
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        assert!(HttpRemote::new("http://localhost:3001", Some("bad\ntoken")).is_err());
    }
}

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::SourceError;
use crate::records::{ContainerRecord, SourceRecord};

/// Read-only access to the upstream learning-management service.
#[allow(async_fn_in_trait)]
pub trait SourceService {
    async fn list_containers(&self, token: &str) -> Result<Vec<ContainerRecord>, SourceError>;

    async fn list_records(
        &self,
        token: &str,
        containers: &[ContainerRecord],
    ) -> Result<Vec<SourceRecord>, SourceError>;
}

pub struct HttpSourceClient {
    client: Client,
    base_url: String,
}

impl HttpSourceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &str, path: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

impl SourceService for HttpSourceClient {
    async fn list_containers(&self, token: &str) -> Result<Vec<ContainerRecord>, SourceError> {
        let containers: Vec<ContainerRecord> = self.get_json(token, "containers").await?;
        debug!(count = containers.len(), "fetched upstream containers");
        Ok(containers)
    }

    async fn list_records(
        &self,
        token: &str,
        containers: &[ContainerRecord],
    ) -> Result<Vec<SourceRecord>, SourceError> {
        let mut records = Vec::new();
        for container in containers {
            let batch: Vec<SourceRecord> = self
                .get_json(token, &format!("containers/{}/records", container.id))
                .await?;
            debug!(container = %container.id, count = batch.len(), "fetched upstream records");
            records.extend(batch);
        }
        Ok(records)
    }
}

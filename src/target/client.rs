use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::TargetError;
use super::types::{CompareResponse, StartSyncResponse, StatusResponse, TargetRequest};

/// The three operations the reconciliation engine needs from the target store.
///
/// Every call carries the bearer credential; none of them retry internally.
#[allow(async_fn_in_trait)]
pub trait TargetService {
    /// Diffs the upstream records against what the target already holds.
    async fn compare(&self, token: &str, target_id: &str) -> Result<CompareResponse, TargetError>;

    /// Asks the backend to start mirroring into `target_id`.
    async fn start_sync(
        &self,
        token: &str,
        target_id: &str,
    ) -> Result<StartSyncResponse, TargetError>;

    /// Reads the status of the most recent mirroring job.
    async fn sync_status(
        &self,
        token: &str,
        target_id: &str,
        job_id: Option<&str>,
    ) -> Result<StatusResponse, TargetError>;
}

pub struct HttpTargetClient {
    client: Client,
    base_url: String,
}

impl HttpTargetClient {
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

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

impl TargetService for HttpTargetClient {
    async fn compare(&self, token: &str, target_id: &str) -> Result<CompareResponse, TargetError> {
        let response = self
            .client
            .post(self.url("compare"))
            .bearer_auth(token)
            .json(&TargetRequest {
                target_id: target_id.to_string(),
            })
            .send()
            .await?;

        let response = error_for_status(response).await?;
        read_json(response).await
    }

    async fn start_sync(
        &self,
        token: &str,
        target_id: &str,
    ) -> Result<StartSyncResponse, TargetError> {
        let response = self
            .client
            .post(self.url("sync"))
            .bearer_auth(token)
            .json(&TargetRequest {
                target_id: target_id.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // A readable rejection body means the backend refused the job;
            // anything else means it never got that far.
            let text = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<StartSyncResponse>(&text) {
                Ok(body) if body.error.is_some() => Ok(StartSyncResponse {
                    success: Some(false),
                    ..body
                }),
                _ => Err(api_error(status, text)),
            };
        }

        read_json(response).await
    }

    async fn sync_status(
        &self,
        token: &str,
        target_id: &str,
        job_id: Option<&str>,
    ) -> Result<StatusResponse, TargetError> {
        let mut query = vec![("targetId", target_id)];
        if let Some(id) = job_id {
            query.push(("jobId", id));
        }

        let response = self
            .client
            .get(self.url("sync/status"))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;

        let response = error_for_status(response).await?;
        read_json(response).await
    }
}

async fn error_for_status(response: Response) -> Result<Response, TargetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(api_error(status, text))
}

fn api_error(status: StatusCode, text: String) -> TargetError {
    let message = if text.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        text
    };
    TargetError::Api {
        status: status.as_u16(),
        message,
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TargetError> {
    let text = response.text().await?;
    debug!(bytes = text.len(), "target response received");
    serde_json::from_str(&text).map_err(|e| TargetError::Malformed(e.to_string()))
}

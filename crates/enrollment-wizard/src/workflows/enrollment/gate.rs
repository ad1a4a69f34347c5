use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Remote answer to "is this email already registered?".
#[async_trait]
pub trait UniquenessGate: Send + Sync {
    async fn exists(&self, email: &str) -> Result<bool, GateError>;
}

/// Both classes are reported to the user the same way; they are kept apart
/// for logs.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("uniqueness service answered with status {status}")]
    Service { status: u16 },
    #[error("uniqueness service unreachable: {0}")]
    Transport(String),
}

/// Wire body returned by the registry's exists endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

pub const EXISTS_PATH: &str = "/api/v1/students/exists";

/// Calls `GET {base_url}/api/v1/students/exists?email=…`.
#[derive(Debug, Clone)]
pub struct HttpUniquenessGate {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUniquenessGate {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GateError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GateError::Transport(err.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }
}

#[async_trait]
impl UniquenessGate for HttpUniquenessGate {
    async fn exists(&self, email: &str) -> Result<bool, GateError> {
        let url = format!("{}{}", self.base_url, EXISTS_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "uniqueness request failed");
                GateError::Transport(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "uniqueness service rejected request");
            return Err(GateError::Service {
                status: status.as_u16(),
            });
        }

        let body: ExistsResponse = response
            .json()
            .await
            .map_err(|err| GateError::Transport(format!("malformed response: {err}")))?;
        debug!(exists = body.exists, "uniqueness check answered");
        Ok(body.exists)
    }
}

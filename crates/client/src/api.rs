//! REST client for the labstream HTTP endpoints.
//!
//! Wraps run triggering and history retrieval using [`reqwest`]. The
//! event stream itself never flows through HTTP; it arrives on the
//! WebSocket connection named in the run request.

use serde::Deserialize;

use labstream_core::run::RunHistoryEntry;
use labstream_core::types::RunId;

/// HTTP client for one labstream server.
pub struct ConsoleApi {
    client: reqwest::Client,
    base_url: String,
}

/// `{ "data": ... }` envelope used by every labstream response.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// Payload of a successful run request.
#[derive(Debug, Deserialize)]
struct StartedRun {
    run_id: RunId,
}

/// Errors from the labstream REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("labstream API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ConsoleApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:3000`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Request a run of `job_id` addressed at `connection_id`.
    ///
    /// Returns the freshly generated run id; progress arrives on the
    /// addressed WebSocket connection.
    pub async fn start_run(
        &self,
        connection_id: &str,
        job_id: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<RunId, ConsoleApiError> {
        let body = serde_json::json!({
            "connection_id": connection_id,
            "job_id": job_id,
            "parameters": parameters,
        });

        let response = self
            .client
            .post(format!("{}/api/v1/runs", self.base_url))
            .json(&body)
            .send()
            .await?;

        let envelope: DataEnvelope<StartedRun> = Self::parse_response(response).await?;
        Ok(envelope.data.run_id)
    }

    /// Fetch the recent terminal runs, newest first.
    pub async fn history(&self) -> Result<Vec<RunHistoryEntry>, ConsoleApiError> {
        let response = self
            .client
            .get(format!("{}/api/v1/runs/history", self.base_url))
            .send()
            .await?;

        let envelope: DataEnvelope<Vec<RunHistoryEntry>> = Self::parse_response(response).await?;
        Ok(envelope.data)
    }

    /// Check a response status and deserialize its body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ConsoleApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConsoleApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

//! REST client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission (`POST /prompt`), history retrieval
//! (`GET /history/{prompt_id}`), the liveness probe (`GET /`) and
//! individual asset fetches (`GET /view`) using [`reqwest`].

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// HTTP client for a single ComfyUI backend.
pub struct ComfyUiApi {
    client: reqwest::Client,
    http_url: String,
}

/// Response returned by `/prompt` after successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
}

/// One produced artifact descriptor from a node's output list.
#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    /// Full local path of the rendered file on the backend host.
    pub fullpath: String,
    pub filename: Option<String>,
    pub subfolder: Option<String>,
    #[serde(rename = "type")]
    pub folder_type: Option<String>,
}

/// Output record for a single node in the history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    /// Rendered video artifacts.  Absent for nodes that produce none.
    #[serde(default)]
    pub gifs: Vec<Artifact>,
}

/// Node-id -> produced-artifacts mapping for one completed prompt.
///
/// Backed by a [`BTreeMap`], so iteration order is the sorted node-id
/// order — deterministic regardless of how the backend serialized it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ResultIndex(pub BTreeMap<String, NodeOutput>);

impl ResultIndex {
    /// Node entries in stored (sorted node-id) order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &NodeOutput)> {
        self.0.iter().map(|(id, out)| (id.as_str(), out))
    }
}

/// One prompt's history record.
#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub outputs: ResultIndex,
}

/// Errors from the ComfyUI REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI rejected the request ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Raw response body for diagnostics.
        body: String,
    },
}

impl ComfyUiApi {
    /// Create a new API client for a ComfyUI backend.
    ///
    /// * `http_url` - base HTTP URL, e.g. `http://host:8188`.
    pub fn new(http_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            http_url,
        }
    }

    /// Base HTTP URL this client targets.
    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    /// Lightweight liveness probe: `GET /` with a per-request timeout.
    ///
    /// Any 2xx response means the backend is up.
    pub async fn probe(&self, timeout: Duration) -> Result<(), ApiError> {
        let response = self
            .client
            .get(format!("{}/", self.http_url))
            .timeout(timeout)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with `{prompt, client_id}`.  Returns the
    /// server-assigned `prompt_id` used to correlate streamed events.
    pub async fn submit_workflow<W: serde::Serialize>(
        &self,
        workflow: &W,
        client_id: &str,
    ) -> Result<SubmitResponse, ApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.http_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// The response maps prompt id to its [`HistoryEntry`]; a prompt
    /// that has not completed yet simply has no entry.
    pub async fn get_history(
        &self,
        prompt_id: &str,
    ) -> Result<HashMap<String, HistoryEntry>, ApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.http_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch one rendered asset via `GET /view`.
    ///
    /// Optional path; the primary flow reads artifacts from their
    /// `fullpath` instead.
    pub async fn get_view(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.http_url))
            .query(&[
                ("filename", filename),
                ("subfolder", subfolder),
                ("type", folder_type),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or surface the
    /// status and body as [`ApiError::Rejected`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_entry_parses_outputs_with_and_without_gifs() {
        let json = r#"{
            "outputs": {
                "30": { "gifs": [{ "fullpath": "/out/b.mp4", "filename": "b.mp4" }] },
                "10": {},
                "20": { "gifs": [] }
            }
        }"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();

        let ids: Vec<&str> = entry.outputs.entries().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["10", "20", "30"]);

        assert!(entry.outputs.0["10"].gifs.is_empty());
        assert!(entry.outputs.0["20"].gifs.is_empty());
        assert_eq!(entry.outputs.0["30"].gifs[0].fullpath, "/out/b.mp4");
    }

    #[test]
    fn artifact_parses_optional_fields() {
        let json = r#"{ "fullpath": "/out/a.mp4", "subfolder": "", "type": "output" }"#;
        let artifact: Artifact = serde_json::from_str(json).unwrap();
        assert_eq!(artifact.fullpath, "/out/a.mp4");
        assert_eq!(artifact.folder_type.as_deref(), Some("output"));
        assert!(artifact.filename.is_none());
    }

    #[test]
    fn submit_response_parses_prompt_id() {
        let json = r#"{ "prompt_id": "abc-123", "number": 4 }"#;
        let response: SubmitResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.prompt_id, "abc-123");
    }
}

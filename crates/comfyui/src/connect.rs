//! Connection establishment against the ComfyUI backend.
//!
//! A job first probes HTTP reachability, then opens the persistent
//! WebSocket event stream.  Both steps run under their own bounded
//! [`RetryPolicy`]; exhausting either budget is terminal for the job.

use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUiApi;
use crate::config::ComfyUiConfig;
use crate::retry::{retry_until, RetryError, RetryPolicy};

/// A live WebSocket stream to the backend.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors from connection establishment.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The HTTP reachability budget was exhausted.
    #[error("backend unreachable after {attempts} attempts: {last}")]
    Unreachable { attempts: u32, last: String },

    /// The WebSocket connect budget was exhausted.
    #[error("event stream unavailable after {attempts} attempts: {last}")]
    StreamUnavailable { attempts: u32, last: String },

    /// The caller aborted while establishing the connection.
    #[error("connection establishment cancelled")]
    Cancelled,
}

/// Establishes connectivity to one ComfyUI backend.
///
/// Owns the two retry budgets; the underlying address and client
/// identity come from the shared [`ComfyUiConfig`].
pub struct ConnectionManager {
    config: ComfyUiConfig,
    probe_policy: RetryPolicy,
    stream_policy: RetryPolicy,
}

/// Fallback per-attempt timeout for the reachability probe when the
/// policy carries none.
const DEFAULT_PROBE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

impl ConnectionManager {
    pub fn new(
        config: ComfyUiConfig,
        probe_policy: RetryPolicy,
        stream_policy: RetryPolicy,
    ) -> Self {
        Self {
            config,
            probe_policy,
            stream_policy,
        }
    }

    /// Probe HTTP reachability: `GET {http_url}/` until it answers or
    /// the attempt budget runs out.
    pub async fn probe_reachability(
        &self,
        api: &ComfyUiApi,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectError> {
        let timeout = self
            .probe_policy
            .per_attempt_timeout
            .unwrap_or(DEFAULT_PROBE_TIMEOUT);

        tracing::info!(url = %self.config.http_url, "Probing backend reachability");

        retry_until(&self.probe_policy, cancel, || api.probe(timeout))
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, last } => ConnectError::Unreachable {
                    attempts,
                    last: last.to_string(),
                },
                RetryError::Cancelled => ConnectError::Cancelled,
            })?;

        tracing::info!(url = %self.config.http_url, "Backend reachable");
        Ok(())
    }

    /// Open the persistent event stream at `{ws_url}/ws?clientId=...`.
    pub async fn open_stream(&self, cancel: &CancellationToken) -> Result<WsStream, ConnectError> {
        let url = self.config.stream_url();
        tracing::info!(url = %url, "Opening event stream");

        let stream = retry_until(&self.stream_policy, cancel, || async {
            let connect = connect_async(&url);
            let result = match self.stream_policy.per_attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, connect)
                    .await
                    .map_err(|_| format!("connect attempt timed out after {limit:?}"))?,
                None => connect.await,
            };
            result
                .map(|(ws, _response)| ws)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => ConnectError::StreamUnavailable {
                attempts,
                last: last.to_string(),
            },
            RetryError::Cancelled => ConnectError::Cancelled,
        })?;

        tracing::info!(
            url = %url,
            client_id = %self.config.client_id,
            "Event stream connected",
        );
        Ok(stream)
    }

    /// Full establishment sequence: probe, then open the stream.
    pub async fn establish(
        &self,
        api: &ComfyUiApi,
        cancel: &CancellationToken,
    ) -> Result<WsStream, ConnectError> {
        self.probe_reachability(api, cancel).await?;
        self.open_stream(cancel).await
    }
}

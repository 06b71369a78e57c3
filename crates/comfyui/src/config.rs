//! Connection configuration for one ComfyUI backend.
//!
//! The backend address and client correlation identity are explicit
//! configuration passed into the client constructors, established once
//! at process start and reused for every job.

/// Default port ComfyUI listens on.
pub const DEFAULT_PORT: u16 = 8188;

/// Addressing and identity for a single ComfyUI backend.
#[derive(Debug, Clone)]
pub struct ComfyUiConfig {
    /// Base HTTP URL, e.g. `http://host:8188`.
    pub http_url: String,
    /// Base WebSocket URL, e.g. `ws://host:8188`.
    pub ws_url: String,
    /// Client correlation identity attached to every submission so
    /// streamed events can be attributed back to this process.
    pub client_id: String,
}

impl ComfyUiConfig {
    /// Build a config from a bare server address (host or host:port
    /// handling is the caller's concern; this appends the default
    /// ComfyUI port).
    pub fn for_server(server_address: &str, client_id: String) -> Self {
        Self {
            http_url: format!("http://{server_address}:{DEFAULT_PORT}"),
            ws_url: format!("ws://{server_address}:{DEFAULT_PORT}"),
            client_id,
        }
    }

    /// The full WebSocket endpoint including the client identity.
    pub fn stream_url(&self) -> String {
        format!("{}/ws?clientId={}", self.ws_url, self.client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_server_builds_both_urls() {
        let config = ComfyUiConfig::for_server("10.0.0.5", "client-1".into());
        assert_eq!(config.http_url, "http://10.0.0.5:8188");
        assert_eq!(config.ws_url, "ws://10.0.0.5:8188");
    }

    #[test]
    fn stream_url_carries_client_id() {
        let config = ComfyUiConfig::for_server("localhost", "abc".into());
        assert_eq!(config.stream_url(), "ws://localhost:8188/ws?clientId=abc");
    }
}

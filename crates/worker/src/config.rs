//! Worker configuration, loaded once from the environment.
//!
//! Every retry budget, timeout and tunable is a variable here rather
//! than a constant in the code that uses it.  `.env` files are honored
//! via `dotenvy` in `main`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use talkgen_core::audio::FrameBudgetParams;
use talkgen_comfyui::retry::RetryPolicy;

/// Process-wide worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// ComfyUI host (the default ComfyUI port is appended).
    pub server_address: String,
    /// Client correlation identity. Generated once when unset.
    pub client_id: String,
    /// Directory holding the four workflow template files.
    pub template_dir: PathBuf,
    /// Root under which per-request work directories are created.
    pub work_dir_root: PathBuf,

    /// HTTP reachability probe budget.
    pub http_probe_attempts: u32,
    pub http_probe_delay: Duration,
    pub http_probe_timeout: Duration,

    /// WebSocket connect budget.
    pub ws_connect_attempts: u32,
    pub ws_connect_delay: Duration,
    pub ws_connect_timeout: Duration,

    /// Total wall-clock bound per URL input download.
    pub download_timeout: Duration,

    /// Frame-budget derivation tunables.
    pub frame_budget: FrameBudgetParams,

    /// Fallback media used when a job carries no media reference.
    pub default_image: PathBuf,
    /// Fallback audio used when a job carries no audio reference.
    pub default_audio: PathBuf,

    /// When true, the produced artifact is read and returned inline as
    /// base64; otherwise its path is returned as the reference.
    pub inline_artifact: bool,
}

impl WorkerConfig {
    /// Load the configuration from environment variables, falling back
    /// to the deployed defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = FrameBudgetParams::default();
        Ok(Self {
            server_address: env_or("SERVER_ADDRESS", "127.0.0.1"),
            client_id: std::env::var("CLIENT_ID")
                .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            template_dir: PathBuf::from(env_or("TEMPLATE_DIR", "/")),
            work_dir_root: PathBuf::from(env_or("WORK_DIR_ROOT", ".")),

            http_probe_attempts: env_parse("HTTP_PROBE_ATTEMPTS", 180)?,
            http_probe_delay: Duration::from_millis(env_parse("HTTP_PROBE_DELAY_MS", 1_000)?),
            http_probe_timeout: Duration::from_millis(env_parse("HTTP_PROBE_TIMEOUT_MS", 5_000)?),

            ws_connect_attempts: env_parse("WS_CONNECT_ATTEMPTS", 36)?,
            ws_connect_delay: Duration::from_millis(env_parse("WS_CONNECT_DELAY_MS", 5_000)?),
            ws_connect_timeout: Duration::from_millis(env_parse("WS_CONNECT_TIMEOUT_MS", 5_000)?),

            download_timeout: Duration::from_secs(env_parse("DOWNLOAD_TIMEOUT_SECS", 60)?),

            frame_budget: FrameBudgetParams {
                fps: env_parse("FRAME_FPS", defaults.fps)?,
                padding_frames: env_parse("FRAME_PADDING", defaults.padding_frames)?,
                default_budget: env_parse("DEFAULT_FRAME_BUDGET", defaults.default_budget)?,
            },

            default_image: PathBuf::from(env_or("DEFAULT_IMAGE", "/examples/image.jpg")),
            default_audio: PathBuf::from(env_or("DEFAULT_AUDIO", "/examples/audio.mp3")),

            inline_artifact: env_parse("INLINE_ARTIFACT", true)?,
        })
    }

    /// Retry policy for the HTTP reachability probe.
    pub fn probe_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.http_probe_attempts, self.http_probe_delay)
            .with_per_attempt_timeout(self.http_probe_timeout)
    }

    /// Retry policy for opening the event stream.
    pub fn stream_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.ws_connect_attempts, self.ws_connect_delay)
            .with_per_attempt_timeout(self.ws_connect_timeout)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

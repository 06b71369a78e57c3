//! Audio duration probing and frame-budget derivation.
//!
//! The frame budget (maximum number of output frames) is derived from
//! the duration of the driving audio when the job does not supply one
//! explicitly.  Duration measurement is injected behind the
//! [`DurationProbe`] trait so the derivation itself stays pure.

use std::path::Path;

use serde::Deserialize;

/// Error type for audio duration probing.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("ffprobe binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),
}

/// Measures the duration of a media file in seconds.
#[async_trait::async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration_secs(&self, path: &Path) -> Result<f64, ProbeError>;
}

/// Top-level ffprobe JSON output (`-print_format json -show_format`).
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Production [`DurationProbe`] backed by the `ffprobe` binary.
pub struct FfprobeDurationProbe;

#[async_trait::async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration_secs(&self, path: &Path) -> Result<f64, ProbeError> {
        let output = tokio::process::Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()
            .await
            .map_err(ProbeError::NotFound)?;

        if !output.status.success() {
            return Err(ProbeError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let probe = serde_json::from_str::<FfprobeOutput>(&stdout)
            .map_err(|e| ProbeError::ParseError(format!("{e}: {stdout}")))?;

        probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| ProbeError::ParseError("no format-level duration".into()))
    }
}

/// Tunables for frame-budget derivation.
///
/// `padding_frames` has two observed operating points: the
/// conservative default (81) and a faster-generation setting (25).
/// Both it and `fps` are configuration, not constants.
#[derive(Debug, Clone, Copy)]
pub struct FrameBudgetParams {
    /// Output frames per second of generated video.
    pub fps: f64,
    /// Extra frames appended past the audio tail.
    pub padding_frames: u32,
    /// Budget used when no audio duration could be measured.
    pub default_budget: u32,
}

impl Default for FrameBudgetParams {
    fn default() -> Self {
        Self {
            fps: 25.0,
            padding_frames: 81,
            default_budget: 81,
        }
    }
}

/// Derive the frame budget from the driving audio track(s).
///
/// Measures each provided path; a failed measurement is logged and that
/// path is excluded rather than failing the job.  With no measurable
/// duration at all, returns `params.default_budget`.  Otherwise returns
/// `floor(max_duration * fps) + padding_frames`.
pub async fn derive_frame_budget(
    probe: &dyn DurationProbe,
    primary_audio: &Path,
    secondary_audio: Option<&Path>,
    params: FrameBudgetParams,
) -> u32 {
    let mut durations = Vec::with_capacity(2);

    for path in std::iter::once(primary_audio).chain(secondary_audio) {
        match probe.duration_secs(path).await {
            Ok(duration) => {
                tracing::info!(
                    path = %path.display(),
                    duration_secs = duration,
                    "Measured audio duration",
                );
                durations.push(duration);
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to measure audio duration, excluding",
                );
            }
        }
    }

    let Some(max_duration) = durations.iter().copied().reduce(f64::max) else {
        tracing::warn!(
            default = params.default_budget,
            "No measurable audio duration, using default frame budget",
        );
        return params.default_budget;
    };

    let budget = (max_duration * params.fps).floor() as u32 + params.padding_frames;
    tracing::info!(
        max_duration_secs = max_duration,
        frame_budget = budget,
        "Derived frame budget from audio",
    );
    budget
}

//! End-to-end job lifecycle.
//!
//! Composes input resolution, template patching, connection
//! establishment, submission tracking and artifact extraction into one
//! request handler.  Every failure is mapped to a structured error
//! response at this boundary; nothing propagates past it, and no state
//! is shared between jobs beyond the immutable configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio_util::sync::CancellationToken;

use talkgen_comfyui::api::{ApiError, ComfyUiApi};
use talkgen_comfyui::config::ComfyUiConfig;
use talkgen_comfyui::connect::{ConnectError, ConnectionManager};
use talkgen_comfyui::tracker::{self, TrackError};
use talkgen_core::audio::{derive_frame_budget, DurationProbe};
use talkgen_core::input::{ensure_exists, InputError, InputKind, InputResolver};
use talkgen_core::types::{JobRequest, JobResponse, MediaKind, ParticipantCount};
use talkgen_workflow::{apply, PatchValues, TemplateError, TemplateKind, WorkflowGraph};

use crate::config::WorkerConfig;

/// Any failure along the job lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("input resolution failed: {0}")]
    Input(#[from] InputError),

    #[error("workflow template error: {0}")]
    Template(#[from] TemplateError),

    #[error("connectivity error: {0}")]
    Connect(#[from] ConnectError),

    #[error("submission failed: {0}")]
    Submit(#[source] ApiError),

    #[error("tracking failed: {0}")]
    Track(#[from] TrackError),

    #[error("failed to read artifact {path}: {source}")]
    ArtifactRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whether a caller-supplied task id is usable as a work directory
/// name: non-empty, no path separators, not a dot component.
fn is_safe_task_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

/// Per-process job handler.
///
/// Holds only read-only state (configuration, HTTP client, injected
/// duration probe); per-job state lives in the request-scoped work
/// directory and the locally owned workflow graph.
pub struct Handler {
    config: WorkerConfig,
    comfy: ComfyUiConfig,
    api: ComfyUiApi,
    connection: ConnectionManager,
    resolver: InputResolver,
    duration_probe: Arc<dyn DurationProbe>,
}

impl Handler {
    pub fn new(
        config: WorkerConfig,
        comfy: ComfyUiConfig,
        duration_probe: Arc<dyn DurationProbe>,
    ) -> Self {
        let api = ComfyUiApi::new(comfy.http_url.clone());
        let connection = ConnectionManager::new(
            comfy.clone(),
            config.probe_policy(),
            config.stream_policy(),
        );
        let resolver = InputResolver::new(config.download_timeout);
        Self {
            config,
            comfy,
            api,
            connection,
            resolver,
            duration_probe,
        }
    }

    /// Run one job to a structured response.  Never fails outward.
    pub async fn run(&self, request: JobRequest, cancel: &CancellationToken) -> JobResponse {
        // The task id names the work directory under the work root, so
        // a caller id carrying path separators is never honored.
        let task_id = match request.id.as_deref().filter(|id| is_safe_task_id(id)) {
            Some(id) => id.to_string(),
            None => {
                if let Some(raw) = &request.id {
                    tracing::warn!(id = %raw, "Unusable caller task id, generating one");
                }
                format!("task_{}", uuid::Uuid::new_v4())
            }
        };

        tracing::info!(
            task_id = %task_id,
            input_type = ?request.input_type,
            person_count = ?request.person_count,
            "Handling job",
        );

        match self.execute(&task_id, request, cancel).await {
            Ok(artifact) => JobResponse::Success { video: artifact },
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Job failed");
                JobResponse::Failure {
                    error: e.to_string(),
                }
            }
        }
    }

    /// The full lifecycle for one job.
    async fn execute(
        &self,
        task_id: &str,
        request: JobRequest,
        cancel: &CancellationToken,
    ) -> Result<String, HandlerError> {
        let work_dir = self.config.work_dir_root.join(task_id);
        let kind = request.input_type;
        let count = request.person_count;

        // Resolve every input to a local path.
        let media_path = self.resolve_media(&request, &work_dir).await?;
        let audio_path = self
            .resolve_or_default(
                request.audio_reference(),
                &work_dir,
                "input_audio.wav",
                &self.config.default_audio,
            )
            .await?;
        let second_audio_path = match count {
            ParticipantCount::Single => None,
            ParticipantCount::Multi => Some(match request.second_audio_reference() {
                Some((input_kind, value)) => {
                    self.resolver
                        .resolve(value, input_kind, &work_dir, "input_audio_2.wav")
                        .await?
                }
                None => {
                    tracing::info!("No second audio provided, using first audio");
                    audio_path.clone()
                }
            }),
        };

        // Everything must exist on disk before any network interaction.
        let media = ensure_exists(&media_path).await?;
        let audio = ensure_exists(&audio_path).await?;
        if let Some(path) = &second_audio_path {
            ensure_exists(path).await?;
        }
        tracing::info!(
            media = %media.path.display(),
            media_bytes = media.byte_size,
            audio = %audio.path.display(),
            audio_bytes = audio.byte_size,
            "Inputs resolved",
        );

        // Frame budget: explicit request value wins.
        let frame_budget = match request.max_frame {
            Some(explicit) => {
                tracing::info!(max_frame = explicit, "Using caller-specified frame budget");
                explicit
            }
            None => {
                derive_frame_budget(
                    self.duration_probe.as_ref(),
                    &audio_path,
                    second_audio_path.as_deref(),
                    self.config.frame_budget,
                )
                .await
            }
        };

        // Load the template variant for this job and patch it.
        let template = TemplateKind::select(kind, count);
        let mut graph = WorkflowGraph::load(&self.config.template_dir, template).await?;
        let values = PatchValues {
            media_path: &media.path,
            audio_path: &audio.path,
            prompt: request.prompt_text(),
            width: request.width(),
            height: request.height(),
            frame_budget,
            second_audio_path: second_audio_path.as_deref(),
            steps: request.steps,
        };
        apply(&mut graph, kind, count, &values)?;
        tracing::info!(
            template = template.file_name(),
            nodes = graph.node_count(),
            frame_budget,
            "Workflow patched",
        );

        // Connect, submit, track to completion.
        let mut stream = self.connection.establish(&self.api, cancel).await?;
        let handle = tracker::submit(&self.api, &graph, &self.comfy.client_id)
            .await
            .map_err(HandlerError::Submit)?;
        let tracked = tracker::track(&mut stream, &handle, cancel).await;
        let _ = stream.close(None).await;
        tracked?;

        // Retrieve and select the produced artifact.
        let outputs = tracker::fetch_outputs(&self.api, &handle).await?;
        let artifact = tracker::extract_primary_artifact(&outputs)?;
        self.artifact_reference(Path::new(&artifact.fullpath)).await
    }

    /// Resolve the primary media reference, falling back to the
    /// configured default when the job carries none.
    async fn resolve_media(
        &self,
        request: &JobRequest,
        work_dir: &Path,
    ) -> Result<PathBuf, HandlerError> {
        let filename = match request.input_type {
            MediaKind::Image => "input_image.jpg",
            MediaKind::Video => "input_video.mp4",
        };
        self.resolve_or_default(
            request.media_reference(),
            work_dir,
            filename,
            &self.config.default_image,
        )
        .await
    }

    async fn resolve_or_default(
        &self,
        reference: Option<(InputKind, &str)>,
        work_dir: &Path,
        filename: &str,
        default: &Path,
    ) -> Result<PathBuf, HandlerError> {
        match reference {
            Some((kind, value)) => Ok(self
                .resolver
                .resolve(value, kind, work_dir, filename)
                .await?),
            None => {
                tracing::info!(default = %default.display(), "No reference given, using default");
                Ok(default.to_path_buf())
            }
        }
    }

    /// Turn the selected artifact into the response reference: inlined
    /// base64 bytes, or the backend-local path.
    async fn artifact_reference(&self, path: &Path) -> Result<String, HandlerError> {
        if !self.config.inline_artifact {
            return Ok(path.to_string_lossy().into_owned());
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| HandlerError::ArtifactRead {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            "Inlining artifact",
        );
        Ok(BASE64.encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_and_separator_task_ids_are_rejected() {
        assert!(!is_safe_task_id(""));
        assert!(!is_safe_task_id("."));
        assert!(!is_safe_task_id(".."));
        assert!(!is_safe_task_id("../escape"));
        assert!(!is_safe_task_id("a/b"));
        assert!(!is_safe_task_id("a\\b"));
    }

    #[test]
    fn plain_task_ids_are_accepted() {
        assert!(is_safe_task_id("task_123"));
        assert!(is_safe_task_id("job-7.retry"));
    }
}

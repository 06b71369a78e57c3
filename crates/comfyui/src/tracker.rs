//! Streamed job tracking.
//!
//! After submission the backend streams execution events over the
//! WebSocket.  The tracker consumes them until the authoritative
//! completion signal for the submitted prompt arrives, then queries
//! the history endpoint and extracts the produced artifact.
//!
//! The read loop carries no timeout of its own; wall-clock bounding is
//! the caller's responsibility via the [`CancellationToken`].

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, Artifact, ComfyUiApi, ResultIndex};
use crate::connect::WsStream;
use crate::messages::{parse_message, ComfyMessage};

/// Backend-issued correlation identifier for one in-flight job.
///
/// Valid only for the lifetime of its tracking session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionHandle(pub String);

impl std::fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors from submission tracking and artifact extraction.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// The event stream closed before the completion signal arrived.
    #[error("event stream closed before completion")]
    StreamClosed,

    /// A WebSocket receive error.
    #[error("event stream receive error: {0}")]
    Receive(#[from] tokio_tungstenite::tungstenite::Error),

    /// The backend reported an execution error for this prompt.
    #[error("generation failed at node {node_id}: {message}")]
    ExecutionFailed { node_id: String, message: String },

    /// The history query failed.
    #[error("result index query failed: {0}")]
    History(#[from] ApiError),

    /// The history response carried no entry for the prompt.
    #[error("no history entry for prompt {0}")]
    MissingHistory(String),

    /// Every node in the result index produced an empty artifact list.
    #[error("no artifact produced by any node")]
    ArtifactNotFound,

    /// The caller aborted tracking.
    #[error("tracking cancelled")]
    Cancelled,
}

/// Submit a patched workflow and return its correlation handle.
pub async fn submit<W: serde::Serialize>(
    api: &ComfyUiApi,
    workflow: &W,
    client_id: &str,
) -> Result<SubmissionHandle, ApiError> {
    let response = api.submit_workflow(workflow, client_id).await?;
    tracing::info!(prompt_id = %response.prompt_id, "Workflow submitted");
    Ok(SubmissionHandle(response.prompt_id))
}

/// Whether a parsed message is the authoritative completion signal for
/// `prompt_id`.
///
/// Completion requires both an absent `node` field and a matching
/// prompt id; a progress event or a completion-shaped event for a
/// different job never completes this one.
pub fn is_completion(msg: &ComfyMessage, prompt_id: &str) -> bool {
    matches!(
        msg,
        ComfyMessage::Executing(data) if data.node.is_none() && data.prompt_id == prompt_id
    )
}

/// Consume streamed events until the completion signal for `handle`.
///
/// Text frames are parsed and dispatched; binary frames (preview
/// images) and unknown message kinds are ignored; ping/pong is handled
/// by tungstenite.  An `execution_error` for this prompt fails the
/// tracking session instead of waiting forever.
pub async fn track(
    stream: &mut WsStream,
    handle: &SubmissionHandle,
    cancel: &CancellationToken,
) -> Result<(), TrackError> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TrackError::Cancelled),
            frame = stream.next() => frame,
        };

        match frame {
            None => return Err(TrackError::StreamClosed),
            Some(Err(e)) => return Err(TrackError::Receive(e)),
            Some(Ok(Message::Text(text))) => {
                if observe_text_frame(&text, handle)? {
                    return Ok(());
                }
            }
            Some(Ok(Message::Binary(_))) => {
                // Preview frames; never a completion signal.
                tracing::trace!(prompt_id = %handle, "Ignoring binary frame");
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::warn!(prompt_id = %handle, ?frame, "Event stream closed by backend");
                return Err(TrackError::StreamClosed);
            }
            Some(Ok(_)) => {}
        }
    }
}

/// Handle one text frame; `Ok(true)` means the job completed.
fn observe_text_frame(text: &str, handle: &SubmissionHandle) -> Result<bool, TrackError> {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(
                prompt_id = %handle,
                error = %e,
                raw_message = %text,
                "Failed to parse event, ignoring",
            );
            return Ok(false);
        }
    };

    if is_completion(&msg, &handle.0) {
        tracing::info!(prompt_id = %handle, "Execution completed (all nodes done)");
        return Ok(true);
    }

    match msg {
        ComfyMessage::Executing(data) => {
            if data.prompt_id == handle.0 {
                tracing::debug!(
                    prompt_id = %handle,
                    node = data.node.as_deref().unwrap_or("-"),
                    "Executing node",
                );
            }
        }
        ComfyMessage::Progress(data) => {
            tracing::debug!(
                prompt_id = %handle,
                value = data.value,
                max = data.max,
                "Generation progress",
            );
        }
        ComfyMessage::Executed(data) if data.prompt_id == handle.0 => {
            tracing::debug!(
                prompt_id = %handle,
                node = %data.node,
                output = %data.output,
                "Node produced output",
            );
        }
        ComfyMessage::ExecutionError(data) if data.prompt_id == handle.0 => {
            tracing::error!(
                prompt_id = %handle,
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error",
            );
            return Err(TrackError::ExecutionFailed {
                node_id: data.node_id,
                message: data.exception_message,
            });
        }
        ComfyMessage::Status(data) => {
            tracing::debug!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "Queue status",
            );
        }
        _ => {}
    }

    Ok(false)
}

/// Query the result index for a completed submission.
pub async fn fetch_outputs(
    api: &ComfyUiApi,
    handle: &SubmissionHandle,
) -> Result<ResultIndex, TrackError> {
    let mut history = api.get_history(&handle.0).await?;
    let entry = history
        .remove(&handle.0)
        .ok_or_else(|| TrackError::MissingHistory(handle.0.clone()))?;

    tracing::info!(
        prompt_id = %handle,
        nodes = entry.outputs.0.len(),
        "Fetched result index",
    );
    Ok(entry.outputs)
}

/// Pick the primary artifact: first non-empty artifact list in stored
/// order, first element.
///
/// This tie-break mirrors the deployed behavior.  It is stable only
/// because [`ResultIndex`] iterates in sorted node-id order; callers
/// needing stability across backend graph changes should bind to a
/// known node id instead.
pub fn extract_primary_artifact(index: &ResultIndex) -> Result<&Artifact, TrackError> {
    index
        .entries()
        .find_map(|(_, output)| output.gifs.first())
        .ok_or(TrackError::ArtifactNotFound)
}

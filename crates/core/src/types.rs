//! Job request/response model.
//!
//! Mirrors the JSON surface exposed to the task queue: a single job
//! request describing the desired generation, and a response that is
//! either an artifact reference or an error message.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::input::InputKind;

/// Kind of primary media driving the generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Image-to-video: a still image is animated.
    Image,
    /// Video-to-video: an existing video is re-driven.
    Video,
}

impl Default for MediaKind {
    fn default() -> Self {
        Self::Image
    }
}

/// Number of speakers in the generated scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantCount {
    Single,
    Multi,
}

impl Default for ParticipantCount {
    fn default() -> Self {
        Self::Single
    }
}

/// A single generation job as received from the task queue.
///
/// Each logical input (media, audio, second audio) may be given as a
/// local path, a URL, or an inline base64 payload.  Only one form per
/// input is honored, in priority order `path > url > base64`; extra
/// forms are ignored, never combined.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRequest {
    /// Caller-assigned request identifier. A fresh `task_<uuid>` is
    /// generated when absent.
    pub id: Option<String>,

    #[serde(default)]
    pub input_type: MediaKind,
    #[serde(default)]
    pub person_count: ParticipantCount,

    pub image_path: Option<String>,
    pub image_url: Option<String>,
    pub image_base64: Option<String>,

    pub video_path: Option<String>,
    pub video_url: Option<String>,
    pub video_base64: Option<String>,

    pub wav_path: Option<String>,
    pub wav_url: Option<String>,
    pub wav_base64: Option<String>,

    pub wav_path_2: Option<String>,
    pub wav_url_2: Option<String>,
    pub wav_base64_2: Option<String>,

    /// Positive prompt text.
    pub prompt: Option<String>,
    /// Output width in pixels.
    pub width: Option<u32>,
    /// Output height in pixels.
    pub height: Option<u32>,
    /// Explicit frame budget. Derived from audio duration when absent.
    pub max_frame: Option<u32>,
    /// Sampler step count. Only applied when the loaded workflow has a
    /// steps slot.
    pub steps: Option<u32>,
}

/// Default prompt when the request carries none.
pub const DEFAULT_PROMPT: &str = "A person talking naturally";

/// Default output dimension (both axes) when the request carries none.
pub const DEFAULT_DIMENSION: u32 = 512;

impl JobRequest {
    /// The primary media reference, first match by priority order.
    ///
    /// Which triple is consulted depends on `input_type`; an image job
    /// never reads the `video_*` fields and vice versa.
    pub fn media_reference(&self) -> Option<(InputKind, &str)> {
        match self.input_type {
            MediaKind::Image => first_reference(
                self.image_path.as_deref(),
                self.image_url.as_deref(),
                self.image_base64.as_deref(),
            ),
            MediaKind::Video => first_reference(
                self.video_path.as_deref(),
                self.video_url.as_deref(),
                self.video_base64.as_deref(),
            ),
        }
    }

    /// The primary audio reference, first match by priority order.
    pub fn audio_reference(&self) -> Option<(InputKind, &str)> {
        first_reference(
            self.wav_path.as_deref(),
            self.wav_url.as_deref(),
            self.wav_base64.as_deref(),
        )
    }

    /// The second-speaker audio reference (multi-participant jobs).
    pub fn second_audio_reference(&self) -> Option<(InputKind, &str)> {
        first_reference(
            self.wav_path_2.as_deref(),
            self.wav_url_2.as_deref(),
            self.wav_base64_2.as_deref(),
        )
    }

    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    pub fn width(&self) -> u32 {
        self.width.unwrap_or(DEFAULT_DIMENSION)
    }

    pub fn height(&self) -> u32 {
        self.height.unwrap_or(DEFAULT_DIMENSION)
    }
}

/// Pick the first present reference in `path > url > base64` order.
fn first_reference<'a>(
    path: Option<&'a str>,
    url: Option<&'a str>,
    base64: Option<&'a str>,
) -> Option<(InputKind, &'a str)> {
    if let Some(p) = path {
        return Some((InputKind::Path, p));
    }
    if let Some(u) = url {
        return Some((InputKind::Url, u));
    }
    base64.map(|b| (InputKind::Base64, b))
}

/// Response returned to the task queue. Exactly one variant per job;
/// failures never propagate past this boundary as panics or raw errors.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobResponse {
    /// Successful generation; `video` is either an inlined base64
    /// payload or a path reference, depending on worker configuration.
    Success { video: String },
    /// The job failed; `error` is a human-readable description.
    Failure { error: String },
}

/// A resolved local input file. Read-only after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// Absolute or caller-relative local path.
    pub path: PathBuf,
    /// Size of the file in bytes at resolution time.
    pub byte_size: u64,
}

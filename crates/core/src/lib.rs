//! Shared types and request-side utilities for the talking-video
//! generation worker.
//!
//! Provides the job request/response model, heterogeneous input
//! resolution (local path / URL / base64), and audio-driven frame
//! budget derivation.

pub mod audio;
pub mod input;
pub mod types;

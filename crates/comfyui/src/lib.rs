//! ComfyUI submission and tracking client.
//!
//! Provides the REST wrapper for workflow submission and history
//! retrieval, typed WebSocket message parsing, bounded-retry
//! connection establishment, and the streamed completion tracker.

pub mod api;
pub mod config;
pub mod connect;
pub mod messages;
pub mod retry;
pub mod tracker;

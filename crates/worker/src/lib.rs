//! Generation worker: queue-facing job orchestration.

pub mod config;
pub mod handler;

//! Core domain types for the clipflow media pipeline.
//!
//! This crate holds the job/artifact/metadata models, the error taxonomy
//! shared by every other crate, and the environment-derived configuration.

pub mod config;
pub mod error;
pub mod models;

pub use config::PipelineConfig;
pub use error::{truncate_diagnostic, PipelineError, MAX_DIAGNOSTIC_LEN};

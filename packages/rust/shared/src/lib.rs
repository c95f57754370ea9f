//! Shared types, error model, and settings for kgpipe.
//!
//! This crate is the foundation depended on by all other kgpipe crates.
//! It provides:
//! - [`KgPipeError`] - the unified error type
//! - Run records ([`RunId`], [`RunInfo`], [`RunIndex`], [`RunPaths`])
//! - Settings resolution ([`Settings`], [`EnvSource`])

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiSettings, EnvSource, Limits, LlmEndpoint, ProcessEnv, RUNS_DIR_ENV, Settings, expand_home,
    runs_base_dir,
};
pub use error::{KgPipeError, Result};
pub use types::{
    RUN_ID_TIMESTAMP_FORMAT, RUN_ID_TIMESTAMP_LEN, RunDirectories, RunId, RunIndex, RunInfo,
    RunPaths, RunStatus,
};

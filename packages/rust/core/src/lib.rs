//! Pipeline orchestration for kgpipe.
//!
//! Ties search, text cleanup, and run management together into end-to-end
//! workflows (e.g., `collect`).

pub mod pipeline;
pub mod trace;

pub use pipeline::{
    COLLECTION_FILE, CollectConfig, CollectResult, CollectedDocument, ProgressReporter,
    SilentProgress, collect, slugify_query,
};
pub use trace::{generate_trace_id, item_trace_id};

//! Run lifecycle management for kgpipe.
//!
//! A run is one pipeline execution with its own directory tree under a base
//! directory, a `run_info.json` record, a dedicated log file, and an entry in
//! the shared `runs_index.json`.

pub mod index;
pub mod logging;
pub mod manager;
pub mod templates;

pub use index::{INDEX_FILE_NAME, RunIndexStore};
pub use logging::{LoggerRegistry, RunLogger};
pub use manager::{DEFAULT_RESULT_FILE, RUN_INFO_FILE, RunManager};
pub use templates::{TEMPLATE_ASSETS, TemplateCopy, TemplateOutcome, copy_templates};

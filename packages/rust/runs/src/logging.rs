//! Run-scoped loggers and the registry that owns them.
//!
//! Each [`RunLogger`] is its own `tracing` dispatcher with a file sink and an
//! optional console sink, both writing lines as
//! `timestamp - logger_name - LEVEL - message`. The [`LoggerRegistry`] hands
//! out one logger per name, so asking twice never attaches a sink twice.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::{LookupSpan, Registry};

use kgpipe_shared::{KgPipeError, Result};

/// Timestamp layout used in log lines.
const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

// ---------------------------------------------------------------------------
// Line format
// ---------------------------------------------------------------------------

/// `timestamp - logger_name - LEVEL - message`
#[derive(Debug, Clone)]
struct LineFormat {
    logger_name: String,
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Local::now().format(LINE_TIMESTAMP_FORMAT);
        write!(
            writer,
            "{now} - {} - {} - ",
            self.logger_name,
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// ---------------------------------------------------------------------------
// RunLogger
// ---------------------------------------------------------------------------

/// A named logger bound to one run's `logs/run.log`.
pub struct RunLogger {
    name: String,
    log_file: PathBuf,
    dispatch: Dispatch,
}

impl std::fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogger")
            .field("name", &self.name)
            .field("log_file", &self.log_file)
            .finish_non_exhaustive()
    }
}

impl RunLogger {
    fn open(name: &str, log_file: &Path, console: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| KgPipeError::io(log_file, e))?;

        let format = LineFormat {
            logger_name: name.to_string(),
        };

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .event_format(format.clone());

        let console_layer = console.then(|| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .event_format(format)
        });

        let subscriber = Registry::default()
            .with(LevelFilter::INFO)
            .with(file_layer)
            .with(console_layer);

        Ok(Self {
            name: name.to_string(),
            log_file: log_file.to_path_buf(),
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::dispatcher::with_default(&self.dispatch, || tracing::info!("{}", message));
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::dispatcher::with_default(&self.dispatch, || tracing::warn!("{}", message));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::dispatcher::with_default(&self.dispatch, || tracing::error!("{}", message));
    }
}

// ---------------------------------------------------------------------------
// LoggerRegistry
// ---------------------------------------------------------------------------

/// Owns every run logger created in this process, keyed by name.
///
/// Pass it around by `Arc`; there is no hidden global.
#[derive(Debug, Default)]
pub struct LoggerRegistry {
    loggers: Mutex<HashMap<String, Arc<RunLogger>>>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the logger called `name`, creating it with its sinks on first use.
    ///
    /// Later calls with the same name return the existing logger untouched,
    /// whatever `log_file` and `console` say.
    pub fn ensure(&self, name: &str, log_file: &Path, console: bool) -> Result<Arc<RunLogger>> {
        let mut loggers = self.loggers.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = loggers.get(name) {
            return Ok(Arc::clone(existing));
        }

        let logger = Arc::new(RunLogger::open(name, log_file, console)?);
        loggers.insert(name.to_string(), Arc::clone(&logger));
        tracing::debug!(logger = name, path = %log_file.display(), "attached run logger");
        Ok(logger)
    }

    pub fn get(&self, name: &str) -> Option<Arc<RunLogger>> {
        self.loggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.loggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_formatted_lines_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("run.log");
        let registry = LoggerRegistry::new();

        let logger = registry.ensure("run_test", &log_file, false).unwrap();
        logger.info("hello");
        logger.warn("careful");

        let content = std::fs::read_to_string(&log_file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - run_test - INFO - hello"));
        assert!(lines[1].contains(" - run_test - WARN - careful"));
    }

    #[test]
    fn ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("run.log");
        let registry = LoggerRegistry::new();

        let first = registry.ensure("run_x", &log_file, false).unwrap();
        let second = registry.ensure("run_x", &log_file, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        second.info("only once");
        let content = std::fs::read_to_string(&log_file).unwrap();
        assert_eq!(content.matches("only once").count(), 1);
    }

    #[test]
    fn separate_names_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LoggerRegistry::new();

        let a = registry.ensure("run_a", &dir.path().join("a.log"), false).unwrap();
        let b = registry.ensure("run_b", &dir.path().join("b.log"), false).unwrap();
        a.info("from a");
        b.error("from b");

        let a_log = std::fs::read_to_string(dir.path().join("a.log")).unwrap();
        let b_log = std::fs::read_to_string(dir.path().join("b.log")).unwrap();
        assert!(a_log.contains("from a") && !a_log.contains("from b"));
        assert!(b_log.contains("run_b - ERROR - from b"));
        assert!(registry.get("run_a").is_some());
        assert!(registry.get("run_c").is_none());
    }

    #[test]
    fn unopenable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LoggerRegistry::new();
        let missing = dir.path().join("no-such-dir").join("run.log");

        let err = registry.ensure("run_bad", &missing, false).unwrap_err();
        assert!(matches!(err, KgPipeError::Io { .. }));
        assert!(registry.is_empty());
    }
}

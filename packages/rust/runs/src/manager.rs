//! Run lifecycle: create, locate, save into, and finalize a run directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use kgpipe_shared::{KgPipeError, Result, RunId, RunInfo, RunPaths};

use crate::index::RunIndexStore;
use crate::logging::{LoggerRegistry, RunLogger};
use crate::templates::{self, TEMPLATE_ASSETS, TemplateOutcome};

/// Per-run metadata file name.
pub const RUN_INFO_FILE: &str = "run_info.json";

/// Default file name for [`RunManager::save_result`].
pub const DEFAULT_RESULT_FILE: &str = "result.json";

/// Subdirectories created under every run root.
const RUN_SUBDIRS: &[&str] = &[
    "logs",
    "graphrag_data",
    "graphrag_data/input",
    "graphrag_data/output",
    "graphrag_data/cache",
    "graphrag_data/prompts",
    "input",
    "output",
    "cache",
    "config",
];

/// The run this manager is currently driving.
#[derive(Debug)]
struct ActiveRun {
    id: RunId,
    dir: PathBuf,
    logger: Arc<RunLogger>,
}

/// Owns the on-disk footprint and metadata of one pipeline execution at a time.
///
/// Directories outlive the manager; dropping it never deletes anything.
#[derive(Debug)]
pub struct RunManager {
    base_dir: PathBuf,
    template_root: PathBuf,
    console: bool,
    loggers: Arc<LoggerRegistry>,
    index: RunIndexStore,
    current: Option<ActiveRun>,
}

impl RunManager {
    /// Manager for runs under `base_dir`, registering loggers in `loggers`.
    pub fn new(base_dir: impl Into<PathBuf>, loggers: Arc<LoggerRegistry>) -> Self {
        let base_dir = base_dir.into();
        Self {
            index: RunIndexStore::new(&base_dir),
            base_dir,
            template_root: PathBuf::from("."),
            console: true,
            loggers,
            current: None,
        }
    }

    /// Directory that template asset sources are resolved against.
    pub fn with_template_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.template_root = root.into();
        self
    }

    /// Whether run loggers also write to the console (default: yes).
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn current_run_id(&self) -> Option<&RunId> {
        self.current.as_ref().map(|run| &run.id)
    }

    pub fn current_run_dir(&self) -> Option<&Path> {
        self.current.as_ref().map(|run| run.dir.as_path())
    }

    /// The active run's logger.
    pub fn logger(&self) -> Option<Arc<RunLogger>> {
        self.current.as_ref().map(|run| Arc::clone(&run.logger))
    }

    /// Start a new run and make it the active one.
    ///
    /// Fails fast on directory, logger, metadata, or index errors. Template
    /// copying is best-effort and only logged.
    #[instrument(skip(self), fields(base_dir = %self.base_dir.display()))]
    pub fn create_new_run(&mut self, run_name: Option<&str>) -> Result<RunId> {
        let now = Local::now();
        let run_id = RunId::generate(now, run_name)?;

        let base_dir =
            std::path::absolute(&self.base_dir).map_err(|e| KgPipeError::io(&self.base_dir, e))?;
        let run_dir = base_dir.join(run_id.as_str());

        create_run_structure(&run_dir)?;

        let logger = self.loggers.ensure(
            &format!("run_{run_id}"),
            &run_dir.join("logs").join("run.log"),
            self.console,
        )?;

        self.copy_templates(&run_dir, &logger);

        let run_info = RunInfo::started(run_id.clone(), &run_dir, now);
        write_json(&run_dir.join(RUN_INFO_FILE), &run_info)?;
        self.index.append(&run_info)?;

        logger.info(format!("run {run_id} created at {}", run_dir.display()));
        info!(%run_id, path = %run_dir.display(), "run created");

        self.current = Some(ActiveRun {
            id: run_id.clone(),
            dir: run_dir,
            logger,
        });

        Ok(run_id)
    }

    fn copy_templates(&self, run_dir: &Path, logger: &RunLogger) {
        for copy in templates::copy_templates(&self.template_root, run_dir, TEMPLATE_ASSETS) {
            let (src, dst) = (copy.source.display(), copy.destination.display());
            match copy.outcome {
                TemplateOutcome::File => logger.info(format!("copied file: {src} -> {dst}")),
                TemplateOutcome::Directory { files } => {
                    logger.info(format!("copied directory ({files} files): {src} -> {dst}"))
                }
                TemplateOutcome::Missing => {
                    logger.warn(format!("template file/directory not found: {src}"))
                }
                TemplateOutcome::Failed(e) => {
                    logger.error(format!("failed to copy template {src}: {e}"))
                }
            }
        }
    }

    /// Paths of the active run.
    ///
    /// Fails with [`KgPipeError::NoActiveRun`] before [`Self::create_new_run`].
    pub fn get_run_paths(&self) -> Result<RunPaths> {
        let run = self.current.as_ref().ok_or(KgPipeError::NoActiveRun)?;
        Ok(RunPaths::from_run_dir(&run.dir))
    }

    /// Write `result` as pretty JSON to `output/<filename>` of the active run.
    ///
    /// Without an active run this does nothing and returns `Ok(None)`.
    pub fn save_result<T: Serialize + ?Sized>(
        &self,
        result: &T,
        filename: &str,
    ) -> Result<Option<PathBuf>> {
        let Some(run) = &self.current else {
            debug!(filename, "no active run, result not saved");
            return Ok(None);
        };

        validate_file_name(filename)?;

        let path = run.dir.join("output").join(filename);
        write_json(&path, result)?;
        run.logger.info(format!("result saved to {}", path.display()));

        Ok(Some(path))
    }

    /// Mark the active run completed or failed.
    ///
    /// Rewrites `run_info.json` and the run's record in the shared index.
    /// Without an active run this does nothing. Calling it again overwrites
    /// the previous outcome.
    #[instrument(skip(self, error_message))]
    pub fn complete_run(&mut self, success: bool, error_message: Option<&str>) -> Result<()> {
        let Some(run) = &self.current else {
            debug!("no active run, nothing to complete");
            return Ok(());
        };

        let info_path = run.dir.join(RUN_INFO_FILE);
        match read_run_info(&info_path)? {
            Some(mut run_info) => {
                run_info.finish(success, error_message, Local::now());
                write_json(&info_path, &run_info)?;
                self.index.upsert(&run_info)?;
            }
            None => {
                warn!(path = %info_path.display(), "run_info.json missing, run not finalized");
            }
        }

        if success {
            run.logger.info(format!("run {} completed", run.id));
        } else {
            run.logger.error(format!(
                "run {} failed: {}",
                run.id,
                error_message.unwrap_or("unknown error")
            ));
        }
        info!(run_id = %run.id, success, "run finished");

        Ok(())
    }

    /// Every run recorded in `<base_dir>/runs_index.json`, oldest first.
    ///
    /// A missing or unreadable index yields an empty list.
    pub fn list_runs(base_dir: &Path) -> Vec<RunInfo> {
        RunIndexStore::new(base_dir).read().runs
    }

    /// Re-open an existing run. Reserved; always fails.
    pub fn load_run(_run_id: &str, _base_dir: &Path) -> Result<Self> {
        Err(KgPipeError::NotImplemented("loading an existing run"))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn create_run_structure(run_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(run_dir).map_err(|e| KgPipeError::io(run_dir, e))?;
    for sub in RUN_SUBDIRS {
        let dir = run_dir.join(sub);
        std::fs::create_dir_all(&dir).map_err(|e| KgPipeError::io(&dir, e))?;
    }
    debug!(path = %run_dir.display(), "run directory structure created");
    Ok(())
}

fn read_run_info(path: &Path) -> Result<Option<RunInfo>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(KgPipeError::io(path, e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| KgPipeError::parse(format!("invalid {}: {e}", path.display())))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| KgPipeError::parse(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| KgPipeError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

fn validate_file_name(filename: &str) -> Result<()> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(KgPipeError::validation(format!(
            "result file name '{filename}' must be a plain file name"
        ))),
    }
}

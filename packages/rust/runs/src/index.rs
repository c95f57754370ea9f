//! The shared `runs_index.json` ledger.
//!
//! Reads are best-effort: a missing or unparsable file reads as an empty
//! index, and records that don't decode are skipped. Writes are
//! read-modify-write cycles serialized across processes by an exclusive
//! lockfile next to the index, and land via temp file + rename. A rewrite
//! works on the raw JSON records, so entries this version cannot decode are
//! written back untouched.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use kgpipe_shared::{KgPipeError, Result, RunIndex, RunInfo};

/// File name of the index inside the runs base directory.
pub const INDEX_FILE_NAME: &str = "runs_index.json";

const RUNS_KEY: &str = "runs";

/// How long a writer waits for the lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between lock attempts.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(25);

/// A lockfile older than this is left over from a crashed writer.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// Handle on the index file of one runs base directory.
#[derive(Debug, Clone)]
pub struct RunIndexStore {
    base_dir: PathBuf,
    path: PathBuf,
    lock_path: PathBuf,
}

impl RunIndexStore {
    pub fn new(base_dir: &Path) -> Self {
        let path = base_dir.join(INDEX_FILE_NAME);
        let lock_path = base_dir.join(format!("{INDEX_FILE_NAME}.lock"));
        Self {
            base_dir: base_dir.to_path_buf(),
            path,
            lock_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the index. Absent or corrupt files read as empty.
    pub fn read(&self) -> RunIndex {
        let mut root = self.read_raw();
        let runs = take_runs(&mut root)
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<RunInfo>(record) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping unreadable run index record");
                    None
                }
            })
            .collect();
        RunIndex { runs }
    }

    /// Append a record.
    pub fn append(&self, info: &RunInfo) -> Result<()> {
        let record = to_record(info)?;
        self.update(|runs| runs.push(record))
    }

    /// Replace the most recent record for `info.run_id`, or append one.
    pub fn upsert(&self, info: &RunInfo) -> Result<()> {
        let record = to_record(info)?;
        let run_id = info.run_id.as_str();
        self.update(|runs| {
            let existing = runs
                .iter_mut()
                .rev()
                .find(|r| r.get("run_id").and_then(Value::as_str) == Some(run_id));
            match existing {
                Some(slot) => *slot = record,
                None => runs.push(record),
            }
        })
    }

    fn update(&self, apply: impl FnOnce(&mut Vec<Value>)) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| KgPipeError::io(&self.base_dir, e))?;

        let _lock = IndexLock::acquire(&self.lock_path, LOCK_TIMEOUT)?;

        let mut root = self.read_raw();
        let mut runs = take_runs(&mut root);
        apply(&mut runs);
        let count = runs.len();
        root.insert(RUNS_KEY.to_string(), Value::Array(runs));
        self.write(&root)?;

        debug!(path = %self.path.display(), runs = count, "run index updated");
        Ok(())
    }

    /// The top-level JSON object. Only a file that is not a JSON object
    /// counts as corrupt.
    fn read_raw(&self) -> Map<String, Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read run index, treating as empty");
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(root)) => root,
            Ok(_) => {
                warn!(path = %self.path.display(), "run index is not a JSON object, treating as empty");
                Map::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "run index is corrupt, treating as empty");
                Map::new()
            }
        }
    }

    fn write(&self, root: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(root)
            .map_err(|e| KgPipeError::parse(format!("run index serialization failed: {e}")))?;

        let temp = self.base_dir.join(format!(".{INDEX_FILE_NAME}.tmp"));
        std::fs::write(&temp, json).map_err(|e| KgPipeError::io(&temp, e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| KgPipeError::io(&self.path, e))?;
        Ok(())
    }
}

fn to_record(info: &RunInfo) -> Result<Value> {
    serde_json::to_value(info)
        .map_err(|e| KgPipeError::parse(format!("run record serialization failed: {e}")))
}

fn take_runs(root: &mut Map<String, Value>) -> Vec<Value> {
    match root.remove(RUNS_KEY) {
        Some(Value::Array(runs)) => runs,
        Some(_) => {
            warn!("run index 'runs' is not an array, treating as empty");
            Vec::new()
        }
        None => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Lockfile
// ---------------------------------------------------------------------------

/// Exclusive lock held while the index is rewritten. Released on drop.
#[derive(Debug)]
struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let start = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    // The pid is informational only.
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path) {
                        match std::fs::remove_file(path) {
                            Ok(()) => {
                                warn!(path = %path.display(), "removed stale run index lock");
                                continue;
                            }
                            // Another writer got there first.
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => {
                                debug!(path = %path.display(), error = %e, "cannot remove stale run index lock");
                            }
                        }
                    }
                    if start.elapsed() >= timeout {
                        return Err(KgPipeError::IndexLocked {
                            path: path.to_path_buf(),
                        });
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => return Err(KgPipeError::io(path, e)),
            }
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release run index lock");
        }
    }
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

//! Core domain types for kgpipe runs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{KgPipeError, Result};

/// `strftime` pattern for the timestamp token at the start of every run id.
pub const RUN_ID_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Length of the rendered timestamp token (`YYYYMMDD_HHMMSS`).
pub const RUN_ID_TIMESTAMP_LEN: usize = 15;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Identifier of a run: local timestamp, optionally suffixed with `_<name>`.
///
/// Unique only to the second. Two unnamed runs started within the same
/// second get the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Build a run id for `now`, appending `name` when it is non-empty.
    ///
    /// Names that would escape the runs directory (path separators, `..`)
    /// are rejected.
    pub fn generate(now: DateTime<Local>, name: Option<&str>) -> Result<Self> {
        let timestamp = now.format(RUN_ID_TIMESTAMP_FORMAT).to_string();
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => {
                validate_run_name(name)?;
                Ok(Self(format!("{timestamp}_{name}")))
            }
            None => Ok(Self(timestamp)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `YYYYMMDD_HHMMSS` prefix.
    pub fn timestamp_token(&self) -> &str {
        self.0.get(..RUN_ID_TIMESTAMP_LEN).unwrap_or(&self.0)
    }

    /// The user-supplied name suffix, if any.
    pub fn name(&self) -> Option<&str> {
        self.0
            .get(RUN_ID_TIMESTAMP_LEN..)
            .and_then(|rest| rest.strip_prefix('_'))
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_run_name(name: &str) -> Result<()> {
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(KgPipeError::validation(format!(
            "run name '{name}' must not contain path separators or '..'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a run: `running → {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Completed
        } else {
            Self::Failed
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// RunDirectories / RunInfo
// ---------------------------------------------------------------------------

/// The `directories` object recorded in `run_info.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDirectories {
    pub base: PathBuf,
    pub logs: PathBuf,
    pub graphrag_data: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
    pub config: PathBuf,
}

impl RunDirectories {
    pub fn from_run_dir(run_dir: &Path) -> Self {
        Self {
            base: run_dir.to_path_buf(),
            logs: run_dir.join("logs"),
            graphrag_data: run_dir.join("graphrag_data"),
            input: run_dir.join("input"),
            output: run_dir.join("output"),
            cache: run_dir.join("cache"),
            config: run_dir.join("config"),
        }
    }
}

/// Metadata record for one run, stored as `run_info.json` and in the index.
///
/// Timestamps are written as RFC 3339. Reading also accepts ISO 8601 without
/// an offset, taken as local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: RunId,
    #[serde(deserialize_with = "local_timestamp::deserialize")]
    pub created_at: DateTime<Local>,
    pub status: RunStatus,
    pub directories: RunDirectories,
    #[serde(
        default,
        deserialize_with = "local_timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RunInfo {
    /// A fresh `running` record for a run rooted at `run_dir`.
    pub fn started(run_id: RunId, run_dir: &Path, created_at: DateTime<Local>) -> Self {
        Self {
            run_id,
            created_at,
            status: RunStatus::Running,
            directories: RunDirectories::from_run_dir(run_dir),
            completed_at: None,
            error_message: None,
        }
    }

    /// Move the record to its terminal state.
    pub fn finish(&mut self, success: bool, error_message: Option<&str>, at: DateTime<Local>) {
        self.completed_at = Some(at);
        self.status = RunStatus::from_success(success);
        if let Some(msg) = error_message {
            self.error_message = Some(msg.to_string());
        }
    }
}

mod local_timestamp {
    use chrono::{DateTime, Local, NaiveDateTime};
    use serde::{Deserialize, Deserializer, de::Error};

    const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn parse(s: &str) -> Option<DateTime<Local>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Local));
        }
        NaiveDateTime::parse_from_str(s, NAIVE_FORMAT)
            .ok()
            .and_then(|naive| naive.and_local_timezone(Local).earliest())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Local>, D::Error> {
        let s = String::deserialize(d)?;
        parse(&s).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{s}'")))
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Local>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{s}'"))),
            None => Ok(None),
        }
    }
}

/// Root structure of `runs_index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunIndex {
    #[serde(default)]
    pub runs: Vec<RunInfo>,
}

// ---------------------------------------------------------------------------
// RunPaths
// ---------------------------------------------------------------------------

/// The ten logical paths a pipeline step needs, as handed to `Settings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPaths {
    pub run_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub graphrag_root: PathBuf,
    pub graphrag_input: PathBuf,
    pub graphrag_output: PathBuf,
    pub graphrag_cache: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl RunPaths {
    /// Paths inside an isolated run directory.
    pub fn from_run_dir(run_dir: &Path) -> Self {
        let graphrag = run_dir.join("graphrag_data");
        Self {
            run_dir: run_dir.to_path_buf(),
            logs_dir: run_dir.join("logs"),
            graphrag_input: graphrag.join("input"),
            graphrag_output: graphrag.join("output"),
            graphrag_cache: graphrag.join("cache"),
            graphrag_root: graphrag,
            input_dir: run_dir.join("input"),
            output_dir: run_dir.join("output"),
            cache_dir: run_dir.join("cache"),
            config_dir: run_dir.join("config"),
        }
    }

    /// All ten paths keyed by their logical name.
    pub fn entries(&self) -> [(&'static str, &Path); 10] {
        [
            ("run_dir", &self.run_dir),
            ("logs_dir", &self.logs_dir),
            ("graphrag_root", &self.graphrag_root),
            ("graphrag_input", &self.graphrag_input),
            ("graphrag_output", &self.graphrag_output),
            ("graphrag_cache", &self.graphrag_cache),
            ("input_dir", &self.input_dir),
            ("output_dir", &self.output_dir),
            ("cache_dir", &self.cache_dir),
            ("config_dir", &self.config_dir),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 3, 14, 9, 26, 53)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn run_id_without_name_is_timestamp() {
        let id = RunId::generate(fixed_time(), None).unwrap();
        assert_eq!(id.as_str(), "20250314_092653");
        assert_eq!(id.timestamp_token().len(), RUN_ID_TIMESTAMP_LEN);
        assert_eq!(id.name(), None);
    }

    #[test]
    fn run_id_with_name_is_suffixed() {
        let id = RunId::generate(fixed_time(), Some("physics")).unwrap();
        assert_eq!(id.as_str(), "20250314_092653_physics");
        assert_eq!(id.name(), Some("physics"));
    }

    #[test]
    fn empty_run_name_is_ignored() {
        let id = RunId::generate(fixed_time(), Some("  ")).unwrap();
        assert_eq!(id.as_str(), "20250314_092653");
    }

    #[test]
    fn run_name_with_separator_is_rejected() {
        assert!(RunId::generate(fixed_time(), Some("a/b")).is_err());
        assert!(RunId::generate(fixed_time(), Some("..")).is_err());
    }

    #[test]
    fn run_info_serialization_omits_unset_fields() {
        let id = RunId::generate(fixed_time(), None).unwrap();
        let info = RunInfo::started(id, Path::new("/tmp/runs/x"), fixed_time());
        let json = serde_json::to_value(&info).expect("serialize");

        assert_eq!(json["status"], "running");
        assert!(json.get("completed_at").is_none());
        assert!(json.get("error_message").is_none());
        assert_eq!(json["directories"]["logs"], "/tmp/runs/x/logs");
    }

    #[test]
    fn run_info_accepts_timestamps_without_offset() {
        let json = r#"{
            "run_id": "20250101_120000",
            "created_at": "2025-01-01T12:00:00.123456",
            "completed_at": "2025-01-01T12:30:00",
            "status": "completed",
            "directories": {
                "base": "/r", "logs": "/r/logs", "graphrag_data": "/r/graphrag_data",
                "input": "/r/input", "output": "/r/output", "cache": "/r/cache",
                "config": "/r/config"
            }
        }"#;
        let info: RunInfo = serde_json::from_str(json).expect("naive timestamps decode");

        assert_eq!(info.created_at.format("%Y-%m-%d %H:%M:%S").to_string(), "2025-01-01 12:00:00");
        assert_eq!(info.completed_at.map(|t| t.format("%H:%M").to_string()).as_deref(), Some("12:30"));
    }

    #[test]
    fn run_info_round_trips_its_own_timestamps() {
        let id = RunId::generate(fixed_time(), None).unwrap();
        let mut info = RunInfo::started(id, Path::new("/r"), fixed_time());
        info.finish(true, None, fixed_time());

        let back: RunInfo = serde_json::from_str(&serde_json::to_string(&info).unwrap()).unwrap();
        assert_eq!(back.created_at, info.created_at);
        assert_eq!(back.completed_at, info.completed_at);
    }

    #[test]
    fn run_info_rejects_garbage_timestamp() {
        let json = r#"{"run_id": "x", "created_at": "yesterday", "status": "running",
            "directories": {"base": "/r", "logs": "/r", "graphrag_data": "/r", "input": "/r",
            "output": "/r", "cache": "/r", "config": "/r"}}"#;
        assert!(serde_json::from_str::<RunInfo>(json).is_err());
    }

    #[test]
    fn finish_sets_terminal_state() {
        let id = RunId::generate(fixed_time(), None).unwrap();
        let mut info = RunInfo::started(id, Path::new("/tmp/runs/x"), fixed_time());
        info.finish(false, Some("boom"), fixed_time());

        assert_eq!(info.status, RunStatus::Failed);
        assert!(info.status.is_terminal());
        assert_eq!(info.error_message.as_deref(), Some("boom"));
        assert!(info.completed_at.is_some());
    }

    #[test]
    fn run_paths_layout() {
        let paths = RunPaths::from_run_dir(Path::new("/r"));
        assert_eq!(paths.graphrag_input, Path::new("/r/graphrag_data/input"));
        assert_eq!(paths.config_dir, Path::new("/r/config"));

        let names: Vec<&str> = paths.entries().iter().map(|(n, _)| *n).collect();
        assert_eq!(names.len(), 10);
        assert!(names.contains(&"graphrag_cache"));
    }
}

//! Promotion of generated datasets into the published dataset directory.
//!
//! Staging holds `*.jsonl` files produced by generation runs. Promotion copies
//! selected files, with their timestamps, into the final directory and checks
//! the copy against the source by SHA-256. Existing files are only replaced
//! with explicit consent.

mod interactive;

use std::fs::{File, FileTimes};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use kgpipe_shared::{KgPipeError, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

/// Where generation writes datasets.
pub const DEFAULT_STAGING_DIR: &str = "evaluation_data/generated_datasets";

/// Where published datasets live.
pub const DEFAULT_FINAL_DIR: &str = "evaluation_data/final_datasets";

/// Extension of dataset files.
const DATASET_EXTENSION: &str = "jsonl";

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Non-empty line count of a dataset, if it could be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCount {
    Records(usize),
    Unreadable,
}

impl std::fmt::Display for LineCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Records(n) => write!(f, "{n} records"),
            Self::Unreadable => f.write_str("unreadable"),
        }
    }
}

/// A staged dataset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub name: String,
    pub path: PathBuf,
    pub records: LineCount,
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Which staged files to promote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Zero-based position in the listing.
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("no file number {choice}: choose 0 for all or 1 to {count}")]
    OutOfRange { choice: usize, count: usize },
}

impl Selection {
    /// Parse a menu answer: `0` for all files, or a 1-based file number.
    pub fn parse(input: &str, count: usize) -> std::result::Result<Self, SelectionError> {
        let input = input.trim();
        let choice: usize = input
            .parse()
            .map_err(|_| SelectionError::NotANumber(input.to_string()))?;

        match choice {
            0 => Ok(Self::All),
            n if n <= count => Ok(Self::Index(n - 1)),
            n => Err(SelectionError::OutOfRange { choice: n, count }),
        }
    }

    fn resolve<'a>(&self, files: &'a [DatasetFile]) -> Result<Vec<&'a DatasetFile>> {
        match self {
            Self::All => Ok(files.iter().collect()),
            Self::Index(i) => files.get(*i).map(|f| vec![f]).ok_or_else(|| {
                KgPipeError::validation(format!(
                    "no file number {}: only {} staged",
                    i + 1,
                    files.len()
                ))
            }),
            Self::Name(name) => files
                .iter()
                .find(|f| &f.name == name)
                .map(|f| vec![f])
                .ok_or_else(|| KgPipeError::validation(format!("no staged dataset named '{name}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

/// What to do when the destination already has a file of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Ask the confirmation callback.
    #[default]
    Ask,
    Always,
    Never,
}

/// Files promoted and skipped by one promotion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionReport {
    pub promoted: Vec<String>,
    pub skipped: Vec<String>,
}

impl PromotionReport {
    /// `N promoted, M skipped`
    pub fn summary(&self) -> String {
        format!("{} promoted, {} skipped", self.promoted.len(), self.skipped.len())
    }
}

/// How a promotion ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    Completed(PromotionReport),
    /// The user stopped before anything was copied.
    Cancelled,
}

/// Copies datasets from a staging directory to a final directory.
#[derive(Debug, Clone)]
pub struct DatasetPromoter {
    staging: PathBuf,
    final_dir: PathBuf,
}

impl Default for DatasetPromoter {
    fn default() -> Self {
        Self::new(DEFAULT_STAGING_DIR, DEFAULT_FINAL_DIR)
    }
}

impl DatasetPromoter {
    pub fn new(staging: impl Into<PathBuf>, final_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging: staging.into(),
            final_dir: final_dir.into(),
        }
    }

    /// Promoter for the default `evaluation_data` layout.
    pub fn default_dirs() -> Self {
        Self::default()
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    pub fn final_dir(&self) -> &Path {
        &self.final_dir
    }

    /// Staged `*.jsonl` files sorted by name.
    pub fn list(&self) -> Result<Vec<DatasetFile>> {
        if !self.staging.is_dir() {
            return Err(KgPipeError::validation(format!(
                "staging directory {} does not exist",
                self.staging.display()
            )));
        }

        let entries =
            std::fs::read_dir(&self.staging).map_err(|e| KgPipeError::io(&self.staging, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| KgPipeError::io(&self.staging, e))?;
            let path = entry.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(DATASET_EXTENSION)
            {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let records = count_records(&path);
            files.push(DatasetFile {
                name,
                path,
                records,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(staging = %self.staging.display(), count = files.len(), "listed staged datasets");
        Ok(files)
    }

    /// Promote the selected files.
    ///
    /// Every overwrite decision is made before the first copy, so a `None`
    /// from `confirm` cancels the whole promotion with nothing written.
    #[instrument(skip(self, files, confirm), fields(staging = %self.staging.display()))]
    pub fn promote(
        &self,
        files: &[DatasetFile],
        selection: &Selection,
        policy: OverwritePolicy,
        mut confirm: impl FnMut(&DatasetFile) -> Option<bool>,
    ) -> Result<PromotionOutcome> {
        let selected = selection.resolve(files)?;

        let mut plan = Vec::with_capacity(selected.len());
        for file in selected {
            let exists = self.final_dir.join(&file.name).exists();
            let copy = match (exists, policy) {
                (false, _) | (true, OverwritePolicy::Always) => true,
                (true, OverwritePolicy::Never) => false,
                (true, OverwritePolicy::Ask) => match confirm(file) {
                    Some(answer) => answer,
                    None => {
                        info!("promotion cancelled");
                        return Ok(PromotionOutcome::Cancelled);
                    }
                },
            };
            plan.push((file, copy));
        }

        std::fs::create_dir_all(&self.final_dir)
            .map_err(|e| KgPipeError::io(&self.final_dir, e))?;

        let mut report = PromotionReport::default();
        for (file, copy) in plan {
            if copy {
                let digest = self.copy_verified(file)?;
                info!(file = %file.name, sha256 = %digest, "promoted dataset");
                report.promoted.push(file.name.clone());
            } else {
                debug!(file = %file.name, "kept existing dataset");
                report.skipped.push(file.name.clone());
            }
        }

        info!(summary = %report.summary(), "promotion finished");
        Ok(PromotionOutcome::Completed(report))
    }

    /// Copy through a temp file, carry over timestamps, and compare digests.
    fn copy_verified(&self, file: &DatasetFile) -> Result<String> {
        let target = self.final_dir.join(&file.name);
        let temp = self.final_dir.join(format!(".{}.tmp", file.name));

        std::fs::copy(&file.path, &temp).map_err(|e| KgPipeError::io(&temp, e))?;
        copy_times(&file.path, &temp)?;

        let expected = sha256_file(&file.path)?;
        let actual = sha256_file(&temp)?;
        if expected != actual {
            let _ = std::fs::remove_file(&temp);
            return Err(KgPipeError::validation(format!(
                "copy of {} does not match the source (sha256 {actual} != {expected})",
                file.name
            )));
        }

        std::fs::rename(&temp, &target).map_err(|e| KgPipeError::io(&target, e))?;
        Ok(expected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn count_records(path: &Path) -> LineCount {
    let Ok(file) = File::open(path) else {
        return LineCount::Unreadable;
    };

    let mut count = 0;
    for line in BufReader::new(file).lines() {
        match line {
            Ok(line) if !line.trim().is_empty() => count += 1,
            Ok(_) => {}
            Err(_) => return LineCount::Unreadable,
        }
    }
    LineCount::Records(count)
}

fn copy_times(source: &Path, target: &Path) -> Result<()> {
    let meta = std::fs::metadata(source).map_err(|e| KgPipeError::io(source, e))?;
    let mut times = FileTimes::new();
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }

    let file = File::options()
        .write(true)
        .open(target)
        .map_err(|e| KgPipeError::io(target, e))?;
    file.set_times(times).map_err(|e| KgPipeError::io(target, e))
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| KgPipeError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| KgPipeError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn staged(names: &[(&str, &str)]) -> (tempfile::TempDir, DatasetPromoter) {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("generated");
        std::fs::create_dir_all(&staging).unwrap();
        for (name, content) in names {
            std::fs::write(staging.join(name), content).unwrap();
        }
        let promoter = DatasetPromoter::new(staging, dir.path().join("final"));
        (dir, promoter)
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!(Selection::parse("0", 2), Ok(Selection::All));
        assert_eq!(Selection::parse(" 2\n", 2), Ok(Selection::Index(1)));
        assert_eq!(
            Selection::parse("abc", 2),
            Err(SelectionError::NotANumber("abc".into()))
        );
        assert_eq!(
            Selection::parse("3", 2),
            Err(SelectionError::OutOfRange { choice: 3, count: 2 })
        );
        assert!(matches!(Selection::parse("-1", 2), Err(SelectionError::NotANumber(_))));
    }

    #[test]
    fn test_list_sorted_with_counts() {
        let (_dir, promoter) = staged(&[
            ("b.jsonl", "{}\n\n{}\n"),
            ("a.jsonl", "{}\n"),
            ("notes.txt", "ignored"),
        ]);
        std::fs::write(promoter.staging_dir().join("bad.jsonl"), [0xff, 0xfe, b'\n']).unwrap();

        let files = promoter.list().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl", "bad.jsonl"]);
        assert_eq!(files[0].records, LineCount::Records(1));
        assert_eq!(files[1].records, LineCount::Records(2));
        assert_eq!(files[2].records, LineCount::Unreadable);
    }

    #[test]
    fn test_list_missing_staging() {
        let dir = tempfile::tempdir().unwrap();
        let promoter = DatasetPromoter::new(dir.path().join("nope"), dir.path().join("final"));
        assert!(matches!(promoter.list(), Err(KgPipeError::Validation { .. })));
    }

    #[test]
    fn test_promote_all_into_empty_destination() {
        let (_dir, promoter) = staged(&[("ds1.jsonl", "{\"q\":1}\n"), ("ds2.jsonl", "{\"q\":2}\n")]);
        let files = promoter.list().unwrap();

        let outcome = promoter
            .promote(&files, &Selection::All, OverwritePolicy::Ask, |_| {
                panic!("nothing to confirm")
            })
            .unwrap();

        let PromotionOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(report.summary(), "2 promoted, 0 skipped");
        for name in ["ds1.jsonl", "ds2.jsonl"] {
            assert_eq!(
                std::fs::read(promoter.final_dir().join(name)).unwrap(),
                std::fs::read(promoter.staging_dir().join(name)).unwrap()
            );
        }
    }

    #[test]
    fn test_declined_overwrite_is_skipped() {
        let (_dir, promoter) = staged(&[("ds1.jsonl", "new\n"), ("ds2.jsonl", "two\n")]);
        std::fs::create_dir_all(promoter.final_dir()).unwrap();
        std::fs::write(promoter.final_dir().join("ds1.jsonl"), "old\n").unwrap();
        let files = promoter.list().unwrap();

        let outcome = promoter
            .promote(&files, &Selection::All, OverwritePolicy::Ask, |_| Some(false))
            .unwrap();

        assert_eq!(
            outcome,
            PromotionOutcome::Completed(PromotionReport {
                promoted: vec!["ds2.jsonl".into()],
                skipped: vec!["ds1.jsonl".into()],
            })
        );
        assert_eq!(
            std::fs::read_to_string(promoter.final_dir().join("ds1.jsonl")).unwrap(),
            "old\n"
        );
    }

    #[test]
    fn test_overwrite_policies() {
        let (_dir, promoter) = staged(&[("ds1.jsonl", "new\n")]);
        std::fs::create_dir_all(promoter.final_dir()).unwrap();
        let target = promoter.final_dir().join("ds1.jsonl");
        std::fs::write(&target, "old\n").unwrap();
        let files = promoter.list().unwrap();

        promoter
            .promote(&files, &Selection::Index(0), OverwritePolicy::Never, |_| None)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old\n");

        promoter
            .promote(&files, &Selection::Name("ds1.jsonl".into()), OverwritePolicy::Always, |_| None)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new\n");
    }

    #[test]
    fn test_cancel_writes_nothing() {
        let (_dir, promoter) = staged(&[("ds1.jsonl", "a\n"), ("ds2.jsonl", "b\n")]);
        std::fs::create_dir_all(promoter.final_dir()).unwrap();
        std::fs::write(promoter.final_dir().join("ds2.jsonl"), "old\n").unwrap();
        let files = promoter.list().unwrap();

        let outcome = promoter
            .promote(&files, &Selection::All, OverwritePolicy::Ask, |_| None)
            .unwrap();

        assert_eq!(outcome, PromotionOutcome::Cancelled);
        assert!(!promoter.final_dir().join("ds1.jsonl").exists());
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let (_dir, promoter) = staged(&[("ds1.jsonl", "a\n")]);
        let files = promoter.list().unwrap();
        let err = promoter
            .promote(&files, &Selection::Name("ds9.jsonl".into()), OverwritePolicy::Never, |_| None)
            .unwrap_err();
        assert!(matches!(err, KgPipeError::Validation { .. }));
        assert!(!promoter.final_dir().exists());
    }

    #[test]
    fn test_modified_time_is_preserved() {
        let (_dir, promoter) = staged(&[("ds1.jsonl", "a\n")]);
        let source = promoter.staging_dir().join("ds1.jsonl");
        let past = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_times(FileTimes::new().set_modified(past))
            .unwrap();

        let files = promoter.list().unwrap();
        promoter
            .promote(&files, &Selection::All, OverwritePolicy::Never, |_| None)
            .unwrap();

        let copied = std::fs::metadata(promoter.final_dir().join("ds1.jsonl"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(copied, std::fs::metadata(&source).unwrap().modified().unwrap());
        assert!(!promoter.final_dir().join(".ds1.jsonl.tmp").exists());
    }
}

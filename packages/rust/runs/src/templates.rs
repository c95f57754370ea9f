//! Template assets copied into every new run.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// `(source under the template root, destination under the run dir)`.
pub const TEMPLATE_ASSETS: &[(&str, &str)] = &[("graphrag_data/prompts", "graphrag_data/prompts")];

/// What happened to one template asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOutcome {
    /// A single file was copied.
    File,
    /// A directory tree replaced the destination; `files` were copied.
    Directory { files: usize },
    /// The source does not exist.
    Missing,
    /// Copying failed part-way.
    Failed(String),
}

/// Result of copying one asset.
#[derive(Debug, Clone)]
pub struct TemplateCopy {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub outcome: TemplateOutcome,
}

/// Copy every entry of `assets` from `template_root` into `run_dir`.
///
/// Never fails: each asset reports its own outcome and the caller decides how
/// loudly to log it.
pub fn copy_templates(
    template_root: &Path,
    run_dir: &Path,
    assets: &[(&str, &str)],
) -> Vec<TemplateCopy> {
    assets
        .iter()
        .map(|(src, dst)| {
            let source = template_root.join(src);
            let destination = run_dir.join(dst);
            let outcome = copy_one(&source, &destination);
            TemplateCopy {
                source,
                destination,
                outcome,
            }
        })
        .collect()
}

fn copy_one(source: &Path, destination: &Path) -> TemplateOutcome {
    if source.is_file() {
        return match std::fs::copy(source, destination) {
            Ok(_) => TemplateOutcome::File,
            Err(e) => TemplateOutcome::Failed(e.to_string()),
        };
    }

    if source.is_dir() {
        return match replace_tree(source, destination) {
            Ok(files) => TemplateOutcome::Directory { files },
            Err(e) => TemplateOutcome::Failed(e.to_string()),
        };
    }

    TemplateOutcome::Missing
}

/// Remove `destination` if present, then deep-copy `source` into it.
fn replace_tree(source: &Path, destination: &Path) -> std::io::Result<usize> {
    if destination.exists() {
        std::fs::remove_dir_all(destination)?;
    }

    let mut files = 0;
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }

    Ok(files)
}

//! Menu-driven promotion over any line reader and writer.

use std::io::{BufRead, Write};

use kgpipe_shared::{KgPipeError, Result};

use crate::{DatasetFile, DatasetPromoter, OverwritePolicy, PromotionOutcome, Selection};

impl DatasetPromoter {
    /// List staged files, ask which to promote, and ask before each overwrite.
    ///
    /// Problems the user can fix (no staging directory, no files, a bad
    /// answer) are printed and end the session with `Ok`. End of input at
    /// any prompt cancels without copying anything.
    pub fn run_interactive<R: BufRead, W: Write>(
        &self,
        mut input: R,
        mut output: W,
    ) -> Result<Option<PromotionOutcome>> {
        let files = match self.list() {
            Ok(files) => files,
            Err(KgPipeError::Validation { message }) => {
                say(&mut output, &format!("error: {message}"))?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if files.is_empty() {
            say(
                &mut output,
                &format!("no .jsonl files in {}", self.staging_dir().display()),
            )?;
            return Ok(None);
        }

        say(
            &mut output,
            &format!("found {} files in {}:", files.len(), self.staging_dir().display()),
        )?;
        for (i, file) in files.iter().enumerate() {
            say(&mut output, &format!("  {}. {} ({})", i + 1, file.name, file.records))?;
        }
        say(&mut output, "  0. all files")?;

        let Some(answer) = ask(&mut input, &mut output, "\nselect files to promote (0 or a file number): ")?
        else {
            say(&mut output, "\ncancelled")?;
            return Ok(Some(PromotionOutcome::Cancelled));
        };

        let selection = match Selection::parse(&answer, files.len()) {
            Ok(selection) => selection,
            Err(e) => {
                say(&mut output, &format!("error: {e}"))?;
                return Ok(None);
            }
        };

        let final_dir = self.final_dir().display().to_string();
        let outcome = self.promote(&files, &selection, OverwritePolicy::Ask, |file: &DatasetFile| {
            let prompt = format!("{} already exists in {final_dir}, overwrite? (y/N): ", file.name);
            // A broken terminal counts as cancelling.
            let answer = ask(&mut input, &mut output, &prompt).ok()??;
            Some(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
        })?;

        match &outcome {
            PromotionOutcome::Cancelled => say(&mut output, "\ncancelled")?,
            PromotionOutcome::Completed(report) => {
                for name in &report.skipped {
                    say(&mut output, &format!("  skipped: {name}"))?;
                }
                for name in &report.promoted {
                    say(&mut output, &format!("  promoted: {name} -> {final_dir}"))?;
                }
                say(&mut output, &format!("\n{}", report.summary()))?;
                if !report.promoted.is_empty() {
                    let absolute = std::path::absolute(self.final_dir())
                        .unwrap_or_else(|_| self.final_dir().to_path_buf());
                    say(&mut output, &format!("final datasets: {}", absolute.display()))?;
                }
            }
        }

        Ok(Some(outcome))
    }
}

fn say<W: Write>(output: &mut W, line: &str) -> Result<()> {
    writeln!(output, "{line}").map_err(|e| KgPipeError::io("<output>", e))
}

/// Print `prompt` and read one line. `None` at end of input.
fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Result<Option<String>> {
    write!(output, "{prompt}")
        .and_then(|()| output.flush())
        .map_err(|e| KgPipeError::io("<output>", e))?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|e| KgPipeError::io("<input>", e))?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn setup(existing: &[&str]) -> (tempfile::TempDir, DatasetPromoter) {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("generated_datasets");
        let final_dir = dir.path().join("final_datasets");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("ds1.jsonl"), "{\"id\":1}\n{\"id\":2}\n").unwrap();
        std::fs::write(staging.join("ds2.jsonl"), "{\"id\":3}\n").unwrap();
        if !existing.is_empty() {
            std::fs::create_dir_all(&final_dir).unwrap();
            for name in existing {
                std::fs::write(final_dir.join(name), "previous\n").unwrap();
            }
        }
        (dir, DatasetPromoter::new(staging, final_dir))
    }

    fn run(promoter: &DatasetPromoter, input: &str) -> (Option<PromotionOutcome>, String) {
        let mut out = Vec::new();
        let outcome = promoter
            .run_interactive(Cursor::new(input.as_bytes()), &mut out)
            .unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn promotes_all_files() {
        let (_dir, promoter) = setup(&[]);
        let (outcome, out) = run(&promoter, "0\n");

        assert!(out.contains("1. ds1.jsonl (2 records)"));
        assert!(out.contains("2. ds2.jsonl (1 records)"));
        assert!(out.contains("2 promoted, 0 skipped"));
        assert!(matches!(outcome, Some(PromotionOutcome::Completed(_))));
        for name in ["ds1.jsonl", "ds2.jsonl"] {
            assert_eq!(
                std::fs::read(promoter.final_dir().join(name)).unwrap(),
                std::fs::read(promoter.staging_dir().join(name)).unwrap()
            );
        }
    }

    #[test]
    fn declined_overwrite_keeps_existing() {
        let (_dir, promoter) = setup(&["ds1.jsonl"]);
        let (_, out) = run(&promoter, "0\nno\n");

        assert!(out.contains("ds1.jsonl already exists"));
        assert!(out.contains("skipped: ds1.jsonl"));
        assert!(out.contains("1 promoted, 1 skipped"));
        assert_eq!(
            std::fs::read_to_string(promoter.final_dir().join("ds1.jsonl")).unwrap(),
            "previous\n"
        );
        assert!(promoter.final_dir().join("ds2.jsonl").exists());
    }

    #[test]
    fn empty_answer_means_no() {
        let (_dir, promoter) = setup(&["ds2.jsonl"]);
        let (_, out) = run(&promoter, "2\n\n");
        assert!(out.contains("0 promoted, 1 skipped"));
    }

    #[test]
    fn yes_overwrites() {
        let (_dir, promoter) = setup(&["ds2.jsonl"]);
        let (_, out) = run(&promoter, "2\nY\n");
        assert!(out.contains("1 promoted, 0 skipped"));
        assert_eq!(
            std::fs::read_to_string(promoter.final_dir().join("ds2.jsonl")).unwrap(),
            "{\"id\":3}\n"
        );
    }

    #[test]
    fn invalid_answers_abort_cleanly() {
        let (_dir, promoter) = setup(&[]);

        let (outcome, out) = run(&promoter, "abc\n");
        assert!(outcome.is_none());
        assert!(out.contains("error: 'abc' is not a number"));

        let (outcome, out) = run(&promoter, "7\n");
        assert!(outcome.is_none());
        assert!(out.contains("error: no file number 7"));
        assert!(!promoter.final_dir().exists());
    }

    #[test]
    fn end_of_input_cancels() {
        let (_dir, promoter) = setup(&[]);
        let (outcome, out) = run(&promoter, "");
        assert_eq!(outcome, Some(PromotionOutcome::Cancelled));
        assert!(out.contains("cancelled"));
        assert!(!promoter.final_dir().exists());

        let (_dir, promoter) = setup(&["ds1.jsonl"]);
        let (outcome, _) = run(&promoter, "0\n");
        assert_eq!(outcome, Some(PromotionOutcome::Cancelled));
        assert!(!promoter.final_dir().join("ds2.jsonl").exists());
    }

    #[test]
    fn missing_staging_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let promoter = DatasetPromoter::new(dir.path().join("absent"), dir.path().join("final"));
        let (outcome, out) = run(&promoter, "0\n");
        assert!(outcome.is_none());
        assert!(out.contains("error: staging directory"));
    }
}

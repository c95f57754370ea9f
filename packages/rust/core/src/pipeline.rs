//! End-to-end `collect` pipeline: queries → search → clean → GraphRAG input files.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use kgpipe_runs::RunManager;
use kgpipe_search::{ResultSource, SearchEngine, SearchOptions};
use kgpipe_shared::{KgPipeError, Result, Settings};
use kgpipe_text::{TextLimits, TextProcessor, clean_text, extract_keywords};

use crate::trace::{generate_trace_id, item_trace_id};

/// File name of the collection summary in the run's output directory.
pub const COLLECTION_FILE: &str = "collection.json";

/// Keywords kept per document.
const DOCUMENT_KEYWORDS: usize = 10;

/// Keywords kept for the whole collection.
const COLLECTION_KEYWORDS: usize = 20;

/// Longest query slug used in file names.
const MAX_SLUG_LEN: usize = 40;

/// Configuration for the `collect` pipeline.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub queries: Vec<String>,
    pub search: SearchOptions,
    pub text: TextLimits,
    /// Fetch the result page when the search snippet is too short.
    pub fetch_pages: bool,
}

impl CollectConfig {
    pub fn from_settings(queries: Vec<String>, settings: &Settings) -> Result<Self> {
        Ok(Self {
            queries,
            search: SearchOptions::from_settings(settings)?,
            text: TextLimits::from_settings(settings),
            fetch_pages: false,
        })
    }
}

/// One text file written to the GraphRAG input directory.
#[derive(Debug, Clone, Serialize)]
pub struct CollectedDocument {
    pub query: String,
    pub trace_id: String,
    /// File name inside the GraphRAG input directory.
    pub file: String,
    pub source_url: String,
    pub source: ResultSource,
    pub chars: usize,
    pub keywords: Vec<String>,
}

/// Result of the `collect` pipeline, also saved as `collection.json`.
#[derive(Debug, Clone, Serialize)]
pub struct CollectResult {
    pub trace_id: String,
    pub run_id: String,
    pub queries: Vec<String>,
    pub documents: Vec<CollectedDocument>,
    /// Results dropped for having too little text.
    pub discarded: usize,
    pub keywords: Vec<String>,
    pub elapsed_ms: u64,
    /// Where the summary was saved.
    #[serde(skip)]
    pub result_file: Option<PathBuf>,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each query with the number of documents kept for it.
    fn query_done(&self, query: &str, current: usize, total: usize, kept: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &CollectResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn query_done(&self, _query: &str, _current: usize, _total: usize, _kept: usize) {}
    fn done(&self, _result: &CollectResult) {}
}

/// Run the `collect` pipeline inside the active run of `run`.
///
/// 1. Search every query
/// 2. Clean result text, optionally fetching short results' pages
/// 3. Write `<slug>_<n>.txt` files to the run's GraphRAG input, skipping
///    numbers already taken by earlier queries or collections
/// 4. Save `collection.json` to the run's output
#[instrument(skip_all, fields(queries = config.queries.len()))]
pub async fn collect(
    config: &CollectConfig,
    settings: &Settings,
    run: &RunManager,
    progress: &dyn ProgressReporter,
) -> Result<CollectResult> {
    let start = Instant::now();
    let paths = run.get_run_paths()?;
    let logger = run.logger().ok_or(KgPipeError::NoActiveRun)?;
    let run_id = run
        .current_run_id()
        .map(ToString::to_string)
        .ok_or(KgPipeError::NoActiveRun)?;

    let trace_id = generate_trace_id("collect", Local::now());
    info!(%trace_id, %run_id, "starting collect pipeline");
    logger.info(format!("[{trace_id}] collecting {} queries", config.queries.len()));

    progress.phase("Preparing search");
    let engine = SearchEngine::new(config.search.clone())?;
    let pages = if config.fetch_pages {
        Some(TextProcessor::new(config.text)?)
    } else {
        None
    };

    std::fs::create_dir_all(&paths.graphrag_input)
        .map_err(|e| KgPipeError::io(&paths.graphrag_input, e))?;

    let limits = &settings.limits;
    let total = config.queries.len();
    let mut documents = Vec::new();
    let mut discarded = 0;
    let mut corpus = String::new();

    for (i, query) in config.queries.iter().enumerate() {
        let item_trace = item_trace_id(&trace_id, i + 1);
        progress.phase(&format!("Searching: {query}"));
        logger.info(format!("[{item_trace}] searching '{query}'"));

        let results = engine.search(query, Some(limits.search_results_limit)).await;
        let slug = slugify_query(query);
        let mut kept = 0;
        let mut next_number = 1;

        for result in results {
            let mut text = clean_text(&result.content);

            if text.chars().count() < limits.min_text_length {
                if let Some(pages) = &pages {
                    if let Some(fetched) = pages.extract_and_clean_text(&result.url).await {
                        debug!(url = %result.url, "using fetched page text");
                        text = fetched;
                    }
                }
            }

            let chars = text.chars().count();
            if chars < limits.min_text_length {
                debug!(url = %result.url, chars, "discarding short result");
                discarded += 1;
                continue;
            }

            let text: String = text.chars().take(limits.max_text_length).collect();
            kept += 1;
            let file = write_new_text(&paths.graphrag_input, &slug, &mut next_number, &text)?;

            corpus.push_str(&text);
            corpus.push('\n');
            documents.push(CollectedDocument {
                query: query.clone(),
                trace_id: item_trace.clone(),
                keywords: extract_keywords(&text, DOCUMENT_KEYWORDS),
                chars: text.chars().count(),
                file,
                source_url: result.url,
                source: result.source,
            });
        }

        if kept == 0 {
            warn!(query, "no usable text for query");
            logger.warn(format!("[{item_trace}] no usable text for '{query}'"));
        } else {
            logger.info(format!("[{item_trace}] kept {kept} documents for '{query}'"));
        }
        progress.query_done(query, i + 1, total, kept);
    }

    progress.phase("Saving collection");
    let mut result = CollectResult {
        trace_id,
        run_id,
        queries: config.queries.clone(),
        documents,
        discarded,
        keywords: extract_keywords(&corpus, COLLECTION_KEYWORDS),
        elapsed_ms: start.elapsed().as_millis() as u64,
        result_file: None,
    };
    result.result_file = run.save_result(&result, COLLECTION_FILE)?;

    info!(
        documents = result.documents.len(),
        discarded = result.discarded,
        elapsed_ms = result.elapsed_ms,
        "collect pipeline complete"
    );
    logger.info(format!(
        "[{}] collected {} documents ({} discarded)",
        result.trace_id,
        result.documents.len(),
        result.discarded
    ));

    progress.done(&result);
    Ok(result)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// File-name-safe form of a query: lowercase alphanumerics joined by `_`.
pub fn slugify_query(query: &str) -> String {
    let slug = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let slug: String = slug.chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('_');

    if slug.is_empty() {
        "query".to_string()
    } else {
        slug.to_string()
    }
}

/// Write `text` to the first free `<slug>_<n>.txt` in `dir`, starting at
/// `*next`. Returns the file name.
fn write_new_text(dir: &Path, slug: &str, next: &mut usize, text: &str) -> Result<String> {
    loop {
        let name = format!("{slug}_{next}.txt");
        let path = dir.join(&name);
        *next += 1;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(text.as_bytes())
                    .map_err(|e| KgPipeError::io(&path, e))?;
                return Ok(name);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(KgPipeError::io(&path, e)),
        }
    }
}

//! Pipeline settings for kgpipe.
//!
//! Every value is resolved once, at construction, from environment variables
//! with documented defaults. Directory paths come either from the environment
//! or from an explicit [`RunPaths`] set handed over by the run manager.
//!
//! Malformed values are fatal: construction fails with
//! [`KgPipeError::Config`] naming the variable.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KgPipeError, Result};
use crate::types::RunPaths;

/// Environment variable holding the base directory for runs.
pub const RUNS_DIR_ENV: &str = "KGPIPE_RUNS_DIR";

/// Default base directory for runs.
const DEFAULT_RUNS_DIR: &str = "runs";

// ---------------------------------------------------------------------------
// Environment source
// ---------------------------------------------------------------------------

/// Where settings read their raw values from.
///
/// The process environment in production; a plain map in tests.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from `std::env`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

fn string_or(env: &dyn EnvSource, key: &str, default: &str) -> String {
    env.var(key).unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(env: &dyn EnvSource, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env.var(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            KgPipeError::config(format!("{key}={raw:?} is not a valid value: {e}"))
        }),
    }
}

// ---------------------------------------------------------------------------
// Settings sections
// ---------------------------------------------------------------------------

/// Endpoint + credentials + model for one language-model role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
}

/// External API credentials and models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub tavily_api_key: String,
    pub tavily_api_base: String,
    pub embedding_model: String,
    /// General-purpose model.
    pub openai: LlmEndpoint,
    /// QA-generation model (falls back to the general API key).
    pub qa: LlmEndpoint,
}

/// Numeric tunables for search, text, graph size and sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub search_results_limit: usize,
    pub max_text_length: usize,
    pub max_nodes: usize,
    pub max_relations_per_node: usize,
    pub iteration_limit: usize,
    pub sample_size: usize,
    /// Probability in `[0, 1]`.
    pub anonymize_probability: f64,
    pub min_text_length: usize,
    pub max_chunk_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            search_results_limit: 10,
            max_text_length: 2000,
            max_nodes: 30,
            max_relations_per_node: 10,
            iteration_limit: 15,
            sample_size: 8,
            anonymize_probability: 0.3,
            min_text_length: 100,
            max_chunk_size: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Resolved configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub api: ApiSettings,
    pub limits: Limits,
    pub paths: RunPaths,
}

impl Settings {
    /// Resolve settings from `env`.
    ///
    /// When `run_paths` is given the ten path fields come from it; otherwise
    /// they fall back to the `GRAPHRAG_*` variables and fixed relative defaults.
    pub fn resolve(env: &dyn EnvSource, run_paths: Option<&RunPaths>) -> Result<Self> {
        let openai_key = string_or(env, "OPENAI_API_KEY", "");

        let api = ApiSettings {
            tavily_api_key: string_or(env, "TAVILY_API_KEY", ""),
            tavily_api_base: string_or(env, "TAVILY_API_BASE", "https://api.tavily.com"),
            embedding_model: string_or(env, "EMBEDDING_MODEL", "text-embedding-3-small"),
            openai: LlmEndpoint {
                api_key: openai_key.clone(),
                api_base: string_or(env, "OPENAI_API_BASE", "https://api.openai.com/v1"),
                model: string_or(env, "OPENAI_MODEL", "gpt-3.5-turbo"),
            },
            qa: LlmEndpoint {
                api_key: string_or(env, "QA_API_KEY", &openai_key),
                api_base: string_or(env, "QA_API_BASE", "https://openrouter.ai/api/v1"),
                model: string_or(env, "QA_MODEL", "google/gemini-2.5-pro"),
            },
        };

        let limits = resolve_limits(env)?;
        debug!(
            tavily_configured = !api.tavily_api_key.is_empty(),
            search_results_limit = limits.search_results_limit,
            "settings resolved"
        );

        let paths = match run_paths {
            Some(paths) => paths.clone(),
            None => default_paths(env),
        };

        Ok(Self { api, limits, paths })
    }

    /// Resolve from the process environment with default paths.
    pub fn from_env() -> Result<Self> {
        Self::resolve(&ProcessEnv, None)
    }

    /// Resolve from the process environment with paths of a specific run.
    pub fn for_run(run_paths: &RunPaths) -> Result<Self> {
        Self::resolve(&ProcessEnv, Some(run_paths))
    }

    /// Point this snapshot at another run. Non-path settings are untouched.
    pub fn update_paths(&mut self, run_paths: &RunPaths) {
        self.paths = run_paths.clone();
    }

    /// Copy with API keys masked, safe for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.api.tavily_api_key = mask(&copy.api.tavily_api_key);
        copy.api.openai.api_key = mask(&copy.api.openai.api_key);
        copy.api.qa.api_key = mask(&copy.api.qa.api_key);
        copy
    }

    /// Tavily key, or `None` when unset.
    pub fn tavily_key(&self) -> Option<&str> {
        Some(self.api.tavily_api_key.as_str()).filter(|k| !k.is_empty())
    }
}

fn resolve_limits(env: &dyn EnvSource) -> Result<Limits> {
    let d = Limits::default();
    let limits = Limits {
        search_results_limit: parse_or(env, "SEARCH_RESULTS_LIMIT", d.search_results_limit)?,
        max_text_length: parse_or(env, "MAX_TEXT_LENGTH", d.max_text_length)?,
        max_nodes: parse_or(env, "MAX_NODES", d.max_nodes)?,
        max_relations_per_node: parse_or(env, "MAX_RELATIONS_PER_NODE", d.max_relations_per_node)?,
        iteration_limit: parse_or(env, "ITERATION_LIMIT", d.iteration_limit)?,
        sample_size: parse_or(env, "SAMPLE_SIZE", d.sample_size)?,
        anonymize_probability: parse_or(env, "ANONYMIZE_PROBABILITY", d.anonymize_probability)?,
        min_text_length: parse_or(env, "MIN_TEXT_LENGTH", d.min_text_length)?,
        max_chunk_size: parse_or(env, "MAX_CHUNK_SIZE", d.max_chunk_size)?,
    };

    if !(0.0..=1.0).contains(&limits.anonymize_probability) {
        return Err(KgPipeError::config(format!(
            "ANONYMIZE_PROBABILITY must be within [0, 1], got {}",
            limits.anonymize_probability
        )));
    }

    Ok(limits)
}

fn default_paths(env: &dyn EnvSource) -> RunPaths {
    RunPaths {
        run_dir: PathBuf::from("."),
        logs_dir: PathBuf::from("logs"),
        graphrag_root: string_or(env, "GRAPHRAG_ROOT_DIR", "graphrag_data").into(),
        graphrag_input: string_or(env, "GRAPHRAG_INPUT_DIR", "graphrag_data/input").into(),
        graphrag_output: string_or(env, "GRAPHRAG_OUTPUT_DIR", "graphrag_data/output").into(),
        graphrag_cache: string_or(env, "GRAPHRAG_CACHE_DIR", "graphrag_data/cache").into(),
        input_dir: PathBuf::from("input"),
        output_dir: PathBuf::from("output"),
        cache_dir: PathBuf::from("cache"),
        config_dir: PathBuf::from("config"),
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".into()
    }
}

/// Base directory for runs: `KGPIPE_RUNS_DIR` or `runs`, with `~` expanded.
pub fn runs_base_dir(env: &dyn EnvSource) -> Result<PathBuf> {
    let raw = string_or(env, RUNS_DIR_ENV, DEFAULT_RUNS_DIR);
    expand_home(&raw)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };
    let home = dirs::home_dir()
        .ok_or_else(|| KgPipeError::config("could not determine home directory"))?;
    Ok(home.join(rest.trim_start_matches(['/', '\\'])))
}

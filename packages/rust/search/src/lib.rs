//! Web search for corpus collection.
//!
//! Queries go to the Tavily API when a key is configured. Without a key, or
//! when the API fails, the engine falls back to deterministic mock results so
//! downstream stages always have text to work with.

mod mock;
mod tavily;

use std::collections::BTreeMap;
use std::time::Duration;

use kgpipe_shared::{KgPipeError, Result, Settings};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Public Tavily endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.tavily.com";

/// Default timeout in seconds for Tavily requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of results per query.
const DEFAULT_MAX_RESULTS: usize = 10;

/// Snippet length for Tavily results.
const SNIPPET_CHARS: usize = 200;

/// Contents gathered per query by [`SearchEngine::batch_search`].
pub const BATCH_CONTENTS_PER_QUERY: usize = 3;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("kgpipe/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Tavily,
    Mock,
}

/// One search hit, normalized across backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Full text; the raw page content when the backend provided it.
    pub content: String,
    pub raw_content: String,
    pub source: ResultSource,
    pub score: f64,
    /// Host part of `url`.
    pub display_link: String,
}

/// Raw page content returned by the extract endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub url: String,
    pub content: String,
    pub images: Vec<String>,
}

/// Configuration for a [`SearchEngine`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Tavily key; `None` means mock results only.
    pub api_key: Option<String>,
    /// API root; endpoint names are appended to it.
    pub api_base: String,
    pub max_results: usize,
    pub timeout_secs: u64,
    /// Pause before each query of a batch.
    pub request_delay: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_delay: Duration::from_secs(1),
        }
    }
}

impl SearchOptions {
    /// Options derived from resolved settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_base = &settings.api.tavily_api_base;
        Url::parse(api_base).map_err(|e| {
            KgPipeError::config(format!("TAVILY_API_BASE '{api_base}' is not a valid URL: {e}"))
        })?;

        Ok(Self {
            api_key: settings.tavily_key().map(str::to_string),
            api_base: api_base.clone(),
            max_results: settings.limits.search_results_limit,
            ..Self::default()
        })
    }
}

// ---------------------------------------------------------------------------
// SearchEngine
// ---------------------------------------------------------------------------

/// Tavily-backed search with mock fallback.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    client: Client,
    opts: SearchOptions,
}

impl SearchEngine {
    pub fn new(opts: SearchOptions) -> Result<Self> {
        if opts.api_key.is_none() {
            warn!("Tavily API key not configured, search will return mock results");
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| KgPipeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, opts })
    }

    pub fn options(&self) -> &SearchOptions {
        &self.opts
    }

    /// Search for `query`, returning at most `limit` (default: `max_results`) hits.
    ///
    /// Never fails: API errors are logged and replaced by mock results.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<SearchResult> {
        let limit = limit.unwrap_or(self.opts.max_results);

        let Some(api_key) = self.opts.api_key.as_deref() else {
            debug!("no API key, using mock results");
            return mock::mock_results(query, limit);
        };

        match self.search_tavily(api_key, query, limit).await {
            Ok(results) => {
                info!(count = results.len(), "Tavily search complete");
                results
            }
            Err(e) => {
                warn!(error = %e, "Tavily search failed, using mock results");
                mock::mock_results(query, limit)
            }
        }
    }

    async fn search_tavily(
        &self,
        api_key: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let body = tavily::SearchRequest {
            api_key,
            query,
            max_results: limit,
            include_answer: false,
            include_images: false,
            include_raw_content: true,
        };

        let response: tavily::SearchResponse = self.post_json("search", &body).await?;

        Ok(response
            .results
            .into_iter()
            .map(|hit| {
                let raw_content = hit.raw_content.unwrap_or_default();
                let content = if raw_content.is_empty() {
                    hit.content.unwrap_or_default()
                } else {
                    raw_content.clone()
                };
                let url = hit.url.unwrap_or_default();
                SearchResult {
                    title: hit.title.unwrap_or_default(),
                    snippet: truncate_with_ellipsis(&content, SNIPPET_CHARS),
                    display_link: host_of(&url),
                    url,
                    content,
                    raw_content,
                    source: ResultSource::Tavily,
                    score: hit.score.unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Fetch raw page content for `urls` through the extract endpoint.
    ///
    /// Empty without an API key or on any failure.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn extract_content(&self, urls: &[String]) -> Vec<ExtractedPage> {
        let Some(api_key) = self.opts.api_key.as_deref() else {
            warn!("Tavily API key not configured, cannot extract content");
            return Vec::new();
        };

        let body = tavily::ExtractRequest { api_key, urls };
        match self.post_json::<_, tavily::ExtractResponse>("extract", &body).await {
            Ok(response) => {
                let pages: Vec<ExtractedPage> = response
                    .results
                    .into_iter()
                    .map(|hit| ExtractedPage {
                        url: hit.url.unwrap_or_default(),
                        content: hit.raw_content.unwrap_or_default(),
                        images: hit.images.unwrap_or_default(),
                    })
                    .collect();
                info!(count = pages.len(), "content extraction complete");
                pages
            }
            Err(e) => {
                warn!(error = %e, "content extraction failed");
                Vec::new()
            }
        }
    }

    /// Non-empty, trimmed contents of the first `limit` results for `query`.
    pub async fn get_search_contents(&self, query: &str, limit: usize) -> Vec<String> {
        let contents: Vec<String> = self
            .search(query, Some(limit))
            .await
            .into_iter()
            .take(limit)
            .map(|r| r.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        info!(query, count = contents.len(), "collected search contents");
        contents
    }

    /// Contents for each query, pausing `request_delay` before every request.
    pub async fn batch_search(&self, queries: &[String]) -> BTreeMap<String, Vec<String>> {
        let mut results = BTreeMap::new();

        for query in queries {
            if !self.opts.request_delay.is_zero() {
                tokio::time::sleep(self.opts.request_delay).await;
            }
            let contents = self
                .get_search_contents(query, BATCH_CONTENTS_PER_QUERY)
                .await;
            results.insert(query.clone(), contents);
        }

        results
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{endpoint}", self.opts.api_base.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| KgPipeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KgPipeError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| KgPipeError::parse(format!("{url}: invalid response body: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// First `max_chars` characters of `text`, plus `...` if anything was cut.
pub(crate) fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

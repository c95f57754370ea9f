//! Tavily request and response bodies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct SearchRequest<'a> {
    pub api_key: &'a str,
    pub query: &'a str,
    pub max_results: usize,
    pub include_answer: bool,
    pub include_images: bool,
    pub include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

/// One search hit. Any field may be absent or `null`.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub raw_content: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExtractRequest<'a> {
    pub api_key: &'a str,
    pub urls: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExtractResponse {
    #[serde(default)]
    pub results: Vec<ExtractHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExtractHit {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub raw_content: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

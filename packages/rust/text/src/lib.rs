//! Text extraction and lightweight analysis for collected documents.
//!
//! Everything here is heuristic: regex word splitting and a fixed English
//! stop-word list, no NLP models.

mod cleanup;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use kgpipe_shared::{KgPipeError, Result, Settings};
use regex::Regex;
use reqwest::Client;
use scraper::Html;
use tracing::{debug, instrument, warn};

/// Default timeout in seconds for page fetches.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Browser-like User-Agent; many sites refuse obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Elements whose text is never part of the page content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "can", "this", "that", "these", "those", "i",
    "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your", "his",
    "its", "our", "their", "mine", "yours", "hers", "ours", "theirs",
];

static STOP_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z]{3,}\b").expect("valid regex"));

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

// ---------------------------------------------------------------------------
// TextLimits
// ---------------------------------------------------------------------------

/// Size limits applied to fetched page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLimits {
    /// Pages with less cleaned text than this are discarded.
    pub min_text_length: usize,
    /// Cleaned text is cut to this many characters.
    pub max_chunk_size: usize,
    pub timeout_secs: u64,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            min_text_length: 100,
            max_chunk_size: 1000,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl TextLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            min_text_length: settings.limits.min_text_length,
            max_chunk_size: settings.limits.max_chunk_size,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// TextProcessor
// ---------------------------------------------------------------------------

/// Fetches pages and cleans, splits, and summarizes their text.
#[derive(Debug, Clone)]
pub struct TextProcessor {
    client: Client,
    limits: TextLimits,
}

impl TextProcessor {
    pub fn new(limits: TextLimits) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(limits.timeout_secs))
            .build()
            .map_err(|e| KgPipeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, limits })
    }

    pub fn limits(&self) -> &TextLimits {
        &self.limits
    }

    /// Download `url` and return its cleaned visible text.
    ///
    /// `None` when the fetch fails or the page has too little text.
    #[instrument(skip(self))]
    pub async fn extract_and_clean_text(&self, url: &str) -> Option<String> {
        let html = match self.fetch(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "failed to extract text");
                return None;
            }
        };

        let cleaned = clean_text(&visible_text(&html));
        let length = cleaned.chars().count();
        if length < self.limits.min_text_length {
            debug!(length, min = self.limits.min_text_length, "page text too short");
            return None;
        }

        Some(truncate_chars(&cleaned, self.limits.max_chunk_size))
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KgPipeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KgPipeError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| KgPipeError::Network(format!("{url}: failed to read body: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Pure text functions
// ---------------------------------------------------------------------------

/// Normalize scraped text: drop tags, URLs, e-mail addresses, and symbols.
pub fn clean_text(text: &str) -> String {
    cleanup::run_pipeline(text)
}

/// Distinct non-stop-words of three or more ASCII letters, in first-seen order.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|word| !is_stop_word(word))
        .filter(|word| seen.insert(*word))
        .map(str::to_string)
        .collect()
}

/// Up to `max` sentences of more than five words.
pub fn extract_sentences(text: &str, max: usize) -> Vec<String> {
    SENTENCE_END_RE
        .split(text)
        .filter(|s| s.split_whitespace().count() > 5)
        .map(|s| s.trim().to_string())
        .take(max)
        .collect()
}

/// The `max` most frequent lower-cased non-stop-words.
///
/// Equal counts keep the order in which the words first appeared.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for word in WORD_RE.find_iter(&lowered).map(|m| m.as_str()) {
        if is_stop_word(word) {
            continue;
        }
        match positions.get(word) {
            Some(&i) => order[i].1 += 1,
            None => {
                positions.insert(word, order.len());
                order.push((word, 1));
            }
        }
    }

    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(max)
        .map(|(word, _)| word.to_string())
        .collect()
}

/// Leading whole sentences that fit in `max_length` characters.
///
/// Text without qualifying sentences is cut to `max_length` characters.
pub fn summarize(text: &str, max_length: usize) -> String {
    let sentences = extract_sentences(text, 10);
    if sentences.is_empty() {
        return truncate_chars(text, max_length);
    }

    let mut summary = String::new();
    for sentence in &sentences {
        if summary.chars().count() + sentence.chars().count() > max_length {
            break;
        }
        summary.push_str(sentence);
        summary.push_str(". ");
    }

    summary.trim_end().to_string()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_stop_word(word: &str) -> bool {
    STOP_SET.contains(word.to_ascii_lowercase().as_str())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Space-joined text nodes of `html`, skipping script and style content.
fn visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        let text = text.trim();
        if !hidden && !text.is_empty() {
            parts.push(text);
        }
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html>
<head><title>Proteins</title><style>body { color: red; }</style></head>
<body>
  <nav>Home</nav>
  <p>Proteins are large biomolecules made of amino acid chains.</p>
  <script>var tracking = "do not keep";</script>
  <p>Contact editor@example.org for details.</p>
</body>
</html>"#;

    fn processor(min: usize, max: usize) -> TextProcessor {
        TextProcessor::new(TextLimits {
            min_text_length: min,
            max_chunk_size: max,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_visible_text_skips_script_and_style() {
        let text = visible_text(PAGE);
        assert!(text.contains("Proteins are large biomolecules"));
        assert!(text.contains("Home"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_extract_entities_first_seen_unique() {
        let entities = extract_entities("Graph theory and graph data; Graph nodes link to the Graph.");
        assert_eq!(entities, vec!["Graph", "theory", "graph", "data", "nodes", "link"]);
    }

    #[test]
    fn test_extract_sentences_filters_short() {
        let text = "Too short. This sentence has more than five words in it! Tiny? \
                    Another long sentence appears right here for testing";
        let sentences = extract_sentences(text, 10);
        assert_eq!(
            sentences,
            vec![
                "This sentence has more than five words in it",
                "Another long sentence appears right here for testing",
            ]
        );
        assert_eq!(extract_sentences(text, 1).len(), 1);
    }

    #[test]
    fn test_extract_keywords_by_frequency() {
        let text = "Enzymes catalyze reactions. Reactions need enzymes. Enzymes are proteins. Cells";
        let keywords = extract_keywords(text, 3);
        assert_eq!(keywords, vec!["enzymes", "reactions", "catalyze"]);
    }

    #[test]
    fn test_summarize_whole_sentences() {
        let text = "The first sentence has exactly seven words. \
                    The second sentence also has seven words. \
                    The third sentence is here to overflow things.";
        let summary = summarize(text, 90);
        assert_eq!(
            summary,
            "The first sentence has exactly seven words. The second sentence also has seven words."
        );
    }

    #[test]
    fn test_summarize_without_sentences_truncates() {
        assert_eq!(summarize("short bits only", 5), "short");
    }

    #[tokio::test]
    async fn test_extract_and_clean_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let url = format!("{}/page", server.uri());

        let text = processor(20, 1000).extract_and_clean_text(&url).await.unwrap();
        assert!(text.starts_with("Proteins Home Proteins are large biomolecules"));
        assert!(!text.contains("editor@example.org"));
        assert!(!text.contains("tracking"));

        let cut = processor(20, 30).extract_and_clean_text(&url).await.unwrap();
        assert_eq!(cut.chars().count(), 30);

        assert!(processor(10_000, 20_000).extract_and_clean_text(&url).await.is_none());
    }

    #[tokio::test]
    async fn test_extract_and_clean_text_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing", server.uri());
        assert!(processor(1, 100).extract_and_clean_text(&url).await.is_none());
    }
}

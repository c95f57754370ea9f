//! Offline stand-in results used when Tavily is unavailable.

use crate::{ResultSource, SearchResult, truncate_with_ellipsis};

/// Snippet length for mock results.
const MOCK_SNIPPET_CHARS: usize = 150;

/// Results beyond the first few get this score floor.
const MIN_MOCK_SCORE: f64 = 0.1;

fn templates(query: &str) -> [String; 3] {
    [
        format!(
            "{query} is an important concept that plays a key role in modern science and \
             technology. Research shows that {query} has a wide range of applications, \
             including medicine, engineering and information technology. A closer look at \
             how {query} works helps explain its value across these fields."
        ),
        format!(
            "Recent studies on {query} show that the field is developing quickly. Experts \
             point out that {query} has great potential and may have a major impact on many \
             industries. Current applications of {query} include data processing, automated \
             control and intelligent analysis."
        ),
        format!(
            "The history of {query} goes back several decades. As technology has advanced, \
             {query} has become an essential part of modern engineering. The latest results \
             suggest that {query} offers clear advantages in efficiency, cost and safety."
        ),
    ]
}

/// Deterministic results for `query`, `limit` of them.
pub(crate) fn mock_results(query: &str, limit: usize) -> Vec<SearchResult> {
    let templates = templates(query);

    (0..limit)
        .map(|i| {
            let n = i + 1;
            let content = templates[i % templates.len()].clone();
            let (title, host, score) = if i < templates.len() {
                (
                    format!("{query} - reference {n}"),
                    format!("example-{n}.com"),
                    0.9 - i as f64 * 0.1,
                )
            } else {
                (
                    format!("{query} - related {n}"),
                    format!("source-{n}.com"),
                    (0.9 - i as f64 * 0.1).max(MIN_MOCK_SCORE),
                )
            };

            SearchResult {
                title,
                url: format!("https://{host}/{query}"),
                snippet: truncate_with_ellipsis(&content, MOCK_SNIPPET_CHARS),
                raw_content: String::new(),
                content,
                source: ResultSource::Mock,
                score,
                display_link: host,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_three_are_references() {
        let results = mock_results("graphene", 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "graphene - reference 1");
        assert_eq!(results[0].url, "https://example-1.com/graphene");
        assert_eq!(results[2].display_link, "example-3.com");
        assert!((results[1].score - 0.8).abs() < 1e-9);
        assert!(results.iter().all(|r| r.source == ResultSource::Mock));
    }

    #[test]
    fn extra_results_cycle_templates_with_score_floor() {
        let results = mock_results("q", 12);
        assert_eq!(results.len(), 12);
        assert_eq!(results[3].title, "q - related 4");
        assert_eq!(results[3].url, "https://source-4.com/q");
        assert_eq!(results[3].content, results[0].content);
        assert!((results[11].score - MIN_MOCK_SCORE).abs() < 1e-9);
    }

    #[test]
    fn snippets_are_truncated() {
        let result = &mock_results("q", 1)[0];
        assert!(result.snippet.ends_with("..."));
        assert_eq!(result.snippet.chars().count(), MOCK_SNIPPET_CHARS + 3);
    }

    #[test]
    fn zero_limit_is_empty() {
        assert!(mock_results("q", 0).is_empty());
    }
}

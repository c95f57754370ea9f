//! Regex passes that turn scraped page text into plain prose.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run every cleanup pass over `text`.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = collapse_whitespace(text);

    result = strip_html_tags(&result);
    result = strip_urls(&result);
    result = strip_emails(&result);
    result = strip_special_chars(&result);
    result = collapse_whitespace(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    WS_RE.replace_all(text, " ").into_owned()
}

/// Tag remnants that survived text extraction.
fn strip_html_tags(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

    TAG_RE.replace_all(text, "").into_owned()
}

fn strip_urls(text: &str) -> String {
    static URL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("valid regex"));

    URL_RE.replace_all(text, "").into_owned()
}

fn strip_emails(text: &str) -> String {
    static EMAIL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\S+@\S+").expect("valid regex"));

    EMAIL_RE.replace_all(text, "").into_owned()
}

/// Keep word characters (any script), whitespace, and basic punctuation.
fn strip_special_chars(text: &str) -> String {
    static SPECIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"[^\w\s.,!?;:()\[\]{}"'-]"#).expect("valid regex")
    });

    SPECIAL_RE.replace_all(text, " ").into_owned()
}

//! Markup stripping for free-text fields.
//!
//! Everything that reaches the store or another client passes through
//! [`strip_markup`]: no tags survive, only their text content.

use regex::Regex;
use std::sync::LazyLock;

// Elements whose inner text is dropped along with the tags.
static DANGEROUS_BLOCK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|object|embed|noscript|template)\b[^>]*>.*?</\s*(script|style|iframe|object|embed|noscript|template)\s*>")
        .expect("dangerous block pattern is valid")
});

static COMMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?(-->|$)").expect("comment pattern is valid"));

// A tag must open with a letter, `/`, `!` or `?` so that `a < b` survives.
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)</?[A-Za-z!?][^<>]*>").expect("tag pattern is valid")
});

/// Remove all markup from `input`, keeping the text between tags.
pub fn strip_markup(input: &str) -> String {
    if !input.contains('<') {
        return input.to_string();
    }
    let without_blocks = DANGEROUS_BLOCK_REGEX.replace_all(input, "");
    let without_comments = COMMENT_REGEX.replace_all(&without_blocks, "");
    TAG_REGEX.replace_all(&without_comments, "").into_owned()
}

/// Trim, then strip. Used for every field that is persisted or relayed.
pub fn clean_text(input: &str) -> String {
    strip_markup(input.trim()).trim().to_string()
}

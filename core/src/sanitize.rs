//! Input cleanup for form-submitted values.
//!
//! The description arrives as HTML from the rich-text editor and keeps its
//! markup (minus anything executable); every other field is reduced to plain
//! text.

use std::sync::LazyLock;

use regex::Regex;
use regex::RegexBuilder;

#[expect(clippy::unwrap_used)]
static TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]*>").unwrap()
});

#[expect(clippy::unwrap_used)]
static SCRIPT_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"<script\b[^>]*>.*?</script\s*>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap()
});

#[expect(clippy::unwrap_used)]
static EVENT_HANDLERS: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r#"\son\w+\s*=\s*("[^"]*"|'[^']*')"#)
        .case_insensitive(true)
        .build()
        .unwrap()
});

#[expect(clippy::unwrap_used)]
static JAVASCRIPT_URLS: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"javascript:")
        .case_insensitive(true)
        .build()
        .unwrap()
});

#[expect(clippy::unwrap_used)]
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").unwrap()
});

/// Used when the description yields no usable subject at all.
pub const FALLBACK_SUBJECT: &str = "Solicitud de soporte";

const SUBJECT_WORDS: usize = 8;

/// Reduce a plain-text field to text: drop tags, drop stray angle brackets,
/// trim.
pub fn sanitize_text(input: &str) -> String {
    let without_tags = TAGS.replace_all(input, "");
    without_tags.replace(['<', '>'], "").trim().to_string()
}

/// Clean editor HTML without flattening it: remove script elements, inline
/// event handlers and `javascript:` URLs, keep the rest of the markup.
pub fn sanitize_html(input: &str) -> String {
    let no_scripts = SCRIPT_BLOCKS.replace_all(input, "");
    let no_handlers = EVENT_HANDLERS.replace_all(&no_scripts, "");
    JAVASCRIPT_URLS.replace_all(&no_handlers, "").trim().to_string()
}

/// Markup stripped and whitespace collapsed, for single-line previews.
pub fn strip_tags(input: &str) -> String {
    let without_tags = TAGS.replace_all(input, " ");
    WHITESPACE.replace_all(&without_tags, " ").trim().to_string()
}

/// Derive a subject from the description when the form left it empty: the
/// first few words of the stripped text, with an ellipsis when truncated.
pub fn default_subject(description: &str) -> String {
    let text = strip_tags(description);
    let words: Vec<&str> = text.split_whitespace().take(SUBJECT_WORDS).collect();
    if words.is_empty() {
        return FALLBACK_SUBJECT.to_string();
    }
    let subject = words.join(" ");
    if subject.len() < text.len() {
        format!("{subject}...")
    } else {
        subject
    }
}

/// Truncate to at most `max` characters, appending an ellipsis when content
/// was dropped.
pub fn truncate(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let cut: String = input.chars().take(max).collect();
    format!("{cut}...")
}

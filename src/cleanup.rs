//! Deterministic cleanup of model-produced page text.
//!
//! OCR models occasionally wrap whole answers in code fences, emit CRLF
//! line endings, or pad output with runs of blank lines. These are cheap,
//! pure string fixes that belong here rather than in the prompt; each rule
//! is a `&str → String` function with no shared state and they run in a
//! fixed order (fences before blank-line collapsing, trim last).

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page's display text.
pub fn clean_page_text(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").expect("fence regex"));

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

//! Post-processing: deterministic clean-up of raw model answers before they
//! are parsed.
//!
//! Models wrap JSON in ` ```json ` fences, prepend a byte-order mark, or pad a
//! one-word answer with whitespace. These rules remove that packaging and
//! nothing else; deciding what the answer *means* is left to the parsers in
//! [`super::classify`] and [`super::extract`].

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```$").unwrap());
static RE_EMBEDDED_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n(.*?)\n?```").unwrap());

const INVISIBLE: [char; 6] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'];

/// Strip zero-width characters, BOMs and soft hyphens.
pub fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

/// Prepare a classifier answer for strict matching: drop invisible
/// characters, trim, lower-case.
///
/// Punctuation is kept on purpose, so `"yes."` stays non-conforming.
pub fn normalise_answer(raw: &str) -> String {
    remove_invisible_chars(raw).trim().to_lowercase()
}

/// Extract the JSON payload from an extractor answer.
///
/// Removes an outer code fence (with or without a language tag) and
/// surrounding whitespace. When prose surrounds a fenced block, the first
/// block is taken. Text without any fence is returned unchanged.
pub fn json_payload(raw: &str) -> String {
    let cleaned = remove_invisible_chars(raw).replace("\r\n", "\n");
    let trimmed = cleaned.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        return caps[1].trim().to_string();
    }
    match RE_EMBEDDED_FENCE.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

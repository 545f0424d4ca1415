//! Normalisation: turn free-form model output into clean plain text.
//!
//! ## Why is normalisation necessary?
//!
//! Vision models prompted for "raw text only" still answer in a handful of
//! shapes:
//!
//! - a JSON object such as `{"text": "..."}` or `{"natural_text": "..."}`
//! - a JSON array of lines
//! - plain text wrapped in stray quotes or braces, with literal `\n`
//!   escapes left in
//!
//! ## Stage Order
//!
//! Stages run as an ordered chain. Each one either decides the final text or
//! passes (`None`) to the next. The last stage always decides.
//!
//! 1. [`from_json`] — structured output; decides only when it finds text
//! 2. [`clean_plain_text`] — unwrap, un-escape, drop blank lines, and revert
//!    to the trimmed raw text when cleaning leaves under 10 characters
//!
//! The chain is re-applied to its own output until nothing changes, so
//! doubly wrapped answers (`""text""`, or a JSON `text` value that is itself
//! quoted) come out fully unwrapped and `extract_text` is idempotent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Keys checked, in order, when the model answers with a JSON object.
pub const TEXT_KEYS: [&str; 5] = ["text", "content", "ocr_text", "extracted_text", "natural_text"];

/// Cleaned output shorter than this (in characters) is considered destroyed
/// by cleaning, and the trimmed raw text is returned instead.
pub const MIN_CLEANED_CHARS: usize = 10;

type Stage = fn(&str) -> Option<String>;

const STAGES: [Stage; 2] = [from_json, clean_plain_text];

/// Upper bound on chain passes. Real outputs settle in two or three.
const MAX_PASSES: usize = 16;

/// Normalise raw model output.
pub fn extract_text(raw: &str) -> String {
    let mut text = run_chain(raw);
    for _ in 1..MAX_PASSES {
        let next = run_chain(&text);
        if next == text {
            break;
        }
        text = next;
    }
    text
}

fn run_chain(raw: &str) -> String {
    let trimmed = raw.trim();
    STAGES
        .iter()
        .find_map(|stage| stage(trimmed))
        .unwrap_or_else(|| trimmed.to_string())
}

// ── Stage 1: JSON-shaped output ──────────────────────────────────────────────

/// Pull text out of a JSON object or array.
///
/// Objects: the first key in [`TEXT_KEYS`] holding a non-empty string wins;
/// otherwise every non-empty string field is joined in key order. An object
/// with no string content passes. Arrays: every element's string form is
/// joined with newlines. Unparseable JSON passes.
pub fn from_json(trimmed: &str) -> Option<String> {
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed).ok()? {
        Value::Object(map) => {
            let keyed = TEXT_KEYS.iter().find_map(|key| match map.get(*key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            });
            if keyed.is_some() {
                return keyed;
            }

            let parts: Vec<&str> = map
                .values()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(value_as_text)
                .filter(|s| !s.is_empty())
                .collect();
            Some(parts.join("\n"))
        }
        _ => None,
    }
}

fn value_as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

// ── Stage 2: plain-text cleanup ──────────────────────────────────────────────

// One wrapping quote, brace or bracket at either end of the string.
static RE_WRAPPING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*[\{\["']|[\}\]"']\s*$"#).unwrap());

/// Unwrap, un-escape and drop blank lines.
///
/// Always decides. When the cleaned text has fewer than
/// [`MIN_CLEANED_CHARS`] characters the trimmed input is returned unchanged.
pub fn clean_plain_text(trimmed: &str) -> Option<String> {
    let unwrapped = strip_wrapping(trimmed);
    let unescaped = unescape(&unwrapped);
    let cleaned = drop_blank_lines(&unescaped);

    if cleaned.chars().count() < MIN_CLEANED_CHARS {
        Some(trimmed.to_string())
    } else {
        Some(cleaned)
    }
}

fn strip_wrapping(s: &str) -> String {
    RE_WRAPPING.replace_all(s, "").into_owned()
}

fn unescape(s: &str) -> String {
    s.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
}

fn drop_blank_lines(s: &str) -> String {
    s.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────

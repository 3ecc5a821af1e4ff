//! Error signature normalization
//!
//! Turns raw error text into a stable fingerprint: volatile tokens (paths,
//! line numbers, quoted literals, numeric ids, ...) are replaced with fixed
//! placeholders so that two occurrences of the same logical error produce
//! the same signature even when the details differ.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Replacement rules, applied in order. Timestamps run before line numbers
/// so `14:30:05` is not partially consumed as a line reference.
fn rules() -> &'static Vec<(Regex, &'static str)> {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            // ISO timestamps like 2026-01-25T14:30:00
            (
                r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
                "<time>",
            ),
            // Quoted literals (single or double, single line)
            (r#""[^"\n]*"|'[^'\n]*'"#, "<str>"),
            // UUIDs
            (
                r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
                "<uuid>",
            ),
            // Hex addresses like 0x7fff1234
            (r"0x[0-9a-fA-F]+", "<hex>"),
            // File paths (Unix and Windows)
            (r"(?:[A-Za-z]:)?[\\/][\w.\-\\/]+", "<path>"),
            // Line numbers like :123, line 42
            (r"(?i)(?::|\bline\s+)\d+", ":<line>"),
            // Remaining standalone integers (ids, ports, counts)
            (r"\b\d+\b", "<num>"),
            // Collapse whitespace last
            (r"\s+", " "),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// Normalize raw error text into a stable signature.
///
/// Deterministic: identical input always yields an identical signature.
/// Input is truncated to `max_input` chars before normalization to bound
/// storage cost. Empty or whitespace-only input is a validation error.
pub fn normalize(raw_text: &str, max_input: usize) -> Result<String> {
    if raw_text.trim().is_empty() {
        return Err(Error::validation("error text is empty"));
    }

    let mut sig = truncate_chars(raw_text, max_input).to_string();
    for (re, replacement) in rules() {
        sig = re.replace_all(&sig, *replacement).into_owned();
    }

    Ok(sig.trim().to_lowercase())
}

/// Truncate on a char boundary without allocating when short enough.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 2_000;

    #[test]
    fn identical_input_yields_identical_signature() {
        let raw = "TypeError: cannot read property 'x' of undefined at /home/u/app/foo.py:42";
        let a = normalize(raw, MAX).unwrap();
        let b = normalize(raw, MAX).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn volatile_tokens_collapse() {
        let first = normalize(
            "TypeError: cannot read property 'x' of undefined at /home/u/app/foo.py:42",
            MAX,
        )
        .unwrap();
        let second = normalize(
            "TypeError: cannot read property 'x' of undefined at /srv/other/bar.py:7",
            MAX,
        )
        .unwrap();
        assert_eq!(first, second);
        assert!(first.contains("<path>"));
        assert!(first.contains(":<line>"));
        assert!(first.contains("<str>"));
    }

    #[test]
    fn timestamps_scrub_before_line_numbers() {
        let sig = normalize("job failed at 2026-01-25T14:30:00 with code 3", MAX).unwrap();
        assert!(sig.contains("<time>"));
        assert!(!sig.contains("14"));
    }

    #[test]
    fn hex_and_uuid_placeholders() {
        let sig = normalize(
            "segfault at 0x7fff1234 in worker 550e8400-e29b-41d4-a716-446655440000",
            MAX,
        )
        .unwrap();
        assert!(sig.contains("<hex>"));
        assert!(sig.contains("<uuid>"));
    }

    #[test]
    fn different_messages_stay_distinct() {
        let a = normalize("ValueError: bad input", MAX).unwrap();
        let b = normalize("KeyError: bad input", MAX).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn lowercases_and_collapses_whitespace() {
        let sig = normalize("Connection   Refused\n\tBY peer", MAX).unwrap();
        assert_eq!(sig, "connection refused by peer");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(normalize("", MAX), Err(Error::Validation(_))));
        assert!(matches!(normalize("  \n ", MAX), Err(Error::Validation(_))));
    }

    #[test]
    fn overlong_input_is_truncated() {
        let raw = "x".repeat(10_000);
        let sig = normalize(&raw, MAX).unwrap();
        assert!(sig.len() <= MAX);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let raw = "é".repeat(3_000);
        // Must not panic on a multi-byte boundary
        let sig = normalize(&raw, MAX).unwrap();
        assert_eq!(sig.chars().count(), MAX);
    }
}

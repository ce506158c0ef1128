// Temporal Marker Classifier
// Decides whether a flagged span is a bare heading and whether it carries a
// concrete date, statistic or time reference.

use regex::Regex;
use std::sync::LazyLock;

const HEADING_STRICT_MAX_WORDS: usize = 6;
const HEADING_LOOSE_MAX_WORDS: usize = 8;

static CAPITALIZED_WORDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][A-Za-z0-9'&/-]*(?:\s+[A-Z][A-Za-z0-9'&/-]*)*$").expect("valid regex")
});

static MARKDOWN_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+\S").expect("valid regex"));

// Title case where short connectives may stay lowercase: "Types of Mortgages".
static TITLE_CASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Z][A-Za-z0-9'&/-]*(?:\s+(?:[A-Z][A-Za-z0-9'&/-]*|a|an|the|of|and|or|for|in|on|to|with|by|at|vs\.?))*$",
    )
    .expect("valid regex")
});

// Four-digit years count only within 1900-2099, in every pattern below.
// "since 1850" and "The 1850 census" are equally not temporal markers.
const YEAR: &str = r"(?:19|20)\d{2}";

struct TemporalPattern {
    label: &'static str,
    regex: Regex,
}

static TEMPORAL_PATTERNS: LazyLock<Vec<TemporalPattern>> = LazyLock::new(|| {
    [
        ("year", r"\bYEAR\b"),
        // November 21, 2024 / Nov 21 2024 / Nov. 21st, 2024
        (
            "month_day_year",
            r"(?i)\b(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+YEAR\b",
        ),
        // 12/15/2023, 1-5-24
        ("numeric_date", r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b"),
        ("percentage", r"\d+(?:\.\d+)?\s?%"),
        ("relative_ago", r"(?i)\b\d+\s+(?:days?|weeks?|months?|years?)\s+ago\b"),
        ("quarter", r"(?i)\bq[1-4]\s+YEAR\b"),
        (
            "preposition_year",
            r"(?i)\b(?:as\s+of|since|in|during|from|until|through|by|before|after)\s+YEAR\b",
        ),
        ("season_year", r"(?i)\b(?:early|mid|late|spring|summer|fall|autumn|winter)[\s-]+YEAR\b"),
    ]
    .iter()
    .map(|&(label, template)| TemporalPattern {
        label,
        regex: Regex::new(&template.replace("YEAR", YEAR)).expect("valid regex"),
    })
    .collect()
});

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_all_uppercase(text: &str) -> bool {
    let mut has_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            has_letter = true;
            if c.is_lowercase() {
                return false;
            }
        }
    }
    has_letter
}

fn has_sentence_punctuation(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c, '.' | '!' | '?' | ',' | ';' | ':'))
}

/// True when `text` reads like a section title rather than substantive content.
///
/// Heuristic only: anything longer than eight words is never a heading.
pub fn is_heading_only(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let words = word_count(trimmed);

    if words <= HEADING_STRICT_MAX_WORDS
        && (CAPITALIZED_WORDS_RE.is_match(trimmed)
            || MARKDOWN_HEADING_RE.is_match(trimmed)
            || is_all_uppercase(trimmed)
            || TITLE_CASE_RE.is_match(trimmed))
    {
        return true;
    }

    words <= HEADING_LOOSE_MAX_WORDS && !has_sentence_punctuation(trimmed)
}

/// True if `text` contains at least one date, statistic or relative time phrase.
pub fn contains_temporal_marker(text: &str) -> bool {
    TEMPORAL_PATTERNS.iter().any(|p| p.regex.is_match(text))
}

/// Labels of every temporal pattern found in `text`, in table order.
pub fn temporal_markers(text: &str) -> Vec<&'static str> {
    TEMPORAL_PATTERNS
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| p.label)
        .collect()
}

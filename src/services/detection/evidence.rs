// Evidence & Confidence Scorer
// Checks that model reasoning shows its work and turns free-form reasoning
// into a numeric confidence score.

use regex::Regex;
use std::sync::LazyLock;

/// Score used when reasoning is empty or gives no signal either way.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Minimum number of evidence labels reasoning must carry.
pub const REQUIRED_EVIDENCE_FIELDS: usize = 3;

static EVIDENCE_FIELD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)found\s+date\s*:",
        r"(?i)current\s+date\s*:",
        r"(?i)\bage\s*:",
        r"(?i)threshold\s*:",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

// Tried in order; the first capture wins.
static EXPLICIT_CONFIDENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)confidence\s*:\s*(\d+(?:\.\d+)?)\s*%",
        r"(?i)(\d+(?:\.\d+)?)\s*%\s*confident",
        r"(?i)confidence\s*:\s*(\d+(?:\.\d+)?)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// One rung of the keyword ladder: any phrase present yields `score`.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceTier {
    pub label: &'static str,
    pub phrases: &'static [&'static str],
    pub score: f64,
}

impl ConfidenceTier {
    fn matches(&self, lowered: &str) -> bool {
        self.phrases.iter().any(|p| lowered.contains(p))
    }
}

/// Priority-ordered keyword tiers. Evaluated top to bottom, first match wins.
pub const CONFIDENCE_TIERS: &[ConfidenceTier] = &[
    ConfidenceTier {
        label: "explicit",
        phrases: &["explicit date", "clearly states", "specifically mentions", "found date:"],
        score: 0.9,
    },
    ConfidenceTier {
        label: "hedged",
        phrases: &["possibly", "may be", "might be", "unclear", "ambiguous"],
        score: 0.4,
    },
    ConfidenceTier {
        label: "inferred",
        phrases: &["inferred", "appears to", "suggests", "likely"],
        score: 0.6,
    },
];

/// Number of distinct evidence labels (`Found Date:`, `Current Date:`, `Age:`,
/// `Threshold:`) present in `reasoning`.
pub fn count_evidence_fields(reasoning: &str) -> usize {
    EVIDENCE_FIELD_PATTERNS
        .iter()
        .filter(|re| re.is_match(reasoning))
        .count()
}

/// True iff at least three of the four evidence labels are present.
pub fn has_structured_evidence(reasoning: &str) -> bool {
    count_evidence_fields(reasoning) >= REQUIRED_EVIDENCE_FIELDS
}

/// Explicit `Confidence: 95%`, `80% confident` or `confidence: 0.85`, normalized to [0, 1].
pub fn explicit_confidence(reasoning: &str) -> Option<f64> {
    EXPLICIT_CONFIDENCE_PATTERNS.iter().find_map(|re| {
        let raw: f64 = re.captures(reasoning)?.get(1)?.as_str().parse().ok()?;
        let value = if raw > 1.0 { raw / 100.0 } else { raw };
        Some(value.clamp(0.0, 1.0))
    })
}

/// Keyword tier that applies to `reasoning`, if any.
pub fn matching_tier(reasoning: &str) -> Option<&'static ConfidenceTier> {
    let lowered = reasoning.to_lowercase();
    CONFIDENCE_TIERS.iter().find(|tier| tier.matches(&lowered))
}

/// Confidence in [0.0, 1.0] derived from free-form reasoning.
pub fn extract_confidence_from_reasoning(reasoning: &str) -> f64 {
    if reasoning.trim().is_empty() {
        return DEFAULT_CONFIDENCE;
    }

    if let Some(value) = explicit_confidence(reasoning) {
        return value;
    }

    matching_tier(reasoning)
        .map(|tier| tier.score)
        .unwrap_or(DEFAULT_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_has_structured_evidence() {
        assert!(has_structured_evidence(
            "Found Date: 2023, Current Date: 2025, Age: 2 years, Threshold: 1 year"
        ));
        assert!(has_structured_evidence(
            "Found Date: 2023, Current Date: 2025, Age: 2 years, exceeds threshold of 1 year"
        ));
        assert!(has_structured_evidence(
            "The content shows found date: Q4 2023, CURRENT DATE: 2025, age: 2 years"
        ));
        assert!(!has_structured_evidence("This appears outdated"));
        assert!(!has_structured_evidence(
            "Found Date: 2023, Current Date: 2025, exceeds threshold of 1 year"
        ));
        assert!(!has_structured_evidence(""));
    }

    #[test]
    fn test_page_is_not_an_age_label() {
        assert_eq!(count_evidence_fields("see page: 4"), 0);
    }

    #[test]
    fn test_explicit_confidence() {
        assert!(approx(extract_confidence_from_reasoning("Confidence: 95%"), 0.95));
        assert!(approx(extract_confidence_from_reasoning("I am 80% confident"), 0.8));
        assert!(approx(extract_confidence_from_reasoning("confidence: 0.85"), 0.85));
        assert!(approx(extract_confidence_from_reasoning("Confidence: 250%"), 1.0));
        // Explicit score beats hedging language.
        assert!(approx(
            extract_confidence_from_reasoning("This may be stale. Confidence: 90%"),
            0.9
        ));
    }

    #[test]
    fn test_keyword_tiers() {
        assert!(approx(extract_confidence_from_reasoning("The text clearly states 2023 data"), 0.9));
        assert!(approx(extract_confidence_from_reasoning("Specifically mentions November 2023"), 0.9));
        assert!(approx(extract_confidence_from_reasoning("may be outdated"), 0.4));
        assert!(approx(extract_confidence_from_reasoning("Possibly from a previous year"), 0.4));
        assert!(approx(extract_confidence_from_reasoning("Unclear if this is current"), 0.4));
        assert!(approx(extract_confidence_from_reasoning("The date appears to be from 2023"), 0.6));
        assert!(approx(extract_confidence_from_reasoning("Inferred from context"), 0.6));
        assert!(approx(extract_confidence_from_reasoning("Rates are outdated"), DEFAULT_CONFIDENCE));
    }

    #[test]
    fn test_tier_priority() {
        // High tier outranks hedged, hedged outranks inferred.
        assert!(approx(extract_confidence_from_reasoning("clearly states, but possibly old"), 0.9));
        assert!(approx(extract_confidence_from_reasoning("likely old, might be revised"), 0.4));
        assert_eq!(matching_tier("likely old").map(|t| t.label), Some("inferred"));
    }

    #[test]
    fn test_empty_reasoning_is_default() {
        assert!(approx(extract_confidence_from_reasoning(""), DEFAULT_CONFIDENCE));
        assert!(approx(extract_confidence_from_reasoning("   "), DEFAULT_CONFIDENCE));
    }
}

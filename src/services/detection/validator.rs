// Finding Validator
// Multi-stage gate that rejects false-positive staleness findings before they
// reach a user. Pure: no I/O, safe to call from any worker.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::info;

use crate::models::CandidateFinding;

use super::evidence::{extract_confidence_from_reasoning, has_structured_evidence};
use super::temporal::{contains_temporal_marker, is_heading_only, temporal_markers};

pub const MIN_CONFIDENCE: f64 = 0.7;

// Reasoning that argues against its own flag.
static CONTRADICTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:should\s+not\s+be\s+flagged|is\s+valid\s+for|is\s+current|not\s+stale|do\s+not\s+flag|don'?t\s+flag|not\s+outdated|still\s+current|no\s+update\s+needed)\b",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Contradiction { phrase: String },
    HeadingOnly,
    NoTemporalMarker,
    InsufficientEvidence,
    LowConfidence { confidence: f64 },
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Contradiction { .. } => "contradiction",
            Self::HeadingOnly => "heading_only",
            Self::NoTemporalMarker => "no_temporal_marker",
            Self::InsufficientEvidence => "insufficient_evidence",
            Self::LowConfidence { .. } => "low_confidence",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contradiction { phrase } => {
                write!(f, "reasoning contradicts the flag (\"{}\")", phrase)
            }
            Self::HeadingOnly => write!(f, "flagged text is a heading only"),
            Self::NoTemporalMarker => write!(f, "no temporal marker in flagged text"),
            Self::InsufficientEvidence => write!(f, "reasoning lacks structured evidence"),
            Self::LowConfidence { confidence } => {
                write!(f, "confidence {:.2} below threshold", confidence)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept { confidence: f64 },
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

/// First self-negating phrase found in `reasoning`.
pub fn find_contradiction(reasoning: &str) -> Option<String> {
    CONTRADICTION_RE
        .find(reasoning)
        .map(|m| m.as_str().to_lowercase())
}

#[derive(Debug, Clone, Copy)]
pub struct FindingValidator {
    min_confidence: f64,
}

impl Default for FindingValidator {
    fn default() -> Self {
        Self::new(MIN_CONFIDENCE)
    }
}

impl FindingValidator {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Validate a candidate against its own reasoning.
    pub fn validate_candidate(&self, candidate: &CandidateFinding) -> Verdict {
        self.validate(candidate, &candidate.reasoning)
    }

    /// Checks run in a fixed order and stop at the first failure:
    /// contradiction, heading-only, temporal marker, evidence, confidence.
    pub fn validate(&self, candidate: &CandidateFinding, reasoning: &str) -> Verdict {
        let flagged = candidate.flagged_text.as_str();

        if let Some(phrase) = find_contradiction(reasoning) {
            return Verdict::Reject(RejectReason::Contradiction { phrase });
        }

        if is_heading_only(flagged) {
            return Verdict::Reject(RejectReason::HeadingOnly);
        }

        if !contains_temporal_marker(flagged) {
            return Verdict::Reject(RejectReason::NoTemporalMarker);
        }

        if !has_structured_evidence(reasoning) {
            return Verdict::Reject(RejectReason::InsufficientEvidence);
        }

        let confidence = extract_confidence_from_reasoning(reasoning);
        if confidence < self.min_confidence {
            return Verdict::Reject(RejectReason::LowConfidence { confidence });
        }

        Verdict::Accept { confidence }
    }

    /// Validate and log the outcome for offline tuning.
    pub fn validate_logged(&self, url: &str, candidate: &CandidateFinding) -> Verdict {
        let verdict = self.validate_candidate(candidate);
        match &verdict {
            Verdict::Accept { confidence } => {
                info!(
                    "[VALIDATOR] accepted url={} confidence={:.2} markers={:?} flagged=\"{}\"",
                    url,
                    confidence,
                    temporal_markers(&candidate.flagged_text),
                    preview(&candidate.flagged_text, 80)
                );
            }
            Verdict::Reject(reason) => {
                info!(
                    reason = reason.code(),
                    "[VALIDATOR] rejected url={} ({}) flagged=\"{}\"",
                    url,
                    reason,
                    preview(&candidate.flagged_text, 80)
                );
            }
        }
        verdict
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_FLAG: &str = "According to November 2023 data, mortgage rates averaged 7.2%";
    const VALID_REASONING: &str = "Found Date: November 2023, Current Date: December 31, 2025, Age: 25 months, Threshold: 12 months, Verdict: STALE (exceeds threshold by 13 months). Confidence: 95%";

    fn candidate(flagged: &str, reasoning: &str) -> CandidateFinding {
        CandidateFinding {
            description: "Rate outdated".to_string(),
            flagged_text: flagged.to_string(),
            reasoning: reasoning.to_string(),
            context_excerpt: None,
        }
    }

    #[test]
    fn test_accepts_valid_flag() {
        let verdict = FindingValidator::default().validate_candidate(&candidate(VALID_FLAG, VALID_REASONING));
        match verdict {
            Verdict::Accept { confidence } => assert!((confidence - 0.95).abs() < 1e-9),
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_heading_false_positive() {
        let reasoning = "The section titled 'Home-Buying Loan Types' is likely outdated, as it refers to information from before the current year of 2025 specified in the analysis parameters.";
        let verdict = FindingValidator::default().validate_candidate(&candidate("Home-Buying Loan Types", reasoning));
        assert_eq!(verdict, Verdict::Reject(RejectReason::HeadingOnly));
    }

    #[test]
    fn test_heading_rejected_regardless_of_evidence() {
        let verdict = FindingValidator::default().validate_candidate(&candidate("Mortgage Rates 2023", VALID_REASONING));
        assert_eq!(verdict, Verdict::Reject(RejectReason::HeadingOnly));
    }

    #[test]
    fn test_contradiction_checked_first() {
        let reasoning = format!("{} However this is current and should not be flagged.", VALID_REASONING);
        let verdict = FindingValidator::default().validate_candidate(&candidate("Home-Buying Loan Types", &reasoning));
        assert!(matches!(verdict, Verdict::Reject(RejectReason::Contradiction { .. })));
    }

    #[test]
    fn test_contradiction_phrases() {
        assert_eq!(find_contradiction("Data is valid for 2025").as_deref(), Some("is valid for"));
        assert_eq!(find_contradiction("Don't flag this").as_deref(), Some("don't flag"));
        assert!(find_contradiction("Verdict: NOT STALE").is_some());
        assert!(find_contradiction("Current Date: December 2025").is_none());
        assert!(find_contradiction("this is currently listed at 7%").is_none());
        assert!(find_contradiction("Verdict: STALE").is_none());
    }

    #[test]
    fn test_rejects_missing_temporal_marker() {
        let verdict = FindingValidator::default().validate_candidate(&candidate(
            "Rates depend on your credit profile, loan size, and the lender you choose.",
            VALID_REASONING,
        ));
        assert_eq!(verdict, Verdict::Reject(RejectReason::NoTemporalMarker));
    }

    #[test]
    fn test_rejects_unstructured_reasoning() {
        let verdict = FindingValidator::default().validate_candidate(&candidate(
            VALID_FLAG,
            "This clearly states 2023 data, which is old. Confidence: 99%",
        ));
        assert_eq!(verdict, Verdict::Reject(RejectReason::InsufficientEvidence));
    }

    #[test]
    fn test_rejects_low_confidence() {
        let reasoning = "Found Date: 2023, Current Date: 2025, Age: 2 years, Threshold: 1 year. Confidence: 55%";
        let verdict = FindingValidator::default().validate_candidate(&candidate(VALID_FLAG, reasoning));
        match verdict {
            Verdict::Reject(RejectReason::LowConfidence { confidence }) => {
                assert!((confidence - 0.55).abs() < 1e-9)
            }
            other => panic!("expected low confidence, got {:?}", other),
        }
    }

    #[test]
    fn test_found_date_keyword_meets_threshold() {
        // No explicit score: the "found date:" label puts reasoning in the 0.9 tier.
        let reasoning = "Found Date: 2023, Current Date: 2025, Age: 2 years, Threshold: 1 year";
        let verdict = FindingValidator::default().validate_candidate(&candidate(VALID_FLAG, reasoning));
        assert!(verdict.is_accept());
    }

    #[test]
    fn test_custom_threshold() {
        let reasoning = "Found Date: 2023, Current Date: 2025, Age: 2 years, Threshold: 1 year. Confidence: 75%";
        let strict = FindingValidator::new(0.8);
        assert!(!strict.validate_candidate(&candidate(VALID_FLAG, reasoning)).is_accept());
        assert!(FindingValidator::default().validate_candidate(&candidate(VALID_FLAG, reasoning)).is_accept());
    }

    #[test]
    fn test_accept_implies_every_check() {
        let flags = [
            VALID_FLAG,
            "Home-Buying Loan Types",
            "In Q4 2024, mortgage applications increased by 15%.",
            "Our team reviews every application carefully and quickly.",
            "",
        ];
        let reasonings = [
            VALID_REASONING,
            "may be outdated",
            "Found Date: Q4 2024, Current Date: 2026, Age: 2 years, Threshold: 1 year, possibly stale",
            "Found Date: 2024, Current Date: 2026, Age: 2 years. This is current.",
            "",
        ];
        let validator = FindingValidator::default();
        for flagged in flags {
            for reasoning in reasonings {
                if let Verdict::Accept { confidence } = validator.validate_candidate(&candidate(flagged, reasoning)) {
                    assert!(confidence >= MIN_CONFIDENCE);
                    assert!(has_structured_evidence(reasoning));
                    assert!(contains_temporal_marker(flagged));
                    assert!(!is_heading_only(flagged));
                    assert!(find_contradiction(reasoning).is_none());
                }
            }
        }
    }
}

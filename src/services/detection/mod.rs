// Detection Module
// Stale-content detection organized into specialized submodules:
// - temporal: heading-only and temporal-marker heuristics
// - evidence: structured-evidence labels and confidence extraction
// - validator: ordered validation gate for model candidates
// - json_extract: pulls the candidate array out of model output
// - prompt: detection prompt assembly
// - detector: one page -> one model call -> validated issues

pub mod temporal;
pub mod evidence;
pub mod validator;
pub mod json_extract;
pub mod prompt;
pub mod detector;

pub use temporal::{contains_temporal_marker, is_heading_only, temporal_markers};
pub use evidence::{extract_confidence_from_reasoning, has_structured_evidence};
pub use validator::{FindingValidator, RejectReason, Verdict, MIN_CONFIDENCE};
pub use json_extract::{extract_json_array, parse_candidates, CandidateParseError};
pub use prompt::build_detection_prompt;
pub use detector::{DetectorOptions, StaleContentDetector};

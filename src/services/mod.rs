// Staleguard Core Services

pub mod config_store;
pub mod providers;
pub mod extractor;
pub mod detection;
pub mod analysis;
pub mod report;

pub use config_store::*;
pub use providers::*;
pub use extractor::*;
pub use analysis::*;
pub use report::*;

pub use detection::{
    build_detection_prompt,
    contains_temporal_marker,
    extract_confidence_from_reasoning,
    extract_json_array,
    has_structured_evidence,
    is_heading_only,
    parse_candidates,
    DetectorOptions,
    FindingValidator,
    RejectReason,
    StaleContentDetector,
    Verdict,
};

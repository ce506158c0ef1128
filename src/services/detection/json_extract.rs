// JSON array extraction from free-text model output
// The model is asked for a bare JSON array but often wraps it in prose.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::CandidateFinding;

#[derive(Error, Debug)]
pub enum CandidateParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Substring between the first `[` and the last `]`, inclusive.
///
/// Returns `None` when there is no `[` or no `]` after it.
pub fn extract_json_array(content: &str) -> Option<&str> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(&content[start..=end])
}

/// Parse candidate findings out of a raw model response.
///
/// No bracketed span means the model found nothing: `Ok(vec![])`.
/// A bracketed span that is not a JSON array is an error for the caller to
/// downgrade. Elements that are not objects, or whose fields have the wrong
/// type, are skipped with a warning. `null` fields read as empty.
pub fn parse_candidates(content: &str) -> Result<Vec<CandidateFinding>, CandidateParseError> {
    let Some(json_str) = extract_json_array(content.trim()) else {
        return Ok(Vec::new());
    };

    let items: Vec<Value> = serde_json::from_str(json_str)?;
    let mut candidates = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            warn!("[DETECTOR] skipping candidate #{}: not an object ({})", idx, item);
            continue;
        }
        match serde_json::from_value::<CandidateFinding>(item) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!("[DETECTOR] skipping candidate #{}: {}", idx, e),
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_array_ignores_surrounding_prose() {
        let content = r#"Here is the result: [{"description":"x"}] Hope this helps!"#;
        assert_eq!(extract_json_array(content), Some(r#"[{"description":"x"}]"#));
    }

    #[test]
    fn test_extract_array_absent() {
        assert_eq!(extract_json_array("No stale content found."), None);
        assert_eq!(extract_json_array("] backwards ["), None);
        assert_eq!(extract_json_array("open only ["), None);
    }

    #[test]
    fn test_extract_array_nested_brackets() {
        let content = r#"[{"description":"a","tags":["x","y"]}]"#;
        assert_eq!(extract_json_array(content), Some(content));
        let parsed = parse_candidates(content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].description, "a");
    }

    #[test]
    fn test_multiple_arrays_do_not_parse() {
        let content = r#"First: [{"description":"a"}] and second: [{"description":"b"}]"#;
        assert!(parse_candidates(content).is_err());
    }

    #[test]
    fn test_empty_array() {
        assert!(parse_candidates("[]").unwrap().is_empty());
    }

    #[test]
    fn test_no_array_is_empty_success() {
        assert!(parse_candidates("I could not find anything stale.").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(parse_candidates(r#"[{"description": "unterminated}]"#).is_err());
    }

    #[test]
    fn test_non_object_items_skipped() {
        let content = r#"[1, "two", {"description":"d","flaggedText":"as of 2023","reasoning":"r"}, null]"#;
        let parsed = parse_candidates(content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].flagged_text, "as of 2023");
    }

    #[test]
    fn test_bracket_inside_flagged_text() {
        let content = "Result:\n[{\"description\":\"d\",\"flaggedText\":\"rates [2023] were 7%\",\"reasoning\":\"r\"}]\nDone.";
        let parsed = parse_candidates(content).unwrap();
        assert_eq!(parsed[0].flagged_text, "rates [2023] were 7%");
    }

    #[test]
    fn test_null_fields_kept_wrong_types_skipped() {
        let content = r#"[
            {"description":"kept","flaggedText":"as of 2023","reasoning":null},
            {"description":"dropped","flaggedText":"as of 2023","reasoning":42}
        ]"#;
        let parsed = parse_candidates(content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].description, "kept");
        assert!(parsed[0].reasoning.is_empty());
    }
}

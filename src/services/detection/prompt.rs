// Detection prompt construction

use chrono::{Datelike, NaiveDate};

use crate::models::DomainContext;

/// Content beyond this many characters is never sent to the model.
pub const DEFAULT_CONTENT_CHAR_LIMIT: usize = 8000;

const OUTPUT_FORMAT_INSTRUCTIONS: &str = r#"OUTPUT FORMAT:
Return a JSON array. Each element must be an object with exactly these fields:
[
  {
    "description": "What is stale, in one sentence",
    "flaggedText": "Verbatim quote from the content that is outdated. Must contain the date, statistic or time reference itself, never just a heading",
    "contextExcerpt": "The sentence before, the sentence containing the issue with the stale text wrapped in **bold**, and the sentence after (whatever is available)",
    "reasoning": "Found Date: <date in text>, Current Date: <reference date>, Age: <computed age>, Threshold: <threshold from the rules>, Verdict: STALE. Confidence: <0-100>%"
  }
]

If nothing is stale, return an empty array: []
Return ONLY the JSON array, with no text before or after it."#;

/// First `limit` characters of `content` (char boundary safe).
pub fn truncate_chars(content: &str, limit: usize) -> &str {
    match content.char_indices().nth(limit) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Build the single analysis prompt for one page.
pub fn build_detection_prompt(
    content_preview: &str,
    domain_context: &DomainContext,
    today: NaiveDate,
) -> String {
    let current_date = today.format("%B %d, %Y").to_string();
    let current_year = today.year();
    let rules = domain_context.staleness_rules.as_str();

    let mut prompt = String::with_capacity(content_preview.len() + 4096);

    prompt.push_str(
        "You audit web content for stale, time-sensitive information.\n\n",
    );
    prompt.push_str(&format!(
        "REFERENCE DATE:\n- Current Date: {}\n- Current Year: {}\n\n",
        current_date, current_year
    ));

    prompt.push_str("PROCESS:\n");
    prompt.push_str("1. Find every absolute or relative date, statistic and time reference in the content.\n");
    prompt.push_str(&format!(
        "2. Resolve dates without a year (\"March 15\") from the title, headers, byline or surrounding text. If the page is about {} or later, assume that year. Never assume a lone month name is in the past.\n",
        current_year
    ));
    prompt.push_str(&format!(
        "3. Compute the age of each reference relative to {}.\n",
        current_date
    ));
    prompt.push_str(&format!(
        "4. Apply the user's staleness rules: \"{}\"\n",
        rules
    ));
    prompt.push_str(&format!(
        "   - Absolute year boundaries (\"anything older than {y}\", \"pre-{y} data\") flag only references to years before {y}. Earlier months within {y} itself are NOT stale under such a rule.\n",
        y = current_year
    ));
    prompt.push_str(&format!(
        "   - Relative durations (\"older than 6 months\", \"older than 2 years\") define a rolling threshold counted back from {}.\n",
        current_date
    ));
    prompt.push_str("   - \"Immediate\" or \"current only\" means any past date is stale.\n");
    prompt.push_str(&format!(
        "   - Dates after {} are current. Never flag them.\n",
        current_date
    ));
    prompt.push_str("5. Do not flag clearly historical statements (\"Founded in 2010\") or bare section headings.\n\n");

    prompt.push_str("DOMAIN CONTEXT:\n");
    prompt.push_str(&format!("- Description: {}\n", domain_context.description.trim()));
    prompt.push_str(&format!(
        "- Entity Types to Check: {}\n",
        domain_context.entity_types.trim()
    ));
    prompt.push_str(&format!("- Staleness Rules: {}\n\n", rules));

    prompt.push_str("CONTENT:\n");
    prompt.push_str(content_preview);
    prompt.push_str("\n\n");

    prompt.push_str(OUTPUT_FORMAT_INSTRUCTIONS);
    prompt.push('\n');
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DomainContext {
        DomainContext {
            description: "Mortgage lender marketing site".to_string(),
            entity_types: "interest rates, loan limits".to_string(),
            staleness_rules: "anything older than 2025".to_string(),
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_prompt_embeds_dates_rules_and_context() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let prompt = build_detection_prompt("Rates were 7.2% in 2023.", &context(), today);

        assert!(prompt.contains("Current Date: December 31, 2025"));
        assert!(prompt.contains("Current Year: 2025"));
        assert!(prompt.contains("\"anything older than 2025\""));
        assert!(prompt.contains("Mortgage lender marketing site"));
        assert!(prompt.contains("interest rates, loan limits"));
        assert!(prompt.contains("Rates were 7.2% in 2023."));
        assert!(prompt.contains("\"flaggedText\""));
        assert!(prompt.contains("Found Date:"));
        assert!(prompt.contains("older than 6 months"));
    }

    #[test]
    fn test_staleness_rules_embedded_verbatim() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let ctx = DomainContext {
            staleness_rules: "  older than 6 months;\n  pre-2024 data\n".to_string(),
            ..context()
        };
        let prompt = build_detection_prompt("content", &ctx, today);
        assert!(prompt.contains("\"  older than 6 months;\n  pre-2024 data\n\""));
        assert!(prompt.contains("- Staleness Rules:   older than 6 months;\n  pre-2024 data\n\n"));
    }
}

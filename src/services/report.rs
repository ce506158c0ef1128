// Run Reporting
// Markdown cleanup and CSV export of analysis runs.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::{AnalysisRun, Issue};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV flush failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```[\s\S]*?```").expect("valid regex"));
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]+\)").expect("valid regex"));
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));
static EMPHASIS_RES: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"),
        Regex::new(r"__([^_]+)__").expect("valid regex"),
        Regex::new(r"\*([^*]+)\*").expect("valid regex"),
        Regex::new(r"_([^_]+)_").expect("valid regex"),
    ]
});
static HEADING_MARK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+").expect("valid regex"));
static RULE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[-*_]{3,}$").expect("valid regex"));
static BLOCKQUOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^>[ \t]+").expect("valid regex"));
static EXTRA_NEWLINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static EXTRA_SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").expect("valid regex"));

/// Reduce markdown to plain text for spreadsheet cells.
pub fn strip_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = CODE_FENCE_RE.replace_all(text, "").into_owned();
    out = INLINE_CODE_RE.replace_all(&out, "$1").into_owned();
    out = IMAGE_RE.replace_all(&out, "$1").into_owned();
    out = LINK_RE.replace_all(&out, "$1").into_owned();
    for re in EMPHASIS_RES.iter() {
        out = re.replace_all(&out, "$1").into_owned();
    }
    out = HEADING_MARK_RE.replace_all(&out, "").into_owned();
    out = RULE_RE.replace_all(&out, "").into_owned();
    out = BLOCKQUOTE_RE.replace_all(&out, "").into_owned();
    out = EXTRA_NEWLINES_RE.replace_all(&out, "\n\n").into_owned();
    out = EXTRA_SPACES_RE.replace_all(&out, " ").into_owned();

    out.trim().to_string()
}

/// One-cell rendering of an issue, with accepted suggested sources appended.
pub fn format_issue_with_reason(issue: &Issue) -> String {
    let mut result = format!(
        "{}\nFlagged: \"{}\"\n\nReason: {}",
        strip_markdown(&issue.description),
        strip_markdown(&issue.flagged_text),
        strip_markdown(&issue.reasoning)
    );

    let accepted: Vec<_> = issue.suggested_sources.iter().filter(|s| s.is_accepted).collect();
    if accepted.is_empty() {
        return result;
    }

    result.push_str("\n\nSUGGESTED SOURCES:");
    for (idx, source) in accepted.iter().enumerate() {
        let title = if source.title.trim().is_empty() {
            "Source".to_string()
        } else {
            strip_markdown(&source.title)
        };
        result.push_str(&format!("\n{}. {}", idx + 1, title));
        if let Some(date) = source.publication_date.as_deref().filter(|d| !d.is_empty()) {
            result.push_str(&format!(" ({})", date));
        }
        let snippet = strip_markdown(&source.snippet);
        if !snippet.is_empty() {
            result.push_str(&format!("\n   \"{}\"", snippet));
        }
        result.push_str(&format!("\n   {}", source.url));
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvLayout {
    /// Description, flagged text and reasoning in separate columns per issue.
    #[default]
    Columns,
    /// One cell per issue rendered with `format_issue_with_reason`.
    Combined,
}

/// Render a run as CSV: one row per page, issue slots padded to the widest page.
pub fn export_csv(run: &AnalysisRun, layout: CsvLayout) -> Result<String, ReportError> {
    let max_issues = run.results.iter().map(|r| r.issues.len()).max().unwrap_or(0);

    let mut headers = vec!["URL".to_string(), "Page Title".to_string(), "Issue Count".to_string()];
    for i in 1..=max_issues {
        match layout {
            CsvLayout::Columns => {
                headers.push(format!("Issue {} Description", i));
                headers.push(format!("Issue {} Flagged Text", i));
                headers.push(format!("Issue {} Reasoning", i));
            }
            CsvLayout::Combined => headers.push(format!("Issue {}", i)),
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;

    for page in &run.results {
        let mut row = vec![page.url.clone(), page.title.clone(), page.issue_count.to_string()];
        for i in 0..max_issues {
            let issue = page.issues.get(i);
            match layout {
                CsvLayout::Columns => match issue {
                    Some(issue) => {
                        row.push(strip_markdown(&issue.description));
                        row.push(strip_markdown(&issue.flagged_text));
                        row.push(strip_markdown(&issue.reasoning));
                    }
                    None => row.extend(std::iter::repeat(String::new()).take(3)),
                },
                CsvLayout::Combined => row.push(issue.map(format_issue_with_reason).unwrap_or_default()),
            }
        }
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

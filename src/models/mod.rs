// Staleguard Data Models
// Shared between the detection pipeline, the batch runner and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============ Domain Context ============

/// User-supplied audit configuration. Fixed for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainContext {
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "entity_types")]
    pub entity_types: String,
    #[serde(default, alias = "staleness_rules")]
    pub staleness_rules: String,
}

// ============ Findings ============

// Models emit `null` for fields they have nothing to say about.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Raw, unvalidated finding as returned by the model.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFinding {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, alias = "flagged_text", deserialize_with = "null_as_empty")]
    pub flagged_text: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reasoning: String,
    #[serde(default, alias = "context_excerpt")]
    pub context_excerpt: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Dismissed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedSource {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    /// "High" or "Medium"
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub is_accepted: bool,
}

/// A candidate that passed every validation check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub description: String,
    pub flagged_text: String,
    #[serde(default)]
    pub context_excerpt: Option<String>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default)]
    pub status: IssueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_doc_url: Option<String>,
    #[serde(default)]
    pub suggested_sources: Vec<SuggestedSource>,
}

impl Issue {
    /// Promote a validated candidate. Generates a fresh `issue_xxxxxxxx` id.
    pub fn from_candidate(candidate: CandidateFinding, confidence: f64) -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("issue_{}", &hex[..8]),
            description: candidate.description,
            flagged_text: candidate.flagged_text,
            context_excerpt: candidate.context_excerpt.filter(|c| !c.trim().is_empty()),
            reasoning: candidate.reasoning,
            confidence: confidence.clamp(0.0, 1.0),
            status: IssueStatus::Open,
            assigned_to: None,
            due_date: None,
            google_doc_url: None,
            suggested_sources: Vec::new(),
        }
    }
}

// ============ Detection Result ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub status: DetectionStatus,
    pub issues: Vec<Issue>,
    pub issue_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn success(issues: Vec<Issue>) -> Self {
        Self {
            status: DetectionStatus::Success,
            issue_count: issues.len(),
            issues,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: DetectionStatus::Failed,
            issues: Vec::new(),
            issue_count: 0,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DetectionStatus::Success
    }
}

// ============ Page Content ============

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PageHeaders {
    #[serde(default)]
    pub h1: Vec<String>,
    #[serde(default)]
    pub h2: Vec<String>,
    #[serde(default)]
    pub h3: Vec<String>,
    #[serde(default)]
    pub h4: Vec<String>,
}

/// Output of the page-extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub title: String,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub headers: PageHeaders,
    pub content: String,
    /// Each table is a list of rows, the first row being the header.
    #[serde(default)]
    pub tables: Vec<Vec<Vec<String>>>,
}

// ============ Analysis Run ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub h1s: Vec<String>,
    #[serde(default)]
    pub h2s: Vec<String>,
    #[serde(default)]
    pub h3s: Vec<String>,
    #[serde(default)]
    pub h4s: Vec<String>,
    pub status: PageStatus,
    pub issue_count: usize,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub const FAILED_PAGE_TITLE: &str = "Failed to Access";

impl PageResult {
    /// Terminal failure entry for a page that produced no findings.
    pub fn failed(url: &str, title: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            meta_title: None,
            meta_description: None,
            h1s: Vec::new(),
            h2s: Vec::new(),
            h3s: Vec::new(),
            h4s: Vec::new(),
            status: PageStatus::Failed,
            issue_count: 0,
            issues: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Merge extracted page metadata with a detection outcome.
    pub fn from_detection(url: &str, page: &PageContent, detection: DetectionResult) -> Self {
        let status = if detection.is_success() {
            PageStatus::Success
        } else {
            PageStatus::Failed
        };
        Self {
            url: url.to_string(),
            title: page.title.clone(),
            meta_title: page.meta_title.clone(),
            meta_description: page.meta_description.clone(),
            h1s: page.headers.h1.clone(),
            h2s: page.headers.h2.clone(),
            h3s: page.headers.h3.clone(),
            h4s: page.headers.h4.clone(),
            status,
            issue_count: detection.issue_count,
            issues: detection.issues,
            error: detection.error,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Processing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub url_count: usize,
    pub total_issues: usize,
    pub status: RunStatus,
    pub domain_context: DomainContext,
    #[serde(default)]
    pub results: Vec<PageResult>,
}

impl AnalysisRun {
    pub fn start(urls: &[String], domain_context: DomainContext) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            url_count: urls.len(),
            total_issues: 0,
            status: RunStatus::Processing,
            domain_context,
            results: Vec::new(),
        }
    }

    /// Record the per-page results and move to a terminal status.
    pub fn finish(&mut self, results: Vec<PageResult>, status: RunStatus) {
        self.total_issues = results.iter().map(|r| r.issue_count).sum();
        self.results = results;
        self.status = status;
    }
}

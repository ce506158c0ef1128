// Page Extraction Service
// Fetches JS-rendered page content through the Firecrawl scrape API and
// shapes it into `PageContent` for detection.

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{PageContent, PageHeaders};

use super::config_store::{ConfigStore, ExtractorConfig};
use super::providers::get_api_key;

const FIRECRAWL_DEFAULT_URL: &str = "https://api.firecrawl.dev/v1/scrape";
const UNTITLED_PAGE: &str = "Untitled Page";

const INCLUDE_TAGS: &[&str] = &[
    "title", "h1", "h2", "h3", "h4", "h5", "h6", "p", "table", "td", "th", "li", "ul", "ol",
];
const EXCLUDE_TAGS: &[&str] = &["script", "style", "nav", "footer", "header"];

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Page load timeout - unable to access")]
    Timeout,
    #[error("Failed - Unable to Access: Access forbidden")]
    Forbidden,
    #[error("Failed - Unable to Access: Page not found")]
    NotFound,
    #[error("Failed - Unable to Access: Rate limit exceeded")]
    RateLimited,
    #[error("Failed - Unable to Access: {0}")]
    Access(String),
    #[error("Failed - Unable to Access: extractor API key not configured")]
    MissingApiKey,
}

impl ExtractError {
    /// Categorize a free-form failure message from the scraping backend.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("403") || lower.contains("forbidden") {
            Self::Forbidden
        } else if lower.contains("404") || lower.contains("not found") {
            Self::NotFound
        } else if lower.contains("429") || lower.contains("rate limit") {
            Self::RateLimited
        } else {
            Self::Access(message.trim().to_string())
        }
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::FORBIDDEN => Self::Forbidden,
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Self::Timeout,
            _ => Self::from_message(&format!("{} {}", status.as_u16(), body)),
        }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::from_message(&e.to_string())
        }
    }
}

/// Page-extraction collaborator.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<PageContent, ExtractError>;
}

#[derive(Debug, Deserialize, Default)]
struct ScrapeResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize, Default)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    metadata: Option<ScrapeMetadata>,
}

#[derive(Debug, Deserialize, Default)]
struct ScrapeMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub struct FirecrawlExtractor {
    client: Client,
    url: String,
    api_key: String,
}

impl FirecrawlExtractor {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        let url = base_url
            .or_else(|| env::var("FIRECRAWL_API_URL").ok())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| FIRECRAWL_DEFAULT_URL.to_string());

        Self {
            client,
            url,
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &ExtractorConfig, store: Option<&ConfigStore>) -> Result<Self, ExtractError> {
        let api_key = get_api_key("firecrawl", store).ok_or(ExtractError::MissingApiKey)?;
        Ok(Self::new(
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        ))
    }
}

#[async_trait]
impl PageExtractor for FirecrawlExtractor {
    async fn extract(&self, url: &str) -> Result<PageContent, ExtractError> {
        let request = serde_json::json!({
            "url": url,
            "formats": ["markdown", "html"],
            "includeTags": INCLUDE_TAGS,
            "excludeTags": EXCLUDE_TAGS,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("[EXTRACTOR] scrape failed url={} status={}", url, status.as_u16());
            return Err(ExtractError::from_status(status, &body));
        }

        let parsed: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Access(format!("Invalid response format ({})", e)))?;

        let page = page_from_scrape(parsed)?;
        info!(
            "[EXTRACTOR] extracted url={} title=\"{}\" chars={}",
            url,
            page.title,
            page.content.chars().count()
        );
        Ok(page)
    }
}

fn page_from_scrape(parsed: ScrapeResponse) -> Result<PageContent, ExtractError> {
    if let Some(error) = parsed.error.filter(|e| !e.trim().is_empty()) {
        return Err(ExtractError::from_message(&error));
    }
    if parsed.success == Some(false) {
        return Err(ExtractError::Access("Unknown error".to_string()));
    }
    let data = parsed
        .data
        .ok_or_else(|| ExtractError::Access("No data returned".to_string()))?;

    let metadata = data.metadata.unwrap_or_default();
    Ok(build_page_content(
        data.markdown.as_deref().unwrap_or(""),
        data.html.as_deref().unwrap_or(""),
        metadata.title.as_deref(),
        metadata.description.as_deref(),
    ))
}

static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("valid regex"));
static H2_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^##\s+(.+)$").expect("valid regex"));
static H3_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^###\s+(.+)$").expect("valid regex"));
static H4_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^####\s+(.+)$").expect("valid regex"));

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\|(.+?)\|\n\|[-\s|:]+\|\n((?:\|.+\|\n?)+)").expect("valid regex")
});

static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn captured_lines(re: &Regex, markdown: &str) -> Vec<String> {
    re.captures_iter(markdown)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// H1-H4 heading text from markdown.
pub fn extract_headers(markdown: &str) -> PageHeaders {
    PageHeaders {
        h1: captured_lines(&H1_RE, markdown),
        h2: captured_lines(&H2_RE, markdown),
        h3: captured_lines(&H3_RE, markdown),
        h4: captured_lines(&H4_RE, markdown),
    }
}

fn split_cells(row: &str) -> Vec<String> {
    row.split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Markdown pipe tables as rows of cells, header row first.
pub fn extract_tables(markdown: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    for caps in TABLE_RE.captures_iter(markdown) {
        let headers = caps.get(1).map(|m| split_cells(m.as_str())).unwrap_or_default();
        let rows: Vec<Vec<String>> = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or("")
            .trim()
            .lines()
            .map(split_cells)
            .filter(|cells| !cells.is_empty())
            .collect();

        if !headers.is_empty() && !rows.is_empty() {
            let mut table = vec![headers];
            table.extend(rows);
            tables.push(table);
        }
    }
    tables
}

/// Runs of three or more newlines become one blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_RUN_RE.replace_all(text.trim(), "\n\n").into_owned()
}

/// Shape scraped markdown/html plus metadata into page content.
pub fn build_page_content(
    markdown: &str,
    html: &str,
    meta_title: Option<&str>,
    meta_description: Option<&str>,
) -> PageContent {
    let headers = extract_headers(markdown);

    let title = meta_title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| headers.h1.first().cloned())
        .unwrap_or_else(|| UNTITLED_PAGE.to_string());

    let raw = if markdown.trim().is_empty() { html } else { markdown };

    PageContent {
        meta_title: Some(title.clone()),
        title,
        meta_description: meta_description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        tables: extract_tables(markdown),
        headers,
        content: collapse_blank_lines(raw),
    }
}

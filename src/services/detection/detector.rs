// Stale Content Detector
// Prompt -> one model call -> JSON array extraction -> validation gate.
//
// Started -> ModelCallFailed -> Failed
//         -> ModelCallSucceeded -> ParseFailed -> Success (no issues)
//         -> ModelCallSucceeded -> ParseSucceeded -> per-candidate validation -> Success

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::models::{DetectionResult, DomainContext, Issue};
use crate::services::config_store::{DetectionConfig, ModelConfig};
use crate::services::providers::{ProviderError, TextModel};

use super::json_extract::parse_candidates;
use super::prompt::{build_detection_prompt, truncate_chars, DEFAULT_CONTENT_CHAR_LIMIT};
use super::validator::{FindingValidator, Verdict};

#[derive(Debug, Clone)]
pub struct DetectorOptions {
    pub content_char_limit: usize,
    pub max_output_tokens: u32,
    pub model_timeout: Duration,
    pub min_confidence: f64,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            content_char_limit: DEFAULT_CONTENT_CHAR_LIMIT,
            max_output_tokens: 2000,
            model_timeout: Duration::from_secs(30),
            min_confidence: super::validator::MIN_CONFIDENCE,
        }
    }
}

impl DetectorOptions {
    pub fn from_config(model: &ModelConfig, detection: &DetectionConfig) -> Self {
        Self {
            content_char_limit: detection.content_char_limit.max(1),
            max_output_tokens: model.max_tokens.max(1),
            model_timeout: Duration::from_secs(model.timeout_secs.max(1)),
            min_confidence: detection.min_confidence,
        }
    }
}

pub struct StaleContentDetector {
    model: Arc<dyn TextModel>,
    validator: FindingValidator,
    options: DetectorOptions,
}

impl StaleContentDetector {
    pub fn new(model: Arc<dyn TextModel>, options: DetectorOptions) -> Self {
        Self {
            model,
            validator: FindingValidator::new(options.min_confidence),
            options,
        }
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    /// Analyze one page against today's date. Never returns an error: model
    /// failures become a `failed` result.
    pub async fn detect(&self, url: &str, content: &str, domain_context: &DomainContext) -> DetectionResult {
        let today = chrono::Local::now().date_naive();
        self.detect_on(url, content, domain_context, today).await
    }

    pub async fn detect_on(
        &self,
        url: &str,
        content: &str,
        domain_context: &DomainContext,
        today: NaiveDate,
    ) -> DetectionResult {
        let started = Instant::now();
        let preview = truncate_chars(content, self.options.content_char_limit);
        info!(
            "[DETECTOR] analyzing url={} model={} chars={} (of {})",
            url,
            self.model.label(),
            preview.chars().count(),
            content.chars().count()
        );

        let prompt = build_detection_prompt(preview, domain_context, today);

        let response = match self.call_model(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("[DETECTOR] model call failed url={} : {}", url, e);
                return DetectionResult::failed(format!("Analysis failed: {}", e));
            }
        };
        debug!("[DETECTOR] response url={} chars={}", url, response.len());

        let candidates = match parse_candidates(&response) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(
                    "[DETECTOR] unparsable model output url={} ({}), treating as no issues",
                    url, e
                );
                return DetectionResult::success(Vec::new());
            }
        };

        let candidate_count = candidates.len();
        let issues: Vec<Issue> = candidates
            .into_iter()
            .filter_map(|candidate| match self.validator.validate_logged(url, &candidate) {
                Verdict::Accept { confidence } => Some(Issue::from_candidate(candidate, confidence)),
                Verdict::Reject(_) => None,
            })
            .collect();

        info!(
            "[DETECTOR] done url={} candidates={} accepted={} elapsed_ms={}",
            url,
            candidate_count,
            issues.len(),
            started.elapsed().as_millis()
        );

        DetectionResult::success(issues)
    }

    async fn call_model(&self, prompt: &str) -> Result<String, ProviderError> {
        let timeout = self.options.model_timeout;
        let call = self.model.complete(prompt, self.options.max_output_tokens);
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::DetectionStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted model: returns a fixed reply (or error) and records prompts.
    pub(crate) struct FakeModel {
        reply: Result<String, String>,
        delay: Duration,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FakeModel {
        pub(crate) fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextModel for FakeModel {
        async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(|message| ProviderError::ApiError {
                status: 529,
                message,
            })
        }

        fn label(&self) -> String {
            "fake:model".to_string()
        }
    }

    pub(crate) const VALID_RESPONSE: &str = r#"[{"description":"Rate outdated","flaggedText":"According to November 2023 data, mortgage rates averaged 7.2%","reasoning":"Found Date: November 2023, Current Date: December 31, 2025, Age: 25 months, Threshold: 12 months, Verdict: STALE. Confidence: 95%"}]"#;

    fn context() -> DomainContext {
        DomainContext {
            description: "Mortgage lender".to_string(),
            entity_types: "rates".to_string(),
            staleness_rules: "older than 12 months".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
    }

    fn detector(model: Arc<FakeModel>) -> StaleContentDetector {
        StaleContentDetector::new(model, DetectorOptions::default())
    }

    #[tokio::test]
    async fn test_heading_only_candidate_rejected() {
        let model = Arc::new(FakeModel::replying(
            r#"[{"description":"Rate outdated","flaggedText":"Home-Buying Loan Types","reasoning":"likely outdated"}]"#,
        ));
        let result = detector(model).detect_on("https://x.example", "content", &context(), today()).await;
        assert_eq!(result.status, DetectionStatus::Success);
        assert_eq!(result.issue_count, 0);
        assert!(result.issues.is_empty());
    }

    #[tokio::test]
    async fn test_valid_candidate_accepted() {
        let model = Arc::new(FakeModel::replying(VALID_RESPONSE));
        let result = detector(model).detect_on("https://x.example", "content", &context(), today()).await;
        assert_eq!(result.status, DetectionStatus::Success);
        assert_eq!(result.issue_count, 1);
        let issue = &result.issues[0];
        assert!((issue.confidence - 0.95).abs() < 1e-9);
        assert!(issue.id.starts_with("issue_"));
        assert_eq!(issue.description, "Rate outdated");
    }

    #[tokio::test]
    async fn test_prose_wrapped_response() {
        let wrapped = format!("Here is the result: {} Hope this helps!", VALID_RESPONSE);
        let model = Arc::new(FakeModel::replying(&wrapped));
        let result = detector(model).detect_on("https://x.example", "content", &context(), today()).await;
        assert_eq!(result.issue_count, 1);
    }

    #[tokio::test]
    async fn test_unparsable_json_is_empty_success() {
        let model = Arc::new(FakeModel::replying("[{\"description\": oops}]"));
        let result = detector(model).detect_on("https://x.example", "content", &context(), today()).await;
        assert_eq!(result.status, DetectionStatus::Success);
        assert_eq!(result.issue_count, 0);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_no_array_is_empty_success() {
        let model = Arc::new(FakeModel::replying("Nothing stale here."));
        let result = detector(model).detect_on("https://x.example", "content", &context(), today()).await;
        assert!(result.is_success());
        assert_eq!(result.issue_count, 0);
    }

    #[tokio::test]
    async fn test_model_failure_is_failed_result() {
        let model = Arc::new(FakeModel::failing("overloaded"));
        let result = detector(model).detect_on("https://x.example", "content", &context(), today()).await;
        assert_eq!(result.status, DetectionStatus::Failed);
        assert_eq!(result.issue_count, 0);
        let error = result.error.unwrap();
        assert!(error.starts_with("Analysis failed:"));
        assert!(error.contains("overloaded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_is_failed_result() {
        let model = Arc::new(FakeModel::replying(VALID_RESPONSE).with_delay(Duration::from_secs(120)));
        let options = DetectorOptions {
            model_timeout: Duration::from_secs(5),
            ..DetectorOptions::default()
        };
        let result = StaleContentDetector::new(model, options)
            .detect_on("https://x.example", "content", &context(), today())
            .await;
        assert_eq!(result.status, DetectionStatus::Failed);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_content_truncated_in_prompt() {
        let model = Arc::new(FakeModel::replying("[]"));
        let options = DetectorOptions {
            content_char_limit: 10,
            ..DetectorOptions::default()
        };
        let content = format!("{}{}", "a".repeat(10), "TAIL_MARKER");
        StaleContentDetector::new(model.clone(), options)
            .detect_on("https://x.example", &content, &context(), today())
            .await;

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("aaaaaaaaaa"));
        assert!(!prompts[0].contains("TAIL_MARKER"));
        assert!(prompts[0].contains("older than 12 months"));
    }

    #[tokio::test]
    async fn test_mixed_candidates_filtered() {
        let response = r#"[
            {"description":"Rate outdated","flaggedText":"According to November 2023 data, mortgage rates averaged 7.2%","reasoning":"Found Date: November 2023, Current Date: December 31, 2025, Age: 25 months, Threshold: 12 months. Confidence: 95%"},
            {"description":"Heading","flaggedText":"Loan Types","reasoning":"Found Date: 2023, Current Date: 2025, Age: 2 years, Threshold: 1 year"},
            {"description":"Hedged","flaggedText":"Limits rose 4% in 2024, the agency said.","reasoning":"Found Date: 2024, Current Date: 2025, Age: 1 year, Threshold: 6 months. Confidence: 50%"},
            {"description":"Self-negating","flaggedText":"Limits rose 4% in 2025, the agency said.","reasoning":"Found Date: 2025, Current Date: 2025, Age: 0, Threshold: 1 year. This is current."}
        ]"#;
        let model = Arc::new(FakeModel::replying(response));
        let result = detector(model).detect_on("https://x.example", "content", &context(), today()).await;
        assert_eq!(result.issue_count, 1);
        assert_eq!(result.issues[0].description, "Rate outdated");
    }
}

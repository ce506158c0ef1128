// Analysis Run Pipeline
// Runs extraction + detection over a batch of URLs with partial-failure
// isolation, bounded concurrency and cooperative cancellation.

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::models::{AnalysisRun, DomainContext, PageResult, RunStatus, FAILED_PAGE_TITLE};

use super::detection::StaleContentDetector;
use super::extractor::PageExtractor;

pub const MAX_URLS_PER_RUN: usize = 20;
pub const CANCELLED_MESSAGE: &str = "Analysis cancelled";

#[derive(Error, Debug, PartialEq)]
pub enum PipelineError {
    #[error("at least one URL is required")]
    NoUrls,
    #[error("too many URLs: {0} (max {MAX_URLS_PER_RUN})")]
    TooManyUrls(usize),
    #[error("URL #{0} is blank")]
    BlankUrl(usize),
}

/// Validate and trim the submitted URL list.
pub fn validate_urls(urls: &[String]) -> Result<Vec<String>, PipelineError> {
    if urls.is_empty() {
        return Err(PipelineError::NoUrls);
    }
    if urls.len() > MAX_URLS_PER_RUN {
        return Err(PipelineError::TooManyUrls(urls.len()));
    }
    urls.iter()
        .enumerate()
        .map(|(idx, url)| {
            let trimmed = url.trim();
            if trimmed.is_empty() {
                Err(PipelineError::BlankUrl(idx + 1))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

/// Sender half: flips the batch into cancelled state.
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

/// Receiver half, cloned into every page task.
#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = cancel_pair();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested. Pending forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub struct AnalysisPipeline {
    extractor: Arc<dyn PageExtractor>,
    detector: Arc<StaleContentDetector>,
    max_concurrency: usize,
}

impl AnalysisPipeline {
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        detector: Arc<StaleContentDetector>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            extractor,
            detector,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Analyze every URL and return the run in a terminal state. One result
    /// entry per URL, in submission order, whatever happens to each page.
    pub async fn run(
        &self,
        urls: &[String],
        domain_context: DomainContext,
        cancel: CancelSignal,
    ) -> Result<AnalysisRun, PipelineError> {
        let urls = validate_urls(urls)?;
        let mut run = AnalysisRun::start(&urls, domain_context);
        let started = Instant::now();
        info!(
            "[PIPELINE] run {} started urls={} concurrency={}",
            run.id,
            urls.len(),
            self.max_concurrency
        );

        let context = Arc::new(run.domain_context.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set: JoinSet<(usize, PageResult)> = JoinSet::new();
        let mut slots: Vec<Option<PageResult>> = vec![None; urls.len()];
        let mut gate = cancel.clone();

        for (idx, url) in urls.iter().enumerate() {
            // Pages are admitted here, in submission order: with one permit each page
            // starts only after the previous one has finished.
            let permit = tokio::select! {
                biased;
                _ = gate.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots[idx] = Some(PageResult::failed(url, FAILED_PAGE_TITLE, CANCELLED_MESSAGE));
                continue;
            };

            let extractor = self.extractor.clone();
            let detector = self.detector.clone();
            let context = context.clone();
            let mut cancel = cancel.clone();
            let url = url.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        PageResult::failed(&url, FAILED_PAGE_TITLE, CANCELLED_MESSAGE)
                    }
                    page = process_page(extractor.as_ref(), detector.as_ref(), &url, &context) => page,
                };
                (idx, result)
            });
        }

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((idx, page)) => slots[idx] = Some(page),
                Err(e) => warn!("[PIPELINE] page task failed: {}", e),
            }
        }

        let results: Vec<PageResult> = slots
            .into_iter()
            .zip(urls.iter())
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| PageResult::failed(url, FAILED_PAGE_TITLE, "Analysis task aborted"))
            })
            .collect();

        let status = if cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        run.finish(results, status);

        info!(
            "[PIPELINE] run {} {:?} total_issues={} elapsed_ms={}",
            run.id,
            run.status,
            run.total_issues,
            started.elapsed().as_millis()
        );
        Ok(run)
    }
}

/// Extraction then detection for one page. Failures stay local to the page.
pub async fn process_page(
    extractor: &dyn PageExtractor,
    detector: &StaleContentDetector,
    url: &str,
    domain_context: &DomainContext,
) -> PageResult {
    let page = match extractor.extract(url).await {
        Ok(page) => page,
        Err(e) => {
            warn!("[PIPELINE] extraction failed url={} : {}", url, e);
            return PageResult::failed(url, FAILED_PAGE_TITLE, e.to_string());
        }
    };

    let detection = detector.detect(url, &page.content, domain_context).await;
    PageResult::from_detection(url, &page, detection)
}

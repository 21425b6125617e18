use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use aeoscope_common::{
    AeoscopeError, ProgressEvent, ProgressSink, QuestionResultSet, SearchResult,
};
use serper_client::{SerperClient, SerperError};

/// Hard cap on questions per batch. Callers with more must paginate.
pub const MAX_QUESTIONS: usize = 50;

/// Results requested per question.
pub const RESULTS_PER_QUESTION: u32 = 10;

/// Provider-wide admission cap: requests per rolling one-second window.
const REQUESTS_PER_SECOND: usize = 5;

/// Deadline for one provider request. Time spent waiting for admission does
/// not count against it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Fixed delay before the single rate-limit retry.
const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_millis(1100);

// --- SearchProvider trait ---

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider signaled too many requests.
    #[error("rate limited by provider")]
    RateLimited,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Seam to the external search provider. Results may carry provider-side
/// positions; the fetcher reassigns ranks during normalization.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, num: u32) -> Result<Vec<SearchResult>, ProviderError>;
}

#[async_trait]
impl SearchProvider for SerperClient {
    async fn search(&self, query: &str, num: u32) -> Result<Vec<SearchResult>, ProviderError> {
        let organic = SerperClient::search(self, query, num)
            .await
            .map_err(|e| match e {
                SerperError::RateLimited => ProviderError::RateLimited,
                other => ProviderError::Other(anyhow::anyhow!(other)),
            })?;

        Ok(organic
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.link,
                snippet: r.snippet,
                position: 0,
            })
            .collect())
    }
}

// --- Rate limiter ---

/// Token-bucket admission control shared by all in-flight fetches.
///
/// A permit is held for the full window after admission, so at most
/// `per_window` requests start within any rolling window. The budget is
/// provider-wide: one limiter instance is shared across every fetch task,
/// never one per task.
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(per_window: usize, window: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(per_window)),
            window,
        }
    }

    /// Wait for admission into the current window.
    pub async fn admit(&self) {
        // The semaphore is never closed, so acquire cannot fail.
        if let Ok(permit) = self.permits.clone().acquire_owned().await {
            let window = self.window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                drop(permit);
            });
        }
    }
}

// --- Result fetcher ---

pub struct ResultFetcher {
    provider: Arc<dyn SearchProvider>,
    limiter: RateLimiter,
}

impl ResultFetcher {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            limiter: RateLimiter::new(REQUESTS_PER_SECOND, Duration::from_secs(1)),
        }
    }

    /// Build a fetcher backed by the Serper API. Refuses an empty key: a
    /// missing credential must fail the run up front rather than surface as
    /// an all-error result set.
    pub fn from_api_key(api_key: &str) -> Result<Self, AeoscopeError> {
        if api_key.trim().is_empty() {
            return Err(AeoscopeError::Config("search provider API key is empty".into()));
        }
        Ok(Self::new(Arc::new(SerperClient::new(api_key))))
    }

    /// Fetch ranked results for every question, concurrently, under the
    /// shared rate budget.
    ///
    /// Output order matches input order regardless of completion order. One
    /// question's failure never aborts the batch: it is recorded as that
    /// question's error and the rest proceed.
    pub async fn fetch_results(
        &self,
        questions: &[String],
        progress: &dyn ProgressSink,
    ) -> Vec<QuestionResultSet> {
        if questions.len() > MAX_QUESTIONS {
            warn!(
                requested = questions.len(),
                cap = MAX_QUESTIONS,
                "Question batch truncated"
            );
        }
        let batch = &questions[..questions.len().min(MAX_QUESTIONS)];
        let total = batch.len();
        let completed = AtomicUsize::new(0);

        info!(total, "Fetching search results");

        let tasks = batch.iter().map(|question| {
            let completed = &completed;
            async move {
                let set = self.fetch_one(question).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress.emit(&ProgressEvent::QuestionFetched {
                    completed: done,
                    total,
                    question: question.clone(),
                });
                set
            }
        });

        join_all(tasks).await
    }

    async fn fetch_one(&self, question: &str) -> QuestionResultSet {
        match self.try_fetch(question).await {
            Ok(results) => QuestionResultSet::success(question, results),
            Err(e) => {
                warn!(question, error = %e, "Question fetch failed");
                QuestionResultSet::error(question, e.to_string())
            }
        }
    }

    async fn try_fetch(&self, question: &str) -> anyhow::Result<Vec<SearchResult>> {
        self.limiter.admit().await;

        let raw = match self.search_with_timeout(question).await {
            Err(ProviderError::RateLimited) => {
                // One fixed-delay retry, then give up on this question only.
                info!(question, "Provider rate limit hit, retrying once");
                tokio::time::sleep(RATE_LIMIT_RETRY_DELAY).await;
                self.limiter.admit().await;
                self.search_with_timeout(question).await?
            }
            other => other?,
        };

        Ok(normalize(raw))
    }

    async fn search_with_timeout(
        &self,
        question: &str,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        match tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.provider.search(question, RESULTS_PER_QUESTION),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Other(anyhow::anyhow!(
                "search timed out after {}s",
                REQUEST_TIMEOUT.as_secs()
            ))),
        }
    }
}

/// Canonicalize provider results: positions are reassigned as a gap-free
/// 1-based rank in list order, whatever the provider claimed.
fn normalize(raw: Vec<SearchResult>) -> Vec<SearchResult> {
    raw.into_iter()
        .enumerate()
        .map(|(i, mut r)| {
            r.position = i as u32 + 1;
            r
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeoscope_common::{FetchStatus, NoopProgress};
    use std::sync::Mutex;

    fn result(url: &str) -> SearchResult {
        SearchResult {
            title: format!("title for {url}"),
            url: url.to_string(),
            snippet: String::new(),
            position: 99,
        }
    }

    /// Provider that fails queries containing "bad" and rate-limits the
    /// first `limited_calls` requests for queries containing "limited".
    struct FakeProvider {
        limited_calls: usize,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(limited_calls: usize) -> Self {
            Self {
                limited_calls,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for FakeProvider {
        async fn search(
            &self,
            query: &str,
            _num: u32,
        ) -> Result<Vec<SearchResult>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if query.contains("bad") {
                return Err(ProviderError::Other(anyhow::anyhow!("provider exploded")));
            }
            if query.contains("limited") && call < self.limited_calls {
                return Err(ProviderError::RateLimited);
            }
            Ok(vec![result("https://a.com"), result("https://b.com")])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_question_does_not_sink_the_batch() {
        let fetcher = ResultFetcher::new(Arc::new(FakeProvider::new(0)));
        let questions = vec![
            "good one".to_string(),
            "bad one".to_string(),
            "good two".to_string(),
        ];

        let sets = fetcher.fetch_results(&questions, &NoopProgress).await;

        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].question, "good one");
        assert_eq!(sets[1].question, "bad one");
        assert_eq!(sets[2].question, "good two");
        assert_eq!(sets[0].status, FetchStatus::Success);
        assert_eq!(sets[1].status, FetchStatus::Error);
        assert_eq!(sets[2].status, FetchStatus::Success);
        assert!(sets[1].results.is_empty());
        assert!(sets[1].error_message.as_deref().unwrap().contains("exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn positions_are_reassigned_gap_free() {
        let fetcher = ResultFetcher::new(Arc::new(FakeProvider::new(0)));
        let sets = fetcher
            .fetch_results(&["q".to_string()], &NoopProgress)
            .await;

        let positions: Vec<u32> = sets[0].results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_is_capped_at_max_questions() {
        let fetcher = ResultFetcher::new(Arc::new(FakeProvider::new(0)));
        let questions: Vec<String> = (0..60).map(|i| format!("q{i}")).collect();

        let sets = fetcher.fetch_results(&questions, &NoopProgress).await;
        assert_eq!(sets.len(), MAX_QUESTIONS);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_once_then_succeeds() {
        let provider = Arc::new(FakeProvider::new(1));
        let fetcher = ResultFetcher::new(provider.clone());

        let sets = fetcher
            .fetch_results(&["limited q".to_string()], &NoopProgress)
            .await;

        assert_eq!(sets[0].status, FetchStatus::Success);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_gives_up_after_one_retry() {
        let provider = Arc::new(FakeProvider::new(usize::MAX));
        let fetcher = ResultFetcher::new(provider.clone());

        let sets = fetcher
            .fetch_results(&["limited q".to_string()], &NoopProgress)
            .await;

        assert_eq!(sets[0].status, FetchStatus::Error);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reports_every_completion() {
        struct Collector(Mutex<Vec<ProgressEvent>>);
        impl ProgressSink for Collector {
            fn emit(&self, event: &ProgressEvent) {
                self.0.lock().unwrap().push(event.clone());
            }
        }

        let fetcher = ResultFetcher::new(Arc::new(FakeProvider::new(0)));
        let sink = Collector(Mutex::new(Vec::new()));
        let questions = vec!["a".to_string(), "b".to_string()];

        fetcher.fetch_results(&questions, &sink).await;

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        let totals: Vec<usize> = events
            .iter()
            .map(|e| match e {
                ProgressEvent::QuestionFetched { total, .. } => *total,
                _ => panic!("unexpected event"),
            })
            .collect();
        assert_eq!(totals, vec![2, 2]);
    }

    #[test]
    fn empty_api_key_is_refused() {
        assert!(ResultFetcher::from_api_key("  ").is_err());
        assert!(ResultFetcher::from_api_key("key").is_ok());
    }

    #[test]
    fn normalize_overrides_provider_positions() {
        let raw = vec![result("https://x.com"), result("https://y.com")];
        let normalized = normalize(raw);
        assert_eq!(normalized[0].position, 1);
        assert_eq!(normalized[1].position, 2);
    }
}

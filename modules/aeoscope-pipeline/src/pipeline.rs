use std::sync::Arc;

use tracing::info;

use aeoscope_common::{
    AeoscopeError, Config, ProgressEvent, ProgressSink, VisibilityScore,
};

use crate::classifier::{build_url_records, ClaudeBucketModel, UrlClassifier};
use crate::fetcher::ResultFetcher;
use crate::scorer;

/// End-to-end visibility pipeline: fetch SERPs for every question, classify
/// the URLs that appear, score the classified results.
///
/// Per-question fetch failures and model batch failures are absorbed along
/// the way; once constructed, a run always produces a best-effort
/// `VisibilityScore`.
pub struct VisibilityPipeline {
    fetcher: ResultFetcher,
    classifier: UrlClassifier,
}

impl VisibilityPipeline {
    /// Construct from configuration. Fails fast on missing credentials
    /// before any work starts.
    pub fn new(config: &Config) -> Result<Self, AeoscopeError> {
        if config.anthropic_api_key.trim().is_empty() {
            return Err(AeoscopeError::Config(
                "classification model API key is empty".into(),
            ));
        }
        Ok(Self {
            fetcher: ResultFetcher::from_api_key(&config.serper_api_key)?,
            classifier: UrlClassifier::new(Arc::new(ClaudeBucketModel::new(
                &config.anthropic_api_key,
                &config.claude_model,
            ))),
        })
    }

    /// Assemble from explicit stage implementations. Used by tests and by
    /// callers bringing their own provider or model.
    pub fn from_parts(fetcher: ResultFetcher, classifier: UrlClassifier) -> Self {
        Self { fetcher, classifier }
    }

    pub async fn run(
        &self,
        questions: &[String],
        target_domain: &str,
        progress: &dyn ProgressSink,
    ) -> VisibilityScore {
        info!(
            questions = questions.len(),
            target_domain, "Visibility pipeline starting"
        );

        progress.emit(&ProgressEvent::Stage {
            stage: 1,
            total_stages: 3,
            message: "Fetching search results".into(),
        });
        let result_sets = self.fetcher.fetch_results(questions, progress).await;

        progress.emit(&ProgressEvent::Stage {
            stage: 2,
            total_stages: 3,
            message: "Classifying URLs".into(),
        });
        let records = build_url_records(&result_sets);
        let classifications = self
            .classifier
            .classify(&records, target_domain, progress)
            .await;

        progress.emit(&ProgressEvent::Stage {
            stage: 3,
            total_stages: 3,
            message: "Scoring visibility".into(),
        });
        let report = scorer::score(&result_sets, &classifications, target_domain);

        info!(overall = report.overall, "Visibility pipeline complete");
        report
    }
}

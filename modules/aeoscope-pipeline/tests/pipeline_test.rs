//! Full-pipeline runs against mocked provider and model seams.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use aeoscope_common::{
    Bucket, Config, NoopProgress, ProgressEvent, ProgressSink, SearchResult,
};
use aeoscope_pipeline::{
    BucketModel, ProviderError, ResultFetcher, SearchProvider, UrlClassifier, VisibilityPipeline,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn result(url: &str, title: &str) -> SearchResult {
    SearchResult {
        title: title.to_string(),
        url: url.to_string(),
        snippet: format!("snippet for {url}"),
        position: 0,
    }
}

/// Deterministic provider: fixed results per question, one failing question.
struct ScriptedProvider;

#[async_trait]
impl SearchProvider for ScriptedProvider {
    async fn search(&self, query: &str, _num: u32) -> Result<Vec<SearchResult>, ProviderError> {
        match query {
            "what is acme.com" => Ok(vec![
                result("https://acme.com/about", "About Acme"),
                result("https://reddit.com/r/x", "Acme discussion"),
            ]),
            "best project tools" => Ok(vec![
                result("https://other.com", "Ten great tools"),
                result("https://review-site.com/acme", "Acme reviewed"),
            ]),
            "broken question" => {
                Err(ProviderError::Other(anyhow::anyhow!("provider unavailable")))
            }
            _ => Ok(vec![]),
        }
    }
}

/// Deterministic model: everything it sees is earned.
struct EarnedModel;

#[async_trait]
impl BucketModel for EarnedModel {
    async fn classify_batch(&self, prompt: &str) -> anyhow::Result<String> {
        let verdicts: Vec<String> = prompt
            .lines()
            .filter_map(|line| line.split_once(". ").map(|(_, url)| url))
            .map(|url| format!("{{\"url\": \"{url}\", \"bucket\": \"earned\"}}"))
            .collect();
        Ok(format!("[{}]", verdicts.join(",")))
    }
}

struct CollectingSink(Mutex<Vec<ProgressEvent>>);

impl ProgressSink for CollectingSink {
    fn emit(&self, event: &ProgressEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

fn pipeline() -> VisibilityPipeline {
    VisibilityPipeline::from_parts(
        ResultFetcher::new(Arc::new(ScriptedProvider)),
        UrlClassifier::new(Arc::new(EarnedModel)),
    )
}

fn questions() -> Vec<String> {
    vec![
        "what is acme.com".to_string(),
        "best project tools".to_string(),
        "broken question".to_string(),
    ]
}

#[tokio::test(start_paused = true)]
async fn full_run_produces_best_effort_score_under_partial_failure() {
    init_tracing();

    let report = pipeline()
        .run(&questions(), "acme.com", &NoopProgress)
        .await;

    // Three questions in, three question scores out, failing one included.
    assert_eq!(report.question_breakdown.len(), 3);
    assert_eq!(report.question_breakdown[2].owned_count, 0);
    assert_eq!(report.question_breakdown[2].earned_count, 0);

    // acme.com/about is owned; one of two questions has owned top-5.
    assert!((report.owned_coverage - 1.0 / 3.0).abs() < 1e-9);
    assert!(report.overall >= 20.0 && report.overall <= 95.0);
}

#[tokio::test(start_paused = true)]
async fn two_identical_runs_produce_identical_reports() {
    let a = pipeline()
        .run(&questions(), "acme.com", &NoopProgress)
        .await;
    let b = pipeline()
        .run(&questions(), "acme.com", &NoopProgress)
        .await;

    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn progress_events_cover_all_stages() {
    let sink = CollectingSink(Mutex::new(Vec::new()));

    pipeline().run(&questions(), "acme.com", &sink).await;

    let events = sink.0.lock().unwrap();
    let stages: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Stage { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(stages, vec![1, 2, 3]);

    let fetched = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::QuestionFetched { .. }))
        .count();
    assert_eq!(fetched, 3);
}

#[tokio::test(start_paused = true)]
async fn model_verdicts_reach_the_report() {
    let report = pipeline()
        .run(&questions(), "acme.com", &NoopProgress)
        .await;

    // review-site.com was ambiguous; the model marked it earned.
    let q2 = &report.question_breakdown[1];
    assert_eq!(q2.owned_count, 0);
    assert_eq!(q2.earned_count, 2);
    assert_eq!(report.question_breakdown[0].owned_count, 1);
    assert_eq!(Bucket::Owned, report.top_content[0].bucket);
}

#[test]
fn missing_credentials_refuse_construction() {
    let config = Config {
        serper_api_key: String::new(),
        anthropic_api_key: "key".to_string(),
        claude_model: "model".to_string(),
    };
    assert!(VisibilityPipeline::new(&config).is_err());

    let config = Config {
        serper_api_key: "key".to_string(),
        anthropic_api_key: "  ".to_string(),
        claude_model: "model".to_string(),
    };
    assert!(VisibilityPipeline::new(&config).is_err());

    let config = Config {
        serper_api_key: "key".to_string(),
        anthropic_api_key: "key".to_string(),
        claude_model: "model".to_string(),
    };
    assert!(VisibilityPipeline::new(&config).is_ok());
}

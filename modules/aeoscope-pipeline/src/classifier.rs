use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use aeoscope_common::{
    brand_token, extract_domain, is_owned_host, root_domain, Bucket, Classification,
    ProgressEvent, ProgressSink, QuestionResultSet, UrlRecord,
};
use ai_client::util::strip_code_blocks;
use ai_client::Claude;

/// Max URLs per model review batch.
const MAX_BATCH_SIZE: usize = 50;

/// Hard deadline for one model batch call. A slow call degrades the batch to
/// its rule verdicts; it never blocks the pipeline.
const MODEL_TIMEOUT: Duration = Duration::from_secs(20);

/// Rule verdicts at or above this confidence are accepted without review.
const REVIEW_THRESHOLD: f64 = 0.8;

const CLASSIFY_SYSTEM: &str = "\
You classify URLs by their relationship to a target company's domain.\n\n\
owned: pages on the company's own domain or its subdomains.\n\
operated: channels the company controls but does not own outright: official \
social profiles, app store listings, package registry pages, directory \
listings it maintains.\n\
earned: independent third-party coverage: press, reviews, forums, blogs, \
aggregators.\n\n\
Respond with a JSON array only, one object per input URL, in input order:\n\
[{\"url\": \"...\", \"bucket\": \"owned|operated|earned\"}]\n\
No prose, no markdown fences.";

// --- URL record construction ---

/// Merge all results sharing a URL across questions into one record.
///
/// Classification is per-URL, not per-(question, URL): ownership of a page
/// does not depend on which question surfaced it. Record order follows first
/// appearance, so the output is deterministic for a fixed input.
pub fn build_url_records(sets: &[QuestionResultSet]) -> Vec<UrlRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut by_url: HashMap<String, UrlRecord> = HashMap::new();

    for set in sets {
        for result in &set.results {
            if result.url.is_empty() {
                continue;
            }
            let record = by_url.entry(result.url.clone()).or_insert_with(|| {
                order.push(result.url.clone());
                UrlRecord {
                    url: result.url.clone(),
                    best_title: String::new(),
                    best_snippet: String::new(),
                    source_questions: BTreeSet::new(),
                }
            });
            if result.title.len() > record.best_title.len() {
                record.best_title = result.title.clone();
            }
            if result.snippet.len() > record.best_snippet.len() {
                record.best_snippet = result.snippet.clone();
            }
            record.source_questions.insert(set.question.clone());
        }
    }

    order
        .into_iter()
        .filter_map(|url| by_url.remove(&url))
        .collect()
}

// --- Model seam ---

/// Seam to the language model used for ambiguous URLs. Production wraps
/// Claude; tests substitute deterministic or erroring models.
#[async_trait]
pub trait BucketModel: Send + Sync {
    async fn classify_batch(&self, prompt: &str) -> anyhow::Result<String>;
}

pub struct ClaudeBucketModel {
    claude: Claude,
}

impl ClaudeBucketModel {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            claude: Claude::new(api_key, model),
        }
    }
}

#[async_trait]
impl BucketModel for ClaudeBucketModel {
    async fn classify_batch(&self, prompt: &str) -> anyhow::Result<String> {
        self.claude.chat_completion(CLASSIFY_SYSTEM, prompt).await
    }
}

// --- Rule stage ---

/// Classifier-internal verdict. Confidence never leaves this module; the
/// final `Classification` carries bucket and reasoning only.
#[derive(Debug, Clone)]
struct RuleVerdict {
    bucket: Bucket,
    confidence: f64,
    reasoning: String,
}

fn rule_classify(record: &UrlRecord, root: &str, brand: &str) -> RuleVerdict {
    let host = extract_domain(&record.url);

    if is_owned_host(&host, root) {
        return RuleVerdict {
            bucket: Bucket::Owned,
            confidence: 0.95,
            reasoning: format!("host {host} is {root} or a subdomain of it"),
        };
    }

    if let Some(shape) = operated_profile_shape(&record.url, &host, brand) {
        return RuleVerdict {
            bucket: Bucket::Operated,
            confidence: 0.85,
            reasoning: format!("official {shape} profile for {brand}"),
        };
    }

    if has_brand_title(&record.best_title, brand) {
        return RuleVerdict {
            bucket: Bucket::Operated,
            confidence: 0.7,
            reasoning: format!("title carries the {brand} brand prefix"),
        };
    }

    RuleVerdict {
        bucket: Bucket::Earned,
        confidence: 0.5,
        reasoning: "no ownership signal, assumed third-party".to_string(),
    }
}

/// Official-profile URL shapes a company operates without owning the host,
/// keyed off the brand token so only the target's own profiles match.
fn operated_profile_shape(url: &str, host: &str, brand: &str) -> Option<&'static str> {
    if brand.is_empty() {
        return None;
    }
    let url = url.to_lowercase();
    let contains = |needle: String| url.contains(&needle);

    match host.strip_prefix("www.").unwrap_or(host) {
        "linkedin.com" if contains(format!("/company/{brand}")) => Some("LinkedIn company"),
        "github.com" if contains(format!("github.com/{brand}")) => Some("GitHub"),
        "x.com" | "twitter.com" if contains(format!(".com/{brand}")) => Some("X/Twitter"),
        "facebook.com" if contains(format!("facebook.com/{brand}")) => Some("Facebook"),
        "instagram.com" if contains(format!("instagram.com/{brand}")) => Some("Instagram"),
        "youtube.com" if contains(format!("/@{brand}")) || contains(format!("/c/{brand}")) => {
            Some("YouTube")
        }
        "apps.apple.com" if contains(brand.to_string()) => Some("App Store"),
        "play.google.com" if contains(brand.to_string()) => Some("Play Store"),
        "npmjs.com" if contains(format!("/package/{brand}")) => Some("npm registry"),
        "pypi.org" if contains(format!("/project/{brand}")) => Some("PyPI"),
        "crates.io" if contains(format!("/crates/{brand}")) => Some("crates.io"),
        _ => None,
    }
}

/// "{Brand} - ..." and "{Brand} | ..." titles are a weak operated signal:
/// directory listings and profile pages the company fills in itself.
fn has_brand_title(title: &str, brand: &str) -> bool {
    if brand.is_empty() {
        return false;
    }
    let t = title.to_lowercase();
    t.starts_with(&format!("{brand} -")) || t.starts_with(&format!("{brand} |"))
}

// --- Classifier ---

pub struct UrlClassifier {
    model: Arc<dyn BucketModel>,
}

impl UrlClassifier {
    pub fn new(model: Arc<dyn BucketModel>) -> Self {
        Self { model }
    }

    /// Classify every record against the target domain.
    ///
    /// Output is positionally aligned with the input and always complete:
    /// records the rules resolve confidently never reach the model, and a
    /// failed model batch keeps its rule verdicts rather than leaving gaps.
    pub async fn classify(
        &self,
        records: &[UrlRecord],
        target_domain: &str,
        progress: &dyn ProgressSink,
    ) -> Vec<Classification> {
        let root = root_domain(target_domain);
        let brand = brand_token(&root);

        let verdicts: Vec<RuleVerdict> = records
            .iter()
            .map(|r| rule_classify(r, &root, &brand))
            .collect();

        let review: Vec<usize> = verdicts
            .iter()
            .enumerate()
            .filter(|(_, v)| v.confidence < REVIEW_THRESHOLD)
            .map(|(i, _)| i)
            .collect();

        info!(
            total = records.len(),
            needs_review = review.len(),
            "Rule classification pass complete"
        );

        let mut finals: Vec<(Bucket, String)> = verdicts
            .into_iter()
            .map(|v| (v.bucket, v.reasoning))
            .collect();

        let total_batches = review.len().div_ceil(MAX_BATCH_SIZE);
        for (batch_no, chunk) in review.chunks(MAX_BATCH_SIZE).enumerate() {
            progress.emit(&ProgressEvent::ClassificationBatch {
                batch: batch_no + 1,
                total_batches,
                urls: chunk.len(),
            });

            let urls: Vec<&str> = chunk.iter().map(|&i| records[i].url.as_str()).collect();
            match self.review_batch(&urls, &root).await {
                Ok(buckets) => {
                    for (&i, bucket) in chunk.iter().zip(buckets) {
                        finals[i] = (bucket, format!("model review against {root}"));
                    }
                }
                Err(e) => {
                    // Fail-safe: the whole batch degrades to rule verdicts.
                    warn!(
                        batch = batch_no + 1,
                        error = %e,
                        "Model batch failed, keeping rule verdicts"
                    );
                }
            }
        }

        records
            .iter()
            .zip(finals)
            .map(|(record, (bucket, reasoning))| Classification {
                url: record.url.clone(),
                bucket,
                reasoning,
            })
            .collect()
    }

    async fn review_batch(&self, urls: &[&str], root: &str) -> anyhow::Result<Vec<Bucket>> {
        // URLs only: titles and snippets would inflate token cost without
        // changing the verdict for ambiguous hosts.
        let list = urls
            .iter()
            .enumerate()
            .map(|(i, url)| format!("{}. {url}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!("Target domain: {root}\n\nURLs:\n{list}");

        let raw = tokio::time::timeout(MODEL_TIMEOUT, self.model.classify_batch(&prompt))
            .await
            .map_err(|_| {
                anyhow::anyhow!("model call timed out after {}s", MODEL_TIMEOUT.as_secs())
            })??;

        parse_batch_response(&raw, urls.len())
    }
}

/// Defensively repair and parse a model batch response.
///
/// Accepts fenced or prose-wrapped output: fences are stripped, then the
/// outermost bracket pair is taken. The payload must be a JSON array with
/// one item per input URL; each item's bucket is matched by substring and
/// anything unrecognized defaults to Earned.
fn parse_batch_response(raw: &str, expected: usize) -> anyhow::Result<Vec<Bucket>> {
    let cleaned = strip_code_blocks(raw);
    let start = cleaned
        .find('[')
        .ok_or_else(|| anyhow::anyhow!("no JSON array in model response"))?;
    let end = cleaned
        .rfind(']')
        .ok_or_else(|| anyhow::anyhow!("unterminated JSON array in model response"))?;
    if end < start {
        anyhow::bail!("malformed JSON array in model response");
    }

    let value: serde_json::Value = serde_json::from_str(&cleaned[start..=end])?;
    let items = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("model response is not a JSON array"))?;
    if items.len() != expected {
        anyhow::bail!(
            "model returned {} verdicts for {} URLs",
            items.len(),
            expected
        );
    }

    Ok(items
        .iter()
        .map(|item| {
            let bucket = item.get("bucket").and_then(|b| b.as_str()).unwrap_or("");
            parse_bucket(bucket)
        })
        .collect())
}

/// Case-insensitive substring match; anything ambiguous is Earned.
fn parse_bucket(s: &str) -> Bucket {
    let s = s.to_lowercase();
    if s.contains("owned") {
        Bucket::Owned
    } else if s.contains("operated") {
        Bucket::Operated
    } else {
        Bucket::Earned
    }
}

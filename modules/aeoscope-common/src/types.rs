use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// --- Search results ---

/// One organic search result as normalized by the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// 1-based rank within one question's result list. Reassigned by the
    /// fetcher regardless of what the provider reported, so ranks are
    /// monotonic and gap-free. Unique only within one question's list.
    pub position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Error,
}

/// Fetch outcome for a single question. A successful fetch may still carry
/// zero results; an errored fetch always carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResultSet {
    pub question: String,
    pub results: Vec<SearchResult>,
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl QuestionResultSet {
    pub fn success(question: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            question: question.into(),
            results,
            status: FetchStatus::Success,
            error_message: None,
        }
    }

    pub fn error(question: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            results: Vec::new(),
            status: FetchStatus::Error,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}

// --- URL records ---

/// All results sharing a URL across the whole batch, merged. The classifier
/// works per-URL, not per-(question, URL): ownership of a page does not
/// depend on which question surfaced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    pub url: String,
    /// Longest title seen for this URL across all questions.
    pub best_title: String,
    /// Longest snippet seen for this URL across all questions.
    pub best_snippet: String,
    pub source_questions: BTreeSet<String>,
}

// --- Classification ---

/// Ownership bucket for a URL relative to the target domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// The target's own domain or a subdomain of it.
    Owned,
    /// A channel the target controls but does not own outright (social
    /// profiles, app store listings, registry pages).
    Operated,
    /// Independent third-party coverage.
    Earned,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Owned => write!(f, "owned"),
            Bucket::Operated => write!(f, "operated"),
            Bucket::Earned => write!(f, "earned"),
        }
    }
}

/// Final verdict for one URL. Produced exactly once per `UrlRecord`; the
/// classifier's internal confidence value is never exposed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub url: String,
    pub bucket: Bucket,
    pub reasoning: String,
}

// --- Scoring ---

/// Per-question derived metrics. Computed purely from one result set plus
/// the classification map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionScore {
    pub question: String,
    /// Brand/company-specific question, as opposed to generic/competitive.
    pub is_direct: bool,
    pub owned_count: u32,
    pub operated_count: u32,
    pub earned_count: u32,
    pub owned_positions: Vec<u32>,
    pub operated_positions: Vec<u32>,
    pub coverage_score: f64,
    pub voice_score: f64,
}

/// Result counts by rank band. Diagnostic display only; does not feed the
/// composite score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionBreakdown {
    /// Position 1.
    pub top1: u32,
    /// Positions 2-3.
    pub top3: u32,
    /// Positions 4-10.
    pub top10: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibilityMetrics {
    pub owned_results: u32,
    pub operated_results: u32,
    pub earned_results: u32,
    /// 0.0 when there are no owned results.
    pub avg_owned_position: f64,
    /// 0.0 when there are no operated results.
    pub avg_operated_position: f64,
    /// Questions with an owned result in the top 3.
    pub top3_owned_questions: u32,
    pub owned_breakdown: PositionBreakdown,
    pub operated_breakdown: PositionBreakdown,
}

/// A page worth surfacing in reports: owned before operated, richer titles
/// first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopContent {
    pub url: String,
    pub bucket: Bucket,
    pub title: String,
}

/// The terminal pipeline artifact. Immutable once returned; a new run
/// produces an entirely new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibilityScore {
    /// Composite 0-100 score, clamped to a floor of 20 and a ceiling tiered
    /// on direct-question coverage.
    pub overall: f64,
    pub brand_score: f64,
    pub competitive_score: f64,
    /// Fraction of questions with an owned result in the top 5.
    pub owned_coverage: f64,
    /// Fraction of questions with an operated result in the top 5.
    pub operated_coverage: f64,
    /// Fraction of questions with either in the top 5.
    pub total_coverage: f64,
    pub share_of_voice: f64,
    pub metrics: VisibilityMetrics,
    pub top_content: Vec<TopContent>,
    pub question_breakdown: Vec<QuestionScore>,
}

// --- Domain helpers ---

/// Extract the host portion of a URL, lowercased. Tolerates bare hosts and
/// strips any port.
pub fn extract_domain(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// Normalize a configured target domain down to its root: strips scheme,
/// path, port, and a leading `www.`.
pub fn root_domain(target: &str) -> String {
    let host = extract_domain(target.trim());
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// Brand token: the first label of the root domain ("acme" for "acme.com").
pub fn brand_token(root: &str) -> String {
    root.split('.').next().unwrap_or(root).to_string()
}

/// True if `host` is the root domain itself or any subdomain of it.
pub fn is_owned_host(host: &str, root: &str) -> bool {
    if root.is_empty() {
        return false;
    }
    let host = host.strip_prefix("www.").unwrap_or(host);
    host == root || host.ends_with(&format!(".{root}"))
}

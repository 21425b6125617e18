//! Visibility scoring. Pure functions only: no I/O, no clocks, no
//! randomness, so a fixed input always produces an identical report.

use std::collections::HashMap;

use regex::Regex;

use aeoscope_common::{
    brand_token, root_domain, Bucket, Classification, PositionBreakdown, QuestionResultSet,
    QuestionScore, TopContent, VisibilityMetrics, VisibilityScore,
};

/// Weight applied to brand (direct) questions: a healthy brand is expected
/// to dominate its own branded queries.
const DIRECT_WEIGHT: f64 = 1.2;
const INDIRECT_WEIGHT: f64 = 1.0;

/// Composite mix.
const BRAND_MIX: f64 = 0.7;
const COMPETITIVE_MIX: f64 = 0.1;
const VOICE_MIX: f64 = 0.15;

/// A small noisy sample must not read as total invisibility.
const SCORE_FLOOR: f64 = 20.0;

/// Attention window for the share-of-voice denominator. Questions with
/// fewer results get a smaller denominator, which inflates their voice
/// contribution; that behavior is intentional and relied on downstream.
const VOICE_WINDOW: usize = 10;

/// How many owned/operated pages to surface in the report.
const TOP_CONTENT_LIMIT: usize = 5;

// --- Question kind ---

/// Direct/indirect question patterns, built per target so brand terms are
/// configuration, not hardcoded company names.
struct QuestionPatterns {
    indirect: Vec<Regex>,
    direct: Vec<Regex>,
}

impl QuestionPatterns {
    fn for_target(root: &str, brand: &str) -> Self {
        let indirect = [
            r"(?i)^(best|top|cheapest|fastest)\b",
            r"(?i)\b(alternatives?|competitors?)\b",
            r"(?i)\b(tools?|software|platforms?|apps?|services?)\s+for\b",
            r"(?i)^how\s+(do|to|can)\b",
            r"(?i)^(what|which)\s+\w+\s+(is|are)\s+the\s+(best|top)\b",
        ];
        let mut direct = vec![
            r"(?i)\bvs\.?\b".to_string(),
            r"(?i)\b(pricing|price|cost|plans?)\b".to_string(),
            r"(?i)\b(login|log\s*in|sign\s*up|account|support|docs|documentation)\b".to_string(),
        ];
        if !brand.is_empty() {
            direct.push(format!(r"(?i)\b{}\b", regex::escape(brand)));
        }
        if !root.is_empty() {
            direct.push(format!(r"(?i){}", regex::escape(root)));
        }

        Self {
            indirect: indirect
                .iter()
                .map(|p| Regex::new(p).expect("valid regex"))
                .collect(),
            direct: direct
                .iter()
                .map(|p| Regex::new(p).expect("valid regex"))
                .collect(),
        }
    }

    /// Generic patterns win even when a weak direct signal is present:
    /// "best acme alternatives" is a competitive question, not a brand one.
    fn is_direct(&self, question: &str) -> bool {
        if self.indirect.iter().any(|re| re.is_match(question)) {
            return false;
        }
        self.direct.iter().any(|re| re.is_match(question))
    }
}

// --- Per-question scoring ---

fn coverage_tier(best_position: Option<u32>, tiers: (f64, f64, f64)) -> f64 {
    match best_position {
        Some(p) if p <= 3 => tiers.0,
        Some(p) if p <= 5 => tiers.1,
        Some(p) if p <= 10 => tiers.2,
        _ => 0.0,
    }
}

fn score_question(
    set: &QuestionResultSet,
    buckets: &HashMap<&str, Bucket>,
    patterns: &QuestionPatterns,
) -> QuestionScore {
    let is_direct = patterns.is_direct(&set.question);
    let weight = if is_direct { DIRECT_WEIGHT } else { INDIRECT_WEIGHT };

    let mut owned_positions = Vec::new();
    let mut operated_positions = Vec::new();
    let mut earned_count = 0u32;

    for result in &set.results {
        // Unclassified URLs default to Earned.
        match buckets.get(result.url.as_str()).copied().unwrap_or(Bucket::Earned) {
            Bucket::Owned => owned_positions.push(result.position),
            Bucket::Operated => operated_positions.push(result.position),
            Bucket::Earned => earned_count += 1,
        }
    }

    let coverage_score = (coverage_tier(owned_positions.iter().min().copied(), (1.0, 0.8, 0.5))
        + coverage_tier(operated_positions.iter().min().copied(), (0.5, 0.4, 0.25)))
        * weight;

    // Harmonic share: position 1 is worth 1.0, position 2 half that, and so
    // on. A question with zero results contributes zero, never NaN.
    let ours: f64 = owned_positions
        .iter()
        .chain(&operated_positions)
        .map(|&p| 1.0 / p as f64)
        .sum();
    let all: f64 = set.results.iter().map(|r| 1.0 / r.position as f64).sum();
    let voice_score = if all > 0.0 { ours / all * weight } else { 0.0 };

    QuestionScore {
        question: set.question.clone(),
        is_direct,
        owned_count: owned_positions.len() as u32,
        operated_count: operated_positions.len() as u32,
        earned_count,
        owned_positions,
        operated_positions,
        coverage_score,
        voice_score,
    }
}

// --- Aggregates ---

/// Brand/competitive class score over one question class: coverage ratio
/// (owned result in the top 3) and average unweighted voice, mixed 70/30.
/// Returns (score, coverage ratio); both zero when the class is empty.
fn class_score(breakdown: &[QuestionScore], direct: bool) -> (f64, f64) {
    let class: Vec<&QuestionScore> = breakdown.iter().filter(|q| q.is_direct == direct).collect();
    if class.is_empty() {
        return (0.0, 0.0);
    }

    let covered = class
        .iter()
        .filter(|q| q.owned_positions.iter().any(|&p| p <= 3))
        .count();
    let coverage_ratio = covered as f64 / class.len() as f64;

    let weight = if direct { DIRECT_WEIGHT } else { INDIRECT_WEIGHT };
    let voice_avg =
        class.iter().map(|q| q.voice_score / weight).sum::<f64>() / class.len() as f64;

    ((coverage_ratio * 0.7 + voice_avg * 0.3) * 100.0, coverage_ratio)
}

/// Step bonus for near-total domination of branded queries.
fn excellence_bonus(direct_coverage_ratio: f64) -> f64 {
    if direct_coverage_ratio > 0.95 {
        15.0
    } else if direct_coverage_ratio > 0.90 {
        12.0
    } else if direct_coverage_ratio > 0.85 {
        8.0
    } else if direct_coverage_ratio > 0.80 {
        4.0
    } else {
        0.0
    }
}

/// Ceiling tiers mirror the bonus tiers: the composite can only read
/// near-perfect when brand coverage is near-total.
fn score_ceiling(direct_coverage_ratio: f64) -> f64 {
    if direct_coverage_ratio > 0.95 {
        95.0
    } else if direct_coverage_ratio > 0.90 {
        90.0
    } else if direct_coverage_ratio > 0.85 {
        85.0
    } else {
        80.0
    }
}

fn tally(breakdown: &mut PositionBreakdown, position: u32) {
    match position {
        1 => breakdown.top1 += 1,
        2..=3 => breakdown.top3 += 1,
        4..=10 => breakdown.top10 += 1,
        _ => {}
    }
}

fn build_metrics(breakdown: &[QuestionScore]) -> VisibilityMetrics {
    let mut owned_breakdown = PositionBreakdown::default();
    let mut operated_breakdown = PositionBreakdown::default();
    let mut owned_positions: Vec<u32> = Vec::new();
    let mut operated_positions: Vec<u32> = Vec::new();
    let mut earned_results = 0u32;
    let mut top3_owned_questions = 0u32;

    for q in breakdown {
        if q.owned_positions.iter().any(|&p| p <= 3) {
            top3_owned_questions += 1;
        }
        for &p in &q.owned_positions {
            tally(&mut owned_breakdown, p);
        }
        for &p in &q.operated_positions {
            tally(&mut operated_breakdown, p);
        }
        owned_positions.extend(&q.owned_positions);
        operated_positions.extend(&q.operated_positions);
        earned_results += q.earned_count;
    }

    let avg = |positions: &[u32]| {
        if positions.is_empty() {
            0.0
        } else {
            positions.iter().sum::<u32>() as f64 / positions.len() as f64
        }
    };

    VisibilityMetrics {
        owned_results: owned_positions.len() as u32,
        operated_results: operated_positions.len() as u32,
        earned_results,
        avg_owned_position: avg(&owned_positions),
        avg_operated_position: avg(&operated_positions),
        top3_owned_questions,
        owned_breakdown,
        operated_breakdown,
    }
}

/// Owned/operated pages worth surfacing: owned before operated, then longer
/// titles first as a crude content-richness proxy.
fn top_content(
    sets: &[QuestionResultSet],
    classifications: &[Classification],
) -> Vec<TopContent> {
    let mut best_title: HashMap<&str, &str> = HashMap::new();
    for set in sets {
        for result in &set.results {
            let entry = best_title.entry(result.url.as_str()).or_insert("");
            if result.title.len() > entry.len() {
                *entry = result.title.as_str();
            }
        }
    }

    let mut picks: Vec<TopContent> = classifications
        .iter()
        .filter(|c| matches!(c.bucket, Bucket::Owned | Bucket::Operated))
        .map(|c| TopContent {
            url: c.url.clone(),
            bucket: c.bucket,
            title: best_title
                .get(c.url.as_str())
                .copied()
                .unwrap_or("")
                .to_string(),
        })
        .collect();

    // Stable sort: ties keep classification order, so output is
    // deterministic for a fixed input.
    picks.sort_by(|a, b| {
        a.bucket
            .cmp(&b.bucket)
            .then(b.title.len().cmp(&a.title.len()))
    });
    picks.truncate(TOP_CONTENT_LIMIT);
    picks
}

/// Compute the full visibility report from fetched result sets and the URL
/// classification map.
pub fn score(
    sets: &[QuestionResultSet],
    classifications: &[Classification],
    target_domain: &str,
) -> VisibilityScore {
    let root = root_domain(target_domain);
    let brand = brand_token(&root);
    let patterns = QuestionPatterns::for_target(&root, &brand);

    let buckets: HashMap<&str, Bucket> = classifications
        .iter()
        .map(|c| (c.url.as_str(), c.bucket))
        .collect();

    let breakdown: Vec<QuestionScore> = sets
        .iter()
        .map(|set| score_question(set, &buckets, &patterns))
        .collect();

    let total_questions = breakdown.len();
    let ratio = |count: usize| {
        if total_questions > 0 {
            count as f64 / total_questions as f64
        } else {
            0.0
        }
    };

    // Coverage ratios are plain fractions over all questions, independent
    // of the weighted per-question coverage feeding the composite.
    let owned_coverage = ratio(
        breakdown
            .iter()
            .filter(|q| q.owned_positions.iter().any(|&p| p <= 5))
            .count(),
    );
    let operated_coverage = ratio(
        breakdown
            .iter()
            .filter(|q| q.operated_positions.iter().any(|&p| p <= 5))
            .count(),
    );
    let total_coverage = ratio(
        breakdown
            .iter()
            .filter(|q| {
                q.owned_positions
                    .iter()
                    .chain(&q.operated_positions)
                    .any(|&p| p <= 5)
            })
            .count(),
    );

    // Share of voice against a top-10 attention budget per question.
    let mut voice_num = 0.0;
    let mut voice_den = 0.0;
    for (set, q) in sets.iter().zip(&breakdown) {
        voice_num += q
            .owned_positions
            .iter()
            .chain(&q.operated_positions)
            .map(|&p| 1.0 / p as f64)
            .sum::<f64>();
        let window = set.results.len().min(VOICE_WINDOW);
        voice_den += (1..=window).map(|p| 1.0 / p as f64).sum::<f64>();
    }
    let share_of_voice = if voice_den > 0.0 {
        voice_num / voice_den
    } else {
        0.0
    };

    let (brand_score, direct_coverage_ratio) = class_score(&breakdown, true);
    let (competitive_score, _) = class_score(&breakdown, false);

    let with_presence = breakdown
        .iter()
        .filter(|q| q.owned_count + q.operated_count > 0)
        .count();
    let consistency_bonus = ratio(with_presence) * 5.0;

    let raw = BRAND_MIX * brand_score
        + COMPETITIVE_MIX * competitive_score
        + VOICE_MIX * share_of_voice * 100.0
        + consistency_bonus
        + excellence_bonus(direct_coverage_ratio);

    let overall = raw.clamp(SCORE_FLOOR, score_ceiling(direct_coverage_ratio));

    VisibilityScore {
        overall,
        brand_score,
        competitive_score,
        owned_coverage,
        operated_coverage,
        total_coverage,
        share_of_voice,
        metrics: build_metrics(&breakdown),
        top_content: top_content(sets, classifications),
        question_breakdown: breakdown,
    }
}

//! Source acquisition recommendations.
//!
//! Scores candidate sources from a static, immutable catalog against the
//! corpus's current topic coverage and a target topic list:
//!
//! ```text
//! score = 30 × gap topics the candidate fills
//!       + impact weight (very_high 25, high 15, medium 8, low 3)
//!       − 5 × candidate topics already well covered
//! ```
//! floored at zero. A topic is a *gap* when its chunk count is below
//! [`WELL_COVERED_THRESHOLD`]; at or above it the topic counts as well
//! covered and contributes redundancy instead.
//!
//! The catalog is injected configuration — a compiled-in default ships for
//! deployments that don't override it.

use std::collections::BTreeMap;

use crate::config::CatalogEntry;

/// Chunk count at which a topic stops being a gap.
pub const WELL_COVERED_THRESHOLD: usize = 10;

const GAP_WEIGHT: i64 = 30;
const REDUNDANCY_PENALTY: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactTier {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl ImpactTier {
    pub fn weight(&self) -> i64 {
        match self {
            ImpactTier::VeryHigh => 25,
            ImpactTier::High => 15,
            ImpactTier::Medium => 8,
            ImpactTier::Low => 3,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "very_high" => Some(ImpactTier::VeryHigh),
            "high" => Some(ImpactTier::High),
            "medium" => Some(ImpactTier::Medium),
            "low" => Some(ImpactTier::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactTier::VeryHigh => "very_high",
            ImpactTier::High => "high",
            ImpactTier::Medium => "medium",
            ImpactTier::Low => "low",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogSource {
    pub source: String,
    pub topics: Vec<String>,
    pub impact: ImpactTier,
    pub complements: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub source: String,
    pub score: i64,
    pub gap_topics: Vec<String>,
    pub redundant_topics: Vec<String>,
    pub impact: ImpactTier,
    pub rationale: String,
}

pub struct RecommendationEngine {
    catalog: Vec<CatalogSource>,
}

impl RecommendationEngine {
    /// Build from config entries, falling back to the compiled-in catalog
    /// when none are provided. Entries with an unknown impact tier were
    /// rejected at config validation.
    pub fn new(entries: &[CatalogEntry]) -> Self {
        let catalog = if entries.is_empty() {
            default_catalog()
        } else {
            entries
                .iter()
                .filter_map(|e| {
                    ImpactTier::parse(&e.impact).map(|impact| CatalogSource {
                        source: e.source.clone(),
                        topics: e.topics.clone(),
                        impact,
                        complements: e.complements.clone(),
                    })
                })
                .collect()
        };
        Self { catalog }
    }

    pub fn catalog(&self) -> &[CatalogSource] {
        &self.catalog
    }

    /// Rank catalog sources against `targets`, given current per-topic
    /// chunk counts. Returns the top `limit` descending by score.
    pub fn recommend(
        &self,
        coverage: &BTreeMap<String, usize>,
        targets: &[String],
        limit: usize,
    ) -> Vec<Recommendation> {
        let mut ranked: Vec<Recommendation> = self
            .catalog
            .iter()
            .map(|candidate| score_candidate(candidate, coverage, targets))
            .collect();

        ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.source.cmp(&b.source)));
        ranked.truncate(limit);
        ranked
    }
}

fn score_candidate(
    candidate: &CatalogSource,
    coverage: &BTreeMap<String, usize>,
    targets: &[String],
) -> Recommendation {
    let gap_topics: Vec<String> = candidate
        .topics
        .iter()
        .filter(|t| targets.contains(*t))
        .filter(|t| coverage.get(*t).copied().unwrap_or(0) < WELL_COVERED_THRESHOLD)
        .cloned()
        .collect();

    let redundant_topics: Vec<String> = candidate
        .topics
        .iter()
        .filter(|t| coverage.get(*t).copied().unwrap_or(0) >= WELL_COVERED_THRESHOLD)
        .cloned()
        .collect();

    let raw = GAP_WEIGHT * gap_topics.len() as i64 + candidate.impact.weight()
        - REDUNDANCY_PENALTY * redundant_topics.len() as i64;
    let score = raw.max(0);

    let rationale = build_rationale(candidate, &gap_topics, &redundant_topics);

    Recommendation {
        source: candidate.source.clone(),
        score,
        gap_topics,
        redundant_topics,
        impact: candidate.impact,
        rationale,
    }
}

fn build_rationale(
    candidate: &CatalogSource,
    gap_topics: &[String],
    redundant_topics: &[String],
) -> String {
    let mut parts = Vec::new();

    if gap_topics.is_empty() {
        parts.push("fills no open gaps".to_string());
    } else {
        parts.push(format!(
            "fills {} gap topic(s): {}",
            gap_topics.len(),
            gap_topics.join(", ")
        ));
    }

    parts.push(format!("impact: {}", candidate.impact.as_str()));

    if !redundant_topics.is_empty() {
        parts.push(format!("already covered: {}", redundant_topics.join(", ")));
    }
    if !candidate.complements.is_empty() {
        parts.push(format!("complements: {}", candidate.complements.join(", ")));
    }

    parts.join("; ")
}

/// Compiled-in acquisition catalog.
pub fn default_catalog() -> Vec<CatalogSource> {
    fn entry(
        source: &str,
        topics: &[&str],
        impact: ImpactTier,
        complements: &[&str],
    ) -> CatalogSource {
        CatalogSource {
            source: source.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            impact,
            complements: complements.iter().map(|c| c.to_string()).collect(),
        }
    }

    vec![
        entry(
            "Thomas Mazzoni",
            &["quantitative_finance", "derivatives", "risk_management"],
            ImpactTier::VeryHigh,
            &["Ed Thorp"],
        ),
        entry(
            "Peter Lynch",
            &["behavioral_investing", "fundamental_analysis", "stock_picking"],
            ImpactTier::VeryHigh,
            &["Warren Buffett"],
        ),
        entry(
            "Warren Buffett",
            &["value_investing", "long_term_strategy", "business_analysis"],
            ImpactTier::VeryHigh,
            &["Benjamin Graham", "Peter Lynch"],
        ),
        entry(
            "Benjamin Graham",
            &["value_investing", "security_analysis", "margin_of_safety"],
            ImpactTier::VeryHigh,
            &["Warren Buffett"],
        ),
        entry(
            "Joel Greenblatt",
            &["magic_formula", "value_investing", "special_situations"],
            ImpactTier::High,
            &["Benjamin Graham"],
        ),
        entry(
            "Howard Marks",
            &["market_cycles", "risk_assessment", "contrarian_investing"],
            ImpactTier::High,
            &["Nassim Taleb"],
        ),
        entry(
            "Ray Dalio",
            &["systematic_investing", "macro_strategy", "all_weather_portfolio"],
            ImpactTier::High,
            &["David Swensen"],
        ),
        entry(
            "David Swensen",
            &["institutional_investing", "asset_allocation", "endowment_model"],
            ImpactTier::Medium,
            &["Ray Dalio", "Jack Bogle"],
        ),
        entry(
            "Ed Thorp",
            &["quantitative_trading", "probability", "kelly_criterion"],
            ImpactTier::VeryHigh,
            &["Jim Simons", "Thomas Mazzoni"],
        ),
        entry(
            "Jim Simons",
            &["algorithmic_trading", "pattern_recognition", "mathematical_models"],
            ImpactTier::High,
            &["Ed Thorp"],
        ),
        entry(
            "Jack Bogle",
            &["index_investing", "cost_efficiency", "long_term_investing"],
            ImpactTier::Medium,
            &["David Swensen"],
        ),
        entry(
            "Daniel Kahneman",
            &["behavioral_economics", "cognitive_biases", "decision_making"],
            ImpactTier::VeryHigh,
            &["Peter Lynch", "Nassim Taleb"],
        ),
        entry(
            "Nassim Taleb",
            &["black_swan_events", "antifragility", "tail_risk"],
            ImpactTier::High,
            &["Howard Marks", "Daniel Kahneman"],
        ),
    ]
}

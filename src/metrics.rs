//! Corpus-wide expansion metrics.
//!
//! Stateless aggregation over the active chunk set: how many sources and
//! chunks the corpus holds, which topics are covered and how densely, how
//! quality is distributed, and how much landed in the trailing seven days.
//! Recomputed on demand — nothing here is authoritative state.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::store::{ChunkStatRow, KnowledgeStore};

/// Trailing window considered "recent".
const RECENT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityDistribution {
    /// quality > 0.8
    pub excellent: usize,
    /// 0.6 < quality ≤ 0.8
    pub good: usize,
    /// quality ≤ 0.6
    pub average: usize,
}

impl QualityDistribution {
    pub fn total(&self) -> usize {
        self.excellent + self.good + self.average
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpansionSnapshot {
    pub total_sources: usize,
    pub total_chunks: usize,
    pub topic_coverage: BTreeMap<String, usize>,
    /// Chunk count per source ("knowledge density").
    pub source_density: BTreeMap<String, usize>,
    pub quality: QualityDistribution,
    pub recent_additions: usize,
}

/// Compute the snapshot for the current corpus. `now` is injected so
/// aggregation stays deterministic under test.
pub async fn expansion_snapshot(
    store: &KnowledgeStore,
    now: DateTime<Utc>,
) -> Result<ExpansionSnapshot> {
    let rows = store.active_chunk_rows().await?;
    Ok(aggregate(&rows, now))
}

fn aggregate(rows: &[ChunkStatRow], now: DateTime<Utc>) -> ExpansionSnapshot {
    let mut snapshot = ExpansionSnapshot {
        total_chunks: rows.len(),
        ..Default::default()
    };

    let recent_floor = (now - Duration::days(RECENT_WINDOW_DAYS)).timestamp();

    for row in rows {
        *snapshot
            .source_density
            .entry(row.source.clone())
            .or_insert(0) += 1;

        for topic in &row.topics {
            *snapshot.topic_coverage.entry(topic.clone()).or_insert(0) += 1;
        }

        if row.quality_score > 0.8 {
            snapshot.quality.excellent += 1;
        } else if row.quality_score > 0.6 {
            snapshot.quality.good += 1;
        } else {
            snapshot.quality.average += 1;
        }

        if row.created_at > recent_floor {
            snapshot.recent_additions += 1;
        }
    }

    snapshot.total_sources = snapshot.source_density.len();
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(source: &str, topics: &[&str], quality: f64, age_days: i64) -> ChunkStatRow {
        let now = Utc::now();
        ChunkStatRow {
            source: source.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            quality_score: quality,
            created_at: (now - Duration::days(age_days)).timestamp(),
        }
    }

    #[test]
    fn buckets_partition_the_corpus_exactly() {
        let rows = vec![
            row("A", &["x"], 0.95, 1),
            row("A", &["x"], 0.8, 1), // boundary: good, not excellent
            row("B", &["y"], 0.7, 1),
            row("B", &["y"], 0.6, 1), // boundary: average, not good
            row("B", &[], 0.1, 1),
        ];
        let snapshot = aggregate(&rows, Utc::now());

        assert_eq!(snapshot.quality.excellent, 1);
        assert_eq!(snapshot.quality.good, 2);
        assert_eq!(snapshot.quality.average, 2);
        assert_eq!(snapshot.quality.total(), snapshot.total_chunks);
    }

    #[test]
    fn counts_sources_topics_and_density() {
        let rows = vec![
            row("Mazzoni", &["quant", "risk"], 0.7, 1),
            row("Mazzoni", &["quant"], 0.7, 1),
            row("Lynch", &["behavioral"], 0.7, 1),
        ];
        let snapshot = aggregate(&rows, Utc::now());

        assert_eq!(snapshot.total_sources, 2);
        assert_eq!(snapshot.total_chunks, 3);
        assert_eq!(snapshot.topic_coverage["quant"], 2);
        assert_eq!(snapshot.topic_coverage["risk"], 1);
        assert_eq!(snapshot.source_density["Mazzoni"], 2);
    }

    #[test]
    fn recent_window_is_seven_days() {
        let rows = vec![
            row("A", &[], 0.5, 1),
            row("A", &[], 0.5, 6),
            row("A", &[], 0.5, 8),
            row("A", &[], 0.5, 30),
        ];
        let snapshot = aggregate(&rows, Utc::now());
        assert_eq!(snapshot.recent_additions, 2);
    }

    #[test]
    fn empty_corpus_is_all_zeroes() {
        let snapshot = aggregate(&[], Utc::now());
        assert_eq!(snapshot.total_chunks, 0);
        assert_eq!(snapshot.total_sources, 0);
        assert_eq!(snapshot.quality.total(), 0);
        assert_eq!(snapshot.recent_additions, 0);
    }
}

//! Retrieval-augmented query engine.
//!
//! Embeds the query, retrieves qualifying chunks from the vector store,
//! enforces multi-source diversity in the assembled context, and asks the
//! generative service for a synthesized answer.
//!
//! This component performs no writes and never lets a provider error escape:
//! every failure path returns a structured [`QueryOutcome`] with
//! `success = false`. A query that retrieves nothing above the similarity
//! threshold succeeds with `insufficient_context = true` instead of
//! fabricating an answer.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::inference::{ChatRequest, Reasoner};
use crate::models::SearchHit;
use crate::store::{KnowledgeStore, SearchFilter};

/// How many chunks one source contributed to the assembled context.
#[derive(Debug, Clone)]
pub struct SourceUsage {
    pub source: String,
    pub chunks_used: usize,
}

/// Structured result of a RAG query.
#[derive(Debug)]
pub struct QueryOutcome {
    pub success: bool,
    pub query: String,
    pub answer: Option<String>,
    /// Set when no candidate cleared the similarity threshold.
    pub insufficient_context: bool,
    pub sources: Vec<SourceUsage>,
    /// Distinct sources contributing to the context.
    pub source_diversity: usize,
    /// Raw candidates above the threshold before the per-source cap.
    pub candidates_considered: usize,
    pub error: Option<String>,
}

impl QueryOutcome {
    fn failure(query: &str, error: String) -> Self {
        Self {
            success: false,
            query: query.to_string(),
            answer: None,
            insufficient_context: false,
            sources: Vec::new(),
            source_diversity: 0,
            candidates_considered: 0,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    config: Arc<Config>,
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    reasoner: Arc<dyn Reasoner>,
}

impl QueryEngine {
    pub fn new(
        config: Arc<Config>,
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            reasoner,
        }
    }

    /// Answer a free-text query, optionally filtered by topic or source.
    pub async fn query(&self, text: &str, filter: Option<SearchFilter>) -> QueryOutcome {
        if text.trim().is_empty() {
            return QueryOutcome::failure(text, "empty query".into());
        }

        let query_vector = match self.embedder.embed(text).await {
            Ok(vector) => vector,
            Err(e) => return QueryOutcome::failure(text, e.to_string()),
        };

        let retrieval = &self.config.retrieval;
        let hits = match self
            .store
            .search(
                &query_vector,
                retrieval.similarity_threshold,
                retrieval.max_results,
                filter.as_ref(),
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => return QueryOutcome::failure(text, e.to_string()),
        };

        if hits.is_empty() {
            return QueryOutcome {
                success: true,
                query: text.to_string(),
                answer: None,
                insufficient_context: true,
                sources: Vec::new(),
                source_diversity: 0,
                candidates_considered: 0,
                error: None,
            };
        }

        let candidates_considered = hits.len();
        let capped = cap_per_source(&hits, retrieval.per_source_cap);
        let sources = usage_by_source(&capped);
        let context = build_context(&capped, retrieval.max_context_chars);

        let filter_label = match &filter {
            Some(SearchFilter::Topic(topic)) => topic.as_str(),
            Some(SearchFilter::Source(source)) => source.as_str(),
            None => "generalist",
        };

        let request = ChatRequest::new(
            self.config.inference.model.as_str(),
            format!(
                "You are a domain expert answering from a curated knowledge library. \
                 Combine the insights of every source in the context, cite sources by \
                 name, and keep the answer scoped to: {filter_label}.\n\n\
                 MULTI-SOURCE CONTEXT:\n{context}"
            ),
            text,
        );

        match self.reasoner.complete(&request).await {
            Ok(answer) => QueryOutcome {
                success: true,
                query: text.to_string(),
                answer: Some(answer),
                insufficient_context: false,
                source_diversity: sources.len(),
                sources,
                candidates_considered,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "answer synthesis failed");
                QueryOutcome {
                    success: false,
                    query: text.to_string(),
                    answer: None,
                    insufficient_context: false,
                    source_diversity: sources.len(),
                    sources,
                    candidates_considered,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Keep at most `cap` chunks per source, preserving overall rank order.
fn cap_per_source(hits: &[SearchHit], cap: usize) -> Vec<SearchHit> {
    let mut used: HashMap<&str, usize> = HashMap::new();
    let mut kept = Vec::new();

    for hit in hits {
        let count = used.entry(hit.source.as_str()).or_insert(0);
        if *count < cap {
            *count += 1;
            kept.push(hit.clone());
        }
    }

    kept
}

fn usage_by_source(capped: &[SearchHit]) -> Vec<SourceUsage> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for hit in capped {
        if !counts.contains_key(&hit.source) {
            order.push(hit.source.clone());
        }
        *counts.entry(hit.source.clone()).or_insert(0) += 1;
    }

    order
        .into_iter()
        .map(|source| {
            let chunks_used = counts[&source];
            SourceUsage {
                source,
                chunks_used,
            }
        })
        .collect()
}

/// Concatenate capped chunks into a bounded context, grouped by source in
/// rank order of each source's best hit.
fn build_context(capped: &[SearchHit], max_chars: usize) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut by_source: HashMap<&str, Vec<&SearchHit>> = HashMap::new();
    for hit in capped {
        if !by_source.contains_key(hit.source.as_str()) {
            order.push(hit.source.as_str());
        }
        by_source.entry(hit.source.as_str()).or_default().push(hit);
    }

    let mut context = String::new();
    for source in order {
        context.push_str(&format!("## {source}:\n"));
        for hit in &by_source[source] {
            context.push_str(&hit.text);
            context.push_str("\n\n");
        }
    }

    if context.chars().count() > max_chars {
        context = context.chars().take(max_chars).collect();
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source: &str, similarity: f64) -> SearchHit {
        SearchHit {
            chunk_id: format!("{source}-{similarity}"),
            source: source.to_string(),
            text: format!("text from {source}"),
            topics: Vec::new(),
            quality_score: 0.5,
            similarity,
        }
    }

    #[test]
    fn cap_keeps_rank_order_and_bounds_each_source() {
        // Two sources, five qualifying chunks each, interleaved by rank.
        let mut hits = Vec::new();
        for i in 0..5 {
            hits.push(hit("A", 0.99 - (i as f64) * 0.02));
            hits.push(hit("B", 0.98 - (i as f64) * 0.02));
        }

        let capped = cap_per_source(&hits, 2);
        assert_eq!(capped.len(), 4);
        assert_eq!(capped[0].source, "A");
        assert_eq!(capped[1].source, "B");
        assert_eq!(capped[2].source, "A");
        assert_eq!(capped[3].source, "B");

        // Rank order preserved within the capped list.
        for pair in capped.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn single_dominant_source_is_bounded() {
        let hits: Vec<SearchHit> = (0..7).map(|i| hit("A", 0.9 - (i as f64) * 0.01)).collect();
        let capped = cap_per_source(&hits, 2);
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn context_is_grouped_and_bounded() {
        let hits = vec![hit("A", 0.9), hit("B", 0.8), hit("A", 0.7)];
        let context = build_context(&hits, 10_000);
        assert!(context.starts_with("## A:\n"));
        assert!(context.contains("## B:\n"));

        let bounded = build_context(&hits, 12);
        assert_eq!(bounded.chars().count(), 12);
    }

    #[test]
    fn usage_counts_follow_rank_order() {
        let hits = vec![hit("A", 0.9), hit("B", 0.8), hit("A", 0.7)];
        let usage = usage_by_source(&hits);
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].source, "A");
        assert_eq!(usage[0].chunks_used, 2);
        assert_eq!(usage[1].source, "B");
        assert_eq!(usage[1].chunks_used, 1);
    }
}

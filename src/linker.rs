//! Cross-domain insight mining.
//!
//! When a knowledge block lands, the linker gathers the highest-trust blocks
//! from *other* domains and asks the reasoning service to propose
//! connections. Each proposed connection is persisted as a
//! [`CrossDomainInsight`] plus a [`ConceptRelationship`] back to the block it
//! drew on; the insight table's uniqueness constraint makes re-runs
//! idempotent.
//!
//! Linking is a best-effort background step. [`spawn_link_task`] returns the
//! `JoinHandle` so callers can await completion (tests, the CLI) or drop it
//! (ingestion hot path); either way a failure is logged, never surfaced as
//! an ingestion error.

use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LinkerConfig;
use crate::error::Result;
use crate::inference::{ChatRequest, Reasoner};
use crate::models::{clamp01, ConceptRelationship, CrossDomainInsight, KnowledgeBlock};
use crate::store::KnowledgeStore;

#[derive(Debug, Deserialize)]
struct InsightReply {
    #[serde(default)]
    insights: Vec<ProposedInsight>,
}

#[derive(Debug, Deserialize)]
struct ProposedInsight {
    secondary_domain: String,
    insight_type: String,
    description: String,
    #[serde(default = "default_strength")]
    strength: f64,
}

fn default_strength() -> f64 {
    0.5
}

const SYSTEM_PROMPT: &str = "You are a cross-domain analyst. Find meaningful connections \
between concepts from different knowledge domains. Focus on practical applications.";

fn insight_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "insights": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "secondary_domain": { "type": "string" },
                        "insight_type": { "type": "string" },
                        "description": { "type": "string" },
                        "strength": { "type": "number" }
                    },
                    "required": ["secondary_domain", "insight_type", "description", "strength"]
                }
            }
        },
        "required": ["insights"],
        "additionalProperties": false
    })
}

/// Run the linker for one block and persist its insights.
/// Returns the number of *new* insights (duplicates are suppressed).
pub async fn link_block(
    store: &KnowledgeStore,
    reasoner: &dyn Reasoner,
    config: &LinkerConfig,
    model: &str,
    block: &KnowledgeBlock,
) -> Result<usize> {
    let related = store
        .top_trusted_blocks_excluding(&block.domain, config.min_trust, config.top_n)
        .await?;

    if related.is_empty() {
        debug!(domain = block.domain.as_str(), "no high-trust blocks in other domains, skipping linker");
        return Ok(0);
    }

    let related_summary: Vec<serde_json::Value> = related
        .iter()
        .map(|b| serde_json::json!({ "domain": b.domain, "concept": b.concept }))
        .collect();

    let request = ChatRequest::new(
        model,
        SYSTEM_PROMPT,
        format!(
            "Analyze cross-domain connections for domain \"{}\" (concept \"{}\") \
             with these related concepts: {}",
            block.domain,
            block.concept,
            serde_json::Value::Array(related_summary)
        ),
    )
    .with_schema("cross_domain_analysis", insight_schema())
    .with_reasoning_effort("high");

    let content = match reasoner.complete(&request).await {
        Ok(content) => content,
        Err(e) => {
            warn!(block = block.id.as_str(), error = %e, "insight generation failed, skipping");
            return Ok(0);
        }
    };

    let reply: InsightReply = match serde_json::from_str(&content) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(block = block.id.as_str(), error = %e, "insight reply failed schema validation");
            return Ok(0);
        }
    };

    let mut inserted = 0usize;
    for proposed in reply.insights {
        let insight = CrossDomainInsight {
            id: Uuid::new_v4().to_string(),
            primary_domain: block.domain.clone(),
            secondary_domain: proposed.secondary_domain.clone(),
            insight_type: proposed.insight_type.clone(),
            description: proposed.description,
            confidence_score: clamp01(proposed.strength),
            source_block_id: block.id.clone(),
        };

        if store.insert_insight(&insight).await? {
            inserted += 1;

            // Tie the insight back to a concrete block in the secondary
            // domain when one of the retrieved blocks matches.
            if let Some(target) = related.iter().find(|b| b.domain == proposed.secondary_domain)
            {
                store
                    .insert_relationship(&ConceptRelationship {
                        source_concept_id: block.id.clone(),
                        target_concept_id: target.id.clone(),
                        relationship_type: proposed.insight_type.clone(),
                        strength: clamp01(proposed.strength),
                        validation_score: block.trust_score.min(target.trust_score),
                        discovered_by: model.to_string(),
                    })
                    .await?;
                store.record_application(&target.id).await?;
            }
        }
    }

    Ok(inserted)
}

/// Launch [`link_block`] on a background task. The handle resolves to the
/// number of new insights; errors are logged inside the task and resolve
/// to zero, so dropping the handle is always safe.
pub fn spawn_link_task(
    store: Arc<KnowledgeStore>,
    reasoner: Arc<dyn Reasoner>,
    config: LinkerConfig,
    model: String,
    block: KnowledgeBlock,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        match link_block(&store, reasoner.as_ref(), &config, &model, &block).await {
            Ok(count) => count,
            Err(e) => {
                warn!(block = block.id.as_str(), error = %e, "background linking failed");
                0
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StubReasoner;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> KnowledgeStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        KnowledgeStore::open(pool).await.unwrap()
    }

    fn insight_reply() -> String {
        serde_json::json!({
            "insights": [{
                "secondary_domain": "math",
                "insight_type": "analogy",
                "description": "diffusion models transfer to volatility",
                "strength": 0.8
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn links_against_other_domains_and_dedupes() {
        let store = memory_store().await;
        let block = store
            .insert_knowledge_block("finance", "implied volatility", None, "Mazzoni", 0.9)
            .await
            .unwrap();
        store
            .insert_knowledge_block("math", "stochastic calculus", None, "Mazzoni", 0.85)
            .await
            .unwrap();

        let reasoner = StubReasoner::canned(insight_reply());
        let config = LinkerConfig::default();

        let first = link_block(&store, &reasoner, &config, "gpt-4o", &block)
            .await
            .unwrap();
        assert_eq!(first, 1);

        // Re-running proposes the identical insight; uniqueness suppresses it.
        let second = link_block(&store, &reasoner, &config, "gpt-4o", &block)
            .await
            .unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn no_related_blocks_means_no_insights() {
        let store = memory_store().await;
        let block = store
            .insert_knowledge_block("finance", "alpha decay", None, "Lynch", 0.9)
            .await
            .unwrap();

        let reasoner = StubReasoner::canned(insight_reply());
        let count = link_block(&store, &reasoner, &LinkerConfig::default(), "gpt-4o", &block)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn provider_failure_is_swallowed() {
        let store = memory_store().await;
        let block = store
            .insert_knowledge_block("finance", "momentum", None, "Lynch", 0.9)
            .await
            .unwrap();
        store
            .insert_knowledge_block("psychology", "loss aversion", None, "Kahneman", 0.95)
            .await
            .unwrap();

        let reasoner = StubReasoner::failing();
        let count = link_block(&store, &reasoner, &LinkerConfig::default(), "gpt-4o", &block)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}

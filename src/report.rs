//! Daily intelligence report generation.
//!
//! Summarizes the corpus (expansion metrics plus the freshest cross-domain
//! insights) through the generative service and persists one report row per
//! calendar day. Provider failure degrades to a stored report with an empty
//! discovery list — the day still gets a row, and the degradation is logged.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::Result;
use crate::inference::{ChatRequest, Reasoner};
use crate::metrics;
use crate::models::clamp01;
use crate::store::KnowledgeStore;

#[derive(Debug, Clone)]
pub struct DailyReport {
    pub report_date: String,
    pub executive_summary: String,
    pub key_discoveries: Vec<String>,
    pub learning_priorities: Vec<String>,
    pub confidence_score: f64,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
struct ReportReply {
    executive_summary: String,
    #[serde(default)]
    key_discoveries: Vec<String>,
    #[serde(default)]
    learning_priorities: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence_score: f64,
}

fn default_confidence() -> f64 {
    0.8
}

const SYSTEM_PROMPT: &str = "You are an intelligence analyst generating a daily report over a \
growing knowledge corpus. Analyze learning progress and cross-domain insights, and surface \
actionable priorities.";

fn report_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "executive_summary": { "type": "string" },
            "key_discoveries": { "type": "array", "items": { "type": "string" } },
            "learning_priorities": { "type": "array", "items": { "type": "string" } },
            "confidence_score": { "type": "number" }
        },
        "required": ["executive_summary", "key_discoveries"],
        "additionalProperties": false
    })
}

/// Generate and persist the report for `now`'s calendar date.
pub async fn generate_daily_report(
    store: &KnowledgeStore,
    reasoner: &dyn Reasoner,
    model: &str,
    now: DateTime<Utc>,
) -> Result<DailyReport> {
    let snapshot = metrics::expansion_snapshot(store, now).await?;
    let insights = store.recent_insights(5).await?;
    let block_count = store.knowledge_block_count().await?;
    let report_date = now.format("%Y-%m-%d").to_string();

    let corpus_digest = serde_json::json!({
        "total_sources": snapshot.total_sources,
        "total_chunks": snapshot.total_chunks,
        "recent_additions": snapshot.recent_additions,
        "knowledge_blocks": block_count,
        "topic_coverage": snapshot.topic_coverage,
        "recent_insights": insights
            .iter()
            .map(|i| format!("{} ↔ {}: {}", i.primary_domain, i.secondary_domain, i.description))
            .collect::<Vec<_>>(),
    });

    let request = ChatRequest::new(
        model,
        SYSTEM_PROMPT,
        format!("Generate a daily intelligence report based on this data: {corpus_digest}"),
    )
    .with_schema("daily_report", report_schema())
    .with_reasoning_effort("high");

    let report = match reasoner.complete(&request).await {
        Ok(content) => match serde_json::from_str::<ReportReply>(&content) {
            Ok(reply) => DailyReport {
                report_date: report_date.clone(),
                executive_summary: reply.executive_summary,
                key_discoveries: reply.key_discoveries,
                learning_priorities: reply.learning_priorities,
                confidence_score: clamp01(reply.confidence_score),
                degraded: false,
            },
            Err(e) => {
                warn!(error = %e, "report reply failed schema validation");
                degraded_report(&report_date)
            }
        },
        Err(e) => {
            warn!(error = %e, "report generation failed");
            degraded_report(&report_date)
        }
    };

    let domains: Vec<String> = snapshot.topic_coverage.keys().cloned().collect();
    store
        .upsert_daily_report(
            &report.report_date,
            &domains,
            block_count,
            &report.key_discoveries,
            &report.executive_summary,
            report.confidence_score,
        )
        .await?;

    Ok(report)
}

fn degraded_report(report_date: &str) -> DailyReport {
    DailyReport {
        report_date: report_date.to_string(),
        executive_summary: "Report generation degraded: provider unavailable.".to_string(),
        key_discoveries: Vec::new(),
        learning_priorities: Vec::new(),
        confidence_score: 0.0,
        degraded: true,
    }
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

    #[tokio::test]
    async fn valid_reply_is_persisted() {
        let store = memory_store().await;
        let reply = serde_json::json!({
            "executive_summary": "steady growth",
            "key_discoveries": ["vol models transfer across domains"],
            "learning_priorities": ["expand tail-risk coverage"],
            "confidence_score": 1.7
        });
        let reasoner = StubReasoner::canned(reply.to_string());

        let report = generate_daily_report(&store, &reasoner, "gpt-4o", Utc::now())
            .await
            .unwrap();

        assert!(!report.degraded);
        assert_eq!(report.executive_summary, "steady growth");
        assert_eq!(report.confidence_score, 1.0); // clamped
        assert_eq!(report.key_discoveries.len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_still_stores_a_row() {
        let store = memory_store().await;
        let reasoner = StubReasoner::failing();

        let report = generate_daily_report(&store, &reasoner, "gpt-4o", Utc::now())
            .await
            .unwrap();

        assert!(report.degraded);
        assert!(report.key_discoveries.is_empty());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM daily_reports")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn rerun_replaces_the_same_day() {
        let store = memory_store().await;
        let reasoner = StubReasoner::canned(
            serde_json::json!({ "executive_summary": "v2", "key_discoveries": [] }).to_string(),
        );
        let now = Utc::now();

        generate_daily_report(&store, &reasoner, "gpt-4o", now)
            .await
            .unwrap();
        generate_daily_report(&store, &reasoner, "gpt-4o", now)
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM daily_reports")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}

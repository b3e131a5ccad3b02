//! Corpus statistics and health overview.
//!
//! Quick summary of what the pipeline holds: document counts by status,
//! active/superseded chunk counts, embedding coverage, knowledge blocks and
//! insights, and a per-source breakdown. Used by `rgl stats` to give
//! confidence that ingestion and the knowledge flow are working.

use sqlx::Row;

use crate::config::Config;
use crate::error::Result;
use crate::store::KnowledgeStore;

struct SourceStats {
    source: String,
    chunk_count: i64,
    avg_quality: f64,
    last_added_ts: Option<i64>,
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config, store: &KnowledgeStore) -> Result<()> {
    let pool = store.pool();

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_documents")
        .fetch_one(pool)
        .await?;
    let completed_docs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM source_documents WHERE status = 'completed'")
            .fetch_one(pool)
            .await?;
    let failed_docs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM source_documents WHERE status = 'failed'")
            .fetch_one(pool)
            .await?;

    let active_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE superseded = 0")
        .fetch_one(pool)
        .await?;
    let superseded_chunks: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE superseded = 1")
            .fetch_one(pool)
            .await?;
    let embedded: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM chunk_vectors cv JOIN chunks c ON c.id = cv.chunk_id WHERE c.superseded = 0",
    )
    .fetch_one(pool)
    .await?;

    let blocks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_blocks")
        .fetch_one(pool)
        .await?;
    let insights: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cross_domain_insights")
        .fetch_one(pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Ragline — Knowledge Store Stats");
    println!("===============================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!(
        "  Documents:    {} ({} completed, {} failed)",
        total_docs, completed_docs, failed_docs
    );
    println!(
        "  Chunks:       {} active, {} superseded",
        active_chunks, superseded_chunks
    );
    println!(
        "  Embedded:     {} / {} ({}%)",
        embedded,
        active_chunks,
        if active_chunks > 0 {
            (embedded * 100) / active_chunks
        } else {
            0
        }
    );
    println!("  Blocks:       {}", blocks);
    println!("  Insights:     {}", insights);

    let source_rows = sqlx::query(
        r#"
        SELECT source,
               COUNT(*) AS chunk_count,
               AVG(quality_score) AS avg_quality,
               MAX(created_at) AS last_added
        FROM chunks
        WHERE superseded = 0
        GROUP BY source
        ORDER BY chunk_count DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            chunk_count: row.get("chunk_count"),
            avg_quality: row.get::<Option<f64>, _>("avg_quality").unwrap_or(0.0),
            last_added_ts: row.get("last_added"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<28} {:>8} {:>10}   {}",
            "SOURCE", "CHUNKS", "QUALITY", "LAST ADDED"
        );
        println!("  {}", "-".repeat(68));

        for s in &source_stats {
            let added_display = match s.last_added_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<28} {:>8} {:>10.2}   {}",
                s.source, s.chunk_count, s.avg_quality, added_display
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

use sqlx::SqlitePool;

use crate::error::Result;

/// Create the schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT,
            topics_json TEXT NOT NULL DEFAULT '[]',
            language TEXT NOT NULL DEFAULT 'en',
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunks are append-only: re-ingestion inserts a new generation and
    // flips `superseded` on the old rows, never updates text or vectors.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_document_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            quality_score REAL NOT NULL,
            topics_json TEXT NOT NULL DEFAULT '[]',
            source TEXT NOT NULL DEFAULT '',
            superseded INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (source_document_id) REFERENCES source_documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_blocks (
            id TEXT PRIMARY KEY,
            domain TEXT NOT NULL,
            concept TEXT NOT NULL,
            equation TEXT,
            source TEXT NOT NULL,
            trust_score REAL NOT NULL,
            trust_level TEXT NOT NULL,
            validation_count INTEGER NOT NULL DEFAULT 0,
            application_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concept_relationships (
            source_concept_id TEXT NOT NULL,
            target_concept_id TEXT NOT NULL,
            relationship_type TEXT NOT NULL,
            strength REAL NOT NULL,
            validation_score REAL NOT NULL,
            discovered_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (source_concept_id) REFERENCES knowledge_blocks(id),
            FOREIGN KEY (target_concept_id) REFERENCES knowledge_blocks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The uniqueness constraint makes insight generation idempotent: a
    // re-run of the linker against the same block cannot duplicate rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cross_domain_insights (
            id TEXT PRIMARY KEY,
            primary_domain TEXT NOT NULL,
            secondary_domain TEXT NOT NULL,
            insight_type TEXT NOT NULL,
            description TEXT NOT NULL,
            confidence_score REAL NOT NULL,
            source_block_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(primary_domain, secondary_domain, insight_type, source_block_id),
            FOREIGN KEY (source_block_id) REFERENCES knowledge_blocks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_reports (
            report_date TEXT PRIMARY KEY,
            domains_json TEXT NOT NULL DEFAULT '[]',
            new_concepts INTEGER NOT NULL DEFAULT 0,
            top_insights_json TEXT NOT NULL DEFAULT '[]',
            executive_summary TEXT NOT NULL,
            confidence REAL NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(source_document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_superseded ON chunks(superseded)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_created ON chunks(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_blocks_domain_trust ON knowledge_blocks(domain, trust_score DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

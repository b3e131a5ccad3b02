//! Append-only knowledge store.
//!
//! SQLite is the durable layer: source documents, chunks with their
//! embedding blobs, knowledge blocks, concept relationships, cross-domain
//! insights, and daily reports. An in-process [`VectorIndex`] mirrors every
//! active chunk vector for similarity search; it is rebuilt from the
//! database on open, so the index is a cache, never the source of truth.
//!
//! Chunks and vectors are append-only. Re-ingesting a document inserts a new
//! chunk generation and flips the `superseded` flag on the old one — vector
//! rows are never edited in place.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{PipelineError, Result};
use crate::index::VectorIndex;
use crate::migrate;
use crate::models::{
    clamp01, Chunk, ConceptRelationship, CrossDomainInsight, KnowledgeBlock, ProcessingStatus,
    SearchHit, SourceDocument, TrustLevel,
};

/// Categorical filter applied before similarity ranking.
#[derive(Debug, Clone)]
pub enum SearchFilter {
    /// Match chunks tagged with this topic.
    Topic(String),
    /// Match chunks belonging to this source (book/author/agent domain).
    Source(String),
}

/// A chunk row joined with its stat fields, used by the metrics engine.
#[derive(Debug, Clone)]
pub struct ChunkStatRow {
    pub source: String,
    pub topics: Vec<String>,
    pub quality_score: f64,
    pub created_at: i64,
}

pub struct KnowledgeStore {
    pool: SqlitePool,
    index: Mutex<VectorIndex>,
}

impl KnowledgeStore {
    /// Run migrations and load the vector index from the active chunk set.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        migrate::run_migrations(&pool).await?;

        let store = Self {
            pool,
            index: Mutex::new(VectorIndex::new()),
        };
        store.refresh_index().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Rebuild the in-memory index from persisted vectors, in insertion
    /// order so search tie-breaking stays stable across restarts. Also the
    /// periodic-refresh entry point.
    pub async fn refresh_index(&self) -> Result<()> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            WHERE c.superseded = 0
            ORDER BY c.rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut index = VectorIndex::new();
        for row in &rows {
            let chunk_id: String = row.get("chunk_id");
            let blob: Vec<u8> = row.get("embedding");
            index.insert(chunk_id, blob_to_vec(&blob));
        }
        *self.index.lock().unwrap() = index;
        Ok(())
    }

    // ============ Source documents ============

    pub async fn register_document(
        &self,
        title: &str,
        author: Option<&str>,
        topics: &[String],
        language: &str,
    ) -> Result<SourceDocument> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO source_documents (id, title, author, topics_json, language, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(title)
        .bind(author)
        .bind(serde_json::to_string(topics).unwrap_or_else(|_| "[]".into()))
        .bind(language)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(SourceDocument {
            id,
            title: title.to_string(),
            author: author.map(String::from),
            topics: topics.to_vec(),
            language: language.to_string(),
            status: ProcessingStatus::Pending,
        })
    }

    /// Transition a document's status, enforcing monotonicity.
    pub async fn set_document_status(
        &self,
        document_id: &str,
        next: ProcessingStatus,
    ) -> Result<()> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM source_documents WHERE id = ?")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;

        let current = current
            .and_then(|s| ProcessingStatus::parse(&s))
            .ok_or_else(|| {
                PipelineError::FatalInput(format!("unknown document: {document_id}"))
            })?;

        if !current.can_transition_to(next) {
            return Err(PipelineError::FatalInput(format!(
                "illegal status transition {} -> {} for document {document_id}",
                current.as_str(),
                next.as_str()
            )));
        }

        sqlx::query("UPDATE source_documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(Utc::now().timestamp())
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Option<SourceDocument>> {
        let row = sqlx::query(
            "SELECT id, title, author, topics_json, language, status FROM source_documents WHERE id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SourceDocument {
            id: row.get("id"),
            title: row.get("title"),
            author: row.get("author"),
            topics: parse_topics(row.get("topics_json")),
            language: row.get("language"),
            status: ProcessingStatus::parse(row.get("status"))
                .unwrap_or(ProcessingStatus::Pending),
        }))
    }

    // ============ Chunks & vectors ============

    /// Mark a document's current chunk generation as superseded.
    /// Returns the number of chunks retired.
    pub async fn supersede_chunks(&self, document_id: &str) -> Result<usize> {
        let rows = sqlx::query(
            "SELECT id FROM chunks WHERE source_document_id = ? AND superseded = 0",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = rows.iter().map(|r| r.get("id")).collect();

        sqlx::query("UPDATE chunks SET superseded = 1 WHERE source_document_id = ? AND superseded = 0")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        self.index.lock().unwrap().remove(&ids);
        Ok(ids.len())
    }

    /// Insert a chunk and its embedding. Append-only: rows are never
    /// updated, and the vector becomes immediately searchable.
    pub async fn insert_chunk(&self, chunk: &Chunk, vector: &[f32], model: &str) -> Result<String> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, source_document_id, sequence_index, text, quality_score, topics_json, source, superseded, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.source_document_id)
        .bind(chunk.sequence_index)
        .bind(&chunk.text)
        .bind(clamp01(chunk.quality_score))
        .bind(serde_json::to_string(&chunk.topics).unwrap_or_else(|_| "[]".into()))
        .bind(&chunk.source)
        .bind(chunk.created_at.timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, embedding, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(vec_to_blob(vector))
        .bind(model)
        .bind(vector.len() as i64)
        .bind(chunk.created_at.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.index
            .lock()
            .unwrap()
            .insert(chunk.id.clone(), vector.to_vec());

        Ok(chunk.id.clone())
    }

    /// Similarity search: cosine ≥ `threshold`, descending similarity, ties
    /// broken by insertion order. An optional categorical filter restricts
    /// the candidate set before ranking.
    pub async fn search(
        &self,
        query_vector: &[f32],
        threshold: f64,
        max_results: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        let allowed = match filter {
            Some(f) => Some(self.filtered_chunk_ids(f).await?),
            None => None,
        };

        let ranked = self
            .index
            .lock()
            .unwrap()
            .search(query_vector, allowed.as_ref());

        let qualifying: Vec<(String, f32)> = ranked
            .into_iter()
            .filter(|(_, sim)| *sim as f64 >= threshold)
            .take(max_results)
            .collect();

        let mut hits = Vec::with_capacity(qualifying.len());
        for (chunk_id, sim) in qualifying {
            let row = sqlx::query(
                "SELECT source, text, topics_json, quality_score FROM chunks WHERE id = ?",
            )
            .bind(&chunk_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                hits.push(SearchHit {
                    chunk_id,
                    source: row.get("source"),
                    text: row.get("text"),
                    topics: parse_topics(row.get("topics_json")),
                    quality_score: row.get("quality_score"),
                    similarity: sim as f64,
                });
            }
        }

        Ok(hits)
    }

    async fn filtered_chunk_ids(&self, filter: &SearchFilter) -> Result<HashSet<String>> {
        let rows = match filter {
            SearchFilter::Topic(topic) => {
                // topics_json is a JSON array of strings; match the quoted form.
                sqlx::query("SELECT id FROM chunks WHERE superseded = 0 AND topics_json LIKE ?")
                    .bind(format!("%\"{}\"%", topic))
                    .fetch_all(&self.pool)
                    .await?
            }
            SearchFilter::Source(source) => {
                sqlx::query("SELECT id FROM chunks WHERE superseded = 0 AND source = ?")
                    .bind(source)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    /// Stat fields for every active chunk, for on-demand aggregation.
    pub async fn active_chunk_rows(&self) -> Result<Vec<ChunkStatRow>> {
        let rows = sqlx::query(
            "SELECT source, topics_json, quality_score, created_at FROM chunks WHERE superseded = 0",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChunkStatRow {
                source: row.get("source"),
                topics: parse_topics(row.get("topics_json")),
                quality_score: row.get("quality_score"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    // ============ Knowledge blocks ============

    pub async fn insert_knowledge_block(
        &self,
        domain: &str,
        concept: &str,
        equation: Option<&str>,
        source: &str,
        trust_score: f64,
    ) -> Result<KnowledgeBlock> {
        let id = Uuid::new_v4().to_string();
        let trust_score = clamp01(trust_score);
        let trust_level = TrustLevel::from_score(trust_score);

        sqlx::query(
            r#"
            INSERT INTO knowledge_blocks (id, domain, concept, equation, source, trust_score, trust_level, validation_count, application_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(domain)
        .bind(concept)
        .bind(equation)
        .bind(source)
        .bind(trust_score)
        .bind(trust_level.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(KnowledgeBlock {
            id,
            domain: domain.to_string(),
            concept: concept.to_string(),
            equation: equation.map(String::from),
            source: source.to_string(),
            trust_score,
            trust_level,
            validation_count: 0,
            application_count: 0,
        })
    }

    /// Highest-trust blocks outside `domain`, for cross-domain linking.
    pub async fn top_trusted_blocks_excluding(
        &self,
        domain: &str,
        min_trust: f64,
        limit: usize,
    ) -> Result<Vec<KnowledgeBlock>> {
        let rows = sqlx::query(
            r#"
            SELECT id, domain, concept, equation, source, trust_score, trust_level, validation_count, application_count
            FROM knowledge_blocks
            WHERE domain != ? AND trust_score >= ?
            ORDER BY trust_score DESC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(domain)
        .bind(min_trust)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(block_from_row).collect())
    }

    /// Bump the reuse counter when a block participates in an insight or a
    /// query answer.
    pub async fn record_application(&self, block_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE knowledge_blocks SET application_count = application_count + 1 WHERE id = ?",
        )
        .bind(block_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_validation(&self, block_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE knowledge_blocks SET validation_count = validation_count + 1 WHERE id = ?",
        )
        .bind(block_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ============ Relationships & insights ============

    pub async fn insert_relationship(&self, rel: &ConceptRelationship) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO concept_relationships (source_concept_id, target_concept_id, relationship_type, strength, validation_score, discovered_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rel.source_concept_id)
        .bind(&rel.target_concept_id)
        .bind(&rel.relationship_type)
        .bind(clamp01(rel.strength))
        .bind(clamp01(rel.validation_score))
        .bind(&rel.discovered_by)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist an insight. Returns `false` when the uniqueness constraint
    /// suppressed a duplicate (idempotent re-runs).
    pub async fn insert_insight(&self, insight: &CrossDomainInsight) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO cross_domain_insights
                (id, primary_domain, secondary_domain, insight_type, description, confidence_score, source_block_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&insight.id)
        .bind(&insight.primary_domain)
        .bind(&insight.secondary_domain)
        .bind(&insight.insight_type)
        .bind(&insight.description)
        .bind(clamp01(insight.confidence_score))
        .bind(&insight.source_block_id)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn recent_insights(&self, limit: usize) -> Result<Vec<CrossDomainInsight>> {
        let rows = sqlx::query(
            r#"
            SELECT id, primary_domain, secondary_domain, insight_type, description, confidence_score, source_block_id
            FROM cross_domain_insights
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CrossDomainInsight {
                id: row.get("id"),
                primary_domain: row.get("primary_domain"),
                secondary_domain: row.get("secondary_domain"),
                insight_type: row.get("insight_type"),
                description: row.get("description"),
                confidence_score: row.get("confidence_score"),
                source_block_id: row.get("source_block_id"),
            })
            .collect())
    }

    // ============ Daily reports ============

    pub async fn upsert_daily_report(
        &self,
        report_date: &str,
        domains: &[String],
        new_concepts: i64,
        top_insights: &[String],
        executive_summary: &str,
        confidence: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_reports (report_date, domains_json, new_concepts, top_insights_json, executive_summary, confidence, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(report_date) DO UPDATE SET
                domains_json = excluded.domains_json,
                new_concepts = excluded.new_concepts,
                top_insights_json = excluded.top_insights_json,
                executive_summary = excluded.executive_summary,
                confidence = excluded.confidence
            "#,
        )
        .bind(report_date)
        .bind(serde_json::to_string(domains).unwrap_or_else(|_| "[]".into()))
        .bind(new_concepts)
        .bind(serde_json::to_string(top_insights).unwrap_or_else(|_| "[]".into()))
        .bind(executive_summary)
        .bind(clamp01(confidence))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn knowledge_block_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_blocks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn block_from_row(row: &sqlx::sqlite::SqliteRow) -> KnowledgeBlock {
    let trust_score: f64 = row.get("trust_score");
    KnowledgeBlock {
        id: row.get("id"),
        domain: row.get("domain"),
        concept: row.get("concept"),
        equation: row.get("equation"),
        source: row.get("source"),
        trust_score,
        trust_level: TrustLevel::from_score(trust_score),
        validation_count: row.get("validation_count"),
        application_count: row.get("application_count"),
    }
}

fn parse_topics(json: String) -> Vec<String> {
    serde_json::from_str(&json).unwrap_or_default()
}

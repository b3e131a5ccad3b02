//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow for a document: normalize → chunk → quality
//! score → embed (bounded concurrency) → store, then the best-effort
//! knowledge flow: concept extraction → trust evaluation → background
//! cross-domain linking.
//!
//! Failure policy follows the pipeline taxonomy: a chunk that cannot be
//! embedded is skipped and logged (the batch continues); a store write
//! failure aborts the document and marks it failed; extraction/trust/link
//! failures degrade silently into the logs. Batch ingestion returns one
//! outcome per document, never an all-or-nothing error.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunk::{chunk_text, ChunkParams};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::extract;
use crate::inference::Reasoner;
use crate::linker;
use crate::models::{Chunk, ProcessingStatus};
use crate::quality::score_chunk;
use crate::store::KnowledgeStore;
use crate::trust::{self, ConceptCandidate};

/// A request to ingest one source document.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub title: String,
    pub author: Option<String>,
    pub topics: Vec<String>,
    pub language: String,
    pub text: String,
}

/// Per-document ingestion outcome.
pub struct IngestOutcome {
    pub document_id: Option<String>,
    pub title: String,
    pub success: bool,
    pub chunks_written: usize,
    pub chunks_skipped: usize,
    pub superseded: usize,
    pub concepts_stored: usize,
    /// Background insight tasks; await for completion counts or drop them.
    pub link_tasks: Vec<JoinHandle<usize>>,
    pub error: Option<String>,
}

impl IngestOutcome {
    fn failed(title: &str, document_id: Option<String>, error: String) -> Self {
        Self {
            document_id,
            title: title.to_string(),
            success: false,
            chunks_written: 0,
            chunks_skipped: 0,
            superseded: 0,
            concepts_stored: 0,
            link_tasks: Vec::new(),
            error: Some(error),
        }
    }
}

/// The ingestion engine. Cheap to clone; all heavy state is shared.
#[derive(Clone)]
pub struct Ingestor {
    config: Arc<Config>,
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    reasoner: Option<Arc<dyn Reasoner>>,
}

impl Ingestor {
    pub fn new(
        config: Arc<Config>,
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        reasoner: Option<Arc<dyn Reasoner>>,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            reasoner,
        }
    }

    /// Ingest a batch. Distinct documents run fully in parallel; the result
    /// preserves request order.
    pub async fn ingest_batch(&self, requests: Vec<IngestRequest>) -> Vec<IngestOutcome> {
        let mut set = JoinSet::new();
        for (position, request) in requests.into_iter().enumerate() {
            let ingestor = self.clone();
            set.spawn(async move { (position, ingestor.ingest(request).await) });
        }

        let mut outcomes: Vec<(usize, IngestOutcome)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => outcomes.push(entry),
                Err(e) => warn!(error = %e, "ingestion task panicked"),
            }
        }
        outcomes.sort_by_key(|(position, _)| *position);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Ingest a single document.
    pub async fn ingest(&self, request: IngestRequest) -> IngestOutcome {
        let normalized = crate::normalize::normalize_content(&request.text);
        if normalized.is_empty() {
            return IngestOutcome::failed(
                &request.title,
                None,
                "document is empty after normalization".into(),
            );
        }

        let source_label = source_label(&request);

        let document = match self
            .store
            .register_document(
                &request.title,
                request.author.as_deref(),
                &request.topics,
                &request.language,
            )
            .await
        {
            Ok(doc) => doc,
            Err(e) => return IngestOutcome::failed(&request.title, None, e.to_string()),
        };

        if let Err(e) = self
            .store
            .set_document_status(&document.id, ProcessingStatus::Processing)
            .await
        {
            return IngestOutcome::failed(&request.title, Some(document.id), e.to_string());
        }

        let params = ChunkParams {
            chunk_size: self.config.chunking.chunk_size,
            overlap: self.config.chunking.overlap,
            min_chunk_length: self.config.chunking.min_chunk_length,
        };
        let pieces = chunk_text(&normalized, &params);

        let (embedded, skipped) = self.embed_pieces(&pieces).await;

        // Append-only re-ingestion: with the new generation embedded and in
        // hand, retire the chunks of any earlier generation of this source.
        let superseded = match self.supersede_prior_generations(&request, &document.id).await {
            Ok(count) => count,
            Err(e) => {
                let _ = self
                    .store
                    .set_document_status(&document.id, ProcessingStatus::Failed)
                    .await;
                return IngestOutcome::failed(&request.title, Some(document.id), e.to_string());
            }
        };

        // Insert in sequence order so search tie-breaking is deterministic.
        let mut written = 0usize;
        for (sequence_index, text, vector) in embedded {
            let chunk = Chunk {
                id: Uuid::new_v4().to_string(),
                source_document_id: document.id.clone(),
                sequence_index,
                text: text.clone(),
                quality_score: score_chunk(&text, &self.config.quality.keywords),
                topics: request.topics.clone(),
                source: source_label.clone(),
                created_at: Utc::now(),
            };

            if let Err(e) = self
                .store
                .insert_chunk(&chunk, &vector, self.embedder.model_name())
                .await
            {
                // Persistence failures abort the document — no partial
                // silent success.
                let _ = self
                    .store
                    .set_document_status(&document.id, ProcessingStatus::Failed)
                    .await;
                return IngestOutcome::failed(&request.title, Some(document.id), e.to_string());
            }
            written += 1;
        }

        let (concepts_stored, link_tasks) = self.run_knowledge_flow(&normalized, &source_label).await;

        if let Err(e) = self
            .store
            .set_document_status(&document.id, ProcessingStatus::Completed)
            .await
        {
            return IngestOutcome::failed(&request.title, Some(document.id), e.to_string());
        }

        info!(
            document = document.id.as_str(),
            chunks = written,
            skipped,
            concepts = concepts_stored,
            "document ingested"
        );

        IngestOutcome {
            document_id: Some(document.id),
            title: request.title,
            success: true,
            chunks_written: written,
            chunks_skipped: skipped,
            superseded,
            concepts_stored,
            link_tasks,
            error: None,
        }
    }

    async fn supersede_prior_generations(
        &self,
        request: &IngestRequest,
        current_document_id: &str,
    ) -> crate::error::Result<usize> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT id FROM source_documents WHERE title = ? AND COALESCE(author, '') = ? AND id != ?",
        )
        .bind(&request.title)
        .bind(request.author.as_deref().unwrap_or(""))
        .bind(current_document_id)
        .fetch_all(self.store.pool())
        .await?;

        let mut total = 0usize;
        for document_id in rows {
            total += self.store.supersede_chunks(&document_id).await?;
        }
        Ok(total)
    }

    /// Embed chunk texts concurrently, bounded by the configured worker
    /// budget. Returns embedded pieces (by sequence index) and the count of
    /// skipped units.
    async fn embed_pieces(&self, pieces: &[String]) -> (Vec<(i64, String, Vec<f32>)>, usize) {
        let semaphore = Arc::new(Semaphore::new(self.config.embedding.max_concurrency.max(1)));
        let mut set: JoinSet<(i64, String, Option<Vec<f32>>)> = JoinSet::new();

        for (i, text) in pieces.iter().enumerate() {
            let embedder = Arc::clone(&self.embedder);
            let semaphore = Arc::clone(&semaphore);
            let text = text.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                match embedder.embed(&text).await {
                    Ok(vector) => (i as i64, text, Some(vector)),
                    Err(e) => {
                        match e {
                            PipelineError::FatalInput(ref msg) => {
                                warn!(chunk = i, reason = msg.as_str(), "skipping unembeddable chunk")
                            }
                            ref other => {
                                warn!(chunk = i, error = %other, "embedding failed after retries, skipping chunk")
                            }
                        }
                        (i as i64, text, None)
                    }
                }
            });
        }

        let mut embedded = Vec::new();
        let mut skipped = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, text, Some(vector))) => embedded.push((i, text, vector)),
                Ok((_, _, None)) => skipped += 1,
                Err(e) => {
                    warn!(error = %e, "embedding task panicked");
                    skipped += 1;
                }
            }
        }

        embedded.sort_by_key(|(i, _, _)| *i);
        (embedded, skipped)
    }

    /// Best-effort knowledge flow: extract concepts, score their trust,
    /// store blocks, and launch background insight linking.
    async fn run_knowledge_flow(
        &self,
        text: &str,
        source_label: &str,
    ) -> (usize, Vec<JoinHandle<usize>>) {
        let Some(reasoner) = &self.reasoner else {
            return (0, Vec::new());
        };

        let concepts =
            extract::extract_concepts(reasoner.as_ref(), &self.config.inference.model, text).await;

        let mut stored = 0usize;
        let mut link_tasks = Vec::new();

        for concept in concepts {
            let assessment = trust::evaluate(
                reasoner.as_ref(),
                &self.config.inference.validation_model,
                &ConceptCandidate {
                    domain: &concept.domain,
                    concept: &concept.concept,
                    source: source_label,
                },
            )
            .await;

            let block = match self
                .store
                .insert_knowledge_block(
                    &concept.domain,
                    &concept.concept,
                    concept.equation.as_deref(),
                    source_label,
                    assessment.trust_score,
                )
                .await
            {
                Ok(block) => block,
                Err(e) => {
                    warn!(concept = concept.concept.as_str(), error = %e, "failed to store knowledge block");
                    continue;
                }
            };
            stored += 1;

            if !assessment.degraded {
                let _ = self.store.record_validation(&block.id).await;
            }

            link_tasks.push(linker::spawn_link_task(
                Arc::clone(&self.store),
                Arc::clone(reasoner),
                self.config.linker.clone(),
                self.config.inference.model.clone(),
                block,
            ));
        }

        (stored, link_tasks)
    }
}

fn source_label(request: &IngestRequest) -> String {
    request
        .author
        .clone()
        .unwrap_or_else(|| request.title.clone())
}

//! Embedding client abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and two implementations:
//! - **[`HttpEmbedder`]** — calls an OpenAI-compatible embeddings endpoint
//!   with retry and exponential backoff.
//! - **[`StubEmbedder`]** — deterministic hash-derived vectors for tests and
//!   offline runs.
//!
//! Also provides the vector utilities shared by the store and query engine:
//! [`cosine_similarity`], [`vec_to_blob`], and [`blob_to_vec`].
//!
//! # Retry strategy
//!
//! HTTP 429 and 5xx responses and network errors are
//! [`PipelineError::TransientProvider`] and retried with exponential backoff
//! (1s, 2s, 4s, ... capped at 2^5). Any other 4xx fails immediately. Empty
//! input is [`PipelineError::FatalInput`]: the caller skips that unit and
//! continues the batch.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{PipelineError, Result};

/// Produces fixed-dimensionality vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding dimensionality.
    fn dims(&self) -> usize;

    /// Embed a single text. Input is validated and truncated by the
    /// implementation; the returned vector always has [`Embedder::dims`]
    /// elements.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Build the embedder selected by configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        "stub" => Ok(Arc::new(StubEmbedder::new(config.dims.unwrap_or(64)))),
        "disabled" => Err(PipelineError::FatalInput(
            "embedding provider is disabled".into(),
        )),
        other => Err(PipelineError::FatalInput(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

// ============ HTTP provider ============

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Requires `OPENAI_API_KEY` in the environment. Over-long input is truncated
/// to `max_input_chars` before sending.
pub struct HttpEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    max_input_chars: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| PipelineError::FatalInput("embedding.model is required".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| PipelineError::FatalInput("embedding.dims is required".into()))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(PipelineError::FatalInput(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::TransientProvider(e.to_string()))?;

        Ok(Self {
            model,
            dims,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_input_chars: config.max_input_chars,
            max_retries: config.max_retries,
            client,
        })
    }
}

/// Validated response schema for the embeddings endpoint.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(PipelineError::FatalInput(
                "empty text provided for embedding".into(),
            ));
        }

        let input: String = text.chars().take(self.max_input_chars).collect();
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::FatalInput("OPENAI_API_KEY not set".into()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
                            PipelineError::InvalidResponse(format!(
                                "embedding response did not match schema: {e}"
                            ))
                        })?;
                        let vector = parsed
                            .data
                            .into_iter()
                            .next()
                            .map(|d| d.embedding)
                            .ok_or_else(|| {
                                PipelineError::InvalidResponse(
                                    "embedding response contained no vectors".into(),
                                )
                            })?;
                        if vector.len() != self.dims {
                            return Err(PipelineError::InvalidResponse(format!(
                                "expected {} dims, provider returned {}",
                                self.dims,
                                vector.len()
                            )));
                        }
                        return Ok(vector);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::TransientProvider(format!(
                            "embedding API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    // Other client errors: don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::FatalInput(format!(
                        "embedding API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::TransientProvider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::TransientProvider("embedding failed after retries".into())
        }))
    }
}

// ============ Stub provider ============

/// Deterministic embedder for tests and offline ingestion.
///
/// Vectors are derived from token hashes, so identical text always maps to
/// the identical vector and similar token sets land near one another. Not a
/// semantic model — just stable geometry.
pub struct StubEmbedder {
    dims: usize,
}

impl StubEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(8) }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(PipelineError::FatalInput(
                "empty text provided for embedding".into(),
            ));
        }

        let mut vector = vec![0.0f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let mut h: u64 = 0xcbf29ce484222325; // FNV-1a offset basis
            for b in token.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            let slot = (h % self.dims as u64) as usize;
            vector[slot] += 1.0;
        }

        // Unit-normalize so cosine similarity behaves like the real provider.
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_is_deterministic() {
        let embedder = StubEmbedder::new(32);
        let a = embedder.embed("value at risk").await.unwrap();
        let b = embedder.embed("value at risk").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn stub_rejects_empty_input() {
        let embedder = StubEmbedder::new(32);
        let err = embedder.embed("   ").await.unwrap_err();
        assert!(matches!(err, PipelineError::FatalInput(_)));
    }

    #[tokio::test]
    async fn stub_self_similarity_is_maximal() {
        let embedder = StubEmbedder::new(64);
        let v = embedder.embed("kelly criterion sizing").await.unwrap();
        let w = embedder.embed("completely unrelated words here").await.unwrap();
        let self_sim = cosine_similarity(&v, &v);
        let cross_sim = cosine_similarity(&v, &w);
        assert!((self_sim - 1.0).abs() < 1e-5);
        assert!(cross_sim < self_sim);
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_basics() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}

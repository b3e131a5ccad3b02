//! Core data models used throughout Ragline.
//!
//! These types represent the documents, chunks, concepts, and insights that
//! flow through the ingestion, retrieval, and cross-domain learning pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clamp a score into `[0.0, 1.0]`.
///
/// Applied to every score-like field at the boundary where it is produced,
/// including values coming back from external providers (`-1.0` → `0.0`,
/// `2.0` → `1.0`, NaN → `0.0`).
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Lifecycle state of a source document.
///
/// Transitions are monotonic: `Pending → Processing → Completed | Failed`.
/// The only backward edge is retry, which returns a `Failed` document to
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "processing" => Some(ProcessingStatus::Processing),
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }

    /// Whether `next` is a legal transition from `self`.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }
}

/// A document registered for ingestion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub topics: Vec<String>,
    pub language: String,
    pub status: ProcessingStatus,
}

/// A bounded, possibly overlapping substring of a source document — the
/// atomic unit of embedding and retrieval. Immutable once written.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source_document_id: String,
    pub sequence_index: i64,
    pub text: String,
    pub quality_score: f64,
    pub topics: Vec<String>,
    /// Source label carried onto every vector row (book title or author),
    /// the grouping key for retrieval diversity.
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Trust tier derived deterministically from a trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Verified,
    High,
    Medium,
    Low,
    Unverified,
}

impl TrustLevel {
    /// Fixed thresholds: verified ≥ 0.9, high ≥ 0.75, medium ≥ 0.5,
    /// low ≥ 0.25, unverified below.
    pub fn from_score(score: f64) -> Self {
        let score = clamp01(score);
        if score >= 0.9 {
            TrustLevel::Verified
        } else if score >= 0.75 {
            TrustLevel::High
        } else if score >= 0.5 {
            TrustLevel::Medium
        } else if score >= 0.25 {
            TrustLevel::Low
        } else {
            TrustLevel::Unverified
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Verified => "verified",
            TrustLevel::High => "high",
            TrustLevel::Medium => "medium",
            TrustLevel::Low => "low",
            TrustLevel::Unverified => "unverified",
        }
    }
}

/// An extracted concept with its trust assessment.
#[derive(Debug, Clone)]
pub struct KnowledgeBlock {
    pub id: String,
    pub domain: String,
    pub concept: String,
    pub equation: Option<String>,
    pub source: String,
    pub trust_score: f64,
    pub trust_level: TrustLevel,
    pub validation_count: i64,
    pub application_count: i64,
}

/// A directed relationship between two knowledge blocks.
#[derive(Debug, Clone)]
pub struct ConceptRelationship {
    pub source_concept_id: String,
    pub target_concept_id: String,
    pub relationship_type: String,
    pub strength: f64,
    pub validation_score: f64,
    pub discovered_by: String,
}

/// A discovered connection between concepts in two different domains.
#[derive(Debug, Clone)]
pub struct CrossDomainInsight {
    pub id: String,
    pub primary_domain: String,
    pub secondary_domain: String,
    pub insight_type: String,
    pub description: String,
    pub confidence_score: f64,
    pub source_block_id: String,
}

/// A row returned by a similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source: String,
    pub text: String,
    pub topics: Vec<String>,
    pub quality_score: f64,
    pub similarity: f64,
}

//! Error taxonomy for the knowledge pipeline.
//!
//! Every failure in the pipeline falls into one of four classes, and each
//! class has a fixed handling policy:
//!
//! | Variant | Policy |
//! |---------|--------|
//! | [`PipelineError::TransientProvider`] | retry with bounded backoff |
//! | [`PipelineError::FatalInput`] | skip the unit, log, continue the batch |
//! | [`PipelineError::Persistence`] | abort the document, mark it failed |
//! | [`PipelineError::DegradedEvaluation`] | substitute a default, continue |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rate limit, timeout, or other recoverable provider failure.
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    /// The unit of work itself is unusable (empty text, bad vector, ...).
    #[error("fatal input error: {0}")]
    FatalInput(String),

    /// Durable store write or read failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Trust scoring or insight generation failed; a default was substituted.
    #[error("degraded evaluation: {0}")]
    DegradedEvaluation(String),

    /// External provider returned a payload that failed schema validation.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl PipelineError {
    /// Whether the caller should retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::TransientProvider(_))
    }

    /// Whether the failure should abort the owning document's ingestion.
    pub fn is_fatal_for_document(&self) -> bool {
        matches!(self, PipelineError::Persistence(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable() {
        let err = PipelineError::TransientProvider("429".into());
        assert!(err.is_retryable());
        assert!(!err.is_fatal_for_document());
    }

    #[test]
    fn persistence_aborts_document() {
        let err = PipelineError::Persistence(sqlx::Error::PoolClosed);
        assert!(!err.is_retryable());
        assert!(err.is_fatal_for_document());
    }
}

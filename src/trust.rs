//! Trust evaluation for extracted concepts.
//!
//! Asks the reasoning service to assess a concept's reliability and returns
//! a trust score in `[0, 1]` with a short rationale. The provider's value is
//! clamped whatever it claims. A provider failure is non-fatal: the fixed
//! default of 0.5 is substituted and the degradation logged.

use serde::Deserialize;
use tracing::warn;

use crate::inference::{ChatRequest, Reasoner};
use crate::models::clamp01;

/// Neutral score used whenever evaluation cannot run.
pub const DEFAULT_TRUST_SCORE: f64 = 0.5;

/// A concept awaiting trust evaluation.
#[derive(Debug, Clone)]
pub struct ConceptCandidate<'a> {
    pub domain: &'a str,
    pub concept: &'a str,
    pub source: &'a str,
}

/// Evaluation outcome. `degraded` is set when the default score was
/// substituted for a provider failure.
#[derive(Debug, Clone)]
pub struct TrustAssessment {
    pub trust_score: f64,
    pub rationale: String,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
struct TrustReply {
    trust_score: f64,
    #[serde(default)]
    validation_notes: String,
}

const SYSTEM_PROMPT: &str = "You are a concept validation engine. Assess the reliability and \
accuracy of financial, mathematical, and regulatory concepts. Return a trust score between 0 \
and 1 based on accuracy, verifiability, and source reliability.";

fn trust_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "trust_score": { "type": "number" },
            "validation_notes": { "type": "string" }
        },
        "required": ["trust_score"],
        "additionalProperties": false
    })
}

/// Evaluate a concept's trustworthiness.
pub async fn evaluate(
    reasoner: &dyn Reasoner,
    model: &str,
    candidate: &ConceptCandidate<'_>,
) -> TrustAssessment {
    let request = ChatRequest::new(
        model,
        SYSTEM_PROMPT,
        format!(
            "Validate this concept: Domain: {}, Concept: {}, Source: {}",
            candidate.domain, candidate.concept, candidate.source
        ),
    )
    .with_schema("trust_validation", trust_schema())
    .with_reasoning_effort("medium");

    let content = match reasoner.complete(&request).await {
        Ok(content) => content,
        Err(e) => {
            warn!(
                concept = candidate.concept,
                error = %e,
                "trust evaluation failed, substituting default score"
            );
            return degraded_assessment();
        }
    };

    match serde_json::from_str::<TrustReply>(&content) {
        Ok(reply) => TrustAssessment {
            trust_score: clamp01(reply.trust_score),
            rationale: reply.validation_notes,
            degraded: false,
        },
        Err(e) => {
            warn!(
                concept = candidate.concept,
                error = %e,
                "trust reply failed schema validation, substituting default score"
            );
            degraded_assessment()
        }
    }
}

fn degraded_assessment() -> TrustAssessment {
    TrustAssessment {
        trust_score: DEFAULT_TRUST_SCORE,
        rationale: String::new(),
        degraded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StubReasoner;

    fn candidate() -> ConceptCandidate<'static> {
        ConceptCandidate {
            domain: "finance",
            concept: "kelly criterion",
            source: "Ed Thorp",
        }
    }

    #[tokio::test]
    async fn valid_reply_is_used() {
        let reply = serde_json::json!({ "trust_score": 0.82, "validation_notes": "well established" });
        let reasoner = StubReasoner::canned(reply.to_string());
        let assessment = evaluate(&reasoner, "gpt-4o-mini", &candidate()).await;

        assert!((assessment.trust_score - 0.82).abs() < 1e-9);
        assert!(!assessment.degraded);
        assert_eq!(assessment.rationale, "well established");
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped() {
        for (raw, expected) in [(-1.0, 0.0), (2.0, 1.0)] {
            let reply = serde_json::json!({ "trust_score": raw });
            let reasoner = StubReasoner::canned(reply.to_string());
            let assessment = evaluate(&reasoner, "gpt-4o-mini", &candidate()).await;
            assert_eq!(assessment.trust_score, expected);
            assert!(!assessment.degraded);
        }
    }

    #[tokio::test]
    async fn provider_failure_yields_default() {
        let reasoner = StubReasoner::failing();
        let assessment = evaluate(&reasoner, "gpt-4o-mini", &candidate()).await;
        assert_eq!(assessment.trust_score, DEFAULT_TRUST_SCORE);
        assert!(assessment.degraded);
    }

    #[tokio::test]
    async fn malformed_reply_yields_default() {
        let reasoner = StubReasoner::canned("{\"unexpected\": true}");
        let assessment = evaluate(&reasoner, "gpt-4o-mini", &candidate()).await;
        assert_eq!(assessment.trust_score, DEFAULT_TRUST_SCORE);
        assert!(assessment.degraded);
    }
}

//! Concept extraction from ingested text.
//!
//! Sends document text to the reasoning service with a structured-output
//! schema and validates the reply into [`ExtractedConcept`]s. Extraction is
//! best-effort: a provider failure or a malformed reply degrades to an empty
//! extraction (logged), never to an ingestion failure.

use serde::Deserialize;
use tracing::warn;

use crate::inference::{ChatRequest, Reasoner};
use crate::models::clamp01;

/// A concept candidate proposed by the reasoning service.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedConcept {
    pub domain: String,
    pub concept: String,
    #[serde(default)]
    pub equation: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(default)]
    concepts: Vec<ExtractedConcept>,
}

const SYSTEM_PROMPT: &str = "You are a cognitive extraction engine. Extract mathematical \
equations, financial concepts, accounting standards, and regulatory rules from content. \
Focus on concepts that can be validated, cross-referenced, and applied.";

fn extraction_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "concepts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "domain": { "type": "string" },
                        "concept": { "type": "string" },
                        "equation": { "type": "string" },
                        "confidence": { "type": "number" }
                    },
                    "required": ["domain", "concept"]
                }
            }
        },
        "required": ["concepts"],
        "additionalProperties": false
    })
}

/// Extract concepts from `text`. Confidence values are clamped to `[0, 1]`.
pub async fn extract_concepts(
    reasoner: &dyn Reasoner,
    model: &str,
    text: &str,
) -> Vec<ExtractedConcept> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let request = ChatRequest::new(
        model,
        SYSTEM_PROMPT,
        format!("Extract cognitive concepts from this content: {text}"),
    )
    .with_schema("cognitive_extraction", extraction_schema())
    .with_reasoning_effort("high");

    let content = match reasoner.complete(&request).await {
        Ok(content) => content,
        Err(e) => {
            warn!(error = %e, "concept extraction failed, continuing without concepts");
            return Vec::new();
        }
    };

    match serde_json::from_str::<ExtractionReply>(&content) {
        Ok(reply) => reply
            .concepts
            .into_iter()
            .map(|mut c| {
                c.confidence = clamp01(c.confidence);
                c
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "extraction reply failed schema validation");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StubReasoner;

    #[tokio::test]
    async fn parses_valid_reply() {
        let reply = serde_json::json!({
            "concepts": [
                { "domain": "finance", "concept": "Black-Scholes", "equation": "dS = mu S dt + sigma S dW", "confidence": 0.9 },
                { "domain": "math", "concept": "Ito calculus" }
            ]
        });
        let reasoner = StubReasoner::canned(reply.to_string());
        let concepts = extract_concepts(&reasoner, "gpt-4o", "some text").await;

        assert_eq!(concepts.len(), 2);
        assert_eq!(concepts[0].concept, "Black-Scholes");
        assert!((concepts[1].confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn clamps_out_of_range_confidence() {
        let reply = serde_json::json!({
            "concepts": [{ "domain": "d", "concept": "c", "confidence": 3.5 }]
        });
        let reasoner = StubReasoner::canned(reply.to_string());
        let concepts = extract_concepts(&reasoner, "gpt-4o", "text").await;
        assert_eq!(concepts[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_empty() {
        let reasoner = StubReasoner::failing();
        let concepts = extract_concepts(&reasoner, "gpt-4o", "text").await;
        assert!(concepts.is_empty());
    }

    #[tokio::test]
    async fn malformed_reply_degrades_to_empty() {
        let reasoner = StubReasoner::canned("not json at all");
        let concepts = extract_concepts(&reasoner, "gpt-4o", "text").await;
        assert!(concepts.is_empty());
    }

    #[tokio::test]
    async fn empty_text_is_skipped() {
        let reasoner = StubReasoner::canned("{}");
        let concepts = extract_concepts(&reasoner, "gpt-4o", "   ").await;
        assert!(concepts.is_empty());
    }
}

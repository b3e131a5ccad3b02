//! Generative / reasoning inference client.
//!
//! Everything in the pipeline that needs a language model — answer
//! synthesis, concept extraction, trust validation, cross-domain insight
//! mining, daily reports — goes through the [`Reasoner`] trait. Requests
//! carry an optional JSON-schema so providers that support structured output
//! return machine-parseable content; responses are always validated into
//! typed structs by the caller (no loosely-typed JSON walking).
//!
//! Retry behavior mirrors the embedding client: 429/5xx/network errors are
//! transient and retried with exponential backoff, other 4xx fail
//! immediately.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::InferenceConfig;
use crate::error::{PipelineError, Result};

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    /// Structured-output schema: `(name, json_schema)`.
    pub schema: Option<(String, serde_json::Value)>,
    /// Provider hint: `"low"`, `"medium"`, or `"high"`.
    pub reasoning_effort: Option<&'static str>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            user: user.into(),
            schema: None,
            reasoning_effort: None,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.schema = Some((name.into(), schema));
        self
    }

    #[must_use]
    pub fn with_reasoning_effort(mut self, effort: &'static str) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }
}

/// External reasoning service boundary.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Run a completion and return the raw message content.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Build the reasoner selected by configuration.
pub fn create_reasoner(config: &InferenceConfig) -> Result<Arc<dyn Reasoner>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(HttpReasoner::new(config)?)),
        "stub" => Ok(Arc::new(StubReasoner::canned("{}"))),
        "disabled" => Err(PipelineError::FatalInput(
            "inference provider is disabled".into(),
        )),
        other => Err(PipelineError::FatalInput(format!(
            "unknown inference provider: {other}"
        ))),
    }
}

// ============ HTTP provider ============

/// Chat client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpReasoner {
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

/// Validated response schema for the chat completions endpoint.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpReasoner {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
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
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client,
        })
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        if let Some((name, schema)) = &request.schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema },
            });
        }
        if let Some(effort) = request.reasoning_effort {
            body["reasoning_effort"] = serde_json::json!(effort);
        }

        body
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::FatalInput("OPENAI_API_KEY not set".into()))?;
        let body = Self::request_body(request);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: ChatResponse = response.json().await.map_err(|e| {
                            PipelineError::InvalidResponse(format!(
                                "chat response did not match schema: {e}"
                            ))
                        })?;
                        return parsed
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .ok_or_else(|| {
                                PipelineError::InvalidResponse(
                                    "chat response contained no choices".into(),
                                )
                            });
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::TransientProvider(format!(
                            "inference API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::FatalInput(format!(
                        "inference API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::TransientProvider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::TransientProvider("inference failed after retries".into())
        }))
    }
}

// ============ Stub provider ============

/// Offline reasoner for tests: returns canned content, or fails every call.
pub struct StubReasoner {
    behavior: StubBehavior,
}

enum StubBehavior {
    Canned(String),
    Fail,
}

impl StubReasoner {
    pub fn canned(content: impl Into<String>) -> Self {
        Self {
            behavior: StubBehavior::Canned(content.into()),
        }
    }

    pub fn failing() -> Self {
        Self {
            behavior: StubBehavior::Fail,
        }
    }
}

#[async_trait]
impl Reasoner for StubReasoner {
    async fn complete(&self, _request: &ChatRequest) -> Result<String> {
        match &self.behavior {
            StubBehavior::Canned(content) => Ok(content.clone()),
            StubBehavior::Fail => Err(PipelineError::TransientProvider(
                "stub reasoner configured to fail".into(),
            )),
        }
    }
}

//! Remote backend: OpenAI-chat-completions-compatible inference over HTTP.
//!
//! The serving endpoint (vLLM or equivalent) handles all image
//! preprocessing itself, so the request is deliberately simple: one user
//! message carrying the image as a base64 data URI plus the instruction
//! text. Two protocol details matter for correctness:
//!
//! * **temperature 0.0, bounded `max_tokens`** — transcription must be
//!   deterministic, and dense pages must not run away;
//! * **grounding-token allow-list** — serving stacks strip special tokens
//!   from output by default, which would silently destroy every
//!   `<|ref|>`/`<|det|>` marker the parser depends on. The request pins
//!   `skip_special_tokens: false` and whitelists the five grounding control
//!   tokens explicitly.
//!
//! ## Retry policy
//!
//! Transient failures are retried up to `max_retries` total attempts:
//! connectivity/timeout errors back off `2^attempt` seconds (1 s, 2 s, 4 s…),
//! HTTP 429 backs off `5 × (attempt + 1)` seconds (5 s, 10 s, 15 s…).
//! Anything else — malformed request, unknown model, auth — is permanent
//! and surfaces immediately. Exhaustion raises
//! [`OcrError::RetriesExhausted`] naming the attempt count and the last
//! underlying failure.

use crate::backend::{ConnectionStatus, InferenceReply, OcrBackend};
use crate::config::{OcrConfig, ProcessingParams};
use crate::error::OcrError;
use crate::prompts::IMAGE_PLACEHOLDER;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Token ids of the grounding control markers that must survive server-side
/// special-token filtering: `<|ref|>`, `<|/ref|>`, `<|det|>`, `<|/det|>`,
/// `<|grounding|>`.
const GROUNDING_TOKEN_IDS: [u32; 5] = [32006, 32007, 32008, 32009, 32010];

/// How a single request attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptFailure {
    /// Connection or timeout trouble; worth retrying with exponential backoff.
    Transport(String),
    /// HTTP 429; worth retrying with a longer linear backoff.
    RateLimited(String),
    /// The endpoint rejected the request; retrying cannot help.
    Permanent(String),
}

impl AttemptFailure {
    fn detail(&self) -> &str {
        match self {
            AttemptFailure::Transport(s)
            | AttemptFailure::RateLimited(s)
            | AttemptFailure::Permanent(s) => s,
        }
    }
}

/// Backoff before the retry that follows failed attempt `attempt` (0-based).
fn backoff_delay(failure: &AttemptFailure, attempt: u32) -> Duration {
    match failure {
        AttemptFailure::Transport(_) => Duration::from_secs(1u64 << attempt.min(16)),
        AttemptFailure::RateLimited(_) => Duration::from_secs(5 * (u64::from(attempt) + 1)),
        // Never consulted for permanent failures.
        AttemptFailure::Permanent(_) => Duration::ZERO,
    }
}

/// Remote OCR inference over an OpenAI-compatible endpoint.
pub struct RemoteBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
    max_tokens: u32,
}

impl RemoteBackend {
    /// Construct the backend from engine configuration.
    ///
    /// # Errors
    /// [`OcrError::ClientConstruction`] when the HTTP client cannot be
    /// built — the only exception `test_connection` callers ever see.
    pub fn new(config: &OcrConfig) -> Result<Self, OcrError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));

        if let Some(ref key) = config.api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| OcrError::ClientConstruction {
                    endpoint: config.endpoint.clone(),
                    detail: format!("invalid API key header: {e}"),
                })?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|e| OcrError::ClientConstruction {
            endpoint: config.endpoint.clone(),
            detail: e.to_string(),
        })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            max_tokens: config.max_tokens,
        })
    }

    /// Issue one chat-completion attempt.
    async fn request_once(&self, body: &serde_json::Value) -> Result<String, AttemptFailure> {
        let url = format!("{}/chat/completions", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptFailure::RateLimited(format!(
                "rate limited by {url} (HTTP 429)"
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Permanent(format!(
                "HTTP {status} from {url}: {}",
                text.chars().take(300).collect::<String>()
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| AttemptFailure::Permanent(format!("malformed completion body: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AttemptFailure::Permanent("completion contained no choices".to_string()))
    }
}

#[async_trait]
impl OcrBackend for RemoteBackend {
    async fn infer(
        &self,
        prompt: &str,
        image_path: &Path,
        _scratch_dir: &Path,
        _params: &ProcessingParams,
    ) -> Result<InferenceReply, OcrError> {
        let bytes =
            tokio::fs::read(image_path)
                .await
                .map_err(|e| OcrError::SourceUnreadable {
                    path: image_path.to_path_buf(),
                    detail: e.to_string(),
                })?;
        let data_uri = format!(
            "data:{};base64,{}",
            mime_for(image_path),
            STANDARD.encode(&bytes)
        );

        // The image travels as a structured content part, so the inline
        // placeholder must not also appear in the text.
        let text_prompt = prompt.replace(IMAGE_PLACEHOLDER, "").trim().to_string();

        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_uri } },
                    { "type": "text", "text": text_prompt },
                ],
            }],
            "max_tokens": self.max_tokens,
            "temperature": 0.0,
            "skip_special_tokens": false,
            "vllm_xargs": {
                "ngram_size": 5,
                "window_size": 10,
                "whitelist_token_ids": GROUNDING_TOKEN_IDS,
            },
        });

        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 0..self.max_retries {
            if let Some(ref failure) = last_failure {
                let delay = backoff_delay(failure, attempt - 1);
                warn!(
                    attempt,
                    max = self.max_retries,
                    delay_secs = delay.as_secs(),
                    "retrying inference after transient failure: {}",
                    failure.detail()
                );
                sleep(delay).await;
            }

            match self.request_once(&body).await {
                Ok(content) => {
                    debug!(attempt, chars = content.len(), "inference succeeded");
                    return Ok(InferenceReply::Text(content));
                }
                Err(AttemptFailure::Permanent(detail)) => {
                    return Err(OcrError::InferenceRejected { detail });
                }
                Err(failure) => last_failure = Some(failure),
            }
        }

        Err(OcrError::RetriesExhausted {
            attempts: self.max_retries,
            last: last_failure
                .map(|f| f.detail().to_string())
                .unwrap_or_else(|| "unknown failure".to_string()),
        })
    }

    /// List the endpoint's models and check ours is served.
    ///
    /// Returns a descriptive status in both the "reachable but wrong model"
    /// and "unreachable" cases; never an `Err` past client construction.
    async fn test_connection(&self) -> Result<ConnectionStatus, OcrError> {
        let url = format!("{}/models", self.endpoint);

        let listing: Result<ModelListing, String> = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let status = response.status();
            if !status.is_success() {
                return Err(format!("HTTP {status}"));
            }
            response.json().await.map_err(|e| e.to_string())
        }
        .await;

        let status = match listing {
            Ok(listing) => {
                let ids: Vec<String> = listing.data.into_iter().map(|m| m.id).collect();
                if ids.iter().any(|id| id == &self.model) {
                    ConnectionStatus {
                        ok: true,
                        message: format!(
                            "Connected successfully. Model '{}' is available.",
                            self.model
                        ),
                    }
                } else {
                    ConnectionStatus {
                        ok: false,
                        message: format!(
                            "Connected, but model '{}' not found. Available: {}",
                            self.model,
                            ids.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
                        ),
                    }
                }
            }
            Err(detail) => ConnectionStatus {
                ok: false,
                message: format!("Connection to {url} failed: {detail}"),
            },
        };

        Ok(status)
    }
}

/// Map a reqwest error to its retry class.
fn classify_reqwest(e: reqwest::Error) -> AttemptFailure {
    if e.is_timeout() {
        AttemptFailure::Transport(format!("request timed out: {e}"))
    } else if e.is_connect() {
        AttemptFailure::Transport(format!("connection failed: {e}"))
    } else {
        AttemptFailure::Permanent(e.to_string())
    }
}

/// Guess the data-URI media type from the file extension.
fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

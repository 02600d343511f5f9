//! Inference backends: one capability, two implementations.
//!
//! Tasks depend only on [`OcrBackend`]; which variant is active is decided
//! once at engine setup. [`RemoteBackend`](remote::RemoteBackend) speaks the
//! OpenAI-chat-completions protocol to a serving endpoint and wraps the call
//! in a tiered retry policy; [`LocalBackend`](local::LocalBackend) drives a
//! pre-loaded in-process model behind the [`VisionModel`] seam.
//!
//! Backends return the model's output *as received* — a plain string, a
//! keyed JSON object, or a sequence of fragments. Normalising those shapes
//! is the task layer's job ([`crate::task::normalize_reply`]), so a backend
//! never has to guess what a caller wants.

pub mod local;
pub mod remote;

pub use local::{LocalBackend, ModelRequest, VisionModel};
pub use remote::RemoteBackend;

use crate::config::ProcessingParams;
use crate::error::OcrError;
use async_trait::async_trait;
use std::path::Path;

/// Raw inference output in whichever shape the backend produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceReply {
    /// Plain text.
    Text(String),
    /// A keyed container; the task layer looks for a `text` field.
    Keyed(serde_json::Value),
    /// A sequence of text fragments, joined with newlines downstream.
    Fragments(Vec<String>),
}

/// Outcome of probing a remote endpoint.
///
/// Deliberately not a `Result`: "reachable but wrong model" and
/// "unreachable" are ordinary answers a caller shows to the user, not
/// exceptional control flow.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub ok: bool,
    pub message: String,
}

/// The one capability tasks require of an inference provider.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Run one prompt + image inference.
    ///
    /// `scratch_dir` is a per-task directory some runtimes write auxiliary
    /// results into; the task layer reads the conventional `result.mmd`
    /// fallback from it after the call.
    async fn infer(
        &self,
        prompt: &str,
        image_path: &Path,
        scratch_dir: &Path,
        params: &ProcessingParams,
    ) -> Result<InferenceReply, OcrError>;

    /// Probe the backend's availability.
    ///
    /// Only transport-client construction failures are `Err`; everything
    /// else is a descriptive [`ConnectionStatus`]. The default covers
    /// in-process backends, which have nothing to probe.
    async fn test_connection(&self) -> Result<ConnectionStatus, OcrError> {
        Ok(ConnectionStatus {
            ok: true,
            message: "In-process backend; no connection to test.".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_variants_compare() {
        assert_eq!(
            InferenceReply::Text("a".into()),
            InferenceReply::Text("a".into())
        );
        assert_ne!(
            InferenceReply::Text("a".into()),
            InferenceReply::Fragments(vec!["a".into()])
        );
    }
}

//! Task orchestration: lifecycle events and result normalisation shared by
//! the single-image and document state machines.
//!
//! Tasks run on their own tokio task and never block the submitting caller;
//! everything a caller learns arrives through an ordered stream of
//! [`TaskEvent`]s. Within one document task, page events are emitted in
//! strictly ascending page order because pages are processed strictly
//! sequentially — there is no reordering to guard against.

pub mod document;
pub mod image;

use crate::backend::InferenceReply;
use crate::output::{DocumentResult, ImageResult};
use std::path::Path;
use tracing::debug;

/// Substituted when the model returns nothing at all.
pub const NO_TEXT_PLACEHOLDER: &str = "No text returned by model.";

/// Conventional auxiliary result file some model runtimes write into the
/// task scratch directory.
const SCRATCH_RESULT_FILE: &str = "result.mmd";

/// Lifecycle notifications emitted by a running task, in order.
///
/// `Progress` text is informational only — consumers must not base control
/// decisions on its content.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Human-readable status line.
    Progress(String),
    /// A document page is about to be processed.
    PageProgress { current: usize, total: usize },
    /// A document page finished successfully.
    PageComplete { page: usize, summary: PageSummary },
    /// Terminal: the task completed and produced a result.
    Finished(TaskOutcome),
    /// Terminal: the task observed the cancellation flag. No result follows.
    Cancelled,
    /// Terminal: the task failed. No result follows.
    Error(String),
}

/// Lightweight per-page completion summary for progress displays.
#[derive(Debug, Clone, Copy)]
pub struct PageSummary {
    pub text_chars: usize,
    pub detections: usize,
    pub extracted_images: usize,
}

/// The result payload of a finished task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Image(Box<ImageResult>),
    Document(Box<DocumentResult>),
}

/// Collapse a heterogeneous backend reply into text.
///
/// Fixed priority: plain string, then a keyed container's `text` field
/// (stringified when it is not already a string), then fragments joined
/// with newlines, otherwise empty.
pub fn normalize_reply(reply: &InferenceReply) -> String {
    match reply {
        InferenceReply::Text(s) => s.trim().to_string(),
        InferenceReply::Keyed(value) => match value.get("text") {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string().trim().to_string(),
            None => String::new(),
        },
        InferenceReply::Fragments(parts) => parts.join("\n").trim().to_string(),
    }
}

/// Normalise a reply, falling back to the scratch result file and finally
/// to the [`NO_TEXT_PLACEHOLDER`].
pub(crate) fn resolve_text(reply: &InferenceReply, scratch_dir: &Path) -> String {
    let mut text = normalize_reply(reply);

    if text.is_empty() {
        let result_file = scratch_dir.join(SCRATCH_RESULT_FILE);
        if let Ok(contents) = std::fs::read_to_string(&result_file) {
            debug!(file = %result_file.display(), "reply empty, using scratch result file");
            text = contents.trim().to_string();
        }
    }

    if text.is_empty() {
        text = NO_TEXT_PLACEHOLDER.to_string();
    }

    text
}

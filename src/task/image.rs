//! Single-image OCR task.
//!
//! Linear pipeline: build the prompt, measure the image, run inference,
//! normalise and parse the reply. Each step emits one progress line before
//! doing its work, so a consumer that renders the last `Progress` event
//! always shows what the task is currently doing. The scratch directory is
//! a [`tempfile::TempDir`], removed when the task returns on any path.

use crate::backend::OcrBackend;
use crate::config::ProcessingParams;
use crate::grounding::{self, GROUNDING_MARKER, REF_OPEN};
use crate::output::{ImageDims, ImageResult};
use crate::prompts::build_prompt;
use crate::task::{resolve_text, TaskEvent, TaskOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

pub(crate) struct ImageTask {
    pub backend: Arc<dyn OcrBackend>,
    pub image_path: PathBuf,
    pub params: ProcessingParams,
    pub events: UnboundedSender<TaskEvent>,
}

impl ImageTask {
    pub async fn run(self) {
        let events = self.events;
        // Send failures mean the consumer dropped the receiver; the task
        // keeps running to completion regardless.
        let send = |event: TaskEvent| {
            let _ = events.send(event);
        };

        send(TaskEvent::Progress("Building prompt...".to_string()));
        let prompt = build_prompt(&self.params);
        debug!(prompt = %prompt, "built inference prompt");

        send(TaskEvent::Progress("Measuring image...".to_string()));
        let dims = match image::image_dimensions(&self.image_path) {
            Ok((width, height)) => Some(ImageDims { width, height }),
            Err(err) => {
                // Not fatal: inference can proceed, only box scaling is lost.
                warn!(path = %self.image_path.display(), error = %err,
                    "could not measure image; grounding boxes will be skipped");
                None
            }
        };

        let scratch = match tempfile::TempDir::with_prefix("ocr2doc_") {
            Ok(dir) => dir,
            Err(err) => {
                send(TaskEvent::Error(format!(
                    "Failed to create scratch directory: {err}"
                )));
                return;
            }
        };

        send(TaskEvent::Progress(
            "Running OCR inference (this may take 10-30 seconds)...".to_string(),
        ));
        let reply = match self
            .backend
            .infer(&prompt, &self.image_path, scratch.path(), &self.params)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                send(TaskEvent::Error(err.to_string()));
                return;
            }
        };

        send(TaskEvent::Progress("Parsing results...".to_string()));
        let raw_text = resolve_text(&reply, scratch.path());

        // Boxes need both grounding markers and known pixel dimensions.
        let detections = match (&dims, grounding::has_grounding_markers(&raw_text)) {
            (Some(d), true) => grounding::parse_detections(&raw_text, d.width, d.height),
            _ => Vec::new(),
        };

        let cleaned = if raw_text.contains(REF_OPEN) || raw_text.contains(GROUNDING_MARKER) {
            grounding::clean_grounding_text(&raw_text)
        } else {
            raw_text.clone()
        };
        let display_text = display_with_fallback(cleaned, &detections);

        send(TaskEvent::Finished(TaskOutcome::Image(Box::new(
            ImageResult {
                display_text,
                raw_text,
                detections,
                image_dims: dims,
                params: self.params,
            },
        ))));
    }
}

/// When cleaning leaves nothing visible but boxes were found, show the
/// comma-joined labels instead of a blank panel.
fn display_with_fallback(cleaned: String, detections: &[crate::grounding::Detection]) -> String {
    if cleaned.is_empty() && !detections.is_empty() {
        detections
            .iter()
            .map(|d| d.label.as_str())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        cleaned
    }
}

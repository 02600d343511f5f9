//! Document OCR task: rasterise, OCR every page sequentially, convert.
//!
//! Pages run strictly one after another so page events arrive in ascending
//! order and the backend never sees concurrent requests from one document.
//! Cancellation is cooperative and only observed at page boundaries — an
//! in-flight page always runs to completion. A failed page is logged and
//! skipped; the aggregate keeps whatever pages succeeded.

use crate::backend::OcrBackend;
use crate::cleanup::clean_page_text;
use crate::config::{OcrConfig, OcrMode, OutputFormat};
use crate::convert::DocumentConverter;
use crate::error::{OcrError, PageError};
use crate::extract::extract_page_images;
use crate::grounding;
use crate::output::{DocumentResult, PageResult};
use crate::prompts::build_prompt;
use crate::rasterize::Rasterizer;
use crate::task::{resolve_text, PageSummary, TaskEvent, TaskOutcome};
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub(crate) struct DocumentTask {
    pub backend: Arc<dyn OcrBackend>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub converter: Arc<dyn DocumentConverter>,
    pub path: PathBuf,
    pub format: OutputFormat,
    pub config: OcrConfig,
    pub cancel: Arc<AtomicBool>,
    pub events: UnboundedSender<TaskEvent>,
}

impl DocumentTask {
    pub async fn run(self) {
        let events = self.events.clone();
        let send = |event: TaskEvent| {
            let _ = events.send(event);
        };

        send(TaskEvent::Progress("Reading document...".to_string()));
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let err = OcrError::SourceUnreadable {
                    path: self.path.clone(),
                    detail: err.to_string(),
                };
                send(TaskEvent::Error(err.to_string()));
                return;
            }
        };
        debug!(size = bytes.len(), path = %self.path.display(), "document read");

        send(TaskEvent::Progress(format!(
            "Rasterising document at {} DPI...",
            self.config.dpi
        )));
        let rasterizer = Arc::clone(&self.rasterizer);
        let dpi = self.config.dpi;
        let pages = match tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes, dpi))
            .await
        {
            Ok(Ok(pages)) => pages,
            Ok(Err(err)) => {
                send(TaskEvent::Error(err.to_string()));
                return;
            }
            Err(join_err) => {
                send(TaskEvent::Error(format!(
                    "Rasterisation task panicked: {join_err}"
                )));
                return;
            }
        };

        let total = pages.len();
        if total == 0 {
            send(TaskEvent::Error(OcrError::EmptyDocument.to_string()));
            return;
        }
        info!(pages = total, "document rasterised");
        send(TaskEvent::Progress(format!("Processing {total} pages...")));

        let mut completed: Vec<PageResult> = Vec::with_capacity(total);
        for (idx, bitmap) in pages.into_iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                warn!("processing cancelled at page boundary");
                send(TaskEvent::Cancelled);
                return;
            }

            let page_num = idx + 1;
            send(TaskEvent::PageProgress {
                current: page_num,
                total,
            });
            send(TaskEvent::Progress(format!(
                "Processing page {page_num}/{total}..."
            )));

            match self.process_page(&bitmap, page_num).await {
                Ok(page) => {
                    let summary = PageSummary {
                        text_chars: page.display_text.chars().count(),
                        detections: page.detections.len(),
                        extracted_images: page.extracted_images.len(),
                    };
                    info!(page = page_num, total, chars = summary.text_chars, "page complete");
                    send(TaskEvent::PageComplete {
                        page: page_num,
                        summary,
                    });
                    completed.push(page);
                }
                Err(err) => {
                    // Page failures do not abort the document.
                    warn!(page = page_num, error = %err, "page failed, skipping");
                }
            }
        }

        if self.cancel.load(Ordering::SeqCst) {
            send(TaskEvent::Cancelled);
            return;
        }

        send(TaskEvent::Progress(format!(
            "Converting to {}...",
            self.format
        )));
        let (content, content_type) = match self.converter.convert(&completed, self.format) {
            Ok(converted) => converted,
            Err(err) => {
                send(TaskEvent::Error(err.to_string()));
                return;
            }
        };

        let extracted_image_count = completed
            .iter()
            .map(|p| p.extracted_images.len())
            .sum::<usize>();
        info!(
            pages = completed.len(),
            format = %self.format,
            size = content.len(),
            extracted_images = extracted_image_count,
            "document processing complete"
        );

        send(TaskEvent::Finished(TaskOutcome::Document(Box::new(
            DocumentResult {
                pages: completed,
                format: self.format,
                content,
                content_type,
                extracted_image_count,
            },
        ))));
    }

    /// OCR one page bitmap into a [`PageResult`].
    ///
    /// Everything that can go wrong here maps to a [`PageError`] carrying
    /// the page number; the caller decides what a failed page means.
    async fn process_page(&self, bitmap: &DynamicImage, page_num: usize) -> Result<PageResult, PageError> {
        let processing = |detail: String| PageError::Processing {
            page: page_num,
            detail,
        };

        let scratch = tempfile::TempDir::with_prefix(format!("ocr2doc_page{page_num}_"))
            .map_err(|e| processing(e.to_string()))?;
        let page_path = scratch.path().join("page.png");
        bitmap
            .save(&page_path)
            .map_err(|e| processing(format!("failed to write page bitmap: {e}")))?;

        // Document pages always use plain OCR without grounding; the mode
        // selector applies to single-image tasks only.
        let params = self.config.params(OcrMode::PlainOcr);
        let prompt = build_prompt(&params);
        debug!(page = page_num, "page prompt built");

        let reply = self
            .backend
            .infer(&prompt, &page_path, scratch.path(), &params)
            .await
            .map_err(|e| PageError::Inference {
                page: page_num,
                detail: e.to_string(),
            })?;

        let raw_text = resolve_text(&reply, scratch.path());
        let (width, height) = (bitmap.width(), bitmap.height());

        let detections = grounding::parse_detections(&raw_text, width, height);
        debug!(page = page_num, detections = detections.len(), "page boxes parsed");

        let (extracted_images, remaining) = if self.config.extract_images {
            extract_page_images(&raw_text, bitmap)
        } else {
            (Vec::new(), raw_text.clone())
        };

        let display_text = clean_page_text(&grounding::clean_grounding_text(&remaining));

        Ok(PageResult {
            page_num,
            display_text,
            raw_text,
            detections,
            extracted_images,
            width,
            height,
        })
    }
}

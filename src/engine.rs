//! Engine: owns the backend and enforces the one-active-task discipline.
//!
//! Submitting a task while another is running first raises the old task's
//! cancellation flag and awaits its join handle, so two tasks never overlap
//! and the backend never sees interleaved requests. The old task's events
//! keep flowing to its own receiver until it terminates; the new task gets
//! a fresh channel.

use crate::backend::{ConnectionStatus, OcrBackend};
use crate::config::{OcrConfig, OcrMode, OutputFormat, ProcessingParams};
use crate::convert::{BuiltinConverter, DocumentConverter};
use crate::error::OcrError;
use crate::rasterize::{PdfiumRasterizer, Rasterizer};
use crate::task::document::DocumentTask;
use crate::task::image::ImageTask;
use crate::task::TaskEvent;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Job {
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

/// Orchestrates OCR tasks over a shared inference backend.
pub struct OcrEngine {
    config: OcrConfig,
    backend: Arc<dyn OcrBackend>,
    rasterizer: Arc<dyn Rasterizer>,
    converter: Arc<dyn DocumentConverter>,
    job: Option<Job>,
}

impl OcrEngine {
    /// Engine with the default pdfium rasterizer and builtin converter.
    pub fn new(config: OcrConfig, backend: Arc<dyn OcrBackend>) -> Self {
        Self::with_components(
            config,
            backend,
            Arc::new(PdfiumRasterizer),
            Arc::new(BuiltinConverter),
        )
    }

    /// Engine with explicit rasterizer and converter implementations.
    pub fn with_components(
        config: OcrConfig,
        backend: Arc<dyn OcrBackend>,
        rasterizer: Arc<dyn Rasterizer>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        Self {
            config,
            backend,
            rasterizer,
            converter,
            job: None,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Derive task parameters for a mode from the engine configuration.
    pub fn params(&self, mode: OcrMode) -> ProcessingParams {
        self.config.params(mode)
    }

    /// Probe the backend.
    pub async fn test_connection(&self) -> Result<ConnectionStatus, OcrError> {
        self.backend.test_connection().await
    }

    /// True while a submitted task is still running.
    pub fn is_processing(&self) -> bool {
        self.job.as_ref().is_some_and(|job| !job.handle.is_finished())
    }

    /// OCR a single image. Replaces any running task.
    pub async fn submit_image(
        &mut self,
        image_path: impl Into<PathBuf>,
        params: ProcessingParams,
    ) -> UnboundedReceiver<TaskEvent> {
        self.stop_current().await;

        let image_path = image_path.into();
        info!(path = %image_path.display(), mode = ?params.mode, "starting image task");

        let (tx, rx) = mpsc::unbounded_channel();
        let task = ImageTask {
            backend: Arc::clone(&self.backend),
            image_path,
            params,
            events: tx,
        };
        // Image tasks have no page boundaries, so the flag only matters for
        // the join discipline, not for the task itself.
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(task.run());
        self.job = Some(Job { handle, cancel });
        rx
    }

    /// OCR a document into `format`. Replaces any running task.
    pub async fn submit_document(
        &mut self,
        path: impl Into<PathBuf>,
        format: OutputFormat,
    ) -> UnboundedReceiver<TaskEvent> {
        self.stop_current().await;

        let path = path.into();
        info!(path = %path.display(), %format, "starting document task");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let task = DocumentTask {
            backend: Arc::clone(&self.backend),
            rasterizer: Arc::clone(&self.rasterizer),
            converter: Arc::clone(&self.converter),
            path,
            format,
            config: self.config.clone(),
            cancel: Arc::clone(&cancel),
            events: tx,
        };
        let handle = tokio::spawn(task.run());
        self.job = Some(Job { handle, cancel });
        rx
    }

    /// Raise the cancellation flag on the running task, if any.
    ///
    /// Returns immediately; the task observes the flag at its next page
    /// boundary and emits [`TaskEvent::Cancelled`] on its own channel.
    pub fn cancel(&self) {
        if let Some(job) = &self.job {
            debug!("cancellation requested");
            job.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Cancel the running task and wait for it to terminate.
    pub async fn shutdown(&mut self) {
        self.stop_current().await;
    }

    async fn stop_current(&mut self) {
        if let Some(job) = self.job.take() {
            if !job.handle.is_finished() {
                warn!("stopping active task before starting a new one");
            }
            job.cancel.store(true, Ordering::SeqCst);
            if let Err(err) = job.handle.await {
                warn!(error = %err, "task terminated abnormally");
            }
        }
    }
}

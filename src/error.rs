//! Error types for the ocr2doc library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrError`] — **Fatal**: the task cannot proceed at all (missing
//!   accelerator, retry budget exhausted, unsupported output format).
//!   Surfaced as the task-terminal `Failed` outcome.
//!
//! * [`PageError`] — **Non-fatal**: a single page of a document failed but
//!   the remaining pages are fine. Logged and the page is excluded from the
//!   aggregate; a document task never fails because of one bad page.
//!
//! Parsing problems are deliberately *not* errors: malformed grounding blocks
//! and unreadable image dimensions degrade to fewer detections (see
//! [`crate::grounding`]), never to an `Err`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocr2doc library.
///
/// Page-level failures use [`PageError`] and are logged rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Precondition errors ───────────────────────────────────────────────
    /// The local backend requires a hardware accelerator that is not present.
    ///
    /// Raised once at backend construction, never per call.
    #[error("No hardware accelerator available: {detail}\nThe local backend requires a GPU; use the remote backend against a hosted endpoint instead.")]
    AcceleratorUnavailable { detail: String },

    /// The HTTP client for the remote backend could not be constructed.
    #[error("Failed to construct HTTP client for '{endpoint}': {detail}")]
    ClientConstruction { endpoint: String, detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found or not readable.
    #[error("Cannot read '{}': {detail}", path.display())]
    SourceUnreadable { path: PathBuf, detail: String },

    // ── Inference errors ──────────────────────────────────────────────────
    /// A transient failure (connectivity, timeout, rate limit) persisted
    /// through every retry attempt.
    #[error("Inference failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// The endpoint rejected the request outright (malformed request, model
    /// not found, authentication). Never retried.
    #[error("Inference request rejected: {detail}")]
    InferenceRejected { detail: String },

    /// The in-process model returned an error.
    #[error("Model inference failed: {detail}")]
    ModelFailed { detail: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// Rasterisation produced zero pages.
    #[error("Document contains no pages")]
    EmptyDocument,

    /// The rasterizer failed on the whole document.
    #[error("Rasterisation failed: {detail}")]
    RasterisationFailed { detail: String },

    // ── Validation errors ─────────────────────────────────────────────────
    /// The requested output format selector is not recognised.
    ///
    /// Reported before any page work begins; never passed to the converter.
    #[error("Unsupported output format: '{format}'\nSupported: markdown, html, docx, json")]
    UnsupportedFormat { format: String },

    /// The format is valid but this converter cannot produce it.
    #[error("The builtin converter does not produce '{format}' output; supply a DocumentConverter implementation that does")]
    ConverterUnsupported { format: String },

    /// Conversion itself failed.
    #[error("Document conversion failed: {detail}")]
    ConversionFailed { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page of a document task.
///
/// Logged when a page fails; the page is excluded from the aggregated
/// [`crate::output::DocumentResult`] and processing continues.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    /// Inference failed for this page (after the backend's own retries).
    #[error("Page {page}: inference failed: {detail}")]
    Inference { page: usize, detail: String },

    /// Any other step of page processing failed.
    #[error("Page {page}: processing failed: {detail}")]
    Processing { page: usize, detail: String },
}

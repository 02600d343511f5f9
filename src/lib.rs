//! # ocr2doc
//!
//! Grounded OCR for images and documents via the DeepSeek-OCR family of
//! vision models.
//!
//! ## Why this crate?
//!
//! Plain OCR engines give you text; grounded OCR models additionally tell
//! you *where* each piece of text sits, as `<|ref|>label<|/ref|>` /
//! `<|det|>[[x1,y1,x2,y2]]<|/det|>` blocks with coordinates normalised to a
//! 0–999 grid. This crate runs the inference (against a local in-process
//! model or a remote vLLM-style endpoint), parses those blocks into
//! pixel-space detections, and assembles multi-page documents into
//! Markdown, HTML or JSON.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF
//!  │
//!  ├─ 1. Prompt   mode-specific instruction (plain OCR, markdown, locate, …)
//!  ├─ 2. Render   documents: rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Infer    LocalBackend or RemoteBackend (tiered retry + backoff)
//!  ├─ 4. Parse    grounding blocks → pixel detections + cleaned text
//!  ├─ 5. Extract  crop figure regions the model marked on each page
//!  └─ 6. Convert  page results → markdown / html / json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr2doc::{OcrConfig, OcrEngine, OutputFormat, RemoteBackend, TaskEvent};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder()
//!         .endpoint("http://localhost:8000/v1")
//!         .build()?;
//!     let backend = Arc::new(RemoteBackend::new(&config)?);
//!     let mut engine = OcrEngine::new(config, backend);
//!
//!     let mut events = engine
//!         .submit_document("scan.pdf", OutputFormat::Markdown)
//!         .await;
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             TaskEvent::Progress(msg) => eprintln!("{msg}"),
//!             TaskEvent::Finished(outcome) => println!("{outcome:?}"),
//!             TaskEvent::Error(err) => eprintln!("failed: {err}"),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2doc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ocr2doc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod cleanup;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod extract;
pub mod grounding;
pub mod output;
pub mod prompts;
pub mod rasterize;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    ConnectionStatus, InferenceReply, LocalBackend, ModelRequest, OcrBackend, RemoteBackend,
    VisionModel,
};
pub use config::{OcrConfig, OcrConfigBuilder, OcrMode, OutputFormat, ProcessingParams};
pub use convert::{BuiltinConverter, DocumentConverter};
pub use engine::OcrEngine;
pub use error::{OcrError, PageError};
pub use grounding::{parse_grounding, Detection};
pub use output::{DocumentContent, DocumentResult, ImageDims, ImageResult, PageResult};
pub use rasterize::{PdfiumRasterizer, Rasterizer};
pub use task::{TaskEvent, TaskOutcome};

//! Configuration types for OCR tasks.
//!
//! Backend and engine behaviour is controlled through [`OcrConfig`], built via
//! its [`OcrConfigBuilder`]. Per-task knobs travel in [`ProcessingParams`],
//! which is constructed once per submission and never mutated afterwards, so
//! a result can always be traced back to the exact parameters that produced
//! it.

use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Engine-level configuration: model identity, endpoint, retry budget and
/// processing defaults.
///
/// Built via [`OcrConfig::builder()`] or [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use ocr2doc::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .endpoint("http://localhost:8000/v1")
///     .model("deepseek-ai/DeepSeek-OCR")
///     .max_retries(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Model identifier as known to the serving endpoint.
    /// Default: "deepseek-ai/DeepSeek-OCR".
    pub model: String,

    /// Remote endpoint base URL (OpenAI-compatible, e.g.
    /// "http://localhost:8000/v1"). Unused by the local backend.
    pub endpoint: String,

    /// Optional API credential for the endpoint. Most self-hosted servers
    /// accept any value; hosted ones require a real key.
    pub api_key: Option<String>,

    /// Per-request HTTP timeout in seconds. Default: 120.
    ///
    /// A dense page can take tens of seconds of generation; a timeout below
    /// ~60 s causes spurious retries on slow hardware.
    pub request_timeout_secs: u64,

    /// Total inference attempts for transient failures. Default: 3.
    ///
    /// Connectivity and timeout failures back off `2^attempt` seconds
    /// between attempts; rate limits back off `5 × (attempt + 1)` seconds.
    /// Permanent errors (malformed request, unknown model) are never retried.
    pub max_retries: u32,

    /// Maximum tokens the model may generate per request. Default: 2048.
    pub max_tokens: u32,

    /// Base processing size handed to the model. Default: 1024.
    pub base_size: u32,

    /// Image tile size handed to the model. Default: 640.
    pub image_size: u32,

    /// Enable tiled crop mode in the model's image preprocessor. Default: true.
    pub crop_mode: bool,

    /// Rendering DPI for document rasterisation. Default: 144.
    pub dpi: u32,

    /// Extract embedded figure crops from document pages. Default: true.
    pub extract_images: bool,

    /// Ask the model for an image caption alongside the text. Default: false.
    pub include_caption: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-ai/DeepSeek-OCR".to_string(),
            endpoint: "http://localhost:8000/v1".to_string(),
            api_key: None,
            request_timeout_secs: 120,
            max_retries: 3,
            max_tokens: 2048,
            base_size: 1024,
            image_size: 640,
            crop_mode: true,
            dpi: 144,
            extract_images: true,
            include_caption: false,
        }
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Derive the per-task parameters for the given mode, inheriting the
    /// engine-level processing defaults.
    pub fn params(&self, mode: OcrMode) -> ProcessingParams {
        ProcessingParams {
            mode,
            prompt_text: String::new(),
            grounding: false,
            search_term: None,
            schema: None,
            include_caption: self.include_caption,
            base_size: self.base_size,
            image_size: self.image_size,
            crop_mode: self.crop_mode,
            test_compress: false,
        }
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn base_size(mut self, px: u32) -> Self {
        self.config.base_size = px;
        self
    }

    pub fn image_size(mut self, px: u32) -> Self {
        self.config.image_size = px;
        self
    }

    pub fn crop_mode(mut self, v: bool) -> Self {
        self.config.crop_mode = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn extract_images(mut self, v: bool) -> Self {
        self.config.extract_images = v;
        self
    }

    pub fn include_caption(mut self, v: bool) -> Self {
        self.config.include_caption = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.model.is_empty() {
            return Err(OcrError::InvalidConfig("Model identifier is empty".into()));
        }
        if c.endpoint.is_empty() {
            return Err(OcrError::InvalidConfig("Endpoint URL is empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(OcrError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Per-task parameters ──────────────────────────────────────────────────

/// The OCR instruction mode, selecting which prompt template is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    /// Plain text extraction. (default)
    #[default]
    PlainOcr,
    /// Convert the page to grounded markdown.
    Markdown,
    /// User-supplied freeform instruction.
    Freeform,
    /// Locate every occurrence of a search term.
    FindRef,
    /// Extract key/value pairs as JSON following a caller-supplied schema.
    KvJson,
}

/// Immutable per-task processing parameters.
///
/// Constructed before a task starts (usually via [`OcrConfig::params`]) and
/// passed through unchanged; the result echoes them back so callers can see
/// exactly what produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingParams {
    /// Instruction mode.
    pub mode: OcrMode,
    /// Custom instruction text (used by [`OcrMode::Freeform`]).
    pub prompt_text: String,
    /// Request grounding boxes from the model.
    pub grounding: bool,
    /// Term to locate (used by [`OcrMode::FindRef`]).
    pub search_term: Option<String>,
    /// JSON schema description (used by [`OcrMode::KvJson`]).
    pub schema: Option<String>,
    /// Append a caption request to the prompt.
    pub include_caption: bool,
    /// Base processing size handed to the model.
    pub base_size: u32,
    /// Image tile size handed to the model.
    pub image_size: u32,
    /// Tiled crop mode flag.
    pub crop_mode: bool,
    /// Model-side compression test flag.
    pub test_compress: bool,
}

// ── Output format ────────────────────────────────────────────────────────

/// Target format for document conversion.
///
/// Parsing a format string with [`FromStr`] is the validation gate: an
/// unknown selector fails here, before any page is processed, and is never
/// handed to a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured Markdown text. (default)
    #[default]
    Markdown,
    /// HTML document.
    Html,
    /// Binary office document.
    Docx,
    /// JSON dump of all page results plus summary counts.
    Json,
}

impl OutputFormat {
    /// MIME content-type label for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "text/markdown",
            OutputFormat::Html => "text/html",
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Json => "application/json",
        }
    }

    /// True when this format carries textual content, false for binary.
    pub fn is_textual(&self) -> bool {
        !matches!(self, OutputFormat::Docx)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
            OutputFormat::Docx => "docx",
            OutputFormat::Json => "json",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            "docx" => Ok(OutputFormat::Docx),
            "json" => Ok(OutputFormat::Json),
            other => Err(OcrError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let c = OcrConfig::builder().build().unwrap();
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.base_size, 1024);
        assert_eq!(c.dpi, 144);
        assert!(c.crop_mode);
    }

    #[test]
    fn builder_rejects_empty_model() {
        let err = OcrConfig::builder().model("").build().unwrap_err();
        assert!(err.to_string().contains("Model identifier"));
    }

    #[test]
    fn dpi_is_clamped() {
        let c = OcrConfig::builder().dpi(10_000).build().unwrap();
        assert_eq!(c.dpi, 400);
    }

    #[test]
    fn params_inherit_processing_defaults() {
        let c = OcrConfig::builder().base_size(512).build().unwrap();
        let p = c.params(OcrMode::Markdown);
        assert_eq!(p.base_size, 512);
        assert_eq!(p.mode, OcrMode::Markdown);
        assert!(!p.grounding);
    }

    #[test]
    fn format_parses_known_selectors() {
        assert_eq!("markdown".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("HTML".parse::<OutputFormat>().unwrap(), OutputFormat::Html);
        assert_eq!("docx".parse::<OutputFormat>().unwrap(), OutputFormat::Docx);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
    }

    #[test]
    fn format_rejects_unknown_selector() {
        let err = "rtf".parse::<OutputFormat>().unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat { format } if format == "rtf"));
    }

    #[test]
    fn format_textual_split() {
        assert!(OutputFormat::Markdown.is_textual());
        assert!(OutputFormat::Json.is_textual());
        assert!(!OutputFormat::Docx.is_textual());
    }
}

//! Result types emitted by OCR tasks.

use crate::config::{OutputFormat, ProcessingParams};
use crate::grounding::Detection;
use serde::{Deserialize, Serialize};

/// Pixel dimensions of the image a result was produced from.
///
/// `None` means the dimensions could not be read; detection scaling was
/// skipped for that result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDims {
    pub width: u32,
    pub height: u32,
}

/// Result of a single-image task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    /// Text with grounding tags replaced by their labels.
    pub display_text: String,
    /// Unmodified model output.
    pub raw_text: String,
    /// Scaled detections, empty when grounding was absent or dimensions
    /// were unreadable.
    pub detections: Vec<Detection>,
    /// Dimensions used for scaling, if they could be read.
    pub image_dims: Option<ImageDims>,
    /// The parameters that produced this result, echoed back unchanged.
    pub params: ProcessingParams,
}

/// Result of one successfully processed document page.
///
/// Pages that fail are never materialised into this type; they are logged
/// and excluded from the aggregate.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// 1-indexed source page number.
    pub page_num: usize,
    /// Cleaned page text.
    pub display_text: String,
    /// Unmodified model output for the page.
    pub raw_text: String,
    /// Detections parsed from the page.
    pub detections: Vec<Detection>,
    /// PNG-encoded figure crops extracted from the page bitmap.
    pub extracted_images: Vec<Vec<u8>>,
    /// Page bitmap width in pixels.
    pub width: u32,
    /// Page bitmap height in pixels.
    pub height: u32,
}

/// Converted document content: textual for markdown/html/json, binary for
/// office formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentContent {
    Text(String),
    Binary(Vec<u8>),
}

impl DocumentContent {
    /// Content size in bytes.
    pub fn len(&self) -> usize {
        match self {
            DocumentContent::Text(s) => s.len(),
            DocumentContent::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The textual content, if this is a text variant.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DocumentContent::Text(s) => Some(s),
            DocumentContent::Binary(_) => None,
        }
    }
}

/// Final aggregate of a completed document task.
///
/// `pages` is contiguous in processing order; failed source pages leave gaps
/// in the `page_num` sequence, never holes in the vector.
#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub pages: Vec<PageResult>,
    pub format: OutputFormat,
    pub content: DocumentContent,
    /// MIME label reported by the converter.
    pub content_type: &'static str,
    /// Total figure crops across all pages.
    pub extracted_image_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_len_covers_both_variants() {
        assert_eq!(DocumentContent::Text("abc".into()).len(), 3);
        assert_eq!(DocumentContent::Binary(vec![0; 5]).len(), 5);
        assert!(DocumentContent::Text(String::new()).is_empty());
    }

    #[test]
    fn as_text_only_for_text_variant() {
        assert_eq!(DocumentContent::Text("x".into()).as_text(), Some("x"));
        assert_eq!(DocumentContent::Binary(vec![1]).as_text(), None);
    }
}

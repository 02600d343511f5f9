//! Document conversion: ordered page results → one output document.
//!
//! The document task validates the format selector long before this point
//! (an unknown string never reaches a converter — see
//! [`crate::config::OutputFormat`]'s `FromStr`), so implementations may
//! assume `format` is one of the known variants.
//!
//! [`BuiltinConverter`] covers the textual formats. Office-binary (docx)
//! rendering needs a dedicated document library and stays behind the trait
//! for callers that bring one.

use crate::config::OutputFormat;
use crate::error::OcrError;
use crate::output::{DocumentContent, PageResult};
use serde_json::json;

/// Renders the aggregated page results into the requested format.
pub trait DocumentConverter: Send + Sync {
    /// Convert `pages` (ordered, successful pages only) to `format`.
    ///
    /// Returns the content and its MIME label.
    fn convert(
        &self,
        pages: &[PageResult],
        format: OutputFormat,
    ) -> Result<(DocumentContent, &'static str), OcrError>;
}

/// Default converter: Markdown, HTML and JSON.
#[derive(Default)]
pub struct BuiltinConverter;

impl DocumentConverter for BuiltinConverter {
    fn convert(
        &self,
        pages: &[PageResult],
        format: OutputFormat,
    ) -> Result<(DocumentContent, &'static str), OcrError> {
        let content = match format {
            OutputFormat::Markdown => DocumentContent::Text(to_markdown(pages)),
            OutputFormat::Html => DocumentContent::Text(to_html(pages)),
            OutputFormat::Json => DocumentContent::Text(to_json(pages)?),
            OutputFormat::Docx => {
                return Err(OcrError::ConverterUnsupported {
                    format: format.to_string(),
                })
            }
        };
        Ok((content, format.content_type()))
    }
}

/// Join page texts with a page-comment separator between source pages.
fn to_markdown(pages: &[PageResult]) -> String {
    let mut parts = Vec::with_capacity(pages.len() * 2);
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            parts.push(format!("\n\n<!-- page {} -->\n\n", page.page_num));
        }
        parts.push(page.display_text.clone());
    }
    let mut doc = parts.join("");
    if !doc.ends_with('\n') {
        doc.push('\n');
    }
    doc
}

/// Minimal standalone HTML document with one section per page.
fn to_html(pages: &[PageResult]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>OCR Result</title>\n</head>\n<body>\n",
    );
    for page in pages {
        html.push_str(&format!(
            "<section data-page=\"{}\">\n<pre>{}</pre>\n</section>\n",
            page.page_num,
            escape_html(&page.display_text)
        ));
    }
    html.push_str("</body>\n</html>\n");
    html
}

/// JSON dump of every page result plus summary counts.
///
/// Figure crops are summarised as counts — raw PNG bytes do not belong in a
/// text serialisation.
fn to_json(pages: &[PageResult]) -> Result<String, OcrError> {
    let total_images: usize = pages.iter().map(|p| p.extracted_images.len()).sum();
    let value = json!({
        "pages": pages.iter().map(|p| json!({
            "page_num": p.page_num,
            "text": p.display_text,
            "raw_text": p.raw_text,
            "boxes": p.detections,
            "image_dims": { "w": p.width, "h": p.height },
            "extracted_images": p.extracted_images.len(),
        })).collect::<Vec<_>>(),
        "total_pages": pages.len(),
        "extracted_images_count": total_images,
    });

    serde_json::to_string_pretty(&value).map_err(|e| OcrError::ConversionFailed {
        detail: e.to_string(),
    })
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

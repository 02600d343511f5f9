//! Prompt assembly for the OCR model.
//!
//! Every instruction the model ever sees is built here, as a pure function
//! of [`ProcessingParams`]. Keeping the templates in one module means prompt
//! changes never touch task or backend code, and unit tests can assert on
//! the exact text without running a model.
//!
//! The `<image>` placeholder marks where the image attaches for the local
//! runtime; the remote backend strips it and sends the image as a separate
//! structured content part.

use crate::config::{OcrMode, ProcessingParams};

/// Placeholder replaced (local) or stripped (remote) by the backend.
pub const IMAGE_PLACEHOLDER: &str = "<image>";

/// Build the instruction prompt for the given parameters.
///
/// Pure; no side effects, no failure modes. Missing optional inputs
/// (search term, schema) fall back to the plain-OCR instruction rather
/// than producing an invalid prompt.
pub fn build_prompt(params: &ProcessingParams) -> String {
    let grounding_prefix = if params.grounding { "<|grounding|>" } else { "" };

    let body = match params.mode {
        OcrMode::PlainOcr => {
            if params.grounding {
                "OCR this image.".to_string()
            } else {
                "Free OCR.".to_string()
            }
        }
        OcrMode::Markdown => "Convert the document to markdown.".to_string(),
        OcrMode::Freeform => {
            let text = params.prompt_text.trim();
            if text.is_empty() {
                "Free OCR.".to_string()
            } else {
                text.to_string()
            }
        }
        OcrMode::FindRef => match params.search_term.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                format!("Locate <|ref|>{term}<|/ref|> in the image.")
            }
            _ => "Free OCR.".to_string(),
        },
        OcrMode::KvJson => match params.schema.as_deref().map(str::trim) {
            Some(schema) if !schema.is_empty() => format!(
                "Extract the key information from the document as JSON \
                 following this schema:\n{schema}\nReturn only the JSON."
            ),
            _ => "Extract the key information from the document as JSON.".to_string(),
        },
    };

    let mut prompt = format!("{IMAGE_PLACEHOLDER}\n{grounding_prefix}{body}");

    if params.include_caption {
        prompt.push_str("\nThen describe the image in one sentence.");
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrMode;

    fn params(mode: OcrMode) -> ProcessingParams {
        ProcessingParams {
            mode,
            ..ProcessingParams::default()
        }
    }

    #[test]
    fn plain_ocr_without_grounding() {
        let p = build_prompt(&params(OcrMode::PlainOcr));
        assert_eq!(p, "<image>\nFree OCR.");
    }

    #[test]
    fn grounding_adds_prefix() {
        let mut pr = params(OcrMode::PlainOcr);
        pr.grounding = true;
        let p = build_prompt(&pr);
        assert!(p.contains("<|grounding|>OCR this image."));
    }

    #[test]
    fn find_ref_wraps_term_in_ref_markers() {
        let mut pr = params(OcrMode::FindRef);
        pr.search_term = Some("Invoice Number".into());
        let p = build_prompt(&pr);
        assert!(p.contains("Locate <|ref|>Invoice Number<|/ref|>"));
    }

    #[test]
    fn find_ref_without_term_falls_back_to_plain() {
        let p = build_prompt(&params(OcrMode::FindRef));
        assert!(p.contains("Free OCR."));
    }

    #[test]
    fn freeform_uses_user_text() {
        let mut pr = params(OcrMode::Freeform);
        pr.prompt_text = "List every date on this page.".into();
        let p = build_prompt(&pr);
        assert!(p.ends_with("List every date on this page."));
    }

    #[test]
    fn kv_json_embeds_schema() {
        let mut pr = params(OcrMode::KvJson);
        pr.schema = Some(r#"{"invoice_no": "string"}"#.into());
        let p = build_prompt(&pr);
        assert!(p.contains(r#"{"invoice_no": "string"}"#));
        assert!(p.contains("Return only the JSON."));
    }

    #[test]
    fn caption_suffix_is_appended() {
        let mut pr = params(OcrMode::Markdown);
        pr.include_caption = true;
        let p = build_prompt(&pr);
        assert!(p.ends_with("Then describe the image in one sentence."));
    }

    #[test]
    fn prompt_always_starts_with_image_placeholder() {
        for mode in [
            OcrMode::PlainOcr,
            OcrMode::Markdown,
            OcrMode::Freeform,
            OcrMode::FindRef,
            OcrMode::KvJson,
        ] {
            assert!(build_prompt(&params(mode)).starts_with("<image>\n"));
        }
    }
}

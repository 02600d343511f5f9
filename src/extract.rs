//! Figure extraction: crop image regions a page's raw text points at.
//!
//! In document mode the model marks embedded figures with the same
//! ref/det syntax as ordinary grounding, using a structural label
//! (`image` / `figure`) instead of transcribed text. Those references carry
//! no prose worth keeping — the payload is the crop region — so they are
//! consumed here: the region is cut out of the page bitmap as a PNG and the
//! whole block is removed from the display text. References with any other
//! label are left alone for the converter to interpret.

use crate::grounding;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use tracing::{debug, warn};

/// Same block shape as the grounding parser matches, captured so individual
/// blocks can be classified by label and selectively removed.
static REF_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(grounding::BLOCK_PATTERN).expect("reference block regex"));

/// True when a reference label denotes an embedded figure rather than text.
fn is_image_label(label: &str) -> bool {
    matches!(label.trim().to_ascii_lowercase().as_str(), "image" | "figure")
}

/// Crop every image-labelled reference out of `bitmap` and strip the
/// consumed blocks from the raw text.
///
/// Returns the PNG-encoded crops in source order together with the raw text
/// with image blocks removed (all other grounding blocks untouched — the
/// caller cleans those with [`grounding::clean_grounding_text`]).
pub fn extract_page_images(raw: &str, bitmap: &DynamicImage) -> (Vec<Vec<u8>>, String) {
    let mut crops = Vec::new();

    let stripped = REF_BLOCK.replace_all(raw, |caps: &regex::Captures<'_>| {
        let label = &caps["label"];
        if !is_image_label(label) {
            return caps[0].to_string();
        }

        // Reuse the grounding scaler so crop regions use the exact same
        // floor(raw/999 × dim) arithmetic as detections.
        let block = caps[0].to_string();
        for det in grounding::parse_detections(&block, bitmap.width(), bitmap.height()) {
            match crop_png(bitmap, det.box_) {
                Some(png) => crops.push(png),
                None => warn!(?det.box_, "skipping degenerate figure region"),
            }
        }
        String::new()
    });

    debug!(count = crops.len(), "figure crops extracted");
    (crops, stripped.into_owned())
}

/// Cut one box out of the bitmap and encode it as PNG.
///
/// Returns `None` for empty or out-of-range regions.
fn crop_png(bitmap: &DynamicImage, box_: [i32; 4]) -> Option<Vec<u8>> {
    let [x1, y1, x2, y2] = box_;
    let x1 = x1.clamp(0, bitmap.width() as i32) as u32;
    let y1 = y1.clamp(0, bitmap.height() as i32) as u32;
    let x2 = x2.clamp(0, bitmap.width() as i32) as u32;
    let y2 = y2.clamp(0, bitmap.height() as i32) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let crop = bitmap.crop_imm(x1, y1, x2 - x1, y2 - y1);
    let mut buf = Vec::new();
    crop.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .ok()?;
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn bitmap(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 200, 200, 255])))
    }

    #[test]
    fn image_refs_are_cropped_and_stripped() {
        let raw = "Heading\n<|ref|>image<|/ref|><|det|>[[0,0,499,499]]<|/det|>\nBody";
        let (crops, stripped) = extract_page_images(raw, &bitmap(200, 100));
        assert_eq!(crops.len(), 1);
        assert!(!stripped.contains("<|ref|>image<|/ref|>"));
        assert!(stripped.contains("Heading"));
        assert!(stripped.contains("Body"));
        // PNG magic
        assert_eq!(&crops[0][..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn other_labels_are_left_for_the_converter() {
        let raw = "<|ref|>Total<|/ref|><|det|>[[10,10,500,500]]<|/det|>";
        let (crops, stripped) = extract_page_images(raw, &bitmap(100, 100));
        assert!(crops.is_empty());
        assert_eq!(stripped, raw);
    }

    #[test]
    fn figure_label_is_case_insensitive() {
        let raw = "<|ref|>Figure<|/ref|><|det|>[[0,0,999,999]]<|/det|>";
        let (crops, _) = extract_page_images(raw, &bitmap(50, 50));
        assert_eq!(crops.len(), 1);
    }

    #[test]
    fn degenerate_region_yields_no_crop_but_is_still_consumed() {
        let raw = "<|ref|>image<|/ref|><|det|>[[500,500,500,500]]<|/det|>";
        let (crops, stripped) = extract_page_images(raw, &bitmap(100, 100));
        assert!(crops.is_empty());
        assert!(stripped.trim().is_empty());
    }

    #[test]
    fn block_shape_matches_the_grounding_parser() {
        // Whatever the grounding parser treats as one block, the extractor
        // must consume whole: a multi-line det payload, followed by a text
        // block that has to survive untouched.
        let raw = "<|ref|>figure<|/ref|><|det|>[\n  [0,0,499,499],\n  [500,0,999,499]\n]<|/det|>\n\
                   <|ref|>Caption<|/ref|><|det|>[[0,500,999,999]]<|/det|>";
        assert_eq!(grounding::parse_detections(raw, 100, 100).len(), 3);
        let (crops, stripped) = extract_page_images(raw, &bitmap(100, 100));
        assert_eq!(crops.len(), 2);
        assert!(stripped.contains("<|ref|>Caption<|/ref|>"));
        assert!(!stripped.contains("figure"));
    }

    #[test]
    fn multiple_figures_in_one_block() {
        let raw = "<|ref|>image<|/ref|><|det|>[[0,0,499,499], [500,500,999,999]]<|/det|>";
        let (crops, _) = extract_page_images(raw, &bitmap(100, 100));
        assert_eq!(crops.len(), 2);
    }
}

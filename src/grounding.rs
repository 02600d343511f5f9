//! Grounding-tag parser: raw model output → pixel detections + display text.
//!
//! Grounded model output interleaves prose with blocks of the form
//!
//! ```text
//! <|ref|>Total<|/ref|><|det|>[[100, 200, 300, 400]]<|/det|>
//! ```
//!
//! where each quad is normalised to the closed range 0–999 on both axes.
//! This module extracts every block into [`Detection`]s scaled to real pixel
//! coordinates and produces a cleaned copy of the text with the tags replaced
//! by their labels.
//!
//! A block may contain one flat quad or an arbitrary list of nested quads,
//! so the coordinate capture must run to the final `]` before the block's
//! own `<|/det|>` — far enough that no inner list is truncated, but never
//! across a later block.
//!
//! Nothing in here returns an error. A block whose coordinate expression is
//! not a literal numeric structure contributes no detections; an inner list
//! with fewer than four numbers is skipped while its siblings are kept.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed label with its bounding box in pixel coordinates.
///
/// Created only by [`parse_grounding`]; `box_` is `[x1, y1, x2, y2]` with
/// `x1 ≤ x2`, `y1 ≤ y2` expected (not enforced — the model occasionally
/// emits degenerate boxes and downstream rendering tolerates them).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    #[serde(rename = "box")]
    pub box_: [i32; 4],
}

/// Marker opening a grounded reference label.
pub const REF_OPEN: &str = "<|ref|>";
/// Marker closing a grounded reference label.
pub const REF_CLOSE: &str = "<|/ref|>";
/// Marker opening a detection coordinate list.
pub const DET_OPEN: &str = "<|det|>";
/// Marker closing a detection coordinate list.
pub const DET_CLOSE: &str = "<|/det|>";
/// Bare grounding-mode marker the model may echo back.
pub const GROUNDING_MARKER: &str = "<|grounding|>";

/// One full reference + detection block, with `label` and `coords` captures.
/// The `coords` capture keeps the outer brackets so single quads and nested
/// quad lists parse uniformly; being lazy but anchored on `<|/det|>`, it
/// stretches to the last `]` of this block and no further.
///
/// Shared with the figure extractor so both scanners agree on what one
/// block is.
pub(crate) const BLOCK_PATTERN: &str =
    r"(?s)<\|ref\|>(?P<label>.*?)<\|/ref\|>\s*<\|det\|>\s*(?P<coords>\[.*?\])\s*<\|/det\|>";

static DET_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(BLOCK_PATTERN).expect("detection block regex"));

/// True when the text contains either grounding marker and is worth parsing.
pub fn has_grounding_markers(text: &str) -> bool {
    text.contains(REF_OPEN) || text.contains(DET_OPEN)
}

/// Parse grounding blocks out of `raw` and scale their 0–999 coordinates to
/// the given image dimensions.
///
/// Returns the detections in source order (block order, then inner-list
/// order) together with the cleaned display text: every matched block is
/// replaced by its label, residual `<|grounding|>` markers are removed, and
/// the result is trimmed.
///
/// This function never fails; malformed blocks degrade to fewer detections.
pub fn parse_grounding(raw: &str, image_width: u32, image_height: u32) -> (Vec<Detection>, String) {
    let detections = parse_detections(raw, image_width, image_height);
    let cleaned = clean_grounding_text(raw);
    (detections, cleaned)
}

/// Extract scaled detections without touching the text.
pub fn parse_detections(raw: &str, image_width: u32, image_height: u32) -> Vec<Detection> {
    let mut detections = Vec::new();

    for caps in DET_BLOCK.captures_iter(raw) {
        let label = caps["label"].trim().to_string();
        let coords = caps["coords"].trim();

        let quads = match parse_quads(coords) {
            Some(q) => q,
            None => {
                tracing::debug!(label = %label, "skipping block with unparsable coordinates");
                continue;
            }
        };

        for quad in quads {
            if quad.len() < 4 {
                tracing::debug!(label = %label, ?quad, "skipping box with fewer than 4 entries");
                continue;
            }
            detections.push(Detection {
                label: label.clone(),
                box_: [
                    scale_coord(quad[0], image_width),
                    scale_coord(quad[1], image_height),
                    scale_coord(quad[2], image_width),
                    scale_coord(quad[3], image_height),
                ],
            });
        }
    }

    detections
}

/// Replace every grounding block with its label and drop bare grounding
/// markers. Labels survive even when a block's coordinates failed to parse —
/// the text should read the same either way.
pub fn clean_grounding_text(raw: &str) -> String {
    let cleaned = DET_BLOCK.replace_all(raw, "$label");
    cleaned.replace(GROUNDING_MARKER, "").trim().to_string()
}

/// Scale one normalised coordinate (0–999) to a pixel offset in `dim`.
///
/// `floor(raw / 999 × dim)`, which lands in `[0, dim]` for raw ∈ [0, 999].
fn scale_coord(raw: f64, dim: u32) -> i32 {
    (raw / 999.0 * f64::from(dim)) as i32
}

/// Parse a bracketed coordinate expression into a list of numeric quads.
///
/// The model emits JSON-shaped lists, so `serde_json` handles both accepted
/// forms: a flat `[x1,y1,x2,y2]` becomes a single quad, and `[[..], [..]]`
/// becomes one quad per inner list. Inner entries that are not numbers make
/// that entry non-numeric and the whole element is dropped by the caller's
/// length check. Returns `None` when the expression is not a literal list.
fn parse_quads(expr: &str) -> Option<Vec<Vec<f64>>> {
    let value: Value = serde_json::from_str(expr).ok()?;
    let outer = value.as_array()?;

    // Flat quad: exactly four numbers at the top level.
    if outer.len() == 4 && outer.iter().all(Value::is_number) {
        let quad = outer.iter().filter_map(Value::as_f64).collect::<Vec<_>>();
        return Some(vec![quad]);
    }

    let mut quads = Vec::with_capacity(outer.len());
    for inner in outer {
        let nums = match inner.as_array() {
            Some(a) => a.iter().filter_map(Value::as_f64).collect::<Vec<_>>(),
            // Non-list element inside a nested expression: treat as an
            // undersized quad so the caller skips it but keeps the rest.
            None => Vec::new(),
        };
        quads.push(nums);
    }
    Some(quads)
}

//! Rasterisation boundary: document bytes → ordered page bitmaps.
//!
//! Document tasks depend only on the [`Rasterizer`] trait; the default
//! [`PdfiumRasterizer`] binds to a system pdfium library. pdfium uses
//! thread-local state and is not async-safe, so the actual rendering runs
//! the blocking call on the caller's thread — document workers already
//! execute on their own task and the render happens inside
//! `spawn_blocking` at the call site in [`crate::task::document`].

use crate::error::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Converts a source document into one bitmap per page.
///
/// Returning an empty vector is legal and means the document had no pages;
/// the document task turns that into its own Failed outcome.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, document: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError>;
}

/// Default rasterizer backed by pdfium.
#[derive(Default)]
pub struct PdfiumRasterizer;

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, document: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let pdfium = Pdfium::default();

        let doc = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| OcrError::RasterisationFailed {
                detail: format!("{e:?}"),
            })?;

        let pages = doc.pages();
        info!(pages = pages.len(), dpi, "rasterising document");

        let scale = dpi_scale(dpi);
        let mut bitmaps = Vec::with_capacity(pages.len() as usize);

        for (idx, page) in pages.iter().enumerate() {
            let width = (page.width().value * scale) as i32;
            let render_config = PdfRenderConfig::new().set_target_width(width.max(1));

            let bitmap =
                page.render_with_config(&render_config)
                    .map_err(|e| OcrError::RasterisationFailed {
                        detail: format!("page {}: {e:?}", idx + 1),
                    })?;

            let image = bitmap.as_image();
            debug!(
                page = idx + 1,
                width = image.width(),
                height = image.height(),
                "page rendered"
            );
            bitmaps.push(image);
        }

        Ok(bitmaps)
    }
}

/// Page geometry in a PDF is expressed in points, 1/72 inch.
fn dpi_scale(dpi: u32) -> f32 {
    dpi as f32 / 72.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_scale_maps_points_to_dots() {
        assert_eq!(dpi_scale(72), 1.0);
        assert_eq!(dpi_scale(144), 2.0);
    }

    #[test]
    fn dpi_scale_survives_values_past_u16() {
        // The field is public, so nothing clamps a caller-supplied dpi.
        assert_eq!(dpi_scale(72_000), 1000.0);
        // A truncating u16 cast would wrap 65_608 to 72 and yield 1.0.
        assert!(dpi_scale(u32::from(u16::MAX) + 73) > 911.0);
    }
}

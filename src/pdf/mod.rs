//! PDF watermarking module

pub mod document;
pub mod fonts;
pub mod merge;
pub mod metadata;
pub mod overlay;

use std::path::Path;

use image::RgbImage;
use lopdf::Document;

use crate::error::Result;
use crate::font::FontResource;
use crate::layout::{PageSize, PdfAnchor, WatermarkStyle};

// Re-export commonly used items
pub use document::{images_to_pdf, save_to_bytes, watermark_document, watermark_pdf_file};
pub use merge::{composite_page, page_size};
pub use metadata::{count_pages, extract_metadata, PdfMetadata};
pub use overlay::render_on_document_page;

/// PDF rendering capability
///
/// Holds the placement settings used for every overlay it produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer {
    anchor: PdfAnchor,
    style: WatermarkStyle,
}

impl PdfRenderer {
    pub fn new(anchor: PdfAnchor) -> Self {
        Self {
            anchor,
            style: WatermarkStyle::standard(),
        }
    }

    pub fn anchor(&self) -> PdfAnchor {
        self.anchor
    }

    /// Build a one-page overlay for a page of the given size
    pub fn render_overlay(&self, page: PageSize, text: &str, font: &FontResource) -> Result<Document> {
        overlay::build_overlay(page, text, font, self.anchor, &self.style)
    }

    /// Watermark every page of a PDF file, returning the output bytes and page count
    pub fn watermark_file(&self, input: &Path, text: &str, font: &FontResource) -> Result<(Vec<u8>, usize)> {
        watermark_pdf_file(input, text, font, self.anchor, &self.style)
    }

    /// Serialize watermarked images as a PDF, one page per image
    pub fn images_to_pdf_bytes(&self, images: &[RgbImage]) -> Result<Vec<u8>> {
        save_to_bytes(images_to_pdf(images)?)
    }
}

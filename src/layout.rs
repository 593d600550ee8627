//! Watermark placement calculations

use std::fmt;
use std::str::FromStr;

/// Fixed watermark appearance shared by the raster and PDF paths
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkStyle {
    /// Text size (pixels for images, points for PDF pages)
    pub font_size: f32,
    /// Distance of the text from the right and bottom edges
    pub inset: u32,
    /// Raster fill color as RGBA
    pub raster_color: [u8; 4],
    /// PDF fill color as RGB components in 0..=1
    pub pdf_color: [f32; 3],
    /// PDF fill alpha
    pub pdf_alpha: f32,
    /// Offset of the fixed PDF anchor from the page's right edge
    pub pdf_anchor_dx: f32,
    /// Offset of the fixed PDF anchor from the page's top edge
    pub pdf_anchor_dy: f32,
}

impl WatermarkStyle {
    /// Semi-transparent red, 40 units, 10 units from the corner
    pub const fn standard() -> Self {
        Self {
            font_size: 40.0,
            inset: 10,
            raster_color: [255, 0, 0, 128],
            pdf_color: [1.0, 0.0, 0.0],
            pdf_alpha: 0.5,
            pdf_anchor_dx: 200.0,
            pdf_anchor_dy: 80.0,
        }
    }
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self::standard()
    }
}

/// Tight box around rendered glyph ink, in pixels
///
/// Coordinates are relative to the layout origin: the top-left of the text
/// line, with the baseline one ascent below it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextBounds {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl TextBounds {
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Smallest box containing both
    pub fn union(&self, other: &TextBounds) -> TextBounds {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        TextBounds {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Where the ink box's top-left corner goes on a `width` x `height` image
///
/// The text ends `inset` pixels from the right and bottom edges. The result can
/// be negative when the text is larger than the image.
pub fn raster_ink_origin(width: u32, height: u32, bounds: &TextBounds, inset: u32) -> (i32, i32) {
    let x = width as i64 - bounds.width() as i64 - inset as i64;
    let y = height as i64 - bounds.height() as i64 - inset as i64;
    (clamp_i32(x), clamp_i32(y))
}

/// Pen position (layout origin) that puts the ink box at [`raster_ink_origin`]
pub fn raster_draw_origin(width: u32, height: u32, bounds: &TextBounds, inset: u32) -> (i32, i32) {
    let (x, y) = raster_ink_origin(width, height, bounds, inset);
    (x - bounds.x0, y - bounds.y0)
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// PDF page size in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// US Letter size (8.5" x 11")
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// A4 size (210mm x 297mm)
    pub fn a4() -> Self {
        Self::new(595.28, 841.89)
    }
}

/// How the PDF watermark is positioned on a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PdfAnchor {
    /// Baseline start at (width - 200, height - 80), whatever the text size.
    /// Can fall off small pages or sit far from the corner of large ones.
    #[default]
    Fixed,
    /// Text advance box ends `inset` points from the right and bottom edges,
    /// matching the raster placement.
    Inset,
}

impl PdfAnchor {
    /// Baseline start point in PDF user space (origin bottom-left)
    ///
    /// `text_width` is the advance width of the shaped text and `descent` the
    /// (positive) distance from baseline to the lowest point of the font.
    pub fn baseline_origin(
        &self,
        page: PageSize,
        style: &WatermarkStyle,
        text_width: f32,
        descent: f32,
    ) -> (f32, f32) {
        match self {
            PdfAnchor::Fixed => (
                page.width - style.pdf_anchor_dx,
                page.height - style.pdf_anchor_dy,
            ),
            PdfAnchor::Inset => {
                let inset = style.inset as f32;
                (page.width - text_width - inset, inset + descent)
            }
        }
    }
}

impl FromStr for PdfAnchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(PdfAnchor::Fixed),
            "inset" => Ok(PdfAnchor::Inset),
            other => Err(format!("unknown PDF anchor '{}' (expected fixed or inset)", other)),
        }
    }
}

impl fmt::Display for PdfAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfAnchor::Fixed => f.write_str("fixed"),
            PdfAnchor::Inset => f.write_str("inset"),
        }
    }
}

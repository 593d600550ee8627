//! Error types for the text watermark library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the text watermark library
#[derive(Error, Debug)]
pub enum Error {
    /// Font file does not exist
    #[error("Font file not found: {}", .0.display())]
    FontNotFound(PathBuf),

    /// Font file could not be read or parsed as TrueType
    #[error("Font error: {0}")]
    Font(String),

    /// The font has no glyph for a character of the watermark text
    #[error("Font has no glyph for character {0:?}")]
    MissingGlyph(char),

    /// Input extension is not one of png/jpg/jpeg/pdf
    #[error("Unsupported file type: {0:?} (only PNG/JPG/JPEG/PDF are supported)")]
    UnsupportedType(String),

    /// Watermark text is empty
    #[error("Watermark text is empty")]
    EmptyText,

    /// PDF support is not available in this build or was disabled
    #[error("PDF support is not available; only image watermarking is possible")]
    PdfUnavailable,

    /// Input file not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(String),

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "pdf")]
impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Pdf(err.to_string())
    }
}

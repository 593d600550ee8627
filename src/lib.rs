//! Text Watermark Library
//!
//! A library for stamping a short text watermark onto images and PDFs.
//! This library provides functionality to:
//! - Draw half-transparent red text near the bottom-right corner of PNG/JPEG images
//! - Overlay the same text on every page of a PDF, keeping page order
//! - Write the result atomically, as JPEG or PDF
//! - Drive the whole interaction through a pluggable front-end
//!
//! # Example
//!
//! ```no_run
//! use text_watermark::{FontResource, Watermarker};
//! use std::path::Path;
//!
//! let font = FontResource::load(Path::new("NotoSansSC-Regular.ttf"))
//!     .expect("Failed to load font");
//! let watermarker = Watermarker::new(font);
//!
//! let outcome = watermarker
//!     .process(Path::new("photo.png"), "CONFIDENTIAL", Path::new("photo-marked.jpg"))
//!     .expect("Failed to watermark");
//! println!("{}", outcome);
//! ```

pub mod error;
pub mod font;
pub mod layout;
pub mod raster;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod process;
pub mod pipeline;

// Re-export commonly used items
pub use error::{Error, Result};
pub use font::FontResource;
pub use layout::{PdfAnchor, WatermarkStyle};
pub use process::{InputKind, Outcome, OutputFormat, OutputMode, Watermarker};
pub use pipeline::{Frontend, Report, Step};

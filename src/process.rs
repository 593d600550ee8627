//! File-type dispatch and output persistence

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::font::FontResource;
use crate::raster::{encode_jpeg, load_rgb, render_on_image, JPEG_QUALITY};

#[cfg(feature = "pdf")]
use crate::layout::PdfAnchor;
#[cfg(feature = "pdf")]
use crate::pdf::PdfRenderer;

/// Kind of document an input path holds, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// PNG or JPEG image
    Raster,
    /// PDF document
    Pdf,
}

impl InputKind {
    /// Classify `path` by its (case-insensitive) extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "png" | "jpg" | "jpeg" => Ok(InputKind::Raster),
            "pdf" => Ok(InputKind::Pdf),
            _ => Err(Error::UnsupportedType(ext)),
        }
    }
}

/// What a raster input is written as
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// JPEG at quality 85, whatever the output extension says
    #[default]
    Native,
    /// A one-page PDF holding the watermarked image at 1:1 scale
    Pdf,
}

/// Format of a written output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Pdf,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => f.write_str("JPEG"),
            OutputFormat::Pdf => f.write_str("PDF"),
        }
    }
}

/// Result of a successful watermarking run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Pages (PDF input) or images (raster input) watermarked
    pub pages: usize,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.pages == 1 { "page" } else { "pages" };
        write!(
            f,
            "Watermarked {} {} into {} ({})",
            self.pages,
            unit,
            self.output.display(),
            self.format
        )
    }
}

struct Rendered {
    bytes: Vec<u8>,
    format: OutputFormat,
    pages: usize,
}

/// Applies one font's watermark to input files
pub struct Watermarker {
    font: FontResource,
    mode: OutputMode,
    #[cfg(feature = "pdf")]
    pdf: Option<PdfRenderer>,
}

impl Watermarker {
    /// Create a watermarker writing raster inputs as JPEG
    ///
    /// PDF support is enabled whenever the crate was built with it.
    pub fn new(font: FontResource) -> Self {
        #[cfg(not(feature = "pdf"))]
        warn!("Built without PDF support; only PNG/JPEG inputs can be watermarked");

        Self {
            font,
            mode: OutputMode::Native,
            #[cfg(feature = "pdf")]
            pdf: Some(PdfRenderer::default()),
        }
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Choose how watermarks are anchored on PDF pages
    #[cfg(feature = "pdf")]
    pub fn with_pdf_anchor(mut self, anchor: PdfAnchor) -> Self {
        if self.pdf.is_some() {
            self.pdf = Some(PdfRenderer::new(anchor));
        }
        self
    }

    /// Disable PDF support, leaving only raster watermarking
    pub fn without_pdf(self) -> Self {
        warn!("PDF support disabled; only PNG/JPEG inputs can be watermarked");
        Self {
            #[cfg(feature = "pdf")]
            pdf: None,
            ..self
        }
    }

    pub fn has_pdf_support(&self) -> bool {
        #[cfg(feature = "pdf")]
        {
            self.pdf.is_some()
        }
        #[cfg(not(feature = "pdf"))]
        {
            false
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn font(&self) -> &FontResource {
        &self.font
    }

    /// Watermark `input` with `text` and write the result to `output`
    ///
    /// Nothing is written unless the whole document renders: the output is
    /// built in memory, written to a temporary file next to `output`, and only
    /// then moved into place.
    pub fn process(&self, input: &Path, text: &str, output: &Path) -> Result<Outcome> {
        if text.is_empty() {
            return Err(Error::EmptyText);
        }

        let kind = InputKind::from_path(input)?;
        if !input.exists() {
            return Err(Error::FileNotFound(input.to_path_buf()));
        }
        debug!("Processing {} as {:?} ({:?} mode)", input.display(), kind, self.mode);

        let rendered = match kind {
            InputKind::Raster => self.render_raster(input, text)?,
            InputKind::Pdf => self.render_pdf(input, text)?,
        };

        write_atomically(output, &rendered.bytes)?;

        let outcome = Outcome {
            output: output.to_path_buf(),
            format: rendered.format,
            pages: rendered.pages,
        };
        info!("{}", outcome);
        Ok(outcome)
    }

    fn render_raster(&self, input: &Path, text: &str) -> Result<Rendered> {
        let mut image = load_rgb(input)?;
        render_on_image(&mut image, text, &self.font)?;

        match self.mode {
            OutputMode::Native => Ok(Rendered {
                bytes: encode_jpeg(&image, JPEG_QUALITY)?,
                format: OutputFormat::Jpeg,
                pages: 1,
            }),
            OutputMode::Pdf => Ok(Rendered {
                bytes: self.images_to_pdf(&[image])?,
                format: OutputFormat::Pdf,
                pages: 1,
            }),
        }
    }

    #[cfg(feature = "pdf")]
    fn render_pdf(&self, input: &Path, text: &str) -> Result<Rendered> {
        let renderer = self.pdf.as_ref().ok_or(Error::PdfUnavailable)?;
        let (bytes, pages) = renderer.watermark_file(input, text, &self.font)?;
        Ok(Rendered {
            bytes,
            format: OutputFormat::Pdf,
            pages,
        })
    }

    #[cfg(not(feature = "pdf"))]
    fn render_pdf(&self, _input: &Path, _text: &str) -> Result<Rendered> {
        Err(Error::PdfUnavailable)
    }

    #[cfg(feature = "pdf")]
    fn images_to_pdf(&self, images: &[RgbImage]) -> Result<Vec<u8>> {
        let renderer = self.pdf.as_ref().ok_or(Error::PdfUnavailable)?;
        renderer.images_to_pdf_bytes(images)
    }

    #[cfg(not(feature = "pdf"))]
    fn images_to_pdf(&self, _images: &[RgbImage]) -> Result<Vec<u8>> {
        Err(Error::PdfUnavailable)
    }
}

/// Write `bytes` to `output` through a temporary file in the same directory
fn write_atomically(output: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(output).map_err(|e| Error::Io(e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

//! Watermark font loading
//!
//! The font is chosen by the user once per run. It is loaded into a
//! [`FontResource`] which every render call borrows; nothing about the font is
//! kept in global state.

use std::fmt;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontVec, GlyphId};
use log::debug;

use crate::error::{Error, Result};

/// Logical name the font is registered under in generated PDF content
pub const DEFAULT_FONT_NAME: &str = "WatermarkFont";

/// A parsed TrueType font shared read-only by all render calls of a run
pub struct FontResource {
    font: FontVec,
    name: String,
    path: Option<PathBuf>,
}

impl FontResource {
    /// Load a TrueType font from disk
    ///
    /// Fails with [`Error::FontNotFound`] when the file is absent and with
    /// [`Error::Font`] when it cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::FontNotFound(path.to_path_buf()));
        }

        let data = std::fs::read(path)
            .map_err(|e| Error::Font(format!("cannot read {}: {}", path.display(), e)))?;

        let mut resource = Self::from_bytes(data)
            .map_err(|e| Error::Font(format!("{}: {}", path.display(), e)))?;
        resource.path = Some(path.to_path_buf());

        debug!(
            "Loaded font {} ({} glyphs)",
            path.display(),
            resource.font.glyph_count()
        );

        Ok(resource)
    }

    /// Parse a font from raw TrueType/OpenType bytes
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let font = FontVec::try_from_vec(data)
            .map_err(|e| Error::Font(format!("not a valid TrueType font ({})", e)))?;

        Ok(Self {
            font,
            name: DEFAULT_FONT_NAME.to_string(),
            path: None,
        })
    }

    /// Register the font under a different logical name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The rasterizer handle
    pub fn glyphs(&self) -> &FontVec {
        &self.font
    }

    /// Raw font program bytes, as embedded into PDF output
    pub fn data(&self) -> &[u8] {
        self.font.as_slice()
    }

    /// Logical name used for the font in generated PDF content
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the font was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Glyph for `c`, failing when the font does not cover it
    pub fn glyph_for(&self, c: char) -> Result<GlyphId> {
        let id = self.font.glyph_id(c);
        if id.0 == 0 && !c.is_control() {
            return Err(Error::MissingGlyph(c));
        }
        Ok(id)
    }
}

impl fmt::Debug for FontResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontResource")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("bytes", &self.data().len())
            .finish()
    }
}

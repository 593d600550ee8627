//! Text watermark rendering onto raster images
//!
//! Glyphs are laid out with [`ab_glyph`] on a single line, measured for their
//! tight ink box, and alpha-blended straight into an RGB surface near its
//! bottom-right corner.

use std::io::Cursor;
use std::path::Path;

use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, Rgb, RgbImage};
use log::debug;

use crate::error::{Error, Result};
use crate::font::FontResource;
use crate::layout::{raster_draw_origin, TextBounds, WatermarkStyle};

/// JPEG quality used for every raster output
pub const JPEG_QUALITY: u8 = 85;

/// Scale at which one em of the font spans `size` pixels
fn em_scale(font: &FontVec, size: f32) -> PxScale {
    match font.units_per_em() {
        Some(upem) if upem > 0.0 => PxScale::from(size * font.height_unscaled() / upem),
        _ => PxScale::from(size),
    }
}

/// Position every glyph of `text` on one line starting at the origin
///
/// The pen starts at x = 0 with the baseline one ascent below y = 0.
fn layout_line(text: &str, font: &FontResource, size: f32) -> Result<Vec<Glyph>> {
    let scale = em_scale(font.glyphs(), size);
    let scaled = font.glyphs().as_scaled(scale);
    let baseline = scaled.ascent();

    let mut glyphs = Vec::with_capacity(text.len());
    let mut caret = 0.0f32;
    let mut prev: Option<ab_glyph::GlyphId> = None;

    for c in text.chars() {
        let id = font.glyph_for(c)?;
        if let Some(prev) = prev {
            caret += scaled.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(caret, baseline)));
        caret += scaled.h_advance(id);
        prev = Some(id);
    }

    Ok(glyphs)
}

/// Tight ink box of `text` rendered at `size` pixels per em
///
/// Text without visible ink (only spaces) yields an empty box.
pub fn measure_text(text: &str, font: &FontResource, size: f32) -> Result<TextBounds> {
    let glyphs = layout_line(text, font, size)?;
    Ok(ink_bounds(font.glyphs(), &glyphs))
}

fn ink_bounds(font: &FontVec, glyphs: &[Glyph]) -> TextBounds {
    glyphs
        .iter()
        .filter_map(|g| font.outline_glyph(g.clone()))
        .map(|outlined| {
            let b = outlined.px_bounds();
            TextBounds {
                x0: b.min.x.floor() as i32,
                y0: b.min.y.floor() as i32,
                x1: b.max.x.ceil() as i32,
                y1: b.max.y.ceil() as i32,
            }
        })
        .fold(TextBounds::default(), |acc, b| acc.union(&b))
}

/// Draw `text` near the bottom-right corner of `surface`
///
/// The ink box is placed so it ends 10 pixels from the right and bottom
/// edges, in half-transparent red at 40 pixels per em. The surface is
/// modified in place and handed back for chaining.
pub fn render_on_image<'a>(
    surface: &'a mut RgbImage,
    text: &str,
    font: &FontResource,
) -> Result<&'a mut RgbImage> {
    render_on_image_with_style(surface, text, font, &WatermarkStyle::standard())
}

/// [`render_on_image`] with an explicit style
pub fn render_on_image_with_style<'a>(
    surface: &'a mut RgbImage,
    text: &str,
    font: &FontResource,
    style: &WatermarkStyle,
) -> Result<&'a mut RgbImage> {
    if text.is_empty() {
        return Err(Error::EmptyText);
    }

    let glyphs = layout_line(text, font, style.font_size)?;
    let bounds = ink_bounds(font.glyphs(), &glyphs);
    if bounds.is_empty() {
        debug!("Watermark text {:?} has no visible ink", text);
        return Ok(surface);
    }

    let (width, height) = surface.dimensions();
    let (ox, oy) = raster_draw_origin(width, height, &bounds, style.inset);
    debug!(
        "Raster watermark {}x{} ink at ({}, {}) on {}x{} image",
        bounds.width(),
        bounds.height(),
        ox + bounds.x0,
        oy + bounds.y0,
        width,
        height
    );

    let [r, g, b, a] = style.raster_color;
    let color = [r as f32, g as f32, b as f32];
    let alpha = a as f32 / 255.0;

    for glyph in glyphs {
        let Some(outlined) = font.glyphs().outline_glyph(glyph) else {
            continue;
        };
        let gb = outlined.px_bounds();
        let left = ox as i64 + gb.min.x as i64;
        let top = oy as i64 + gb.min.y as i64;

        outlined.draw(|gx, gy, coverage| {
            let x = left + gx as i64;
            let y = top + gy as i64;
            if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                return;
            }
            let weight = coverage.clamp(0.0, 1.0) * alpha;
            let pixel = surface.get_pixel_mut(x as u32, y as u32);
            *pixel = blend(*pixel, color, weight);
        });
    }

    Ok(surface)
}

/// Source-over blend of a solid color onto an opaque pixel
fn blend(dst: Rgb<u8>, src: [f32; 3], weight: f32) -> Rgb<u8> {
    let mix = |d: u8, s: f32| -> u8 { (d as f32 * (1.0 - weight) + s * weight).round() as u8 };
    Rgb([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2])])
}

/// Decode an image file and flatten it to opaque RGB, dropping any alpha
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    debug!(
        "Decoded {} ({}x{}, {:?})",
        path.display(),
        image.width(),
        image.height(),
        image.color()
    );
    Ok(image.into_rgb8())
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode_image(image)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::fixture_font;

    /// Box around every pixel that differs from the background color
    fn changed_region(image: &RgbImage, background: Rgb<u8>) -> Option<TextBounds> {
        let mut region: Option<TextBounds> = None;
        for (x, y, px) in image.enumerate_pixels() {
            if *px != background {
                let b = TextBounds { x0: x as i32, y0: y as i32, x1: x as i32 + 1, y1: y as i32 + 1 };
                region = Some(region.map_or(b, |r| r.union(&b)));
            }
        }
        region
    }

    #[test]
    fn test_measure_text() {
        let font = fixture_font();
        let bounds = measure_text("TEST", &font, 40.0).unwrap();
        assert!(bounds.width() > 40, "width {}", bounds.width());
        assert!(bounds.height() > 20 && bounds.height() <= 40, "height {}", bounds.height());
        // Caps start below the ascender line
        assert!(bounds.y0 > 0);
    }

    #[test]
    fn test_measure_whitespace_has_no_ink() {
        let font = fixture_font();
        assert!(measure_text("   ", &font, 40.0).unwrap().is_empty());
    }

    #[test]
    fn test_wider_text_measures_wider() {
        let font = fixture_font();
        let short = measure_text("ab", &font, 40.0).unwrap();
        let long = measure_text("abab", &font, 40.0).unwrap();
        assert!(long.width() > short.width());
    }

    #[test]
    fn test_render_places_ink_in_bottom_right() {
        let font = fixture_font();
        let background = Rgb([255, 255, 255]);
        let mut image = RgbImage::from_pixel(800, 600, background);

        let bounds = measure_text("TEST", &font, 40.0).unwrap();
        render_on_image(&mut image, "TEST", &font).unwrap();

        let region = changed_region(&image, background).expect("watermark should be drawn");
        assert!(region.x0 >= 0 && region.y0 >= 0);
        assert!(region.x1 <= 800 - 10, "right edge {}", region.x1);
        assert!(region.y1 <= 600 - 10, "bottom edge {}", region.y1);
        assert!(region.x0 >= 800 - 10 - bounds.width());
        assert!(region.y0 >= 600 - 10 - bounds.height());
        assert_eq!(image.dimensions(), (800, 600));
    }

    #[test]
    fn test_render_is_half_transparent_red() {
        let font = fixture_font();
        let mut image = RgbImage::from_pixel(400, 200, Rgb([0, 0, 255]));
        render_on_image(&mut image, "IIII", &font).unwrap();

        // Fully covered stem pixels blend 128/255 red over blue
        let reddest = image.pixels().map(|p| p[0]).max().unwrap();
        assert!((126..=130).contains(&reddest), "red channel {}", reddest);
        let strongest = image.pixels().find(|p| p[0] == reddest).unwrap();
        assert!((125..=129).contains(&strongest[2]), "blue channel {}", strongest[2]);
        assert_eq!(strongest[1], 0);
    }

    #[test]
    fn test_render_clips_on_tiny_image() {
        let font = fixture_font();
        let mut image = RgbImage::new(12, 12);
        render_on_image(&mut image, "Watermark", &font).unwrap();
        assert_eq!(image.dimensions(), (12, 12));
    }

    #[test]
    fn test_render_rejects_empty_text() {
        let font = fixture_font();
        let mut image = RgbImage::new(50, 50);
        assert!(matches!(render_on_image(&mut image, "", &font), Err(Error::EmptyText)));
    }

    #[test]
    fn test_render_missing_glyph_fails() {
        let font = fixture_font();
        let mut image = RgbImage::new(300, 100);
        let result = render_on_image(&mut image, "水印", &font);
        assert!(matches!(result, Err(Error::MissingGlyph('水'))));
    }

    #[test]
    fn test_encode_jpeg_keeps_dimensions() {
        let image = RgbImage::from_pixel(64, 48, Rgb([10, 200, 30]));
        let bytes = encode_jpeg(&image, JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }
}

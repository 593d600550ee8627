//! Text shaping and TrueType embedding for watermark overlays
//!
//! Text is shaped with rustybuzz into glyph ids and drawn through a Type0 font
//! with Identity-H encoding, so any script the font covers can be written.
//! A ToUnicode CMap keeps the watermark text extractable.

use std::collections::BTreeMap;

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use rustybuzz::ttf_parser::GlyphId;
use rustybuzz::{Face, UnicodeBuffer};

use crate::error::{Error, Result};
use crate::font::FontResource;

/// One shaped glyph
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedGlyph {
    /// Glyph id, used directly as CID
    pub id: u16,
    /// Advance chosen by the shaper, in font units
    pub advance: i32,
    /// Nominal advance from the hmtx table, in font units
    pub nominal_advance: i32,
    /// Placement relative to the pen position, in font units (combining marks)
    pub x_offset: i32,
    pub y_offset: i32,
    /// Source text the glyph was produced from
    pub text: String,
}

/// Text run shaped against a specific font
#[derive(Debug, Clone)]
pub struct ShapedText {
    pub glyphs: Vec<ShapedGlyph>,
    pub units_per_em: u16,
    /// Distance from baseline to the font's lowest point, in font units
    pub descent: i32,
}

impl ShapedText {
    /// Advance width of the whole run at `font_size`
    pub fn width(&self, font_size: f32) -> f32 {
        let total: i32 = self.glyphs.iter().map(|g| g.advance).sum();
        total as f32 * font_size / self.units_per_em as f32
    }

    /// Descent below the baseline at `font_size`
    pub fn descent(&self, font_size: f32) -> f32 {
        self.descent as f32 * font_size / self.units_per_em as f32
    }

    /// Convert font units to the 1/1000 em units PDF font metrics use
    fn to_pdf_units(&self, value: i32) -> i64 {
        (value as f64 * 1000.0 / self.units_per_em as f64).round() as i64
    }

    /// Text-showing operations for the run at `font_size`
    ///
    /// Glyph ids go out as hex strings in `TJ` arrays. Shaped advances and
    /// horizontal offsets become `TJ` adjustments; vertical offsets switch the
    /// text rise with `Ts`, splitting the run.
    pub fn text_operations(&self, font_size: f32) -> Vec<Operation> {
        let mut operations = Vec::new();
        let mut parts: Vec<Object> = Vec::new();
        let mut run: Vec<u8> = Vec::new();
        let mut rise = 0;
        // Adjustment owed before the next glyph, in 1/1000 em
        let mut pending: i64 = 0;

        let flush_run = |run: &mut Vec<u8>, parts: &mut Vec<Object>| {
            if !run.is_empty() {
                parts.push(Object::String(std::mem::take(run), StringFormat::Hexadecimal));
            }
        };

        for glyph in &self.glyphs {
            if glyph.y_offset != rise {
                flush_run(&mut run, &mut parts);
                if !parts.is_empty() {
                    operations.push(Operation::new("TJ", vec![Object::Array(std::mem::take(&mut parts))]));
                }
                rise = glyph.y_offset;
                let rise_pts = rise as f32 * font_size / self.units_per_em as f32;
                operations.push(Operation::new("Ts", vec![Object::Real(rise_pts)]));
            }

            // TJ numbers move the pen left, so a rightward shift is negative
            let shift = self.to_pdf_units(glyph.x_offset);
            let before = pending - shift;
            if before != 0 {
                flush_run(&mut run, &mut parts);
                parts.push(Object::Integer(before));
            }
            run.extend_from_slice(&glyph.id.to_be_bytes());
            pending = self.to_pdf_units(glyph.nominal_advance - glyph.advance) + shift;
        }

        flush_run(&mut run, &mut parts);
        if !parts.is_empty() {
            operations.push(Operation::new("TJ", vec![Object::Array(parts)]));
        }
        if rise != 0 {
            operations.push(Operation::new("Ts", vec![Object::Integer(0)]));
        }

        operations
    }
}

fn parse_face(font: &FontResource) -> Result<Face<'_>> {
    Face::from_slice(font.data(), 0)
        .ok_or_else(|| Error::Font(format!("{} cannot be parsed for shaping", font.name())))
}

/// Shape `text` with the watermark font
///
/// Fails with [`Error::MissingGlyph`] when the font maps a character to the
/// missing glyph.
pub fn shape_text(font: &FontResource, text: &str) -> Result<ShapedText> {
    if text.is_empty() {
        return Err(Error::EmptyText);
    }

    let face = parse_face(font)?;

    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    buffer.guess_segment_properties();
    let output = rustybuzz::shape(&face, &[], buffer);

    let infos = output.glyph_infos();
    let positions = output.glyph_positions();

    // Cluster boundaries let every glyph recover the text it came from
    let mut boundaries: Vec<usize> = infos.iter().map(|info| info.cluster as usize).collect();
    boundaries.push(text.len());
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut glyphs = Vec::with_capacity(infos.len());
    for (info, pos) in infos.iter().zip(positions) {
        let start = (info.cluster as usize).min(text.len());
        let end = boundaries
            .iter()
            .copied()
            .find(|&b| b > start)
            .unwrap_or(text.len());
        let source = text.get(start..end).unwrap_or_default();

        if info.glyph_id == 0 {
            let missing = source.chars().find(|c| !c.is_control());
            if let Some(c) = missing {
                return Err(Error::MissingGlyph(c));
            }
        }

        let id = u16::try_from(info.glyph_id)
            .map_err(|_| Error::Font(format!("glyph id {} out of range", info.glyph_id)))?;
        let nominal = face.glyph_hor_advance(GlyphId(id)).unwrap_or(0) as i32;

        glyphs.push(ShapedGlyph {
            id,
            advance: pos.x_advance,
            nominal_advance: nominal,
            x_offset: pos.x_offset,
            y_offset: pos.y_offset,
            text: source.to_string(),
        });
    }

    let units_per_em = u16::try_from(face.units_per_em())
        .ok()
        .filter(|&upem| upem > 0)
        .ok_or_else(|| Error::Font(format!("invalid units per em {}", face.units_per_em())))?;

    Ok(ShapedText {
        glyphs,
        units_per_em,
        descent: -(face.descender() as i32),
    })
}

/// PDF name for the font: printable ASCII without delimiters or spaces
fn base_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect();
    if cleaned.is_empty() {
        "WatermarkFont".to_string()
    } else {
        cleaned
    }
}

/// Embed the font program as a Type0 font covering the glyphs of `shaped`
///
/// Returns the id of the Type0 font dictionary.
pub fn embed_font(doc: &mut Document, font: &FontResource, shaped: &ShapedText) -> Result<ObjectId> {
    let face = parse_face(font)?;
    let base_font = base_font_name(font.name());
    let scale = |v: i16| -> i64 { (v as f64 * 1000.0 / face.units_per_em() as f64).round() as i64 };

    // Font program (the actual TTF data)
    let mut font_stream_dict = Dictionary::new();
    font_stream_dict.set("Length1", Object::Integer(font.data().len() as i64));
    let font_stream_id = doc.add_object(Stream::new(font_stream_dict, font.data().to_vec()));

    let bbox = face.global_bounding_box();
    let mut font_descriptor = Dictionary::new();
    font_descriptor.set("Type", Object::Name(b"FontDescriptor".to_vec()));
    font_descriptor.set("FontName", Object::Name(base_font.as_bytes().to_vec()));
    font_descriptor.set("Flags", Object::Integer(32)); // Nonsymbolic
    font_descriptor.set("FontBBox", Object::Array(vec![
        Object::Integer(scale(bbox.x_min)),
        Object::Integer(scale(bbox.y_min)),
        Object::Integer(scale(bbox.x_max)),
        Object::Integer(scale(bbox.y_max)),
    ]));
    font_descriptor.set("ItalicAngle", Object::Integer(0));
    font_descriptor.set("Ascent", Object::Integer(scale(face.ascender())));
    font_descriptor.set("Descent", Object::Integer(scale(face.descender())));
    font_descriptor.set(
        "CapHeight",
        Object::Integer(scale(face.capital_height().unwrap_or(face.ascender()))),
    );
    font_descriptor.set("StemV", Object::Integer(80));
    font_descriptor.set("FontFile2", Object::Reference(font_stream_id));
    let font_descriptor_id = doc.add_object(Object::Dictionary(font_descriptor));

    // Widths of the glyphs actually used
    let widths: BTreeMap<u16, i64> = shaped
        .glyphs
        .iter()
        .map(|g| (g.id, shaped.to_pdf_units(g.nominal_advance)))
        .collect();
    let mut w_array = Vec::with_capacity(widths.len() * 2);
    for (gid, width) in &widths {
        w_array.push(Object::Integer(*gid as i64));
        w_array.push(Object::Array(vec![Object::Integer(*width)]));
    }

    let mut system_info = Dictionary::new();
    system_info.set("Registry", Object::String(b"Adobe".to_vec(), StringFormat::Literal));
    system_info.set("Ordering", Object::String(b"Identity".to_vec(), StringFormat::Literal));
    system_info.set("Supplement", Object::Integer(0));

    let mut cid_font = Dictionary::new();
    cid_font.set("Type", Object::Name(b"Font".to_vec()));
    cid_font.set("Subtype", Object::Name(b"CIDFontType2".to_vec()));
    cid_font.set("BaseFont", Object::Name(base_font.as_bytes().to_vec()));
    cid_font.set("CIDSystemInfo", Object::Dictionary(system_info));
    cid_font.set("FontDescriptor", Object::Reference(font_descriptor_id));
    cid_font.set("DW", Object::Integer(1000));
    cid_font.set("W", Object::Array(w_array));
    cid_font.set("CIDToGIDMap", Object::Name(b"Identity".to_vec()));
    let cid_font_id = doc.add_object(Object::Dictionary(cid_font));

    let to_unicode_id = doc.add_object(Stream::new(
        Dictionary::new(),
        to_unicode_cmap(shaped).into_bytes(),
    ));

    let mut type0 = Dictionary::new();
    type0.set("Type", Object::Name(b"Font".to_vec()));
    type0.set("Subtype", Object::Name(b"Type0".to_vec()));
    type0.set("BaseFont", Object::Name(base_font.as_bytes().to_vec()));
    type0.set("Encoding", Object::Name(b"Identity-H".to_vec()));
    type0.set("DescendantFonts", Object::Array(vec![Object::Reference(cid_font_id)]));
    type0.set("ToUnicode", Object::Reference(to_unicode_id));

    Ok(doc.add_object(Object::Dictionary(type0)))
}

/// ToUnicode CMap mapping each used glyph back to its source text
fn to_unicode_cmap(shaped: &ShapedText) -> String {
    let mut mapping: BTreeMap<u16, &str> = BTreeMap::new();
    for glyph in &shaped.glyphs {
        if !glyph.text.is_empty() {
            mapping.entry(glyph.id).or_insert(glyph.text.as_str());
        }
    }

    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe)
/Ordering (UCS)
/Supplement 0
>> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
",
    );

    // At most 100 entries per bfchar block
    let entries: Vec<(u16, &str)> = mapping.into_iter().collect();
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let utf16: String = text.encode_utf16().map(|u| format!("{:04X}", u)).collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", gid, utf16));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::fixture_font;

    #[test]
    fn test_shape_ascii() {
        let font = fixture_font();
        let shaped = shape_text(&font, "TEST").unwrap();
        assert_eq!(shaped.glyphs.len(), 4);
        assert_eq!(shaped.units_per_em, 2048);
        assert!(shaped.glyphs.iter().all(|g| g.id != 0));
        assert_eq!(shaped.glyphs[0].text, "T");
        // Both T glyphs share an id
        assert_eq!(shaped.glyphs[0].id, shaped.glyphs[3].id);
        assert!(shaped.width(40.0) > 60.0);
        assert!(shaped.descent(40.0) > 0.0);
    }

    #[test]
    fn test_shape_missing_glyph() {
        let font = fixture_font();
        assert!(matches!(shape_text(&font, "ok 水"), Err(Error::MissingGlyph('水'))));
    }

    #[test]
    fn test_shape_empty() {
        let font = fixture_font();
        assert!(matches!(shape_text(&font, ""), Err(Error::EmptyText)));
    }

    fn glyph(id: u16, advance: i32, nominal_advance: i32, text: &str) -> ShapedGlyph {
        ShapedGlyph {
            id,
            advance,
            nominal_advance,
            x_offset: 0,
            y_offset: 0,
            text: text.into(),
        }
    }

    fn tj_parts(operation: &Operation) -> &[Object] {
        assert_eq!(operation.operator, "TJ");
        match &operation.operands[0] {
            Object::Array(parts) => parts,
            other => panic!("expected an array, got {:?}", other),
        }
    }

    #[test]
    fn test_text_operations_encode_glyph_ids() {
        let shaped = ShapedText {
            glyphs: vec![
                glyph(0x0037, 1000, 1000, "T"),
                glyph(0x0044, 900, 1000, "a"),
                glyph(0x0045, 1000, 1000, "b"),
            ],
            units_per_em: 1000,
            descent: 200,
        };

        let ops = shaped.text_operations(10.0);
        assert_eq!(ops.len(), 1);
        let parts = tj_parts(&ops[0]);
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], Object::String(b, StringFormat::Hexadecimal) if b == &[0x00, 0x37, 0x00, 0x44]));
        assert!(matches!(parts[1], Object::Integer(100)));
        assert!(matches!(&parts[2], Object::String(b, StringFormat::Hexadecimal) if b == &[0x00, 0x45]));
        assert_eq!(shaped.width(10.0), 29.0);
    }

    #[test]
    fn test_text_operations_place_combining_marks() {
        // Base, mark raised 200 units and pulled back 300, then another base
        let mut mark = glyph(0x0020, 0, 0, "\u{0E34}");
        mark.x_offset = -300;
        mark.y_offset = 200;
        let shaped = ShapedText {
            glyphs: vec![glyph(0x0010, 500, 500, "a"), mark, glyph(0x0011, 500, 500, "b")],
            units_per_em: 1000,
            descent: 200,
        };

        let ops = shaped.text_operations(10.0);
        let operators: Vec<&str> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators, vec!["TJ", "Ts", "TJ", "Ts", "TJ"]);

        assert!(matches!(ops[1].operands[0], Object::Real(r) if r == 2.0));
        let mark_parts = tj_parts(&ops[2]);
        assert!(matches!(mark_parts[0], Object::Integer(300)));
        assert!(matches!(&mark_parts[1], Object::String(b, _) if b == &[0x00, 0x20]));

        assert!(matches!(ops[3].operands[0], Object::Real(r) if r == 0.0));
        let tail = tj_parts(&ops[4]);
        assert!(matches!(tail[0], Object::Integer(-300)));
        assert!(matches!(&tail[1], Object::String(b, _) if b == &[0x00, 0x11]));
    }

    #[test]
    fn test_units_per_em_from_font() {
        let font = fixture_font();
        let shaped = shape_text(&font, "Mark").unwrap();
        assert_eq!(shaped.units_per_em, 2048);
        assert!(shaped.glyphs.iter().all(|g| g.x_offset == 0 && g.y_offset == 0));
    }

    #[test]
    fn test_to_unicode_cmap() {
        let shaped = ShapedText {
            glyphs: vec![
                glyph(3, 0, 0, "A"),
                glyph(9, 0, 0, "é"),
            ],
            units_per_em: 1000,
            descent: 0,
        };
        let cmap = to_unicode_cmap(&shaped);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0003> <0041>"));
        assert!(cmap.contains("<0009> <00E9>"));
    }

    #[test]
    fn test_embed_font_objects() {
        let font = fixture_font();
        let shaped = shape_text(&font, "Draft").unwrap();
        let mut doc = Document::with_version("1.5");
        let font_id = embed_font(&mut doc, &font, &shaped).unwrap();

        let name = |key: &[u8]| -> Vec<u8> {
            let Ok(Object::Dictionary(dict)) = doc.get_object(font_id) else {
                panic!("font should be a dictionary")
            };
            match dict.get(key) {
                Ok(Object::Name(name)) => name.clone(),
                other => panic!("expected a name, got {:?}", other),
            }
        };
        assert_eq!(name(b"Subtype"), b"Type0");
        assert_eq!(name(b"Encoding"), b"Identity-H");
        assert_eq!(name(b"BaseFont"), b"WatermarkFont");
        // Font program, descriptor, CID font, ToUnicode and Type0
        assert_eq!(doc.objects.len(), 5);
    }

    #[test]
    fn test_base_font_name() {
        assert_eq!(base_font_name("Chinese Font"), "ChineseFont");
        assert_eq!(base_font_name("水印"), "WatermarkFont");
    }
}

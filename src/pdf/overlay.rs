//! One-page watermark overlay documents

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use log::debug;

use crate::error::Result;
use crate::font::FontResource;
use crate::layout::{PageSize, PdfAnchor, WatermarkStyle};
use crate::pdf::fonts::{embed_font, shape_text, ShapedText};

/// Resource name of the transparency graphics state in overlay pages
pub const ALPHA_STATE_NAME: &str = "WatermarkAlpha";

/// Build a one-page overlay document holding only the watermark
///
/// The page is sized `page_width` x `page_height` points and carries `text`
/// in half-transparent red at 40pt, starting at the fixed point
/// (`page_width` - 200, `page_height` - 80). The font is embedded under its
/// logical name so the overlay can be composited onto any source page.
pub fn render_on_document_page(
    page_width: f32,
    page_height: f32,
    text: &str,
    font: &FontResource,
) -> Result<Document> {
    build_overlay(
        PageSize::new(page_width, page_height),
        text,
        font,
        PdfAnchor::Fixed,
        &WatermarkStyle::standard(),
    )
}

pub(crate) fn build_overlay(
    page: PageSize,
    text: &str,
    font: &FontResource,
    anchor: PdfAnchor,
    style: &WatermarkStyle,
) -> Result<Document> {
    let shaped = shape_text(font, text)?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let resources = overlay_resources(&mut doc, font, &shaped, style)?;
    let content = overlay_content(page, font, &shaped, anchor, style)?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let mut page_dict = Dictionary::new();
    page_dict.set("Type", Object::Name(b"Page".to_vec()));
    page_dict.set("Parent", Object::Reference(pages_id));
    page_dict.set("MediaBox", Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Real(page.width),
        Object::Real(page.height),
    ]));
    page_dict.set("Contents", Object::Reference(content_id));
    page_dict.set("Resources", Object::Dictionary(resources));
    let page_id = doc.add_object(Object::Dictionary(page_dict));

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    pages.set("Count", Object::Integer(1));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    Ok(doc)
}

/// Add the watermark font and transparency state to `doc`
///
/// Returns the resources dictionary naming them. The font is embedded once
/// here and shared by every page that draws the watermark.
pub(crate) fn overlay_resources(
    doc: &mut Document,
    font: &FontResource,
    shaped: &ShapedText,
    style: &WatermarkStyle,
) -> Result<Dictionary> {
    let font_id = embed_font(doc, font, shaped)?;

    let mut alpha_state = Dictionary::new();
    alpha_state.set("Type", Object::Name(b"ExtGState".to_vec()));
    alpha_state.set("ca", Object::Real(style.pdf_alpha));
    alpha_state.set("CA", Object::Real(style.pdf_alpha));
    let alpha_state_id = doc.add_object(Object::Dictionary(alpha_state));

    let mut fonts = Dictionary::new();
    fonts.set(font.name().as_bytes().to_vec(), Object::Reference(font_id));
    let mut states = Dictionary::new();
    states.set(ALPHA_STATE_NAME, Object::Reference(alpha_state_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    resources.set("ExtGState", Object::Dictionary(states));

    Ok(resources)
}

/// Content stream drawing the shaped text at its anchor on a page of `page` size
pub(crate) fn overlay_content(
    page: PageSize,
    font: &FontResource,
    shaped: &ShapedText,
    anchor: PdfAnchor,
    style: &WatermarkStyle,
) -> Result<Vec<u8>> {
    let (x, y) = anchor.baseline_origin(
        page,
        style,
        shaped.width(style.font_size),
        shaped.descent(style.font_size),
    );
    debug!(
        "Overlay {}x{}pt, text width {:.1}pt at ({:.1}, {:.1})",
        page.width,
        page.height,
        shaped.width(style.font_size),
        x,
        y
    );

    let [r, g, b] = style.pdf_color;
    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(ALPHA_STATE_NAME.as_bytes().to_vec())]),
        Operation::new("rg", vec![r.into(), g.into(), b.into()]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font.name().as_bytes().to_vec()), style.font_size.into()],
        ),
        Operation::new("Td", vec![x.into(), y.into()]),
    ];
    operations.extend(shaped.text_operations(style.font_size));
    operations.push(Operation::new("ET", vec![]));
    operations.push(Operation::new("Q", vec![]));

    Ok(Content { operations }.encode()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::fixture_font;

    fn overlay_operations(doc: &Document) -> Vec<Operation> {
        let page_id = *doc.get_pages().get(&1).expect("overlay should have a page");
        let content = doc.get_page_content(page_id).unwrap();
        Content::decode(&content).unwrap().operations
    }

    fn number(obj: &Object) -> f32 {
        match obj {
            Object::Integer(i) => *i as f32,
            Object::Real(r) => *r,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn test_overlay_is_single_page() {
        let font = fixture_font();
        let doc = render_on_document_page(612.0, 792.0, "CONFIDENTIAL", &font).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_overlay_uses_fixed_anchor() {
        let font = fixture_font();
        let doc = render_on_document_page(612.0, 792.0, "TEST", &font).unwrap();
        let ops = overlay_operations(&doc);

        let td = ops.iter().find(|op| op.operator == "Td").expect("text position");
        assert_eq!(number(&td.operands[0]), 412.0);
        assert_eq!(number(&td.operands[1]), 712.0);

        let tf = ops.iter().find(|op| op.operator == "Tf").expect("font selection");
        assert!(matches!(&tf.operands[0], Object::Name(n) if n == b"WatermarkFont"));
        assert_eq!(number(&tf.operands[1]), 40.0);

        let rg = ops.iter().find(|op| op.operator == "rg").expect("fill color");
        let rgb: Vec<f32> = rg.operands.iter().map(number).collect();
        assert_eq!(rgb, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_overlay_media_box_matches_page() {
        let font = fixture_font();
        let doc = render_on_document_page(300.0, 200.0, "x", &font).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let Ok(Object::Dictionary(page)) = doc.get_object(page_id) else {
            panic!("page should be a dictionary")
        };
        let Ok(Object::Array(media_box)) = page.get(b"MediaBox") else {
            panic!("page should have a MediaBox")
        };
        let values: Vec<f32> = media_box.iter().map(number).collect();
        assert_eq!(values, vec![0.0, 0.0, 300.0, 200.0]);
    }

    #[test]
    fn test_overlay_inset_anchor() {
        let font = fixture_font();
        let style = WatermarkStyle::standard();
        let doc = build_overlay(PageSize::letter(), "TEST", &font, PdfAnchor::Inset, &style).unwrap();
        let ops = overlay_operations(&doc);
        let td = ops.iter().find(|op| op.operator == "Td").unwrap();
        let x = number(&td.operands[0]);
        let y = number(&td.operands[1]);
        assert!(x > 450.0 && x < 612.0 - 10.0, "x = {}", x);
        assert!(y > 10.0 && y < 30.0, "y = {}", y);
    }

    #[test]
    fn test_overlay_has_alpha_state() {
        let font = fixture_font();
        let doc = render_on_document_page(612.0, 792.0, "TEST", &font).unwrap();
        let ops = overlay_operations(&doc);
        assert!(ops.iter().any(|op| op.operator == "gs"));

        let alpha = doc.objects.values().find_map(|obj| match obj {
            Object::Dictionary(d) if matches!(d.get(b"Type"), Ok(Object::Name(n)) if n == b"ExtGState") => {
                d.get(b"ca").ok().map(number)
            }
            _ => None,
        });
        assert_eq!(alpha, Some(0.5));
    }
}

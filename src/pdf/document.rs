//! Whole-document operations: watermarking every page of a PDF, and
//! synthesizing a PDF from watermarked images

use std::collections::HashMap;
use std::path::Path;

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use log::{debug, info};

use crate::error::{Error, Result};
use crate::font::FontResource;
use crate::layout::{PdfAnchor, WatermarkStyle};
use crate::pdf::fonts::shape_text;
use crate::pdf::merge::{draw_on_top, page_size, rename_in_content, resource_renames};
use crate::pdf::overlay::{overlay_content, overlay_resources};
use crate::raster::{encode_jpeg, JPEG_QUALITY};

/// Overlay content streams already added, by page size and resource renames
type ContentKey = (u32, u32, Vec<(Vec<u8>, Vec<u8>)>);

/// Watermark every page of `doc` in place
///
/// The font and transparency state are embedded once for the whole document.
/// Each page draws a content stream placed for its MediaBox; pages of equal
/// size share that stream. Page order is untouched. Returns the page count.
pub fn watermark_document(
    doc: &mut Document,
    text: &str,
    font: &FontResource,
    anchor: PdfAnchor,
    style: &WatermarkStyle,
) -> Result<usize> {
    if text.is_empty() {
        return Err(Error::EmptyText);
    }

    let page_ids: Vec<_> = doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Ok(0);
    }

    let shaped = shape_text(font, text)?;
    let resources = overlay_resources(doc, font, &shaped, style)?;
    let mut contents: HashMap<ContentKey, ObjectId> = HashMap::new();

    for (i, page_id) in page_ids.iter().enumerate() {
        let size = page_size(doc, *page_id)?;
        let renames = resource_renames(doc, *page_id, &resources)?;

        let mut renamed: Vec<_> = renames.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        renamed.sort();
        let key = (size.width.to_bits(), size.height.to_bits(), renamed);

        let content_id = match contents.get(&key) {
            Some(id) => *id,
            None => {
                let mut content = overlay_content(size, font, &shaped, anchor, style)?;
                if !renames.is_empty() {
                    content = rename_in_content(&content, &renames)?;
                }
                let id = doc.add_object(Stream::new(Dictionary::new(), content));
                contents.insert(key, id);
                id
            }
        };

        draw_on_top(doc, *page_id, &[content_id], &resources, &renames)?;
        debug!("Watermarked page {} ({}x{}pt)", i + 1, size.width, size.height);
    }

    Ok(page_ids.len())
}

/// Load, watermark and serialize a PDF file
///
/// Returns the output bytes and the number of pages watermarked.
pub fn watermark_pdf_file(
    input: &Path,
    text: &str,
    font: &FontResource,
    anchor: PdfAnchor,
    style: &WatermarkStyle,
) -> Result<(Vec<u8>, usize)> {
    if !input.exists() {
        return Err(Error::FileNotFound(input.to_path_buf()));
    }

    let mut doc = Document::load(input)?;
    if doc.get_pages().is_empty() {
        return Err(Error::EmptyPdf(input.to_path_buf()));
    }

    let pages = watermark_document(&mut doc, text, font, anchor, style)?;
    info!("Watermarked {} pages of {}", pages, input.display());

    Ok((save_to_bytes(doc)?, pages))
}

/// Build a PDF with one page per image
///
/// Every page is exactly the image's pixel size in points, with the image
/// drawn at 1:1 scale from the bottom-left corner. Images are embedded as
/// JPEG at the raster output quality.
pub fn images_to_pdf(images: &[RgbImage]) -> Result<Document> {
    if images.is_empty() {
        return Err(Error::Pdf("no images to place".to_string()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(images.len());

    for image in images {
        let (width, height) = image.dimensions();

        let mut image_dict = Dictionary::new();
        image_dict.set("Type", Object::Name(b"XObject".to_vec()));
        image_dict.set("Subtype", Object::Name(b"Image".to_vec()));
        image_dict.set("Width", Object::Integer(width as i64));
        image_dict.set("Height", Object::Integer(height as i64));
        image_dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        image_dict.set("BitsPerComponent", Object::Integer(8));
        image_dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        let jpeg = encode_jpeg(image, JPEG_QUALITY)?;
        let image_id = doc.add_object(Stream::new(image_dict, jpeg).with_compression(false));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));

        let mut xobjects = Dictionary::new();
        xobjects.set("Im0", Object::Reference(image_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("MediaBox", Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width as i64),
            Object::Integer(height as i64),
        ]));
        page.set("Contents", Object::Reference(content_id));
        page.set("Resources", Object::Dictionary(resources));
        kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    Ok(doc)
}

/// Compress and serialize a document
pub fn save_to_bytes(mut doc: Document) -> Result<Vec<u8>> {
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

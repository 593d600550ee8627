//! Compositing overlay pages onto source pages using lopdf
//!
//! The overlay's objects are copied into the target document with renumbered
//! ids, then the overlay page's content streams are appended to the target
//! page and its resources merged into the page's resources. Source content is
//! wrapped in `q`/`Q` first so its graphics state cannot leak into the overlay.

use std::collections::{BTreeSet, HashMap};

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use log::debug;

use crate::error::{Error, Result};
use crate::layout::PageSize;

/// Overlay objects already copied into a target document
#[derive(Debug, Clone)]
struct ImportedOverlay {
    contents: Vec<ObjectId>,
    resources: Dictionary,
}

/// Composite the single page of `overlay` on top of `page_id`
pub fn composite_page(doc: &mut Document, page_id: ObjectId, overlay: &Document) -> Result<()> {
    let imported = import_overlay(doc, overlay)?;

    // The import belongs to this page alone, so renamed content replaces it
    let renames = resource_renames(doc, page_id, &imported.resources)?;
    if !renames.is_empty() {
        debug!("Renaming overlay resources on page {:?}: {:?}", page_id, renames);
        for content_id in &imported.contents {
            let stream = doc.get_object_mut(*content_id)?.as_stream_mut()?;
            let bytes = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            let renamed = rename_in_content(&bytes, &renames)?;
            stream.dict.remove(b"Filter");
            stream.dict.remove(b"DecodeParms");
            stream.set_content(renamed);
        }
    }

    draw_on_top(doc, page_id, &imported.contents, &imported.resources, &renames)
}

/// Copy the drawing objects of `overlay`'s first page into `doc`
fn import_overlay(doc: &mut Document, overlay: &Document) -> Result<ImportedOverlay> {
    let overlay_page_id = overlay
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| Error::Pdf("overlay document has no page".to_string()))?;

    // Page tree objects stay behind; only what the page draws with is copied
    let skipped = page_tree_objects(overlay, overlay_page_id);

    let id_offset = doc.max_id;
    let mut id_map: HashMap<ObjectId, ObjectId> = HashMap::new();
    for old_id in overlay.objects.keys() {
        if !skipped.contains(old_id) {
            id_map.insert(*old_id, (old_id.0 + id_offset, old_id.1));
        }
    }

    for (old_id, object) in overlay.objects.iter() {
        if let Some(new_id) = id_map.get(old_id) {
            doc.objects.insert(*new_id, renumber_object_references(object, &id_map));
            doc.max_id = doc.max_id.max(new_id.0);
        }
    }

    let page_dict = overlay.get_object(overlay_page_id)?.as_dict()?;

    let contents = match page_dict.get(b"Contents") {
        Ok(content) => match renumber_object_references(content, &id_map) {
            Object::Reference(id) => vec![id],
            Object::Array(items) => items
                .iter()
                .filter_map(|obj| match obj {
                    Object::Reference(id) => Some(*id),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        },
        Err(_) => vec![],
    };

    let resources = match page_dict.get(b"Resources") {
        Ok(Object::Reference(id)) => overlay.get_object(*id)?.as_dict()?.clone(),
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let resources = match renumber_object_references(&Object::Dictionary(resources), &id_map) {
        Object::Dictionary(dict) => dict,
        _ => Dictionary::new(),
    };

    debug!(
        "Imported overlay: {} objects, {} content streams",
        id_map.len(),
        contents.len()
    );

    Ok(ImportedOverlay { contents, resources })
}

/// New names for overlay resources that collide with the page's own
pub(crate) fn resource_renames(
    doc: &Document,
    page_id: ObjectId,
    overlay_resources: &Dictionary,
) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
    let page_resources = page_resources(doc, page_id)?;
    Ok(conflicting_names(&page_resources, overlay_resources))
}

/// Replace resource name operands in a content stream
pub(crate) fn rename_in_content(bytes: &[u8], renames: &HashMap<Vec<u8>, Vec<u8>>) -> Result<Vec<u8>> {
    let mut content = Content::decode(bytes)?;
    for operation in content.operations.iter_mut() {
        for operand in operation.operands.iter_mut() {
            if let Object::Name(name) = operand {
                if let Some(new_name) = renames.get(name.as_slice()) {
                    *name = new_name.clone();
                }
            }
        }
    }
    Ok(content.encode()?)
}

/// Draw overlay content streams on top of `page_id`
///
/// `overlay_contents` must already use the names in `renames`. The page's own
/// content is wrapped in `q`/`Q` and the overlay resources are merged into a
/// page-local copy of its resources.
pub(crate) fn draw_on_top(
    doc: &mut Document,
    page_id: ObjectId,
    overlay_contents: &[ObjectId],
    overlay_resources: &Dictionary,
    renames: &HashMap<Vec<u8>, Vec<u8>>,
) -> Result<()> {
    let mut resources = page_resources(doc, page_id)?;
    merge_resources(&mut resources, overlay_resources, renames);

    let mut contents = page_contents(doc, page_id)?;
    if !contents.is_empty() {
        let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        contents.insert(0, Object::Reference(save_id));
        contents.push(Object::Reference(restore_id));
    }
    contents.extend(overlay_contents.iter().map(|id| Object::Reference(*id)));

    let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page_dict.set("Contents", Object::Array(contents));
    page_dict.set("Resources", Object::Dictionary(resources));

    Ok(())
}

/// The page's content stream references, flattened into one list
///
/// `/Contents` may be a stream, an array of streams, or a reference to
/// either.
fn page_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page_dict = doc.get_object(page_id)?.as_dict()?;
    let contents = match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => vec![],
    };
    Ok(contents)
}

/// Ids of the overlay's catalog, page tree nodes and page
fn page_tree_objects(doc: &Document, page_id: ObjectId) -> BTreeSet<ObjectId> {
    let mut ids = BTreeSet::new();
    ids.insert(page_id);

    let mut current = page_id;
    while let Ok(Object::Reference(parent)) = doc
        .get_object(current)
        .and_then(Object::as_dict)
        .and_then(|dict| dict.get(b"Parent"))
    {
        if !ids.insert(*parent) {
            break;
        }
        current = *parent;
    }

    if let Ok(Object::Reference(root)) = doc.trailer.get(b"Root") {
        ids.insert(*root);
    }

    ids
}

/// Renumber all object references in an object
fn renumber_object_references(object: &Object, id_map: &HashMap<ObjectId, ObjectId>) -> Object {
    match object {
        Object::Reference(old_id) => match id_map.get(old_id) {
            Some(new_id) => Object::Reference(*new_id),
            None => Object::Null,
        },
        Object::Array(arr) => {
            Object::Array(arr.iter().map(|obj| renumber_object_references(obj, id_map)).collect())
        }
        Object::Dictionary(dict) => Object::Dictionary(renumber_dictionary(dict, id_map)),
        Object::Stream(stream) => {
            let mut new_stream = stream.clone();
            new_stream.dict = renumber_dictionary(&stream.dict, id_map);
            Object::Stream(new_stream)
        }
        _ => object.clone(),
    }
}

fn renumber_dictionary(dict: &Dictionary, id_map: &HashMap<ObjectId, ObjectId>) -> Dictionary {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        new_dict.set(key.clone(), renumber_object_references(value, id_map));
    }
    new_dict
}

/// Follow a reference to the object it points at
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// Look up a page attribute, walking up the page tree for inherited values
fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Result<Option<&'a Object>> {
    let mut current = page_id;
    let mut seen = BTreeSet::new();

    while seen.insert(current) {
        let dict = doc.get_object(current)?.as_dict()?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(resolve(doc, value)?));
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => break,
        }
    }

    Ok(None)
}

/// The page's effective resources as a standalone dictionary
///
/// Referenced or inherited resources are copied, and each resource category
/// is dereferenced so it can be extended in place.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut resources = match inherited_attribute(doc, page_id, b"Resources")? {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    let categories: Vec<Vec<u8>> = resources.iter().map(|(key, _)| key.clone()).collect();
    for key in categories {
        let resolved = match resources.get(&key) {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Dictionary(dict)) => Some(dict.clone()),
                _ => None,
            },
            _ => None,
        };
        if let Some(dict) = resolved {
            resources.set(key, Object::Dictionary(dict));
        }
    }

    Ok(resources)
}

/// Size of a page from its (possibly inherited) MediaBox
pub fn page_size(doc: &Document, page_id: ObjectId) -> Result<PageSize> {
    let media_box = match inherited_attribute(doc, page_id, b"MediaBox")? {
        Some(Object::Array(values)) => values
            .iter()
            .map(|value| resolve(doc, value).ok().and_then(number))
            .collect::<Option<Vec<f32>>>(),
        _ => None,
    };

    match media_box.as_deref() {
        Some([x0, y0, x1, y1]) => Ok(PageSize::new((x1 - x0).abs(), (y1 - y0).abs())),
        _ => Err(Error::Pdf(format!("page {:?} has no valid MediaBox", page_id))),
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Pick new names for overlay resources that already exist on the page
fn conflicting_names(page: &Dictionary, overlay: &Dictionary) -> HashMap<Vec<u8>, Vec<u8>> {
    let mut renames = HashMap::new();

    for (category, value) in overlay.iter() {
        let Object::Dictionary(entries) = value else { continue };
        let existing = match page.get(category) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => continue,
        };

        for (name, _) in entries.iter() {
            if !existing.has(name) {
                continue;
            }
            let mut n = 1;
            let renamed = loop {
                let mut candidate = name.clone();
                candidate.extend_from_slice(n.to_string().as_bytes());
                if !existing.has(&candidate) && !entries.has(&candidate) {
                    break candidate;
                }
                n += 1;
            };
            renames.insert(name.clone(), renamed);
        }
    }

    renames
}

/// Merge overlay resources into the page's resources dictionary
fn merge_resources(
    merged: &mut Dictionary,
    overlay: &Dictionary,
    renames: &HashMap<Vec<u8>, Vec<u8>>,
) {
    // Merge each resource type (Font, ExtGState, XObject, etc.)
    for (key, value) in overlay.iter() {
        match (merged.get(key).ok().cloned(), value) {
            (Some(Object::Dictionary(mut existing)), Object::Dictionary(entries)) => {
                for (name, entry) in entries.iter() {
                    let name = renames.get(name).unwrap_or(name);
                    existing.set(name.clone(), entry.clone());
                }
                merged.set(key.clone(), Object::Dictionary(existing));
            }
            // ProcSet arrays and the like: keep what the page already has
            (Some(_), _) => {}
            (None, _) => merged.set(key.clone(), value.clone()),
        }
    }
}

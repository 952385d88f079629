#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Builds a PDF with `count` pages of the given size.
pub fn pdf_with_pages(count: usize, width: i64, height: i64) -> Vec<u8> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::with_capacity(count);
    for index in 0..count {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 18.into()]),
                Operation::new("Td", vec![72.into(), 72.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Page {}", index + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = document.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).expect("serialize fixture");
    bytes
}

/// Writes a rendered page fixture into `dir`.
pub fn write_page(dir: &Path, name: &str, pages: usize) {
    fs::write(dir.join(name), pdf_with_pages(pages, 612, 792)).expect("write fixture");
}

/// One bookmark read back from a document.
#[derive(Debug, Clone)]
pub struct Bookmark {
    pub depth: usize,
    pub title: String,
    pub page: usize,
    pub count: Option<i64>,
    pub dest: Vec<Object>,
}

/// Decodes a PDF text string.
pub fn decode_text(object: &Object) -> String {
    let Object::String(bytes, _) = object else {
        panic!("expected string, got {:?}", object);
    };
    match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).expect("valid utf-16")
        }
        None => String::from_utf8(bytes.clone()).expect("valid ascii"),
    }
}

/// Catalog dictionary of `document`.
pub fn catalog(document: &Document) -> &lopdf::Dictionary {
    let id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .expect("trailer root");
    document.get_dictionary(id).expect("catalog dictionary")
}

/// Root of the outline tree, if any.
pub fn outline_root(document: &Document) -> Option<&lopdf::Dictionary> {
    let id = catalog(document)
        .get(b"Outlines")
        .and_then(Object::as_reference)
        .ok()?;
    Some(document.get_dictionary(id).expect("outlines dictionary"))
}

/// Reads the bookmark tree in preorder, following `First` and `Next` links.
pub fn read_bookmarks(document: &Document) -> Vec<Bookmark> {
    let pages: HashMap<ObjectId, usize> = document
        .get_pages()
        .into_values()
        .enumerate()
        .map(|(index, id)| (id, index))
        .collect();

    let mut bookmarks = Vec::new();
    let Some(root) = outline_root(document) else {
        return bookmarks;
    };
    collect(document, &pages, root, 0, &mut bookmarks);
    bookmarks
}

fn collect(
    document: &Document,
    pages: &HashMap<ObjectId, usize>,
    parent: &lopdf::Dictionary,
    depth: usize,
    out: &mut Vec<Bookmark>,
) {
    let mut next = parent.get(b"First").and_then(Object::as_reference).ok();
    while let Some(id) = next {
        let item = document.get_dictionary(id).expect("outline item");
        let dest = item
            .get(b"Dest")
            .and_then(Object::as_array)
            .expect("explicit destination")
            .clone();
        let page_id = dest[0].as_reference().expect("page reference");
        out.push(Bookmark {
            depth,
            title: decode_text(item.get(b"Title").expect("title")),
            page: pages[&page_id],
            count: item.get(b"Count").and_then(Object::as_i64).ok(),
            dest,
        });
        collect(document, pages, item, depth + 1, out);
        next = item.get(b"Next").and_then(Object::as_reference).ok();
    }
}

/// Titles with their depth and target page, for compact assertions.
pub fn outline_shape(document: &Document) -> Vec<(usize, String, usize)> {
    read_bookmarks(document)
        .into_iter()
        .map(|bookmark| (bookmark.depth, bookmark.title, bookmark.page))
        .collect()
}

/// Entry helper for [`outline_shape`] expectations.
pub fn entry(depth: usize, title: &str, page: usize) -> (usize, String, usize) {
    (depth, title.to_string(), page)
}

//! Concatenation of rendered sources into a single document.
//!
//! Every source is parsed with `lopdf`, renumbered so its object ids do not
//! collide with earlier sources, and its pages are appended to a fresh page
//! tree. The starting page of each source in the merged numbering is recorded
//! as a [`PageOffsetRecord`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::debug;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::destination::inherited_attribute;
use crate::source::SourceDocument;

/// Page attributes that may be inherited from the page tree.
const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Errors raised while merging sources. All of them abort the merge.
#[derive(Debug)]
pub enum MergeError {
    /// No sources were supplied.
    NoSources,
    /// A source could not be parsed as a PDF.
    Unreadable {
        /// Key of the offending source.
        key: String,
        /// Parser error.
        source: lopdf::Error,
    },
    /// A source is encrypted.
    Encrypted {
        /// Key of the offending source.
        key: String,
    },
    /// A source parsed but contains no pages.
    EmptySource {
        /// Key of the offending source.
        key: String,
    },
    /// A page listed in a source's page tree could not be read.
    MissingPage {
        /// Key of the offending source.
        key: String,
        /// One-based page number inside the source.
        page_number: u32,
    },
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSources => write!(f, "no sources to merge"),
            Self::Unreadable { key, .. } => write!(f, "source `{}` is not a readable PDF", key),
            Self::Encrypted { key } => write!(f, "source `{}` is encrypted", key),
            Self::EmptySource { key } => write!(f, "source `{}` has no pages", key),
            Self::MissingPage { key, page_number } => write!(
                f,
                "page {} of source `{}` could not be read",
                page_number, key
            ),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unreadable { source, .. } => Some(source),
            Self::NoSources
            | Self::Encrypted { .. }
            | Self::EmptySource { .. }
            | Self::MissingPage { .. } => None,
        }
    }
}

/// Position of one source inside the merged page numbering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageOffsetRecord {
    /// Key of the source.
    pub key: String,
    /// Zero-based index of the source's first page in the merged document.
    pub start_page: usize,
    /// Number of pages contributed by the source.
    pub page_count: usize,
}

impl PageOffsetRecord {
    /// One past the last merged page index of this source.
    pub fn end_page(&self) -> usize {
        self.start_page + self.page_count
    }
}

/// Result of a merge: the document plus one offset record per source, in merge order.
#[derive(Debug)]
pub struct MergedDocument {
    /// Merged document with a fresh catalog and page tree.
    pub document: Document,
    /// Offset records in merge order.
    pub offsets: Vec<PageOffsetRecord>,
}

impl MergedDocument {
    /// Total number of pages.
    pub fn page_count(&self) -> usize {
        self.offsets.last().map_or(0, PageOffsetRecord::end_page)
    }
}

/// Merges `sources` in iteration order.
///
/// Nothing is written anywhere; a failure on any source discards all work done so far.
pub fn merge_sources<'a, I>(sources: I, version: &str) -> Result<MergedDocument, MergeError>
where
    I: IntoIterator<Item = &'a SourceDocument>,
{
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut offsets = Vec::new();
    let mut next_id = 1;

    for source in sources {
        let mut document =
            Document::load_mem(source.bytes()).map_err(|err| MergeError::Unreadable {
                key: source.key().to_string(),
                source: err,
            })?;
        if document.is_encrypted() {
            return Err(MergeError::Encrypted {
                key: source.key().to_string(),
            });
        }

        document.renumber_objects_with(next_id);
        next_id = document.max_id + 1;

        let page_ids = document.get_pages();
        if page_ids.is_empty() {
            return Err(MergeError::EmptySource {
                key: source.key().to_string(),
            });
        }

        let record = PageOffsetRecord {
            key: source.key().to_string(),
            start_page: pages.len(),
            page_count: page_ids.len(),
        };
        debug!(
            "source `{}` contributes pages {}..{}",
            record.key,
            record.start_page,
            record.end_page()
        );

        let mut source_pages = HashSet::with_capacity(page_ids.len());
        for (page_number, page_id) in page_ids {
            let page = flatten_page(&document, page_id).ok_or_else(|| MergeError::MissingPage {
                key: source.key().to_string(),
                page_number,
            })?;
            source_pages.insert(page_id);
            pages.push((page_id, page));
        }

        objects.extend(document.objects.into_iter().filter(|(id, object)| {
            !source_pages.contains(id)
                && !matches!(object.type_name().ok(), Some("Catalog" | "Pages" | "Outlines"))
        }));
        offsets.push(record);
    }

    if offsets.is_empty() {
        return Err(MergeError::NoSources);
    }

    let mut document = Document::with_version(version);
    document.objects = objects;
    document.max_id = next_id - 1;

    let pages_id = document.new_object_id();
    let catalog_id = document.new_object_id();

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let page_count = pages.len() as i64;
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        document.objects.insert(page_id, Object::Dictionary(page));
    }

    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    document.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    document.trailer.set("Root", catalog_id);

    let pruned = document.prune_objects();
    debug!(
        "merged {} sources into {} pages, pruned {} unreachable objects",
        offsets.len(),
        page_count,
        pruned.len()
    );

    Ok(MergedDocument { document, offsets })
}

/// Copies a page dictionary with its inherited attributes made explicit.
fn flatten_page(document: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let original = document.get_dictionary(page_id).ok()?;
    let mut page = original.clone();
    for key in INHERITABLE_ATTRIBUTES {
        if page.has(key) {
            continue;
        }
        if let Some(value) = inherited_attribute(document, original, key) {
            page.set(key.to_vec(), value.clone());
        }
    }
    Some(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{PageGeometry, PageSize, PageTable};
    use crate::testing;

    fn source(key: &str, pages: usize) -> SourceDocument {
        SourceDocument::new(key, testing::pdf_with_pages(pages, 600, 800))
    }

    #[test]
    fn offsets_are_a_running_prefix_sum() {
        let sources = [source("a", 2), source("b", 3), source("c", 1)];
        let merged = merge_sources(&sources, "1.7").unwrap();

        let starts: Vec<usize> = merged.offsets.iter().map(|r| r.start_page).collect();
        assert_eq!(starts, [0, 2, 5]);
        assert_eq!(merged.page_count(), 6);
        assert_eq!(merged.document.get_pages().len(), 6);
    }

    #[test]
    fn pages_keep_source_order_and_inherited_attributes() {
        let sources = [
            SourceDocument::new("wide", testing::pdf_with_pages(1, 800, 600)),
            SourceDocument::new("tall", testing::pdf_with_pages(2, 600, 800)),
        ];
        let merged = merge_sources(&sources, "1.7").unwrap();
        let table = PageTable::from_document(&merged.document);

        assert_eq!(table.page_size(0), Some(PageSize::new(800.0, 600.0)));
        assert_eq!(table.page_size(1), Some(PageSize::new(600.0, 800.0)));
        assert_eq!(table.page_size(2), Some(PageSize::new(600.0, 800.0)));

        for (_, page_id) in merged.document.get_pages() {
            let page = merged.document.get_dictionary(page_id).unwrap();
            assert!(page.has(b"Resources"));
        }
    }

    #[test]
    fn corrupt_source_aborts_the_merge() {
        let sources = [
            source("good", 1),
            SourceDocument::new("broken", b"%PDF-1.7 garbage".to_vec()),
        ];

        match merge_sources(&sources, "1.7") {
            Err(MergeError::Unreadable { key, .. }) => assert_eq!(key, "broken"),
            other => panic!("expected unreadable source error, got {:?}", other.map(|m| m.offsets)),
        }
    }

    #[test]
    fn sources_without_pages_are_rejected() {
        let sources = [source("empty", 0)];

        assert!(matches!(
            merge_sources(&sources, "1.7"),
            Err(MergeError::EmptySource { key }) if key == "empty"
        ));
    }

    #[test]
    fn empty_input_is_an_error() {
        let sources: [SourceDocument; 0] = [];

        assert!(matches!(
            merge_sources(&sources, "1.7"),
            Err(MergeError::NoSources)
        ));
    }

    #[test]
    fn merged_catalog_has_no_outline_yet() {
        let merged = merge_sources(&[source("a", 1)], "1.7").unwrap();
        let catalog_id = merged
            .document
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .unwrap();
        let catalog = merged.document.get_dictionary(catalog_id).unwrap();

        assert!(!catalog.has(b"Outlines"));
        assert!(catalog.has(b"Pages"));
    }
}

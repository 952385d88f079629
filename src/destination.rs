//! Resolution of bookmark targets into concrete PDF destinations.

use std::fmt;

use log::warn;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::outline::PageTarget;

/// Page size assumed when a page carries no usable `/MediaBox` (US Letter).
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// Upper bound on `/Parent` hops followed while looking up inherited page attributes.
pub(crate) const MAX_TREE_DEPTH: usize = 64;

/// Error returned when a target cannot be mapped onto the merged document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationError {
    /// The target points past the last page of the document.
    PageOutOfRange {
        /// Requested zero-based page index.
        page_index: usize,
        /// Number of pages actually present.
        page_count: usize,
    },
}

impl fmt::Display for DestinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageOutOfRange {
                page_index,
                page_count,
            } => write!(
                f,
                "bookmark targets page index {} but the document has {} pages",
                page_index, page_count
            ),
        }
    }
}

impl std::error::Error for DestinationError {}

/// Physical page dimensions in PDF user space units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    /// Page width.
    pub width: f32,
    /// Page height.
    pub height: f32,
}

impl PageSize {
    /// Creates a size from width and height.
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A destination ready to be written as a `/Dest` array.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Destination {
    /// `[page /Fit]`
    Fit {
        /// Page object of the target page.
        page: ObjectId,
    },
    /// `[page /XYZ left top null]`
    Xyz {
        /// Page object of the target page.
        page: ObjectId,
        /// Horizontal coordinate.
        left: f32,
        /// Vertical coordinate.
        top: f32,
    },
}

impl Destination {
    /// Page object the destination refers to.
    pub fn page(&self) -> ObjectId {
        match *self {
            Self::Fit { page } | Self::Xyz { page, .. } => page,
        }
    }

    /// Encodes the destination as an explicit destination array.
    pub fn to_object(&self) -> Object {
        match *self {
            Self::Fit { page } => {
                Object::Array(vec![Object::Reference(page), Object::Name(b"Fit".to_vec())])
            }
            Self::Xyz { page, left, top } => Object::Array(vec![
                Object::Reference(page),
                Object::Name(b"XYZ".to_vec()),
                Object::Real(left),
                Object::Real(top),
                Object::Null,
            ]),
        }
    }
}

/// Page lookup used while resolving destinations.
pub trait PageGeometry {
    /// Number of pages available.
    fn page_count(&self) -> usize;

    /// Object id of the page with the given zero-based index.
    fn page_id(&self, index: usize) -> Option<ObjectId>;

    /// Dimensions of the page with the given zero-based index.
    fn page_size(&self, index: usize) -> Option<PageSize>;
}

/// Resolves a [`PageTarget`] against the pages described by `geometry`.
///
/// Whole-page targets become `/Fit` destinations. Position targets are scaled
/// by the page size and become `/XYZ` destinations.
pub fn resolve<G>(target: PageTarget, geometry: &G) -> Result<Destination, DestinationError>
where
    G: PageGeometry + ?Sized,
{
    let page_index = target.page_index();
    let out_of_range = || DestinationError::PageOutOfRange {
        page_index,
        page_count: geometry.page_count(),
    };
    let page = geometry.page_id(page_index).ok_or_else(out_of_range)?;

    match target {
        PageTarget::Page(_) => Ok(Destination::Fit { page }),
        PageTarget::Position { x, y, .. } => {
            let size = geometry.page_size(page_index).ok_or_else(out_of_range)?;
            Ok(Destination::Xyz {
                page,
                left: size.width * x,
                top: size.height * y,
            })
        }
    }
}

/// Page ids and sizes of a document in page order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageTable {
    pages: Vec<(ObjectId, PageSize)>,
}

impl PageTable {
    /// Builds a table from explicit `(page id, size)` pairs.
    pub fn new<I>(pages: I) -> Self
    where
        I: IntoIterator<Item = (ObjectId, PageSize)>,
    {
        Self {
            pages: pages.into_iter().collect(),
        }
    }

    /// Reads the page tree of `document`.
    ///
    /// Sizes come from the page's own or inherited `/MediaBox`; pages without one
    /// fall back to [`DEFAULT_PAGE_SIZE`].
    pub fn from_document(document: &Document) -> Self {
        let pages = document
            .get_pages()
            .into_iter()
            .map(|(number, id)| {
                let size = document
                    .get_dictionary(id)
                    .ok()
                    .and_then(|page| inherited_attribute(document, page, b"MediaBox"))
                    .and_then(media_box_size)
                    .unwrap_or_else(|| {
                        warn!("page {} has no usable MediaBox, assuming US Letter", number);
                        DEFAULT_PAGE_SIZE
                    });
                (id, size)
            })
            .collect();

        Self { pages }
    }

    /// Number of pages in the table.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns `true` if the table holds no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Resolves a target against this table.
    pub fn resolve(&self, target: PageTarget) -> Result<Destination, DestinationError> {
        resolve(target, self)
    }
}

impl PageGeometry for PageTable {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_id(&self, index: usize) -> Option<ObjectId> {
        self.pages.get(index).map(|(id, _)| *id)
    }

    fn page_size(&self, index: usize) -> Option<PageSize> {
        self.pages.get(index).map(|(_, size)| *size)
    }
}

/// Looks up `key` on a page dictionary, then on its ancestors in the page tree.
pub(crate) fn inherited_attribute<'a>(
    document: &'a Document,
    page: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    if let Ok(value) = page.get(key) {
        return Some(value);
    }

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = document.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn media_box_size(object: &Object) -> Option<PageSize> {
    let values = object.as_array().ok()?;
    if values.len() < 4 {
        return None;
    }
    let mut coords = [0.0f32; 4];
    for (slot, value) in coords.iter_mut().zip(values) {
        *slot = number(value)?;
    }
    let [llx, lly, urx, ury] = coords;
    Some(PageSize::new((urx - llx).abs(), (ury - lly).abs()))
}

fn number(object: &Object) -> Option<f32> {
    match *object {
        Object::Integer(value) => Some(value as f32),
        Object::Real(value) => Some(value as f32),
        _ => None,
    }
}

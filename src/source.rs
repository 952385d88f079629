//! Rendered page sources and the metadata attached to them.
//!
//! File names are only interpreted here, at the boundary with the renderer.
//! Everything downstream works with [`EntryMeta`] values.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

/// Ordering rank given to sources that are missing from the reading order.
pub const UNMATCHED_RANK: usize = usize::MAX;

/// A heading inside a documentation page that gets its own bookmark.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Anchor {
    /// Bookmark title.
    pub title: String,
    /// Page of the anchor relative to the first page of its source.
    #[serde(default)]
    pub page: usize,
    /// Horizontal position as a fraction of the page width.
    #[serde(default)]
    pub x: f32,
    /// Vertical position as a fraction of the page height.
    #[serde(default)]
    pub y: f32,
}

/// A documentation page in reading order.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DocEntry {
    /// Site pathname the page was rendered from, e.g. `/guide/install/`.
    pub pathname: String,
    /// Page title.
    pub title: String,
    /// Sidebar section label; present on the first page of each section.
    #[serde(default)]
    pub section: Option<String>,
    /// Headings that receive nested bookmarks.
    #[serde(default)]
    pub anchors: Vec<Anchor>,
}

impl DocEntry {
    /// Creates an entry without section label or anchors.
    pub fn new(pathname: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            title: title.into(),
            section: None,
            anchors: Vec::new(),
        }
    }

    /// Sets the section label and returns the updated entry.
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Appends an anchor and returns the updated entry.
    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchors.push(anchor);
        self
    }

    /// File stem the renderer uses for this page.
    pub fn file_stem(&self) -> String {
        slugify_pathname(&self.pathname)
    }
}

/// Kind-prefixed, zero-padded specification identifier such as `RFC-0002`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedId {
    kind: String,
    number: u32,
}

fn qualified_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([A-Za-z]+)-([0-9]+)$").ok())
        .as_ref()
}

impl QualifiedId {
    /// Creates an identifier; the kind is upper-cased.
    pub fn new(kind: &str, number: u32) -> Self {
        Self {
            kind: kind.to_ascii_uppercase(),
            number,
        }
    }

    /// Parses `KIND-digits`, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        let captures = qualified_id_pattern()?.captures(value.trim())?;
        let number = captures[2].parse().ok()?;
        Some(Self::new(&captures[1], number))
    }

    /// Parses a file name of the form `KIND-digits.ext`.
    pub fn from_file_name(path: &Path) -> Option<Self> {
        path.extension()?;
        Self::parse(path.file_stem()?.to_str()?)
    }

    /// Upper-cased kind prefix.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Lower-cased kind, used as collection and directory name.
    pub fn kind_key(&self) -> String {
        self.kind.to_ascii_lowercase()
    }

    /// Numeric part.
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}", self.kind, self.number)
    }
}

/// A specification page.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecEntry {
    /// Identifier of the specification.
    pub id: QualifiedId,
    /// Display name of the specification kind, used as group title.
    pub kind_name: String,
    /// Optional human readable title.
    pub title: Option<String>,
}

impl SpecEntry {
    /// Creates an entry without title.
    pub fn new(id: QualifiedId, kind_name: impl Into<String>) -> Self {
        Self {
            id,
            kind_name: kind_name.into(),
            title: None,
        }
    }

    /// Sets the title and returns the updated entry.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title shown for the entry's own bookmark.
    pub fn bookmark_title(&self) -> String {
        match &self.title {
            Some(title) => format!("{}: {}", self.id, title),
            None => self.id.to_string(),
        }
    }
}

/// Structured metadata of a recognised source.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryMeta {
    /// Documentation page.
    Doc(DocEntry),
    /// Specification page.
    Spec(SpecEntry),
}

impl EntryMeta {
    /// Returns `true` for specification pages.
    pub fn is_spec(&self) -> bool {
        matches!(self, Self::Spec(_))
    }
}

/// Sort key of a source: reading-order rank, then directory scan position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    /// Position in the reading order, [`UNMATCHED_RANK`] when absent.
    pub rank: usize,
    /// Position in the (sorted) directory listing.
    pub scan_index: usize,
}

impl OrderKey {
    /// Key for a source found in the reading order.
    pub fn ranked(rank: usize, scan_index: usize) -> Self {
        Self { rank, scan_index }
    }

    /// Key for a source that is not in the reading order.
    pub fn unmatched(scan_index: usize) -> Self {
        Self::ranked(UNMATCHED_RANK, scan_index)
    }

    /// Returns `true` when the source was not found in the reading order.
    pub fn is_unmatched(&self) -> bool {
        self.rank == UNMATCHED_RANK
    }
}

/// One rendered PDF together with its ordering key and metadata.
#[derive(Clone, Debug)]
pub struct SourceDocument {
    key: String,
    path: Option<PathBuf>,
    bytes: Vec<u8>,
    order: OrderKey,
    meta: Option<EntryMeta>,
}

impl SourceDocument {
    /// Creates an unmatched source from raw bytes.
    pub fn new(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            path: None,
            bytes: bytes.into(),
            order: OrderKey::unmatched(0),
            meta: None,
        }
    }

    /// Identifier of the source, normally the file stem.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// File the bytes were read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw PDF bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Ordering key.
    pub fn order(&self) -> OrderKey {
        self.order
    }

    /// Metadata; `None` for sources that did not match any known pattern.
    pub fn meta(&self) -> Option<&EntryMeta> {
        self.meta.as_ref()
    }

    /// Sets the originating path and returns the updated source.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the ordering key and returns the updated source.
    pub fn with_order(mut self, order: OrderKey) -> Self {
        self.order = order;
        self
    }

    /// Attaches metadata and returns the updated source.
    pub fn with_meta(mut self, meta: impl Into<Option<EntryMeta>>) -> Self {
        self.meta = meta.into();
        self
    }
}

/// Sorts sources by ordering key. Equal keys keep their relative order.
pub fn order_sources(sources: &mut [SourceDocument]) {
    sources.sort_by_key(SourceDocument::order);
}

/// Converts a site pathname into the file stem used for its rendered page.
///
/// `/guide/Install/` becomes `guide-install`; the site root becomes `index`.
pub fn slugify_pathname(pathname: &str) -> String {
    let trimmed = pathname.trim().trim_matches('/');
    let trimmed = trimmed
        .strip_suffix(".html")
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    if trimmed.is_empty() {
        return "index".to_string();
    }

    trimmed
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

//! Reading order supplied by the site build.
//!
//! The manifest lists documentation pages in order and the specification kinds
//! in precedence order. Together with a per-kind listing of specification ids
//! it yields the canonical order that rendered pages are merged in.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use crate::source::{DocEntry, EntryMeta, QualifiedId, SpecEntry};

/// Errors raised while loading a manifest or listing specification sources.
#[derive(Debug)]
pub enum ManifestError {
    /// A file or directory could not be read.
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The manifest is not valid JSON of the expected shape.
    Json {
        /// Manifest path, when loaded from disk.
        path: Option<PathBuf>,
        /// Parser error.
        source: serde_json::Error,
    },
    /// Two specification kinds share the same id.
    DuplicateKind(String),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, .. } => write!(f, "failed to read {}", path.display()),
            Self::Json { path: Some(path), .. } => {
                write!(f, "manifest {} is malformed", path.display())
            }
            Self::Json { path: None, .. } => write!(f, "manifest is malformed"),
            Self::DuplicateKind(kind) => {
                write!(f, "specification kind `{}` is declared twice", kind)
            }
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::DuplicateKind(_) => None,
        }
    }
}

impl From<serde_json::Error> for ManifestError {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { path: None, source }
    }
}

/// A specification kind such as `rfc` with its display name.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SpecKind {
    /// Kind identifier; matched case-insensitively.
    pub id: String,
    /// Group title; defaults to the upper-cased id.
    #[serde(default)]
    pub name: Option<String>,
}

impl SpecKind {
    /// Creates a kind without a display name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Sets the display name and returns the updated kind.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lower-cased id, used as directory name.
    pub fn key(&self) -> String {
        self.id.to_ascii_lowercase()
    }

    /// Title of the bookmark group for this kind.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.id.to_ascii_uppercase())
    }
}

/// Reading order description produced by the site build.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Manifest {
    /// Documentation pages in reading order.
    #[serde(default)]
    pub docs: Vec<DocEntry>,
    /// Specification kinds in precedence order.
    #[serde(default)]
    pub spec_kinds: Vec<SpecKind>,
    #[serde(default)]
    spec_titles: BTreeMap<String, String>,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a manifest.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.normalized()
    }

    /// Reads and parses a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self = serde_json::from_str(&json).map_err(|source| ManifestError::Json {
            path: Some(path.to_path_buf()),
            source,
        })?;
        debug!(
            "loaded manifest {} with {} docs and {} spec kinds",
            path.display(),
            manifest.docs.len(),
            manifest.spec_kinds.len()
        );
        manifest.normalized()
    }

    /// Appends a documentation page and returns the updated manifest.
    pub fn with_doc(mut self, entry: DocEntry) -> Self {
        self.docs.push(entry);
        self
    }

    /// Appends a specification kind and returns the updated manifest.
    pub fn with_kind(mut self, kind: SpecKind) -> Self {
        self.spec_kinds.push(kind);
        self
    }

    /// Records the title of a specification and returns the updated manifest.
    pub fn with_spec_title(mut self, id: &QualifiedId, title: impl Into<String>) -> Self {
        self.spec_titles.insert(id.to_string(), title.into());
        self
    }

    /// Title recorded for a specification.
    pub fn spec_title(&self, id: &QualifiedId) -> Option<&str> {
        self.spec_titles.get(&id.to_string()).map(String::as_str)
    }

    /// Looks up a kind by id, case-insensitively.
    pub fn kind(&self, id: &str) -> Option<&SpecKind> {
        self.spec_kinds
            .iter()
            .find(|kind| kind.id.eq_ignore_ascii_case(id))
    }

    /// Rejects manifests that declare a kind twice.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for kind in &self.spec_kinds {
            if !seen.insert(kind.key()) {
                return Err(ManifestError::DuplicateKind(kind.id.clone()));
            }
        }
        Ok(())
    }

    fn normalized(mut self) -> Result<Self, ManifestError> {
        self.validate()?;
        let titles = std::mem::take(&mut self.spec_titles);
        for (key, title) in titles {
            match QualifiedId::parse(&key) {
                Some(id) => {
                    self.spec_titles.insert(id.to_string(), title);
                }
                None => warn!("ignoring title for malformed specification id `{}`", key),
            }
        }
        Ok(self)
    }
}

/// Specification ids available per kind, each kind sorted lexically by file name
/// ignoring ASCII case.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpecListing {
    kinds: HashMap<String, BTreeMap<String, QualifiedId>>,
}

impl SpecListing {
    /// Creates an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists `<dir>/<kind>/` for every kind. Missing kind directories are empty.
    pub fn from_dir(dir: impl AsRef<Path>, kinds: &[SpecKind]) -> Result<Self, ManifestError> {
        let mut listing = Self::new();
        for kind in kinds {
            let kind_dir = dir.as_ref().join(kind.key());
            if !kind_dir.is_dir() {
                debug!("no specification directory {}", kind_dir.display());
                continue;
            }

            let io_error = |source| ManifestError::Io {
                path: kind_dir.clone(),
                source,
            };
            for entry in fs::read_dir(&kind_dir).map_err(io_error)? {
                let entry = entry.map_err(io_error)?;
                let path = entry.path();
                match QualifiedId::from_file_name(&path) {
                    Some(id) if id.kind_key() == kind.key() => {
                        listing.insert_named(entry.file_name().to_string_lossy(), id)
                    }
                    _ => debug!("ignoring {} in specification listing", path.display()),
                }
            }
        }
        Ok(listing)
    }

    /// Builds a listing from file stems, keeping ids of the given kinds.
    pub fn from_names<I, S>(names: I, kinds: &[SpecKind]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known: HashSet<String> = kinds.iter().map(SpecKind::key).collect();
        let mut listing = Self::new();
        for name in names {
            if let Some(id) = QualifiedId::parse(name.as_ref()) {
                if known.contains(&id.kind_key()) {
                    listing.insert_named(name.as_ref(), id);
                }
            }
        }
        listing
    }

    /// Adds an id to its kind, sorted under its canonical form.
    pub fn insert(&mut self, id: QualifiedId) {
        self.insert_named(id.to_string(), id);
    }

    /// Adds an id to its kind, sorted under the file name it was listed as.
    pub fn insert_named(&mut self, name: impl AsRef<str>, id: QualifiedId) {
        self.kinds
            .entry(id.kind_key())
            .or_default()
            .insert(name.as_ref().to_ascii_lowercase(), id);
    }

    /// Ids of one kind in file name order. An id listed under two names appears twice.
    pub fn ids(&self, kind_key: &str) -> impl Iterator<Item = &QualifiedId> {
        self.kinds
            .get(kind_key)
            .into_iter()
            .flat_map(|ids| ids.values())
    }
}

/// Why a rendered page or a listed entry stays out of the bookmarks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The file name matches neither a documentation page nor a specification id.
    NotInManifest,
    /// The file name is a specification id of a kind the manifest does not declare.
    UnknownKind(String),
    /// The specification id is missing from its kind's listing.
    NotListed,
    /// A manifest entry has no rendered page.
    MissingRender,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInManifest => write!(f, "not in the reading order"),
            Self::UnknownKind(kind) => write!(f, "unknown specification kind `{}`", kind),
            Self::NotListed => write!(f, "not in the specification listing"),
            Self::MissingRender => write!(f, "no rendered page"),
        }
    }
}

/// Canonical merge order: documentation first, then specifications by kind.
#[derive(Clone, Debug, Default)]
pub struct ReadingOrder {
    entries: Vec<(String, EntryMeta)>,
    docs: HashMap<String, usize>,
    specs: HashMap<QualifiedId, usize>,
    kinds: HashSet<String>,
}

impl ReadingOrder {
    /// Builds the order from a manifest and a specification listing.
    ///
    /// A documentation page whose slug repeats an earlier one is dropped.
    pub fn build(manifest: &Manifest, listing: &SpecListing) -> Self {
        let mut order = Self::default();

        for doc in &manifest.docs {
            let stem = doc.file_stem();
            if order.docs.contains_key(&stem) {
                warn!(
                    "documentation page `{}` repeats slug `{}`, keeping the first",
                    doc.pathname, stem
                );
                continue;
            }
            order.docs.insert(stem.clone(), order.entries.len());
            order.entries.push((stem, EntryMeta::Doc(doc.clone())));
        }

        for kind in &manifest.spec_kinds {
            order.kinds.insert(kind.key());
            let name = kind.display_name();
            for id in listing.ids(&kind.key()) {
                if order.specs.contains_key(id) {
                    debug!("specification {} listed twice, keeping the first", id);
                    continue;
                }
                let mut entry = SpecEntry::new(id.clone(), name.as_str());
                if let Some(title) = manifest.spec_title(id) {
                    entry = entry.with_title(title);
                }
                order.specs.insert(id.clone(), order.entries.len());
                order.entries.push((id.to_string(), EntryMeta::Spec(entry)));
            }
        }

        debug!("reading order has {} entries", order.entries.len());
        order
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is ordered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with their expected file stems, in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &EntryMeta)> {
        self.entries.iter().map(|(stem, meta)| (stem.as_str(), meta))
    }

    /// Maps a rendered file stem to its rank and metadata.
    pub fn classify(&self, stem: &str) -> Result<(usize, &EntryMeta), SkipReason> {
        let rank = match self.docs.get(&stem.to_lowercase()) {
            Some(&rank) => rank,
            None => {
                let id = QualifiedId::parse(stem).ok_or(SkipReason::NotInManifest)?;
                if !self.kinds.contains(&id.kind_key()) {
                    return Err(SkipReason::UnknownKind(id.kind().to_string()));
                }
                *self.specs.get(&id).ok_or(SkipReason::NotListed)?
            }
        };
        Ok((rank, &self.entries[rank].1))
    }
}

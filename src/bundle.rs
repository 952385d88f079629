//! End-to-end pipeline: rendered pages in, bookmarked bundles out.
//!
//! A [`Bundler`] scans the rendered pages directory, orders the pages by the
//! manifest, and builds two documents: the complete bundle and a bundle holding
//! only specification pages. Both are built and serialized in memory before
//! anything is written, so a failure on any page leaves the output directory
//! untouched and the rendered pages in place.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use lopdf::Document;
use tempfile::NamedTempFile;

use crate::compile::{compile_outline, CompileError};
use crate::destination::PageTable;
use crate::info::DocumentInfo;
use crate::manifest::{Manifest, ManifestError, ReadingOrder, SkipReason, SpecListing};
use crate::merge::{merge_sources, MergeError};
use crate::reconstruct::{reconstruct, ReconstructError};
use crate::source::{order_sources, OrderKey, SourceDocument};

/// Default file name of the complete bundle.
pub const DEFAULT_COMPLETE_NAME: &str = "complete.pdf";
/// Default file name of the specification bundle.
pub const DEFAULT_SPECS_NAME: &str = "specifications.pdf";
/// PDF version written when none is configured.
pub const DEFAULT_PDF_VERSION: &str = "1.7";

/// Errors that abort a bundling run.
#[derive(Debug)]
pub enum BundleError {
    /// The manifest or the specification listing could not be read.
    Manifest(ManifestError),
    /// A rendered page could not be merged.
    Merge(MergeError),
    /// Bookmarks could not be rebuilt from the merge.
    Reconstruct(ReconstructError),
    /// Bookmarks could not be written into the merged document.
    Compile(CompileError),
    /// A merged document could not be serialized.
    Serialize {
        /// Output the document was meant for.
        path: PathBuf,
        /// Writer error.
        source: lopdf::Error,
    },
    /// A file system operation failed.
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest(_) => write!(f, "failed to load the reading order"),
            Self::Merge(_) => write!(f, "failed to merge rendered pages"),
            Self::Reconstruct(_) => write!(f, "failed to rebuild bookmarks"),
            Self::Compile(_) => write!(f, "failed to write bookmarks"),
            Self::Serialize { path, .. } => write!(f, "failed to serialize {}", path.display()),
            Self::Io { path, .. } => write!(f, "I/O error on {}", path.display()),
        }
    }
}

impl std::error::Error for BundleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Manifest(err) => Some(err),
            Self::Merge(err) => Some(err),
            Self::Reconstruct(err) => Some(err),
            Self::Compile(err) => Some(err),
            Self::Serialize { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<ManifestError> for BundleError {
    fn from(err: ManifestError) -> Self {
        Self::Manifest(err)
    }
}

impl From<MergeError> for BundleError {
    fn from(err: MergeError) -> Self {
        Self::Merge(err)
    }
}

impl From<ReconstructError> for BundleError {
    fn from(err: ReconstructError) -> Self {
        Self::Reconstruct(err)
    }
}

impl From<CompileError> for BundleError {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> BundleError + '_ {
    move |source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Settings for a bundling run.
#[derive(Clone, Debug)]
pub struct BundleConfig {
    pages_dir: PathBuf,
    output_dir: PathBuf,
    complete_name: String,
    specs_name: String,
    specs_dir: Option<PathBuf>,
    info: DocumentInfo,
    cleanup: bool,
    pdf_version: String,
    compress: bool,
}

impl BundleConfig {
    /// Creates a configuration reading rendered pages from `pages_dir` and
    /// writing bundles into `output_dir`.
    pub fn new(pages_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pages_dir: pages_dir.into(),
            output_dir: output_dir.into(),
            complete_name: DEFAULT_COMPLETE_NAME.to_string(),
            specs_name: DEFAULT_SPECS_NAME.to_string(),
            specs_dir: None,
            info: DocumentInfo::default(),
            cleanup: true,
            pdf_version: DEFAULT_PDF_VERSION.to_string(),
            compress: true,
        }
    }

    /// Sets the complete bundle's file name.
    pub fn with_complete_name(mut self, name: impl Into<String>) -> Self {
        self.complete_name = name.into();
        self
    }

    /// Sets the specification bundle's file name.
    pub fn with_specs_name(mut self, name: impl Into<String>) -> Self {
        self.specs_name = name.into();
        self
    }

    /// Lists specification ids from `<dir>/<kind>/` instead of the rendered file names.
    pub fn with_specs_dir(mut self, dir: impl Into<Option<PathBuf>>) -> Self {
        self.specs_dir = dir.into();
        self
    }

    /// Sets the document information written into both bundles.
    pub fn with_info(mut self, info: DocumentInfo) -> Self {
        self.info = info;
        self
    }

    /// Controls whether rendered pages are deleted after a successful run.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Sets the PDF version of the bundles.
    pub fn with_pdf_version(mut self, version: impl Into<String>) -> Self {
        self.pdf_version = version.into();
        self
    }

    /// Controls stream compression of the bundles.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Directory holding rendered pages.
    pub fn pages_dir(&self) -> &Path {
        &self.pages_dir
    }

    /// Directory receiving the bundles.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the complete bundle.
    pub fn complete_path(&self) -> PathBuf {
        self.output_dir.join(&self.complete_name)
    }

    /// Path of the specification bundle.
    pub fn specs_path(&self) -> PathBuf {
        self.output_dir.join(&self.specs_name)
    }

    /// Document information written into both bundles.
    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Whether rendered pages are deleted after a successful run.
    pub fn cleanup(&self) -> bool {
        self.cleanup
    }
}

/// A bundle written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleOutput {
    /// Location of the bundle.
    pub path: PathBuf,
    /// Pages in the bundle.
    pub page_count: usize,
    /// Bookmarks in the bundle, nested ones included.
    pub bookmark_count: usize,
}

/// A rendered page or manifest entry left out of the bookmarks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedSource {
    /// File stem or qualified id.
    pub key: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Summary of a successful run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleReport {
    /// The complete bundle.
    pub complete: Option<BundleOutput>,
    /// The specification bundle; `None` when there are no specification pages.
    pub specifications: Option<BundleOutput>,
    /// Non-fatal skips, in scan order followed by unrendered manifest entries.
    pub skipped: Vec<SkippedSource>,
    /// Rendered pages deleted after the bundles were written.
    pub removed_artifacts: usize,
}

/// A document serialized in memory, waiting to be written.
struct StagedBundle {
    bytes: Vec<u8>,
    output: BundleOutput,
}

/// Runs the bundling pipeline for one manifest.
#[derive(Clone, Debug)]
pub struct Bundler {
    config: BundleConfig,
    manifest: Manifest,
}

impl Bundler {
    /// Creates a bundler.
    pub fn new(config: BundleConfig, manifest: Manifest) -> Self {
        Self { config, manifest }
    }

    /// Configuration of this bundler.
    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Builds and writes both bundles, then removes the rendered pages if
    /// cleanup is enabled.
    pub fn run(&self) -> Result<BundleReport, BundleError> {
        self.manifest.validate()?;
        let mut report = BundleReport::default();

        let sources = self.load_sources(&mut report)?;
        info!(
            "bundling {} rendered pages from {}",
            sources.len(),
            self.config.pages_dir.display()
        );

        let complete = self.stage(sources.iter(), self.config.complete_path())?;
        let specs: Vec<&SourceDocument> = sources
            .iter()
            .filter(|source| source.meta().is_some_and(|meta| meta.is_spec()))
            .collect();
        let specifications = if specs.is_empty() {
            info!("no specification pages, skipping the specification bundle");
            None
        } else {
            Some(self.stage(specs, self.config.specs_path())?)
        };

        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
        let mut writes = vec![write_temp(&complete, output_dir)?];
        if let Some(staged) = &specifications {
            writes.push(write_temp(staged, output_dir)?);
        }
        commit(writes, output_dir)?;

        report.complete = Some(complete.output);
        report.specifications = specifications.map(|staged| staged.output);
        if self.config.cleanup {
            report.removed_artifacts = remove_artifacts(&sources);
        }
        Ok(report)
    }

    /// Reads every rendered page and puts them in canonical order.
    fn load_sources(&self, report: &mut BundleReport) -> Result<Vec<SourceDocument>, BundleError> {
        let reserved = [self.config.complete_path(), self.config.specs_path()];
        let paths: Vec<PathBuf> = scan_pages(&self.config.pages_dir)?
            .into_iter()
            .filter(|path| !reserved.contains(path))
            .collect();
        let stems: Vec<String> = paths.iter().map(|path| file_stem(path)).collect();

        let listing = match &self.config.specs_dir {
            Some(dir) => SpecListing::from_dir(dir, &self.manifest.spec_kinds)?,
            None => SpecListing::from_names(&stems, &self.manifest.spec_kinds),
        };
        let order = ReadingOrder::build(&self.manifest, &listing);

        let mut rendered = HashSet::new();
        let mut sources = Vec::with_capacity(paths.len());
        for (scan_index, (path, stem)) in paths.into_iter().zip(stems).enumerate() {
            let bytes = fs::read(&path).map_err(io_error(&path))?;
            let source = SourceDocument::new(stem.as_str(), bytes).with_path(&path);

            let source = match order.classify(&stem) {
                Ok((rank, meta)) => {
                    rendered.insert(rank);
                    source
                        .with_order(OrderKey::ranked(rank, scan_index))
                        .with_meta(meta.clone())
                }
                Err(reason) => {
                    warn!("{} is not bookmarked: {}", path.display(), reason);
                    report.skipped.push(SkippedSource { key: stem, reason });
                    source.with_order(OrderKey::unmatched(scan_index))
                }
            };
            sources.push(source);
        }

        for (rank, (stem, _)) in order.entries().enumerate() {
            if !rendered.contains(&rank) {
                warn!("`{}` is in the reading order but was not rendered", stem);
                report.skipped.push(SkippedSource {
                    key: stem.to_string(),
                    reason: SkipReason::MissingRender,
                });
            }
        }

        order_sources(&mut sources);
        Ok(sources)
    }

    /// Merges, bookmarks and serializes one bundle without touching the disk.
    fn stage<'a, I>(&self, sources: I, path: PathBuf) -> Result<StagedBundle, BundleError>
    where
        I: IntoIterator<Item = &'a SourceDocument>,
    {
        let sources: Vec<&SourceDocument> = sources.into_iter().collect();
        let mut merged = merge_sources(sources.iter().copied(), &self.config.pdf_version)?;
        let page_count = merged.page_count();

        let outline = reconstruct(
            merged
                .offsets
                .iter()
                .zip(sources.iter().map(|source| source.meta())),
        )?;
        let table = PageTable::from_document(&merged.document);

        let document = &mut merged.document;
        if let Some(compiled) = compile_outline(&outline, &table, || document.new_object_id())? {
            compiled.attach(document)?;
        }
        self.config.info.apply(document);
        if self.config.compress {
            document.compress();
        }

        let bytes = serialize(document, &path)?;
        debug!(
            "staged {} with {} pages and {} bookmarks ({} bytes)",
            path.display(),
            page_count,
            outline.len(),
            bytes.len()
        );

        Ok(StagedBundle {
            bytes,
            output: BundleOutput {
                path,
                page_count,
                bookmark_count: outline.len(),
            },
        })
    }
}

/// Lists `.pdf` files in `dir`, sorted by path.
pub fn scan_pages(dir: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let mut pages = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pages.push(path);
        }
    }
    pages.sort();
    Ok(pages)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn serialize(document: &mut Document, path: &Path) -> Result<Vec<u8>, BundleError> {
    let mut buffer = Vec::new();
    document
        .save_to(&mut buffer)
        .map_err(|err| BundleError::Serialize {
            path: path.to_path_buf(),
            source: err.into(),
        })?;
    Ok(buffer)
}

/// Writes a staged bundle to a temporary file in `output_dir`.
fn write_temp<'a>(
    staged: &'a StagedBundle,
    output_dir: &Path,
) -> Result<(NamedTempFile, &'a Path), BundleError> {
    let path = staged.output.path.as_path();
    let mut file = NamedTempFile::new_in(output_dir).map_err(io_error(output_dir))?;
    file.write_all(&staged.bytes).map_err(io_error(path))?;
    file.as_file().sync_all().map_err(io_error(path))?;
    Ok((file, path))
}

/// Renames every written bundle into place, or none of them.
///
/// Existing outputs are moved into a scratch directory first and restored if a
/// later rename fails. A directory occupying an output path is refused before
/// anything is renamed.
fn commit(writes: Vec<(NamedTempFile, &Path)>, output_dir: &Path) -> Result<(), BundleError> {
    for (_, target) in &writes {
        if target.is_dir() {
            return Err(BundleError::Io {
                path: target.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "a directory occupies the output path",
                ),
            });
        }
    }

    let backup = tempfile::tempdir_in(output_dir).map_err(io_error(output_dir))?;
    let mut saved: Vec<(&Path, PathBuf)> = Vec::new();
    let mut written: Vec<&Path> = Vec::new();

    for (index, (file, target)) in writes.into_iter().enumerate() {
        let result = replace(file, target, &backup.path().join(index.to_string()), &mut saved);
        if let Err(err) = result {
            if !roll_back(&written, &saved) {
                let kept = backup.into_path();
                warn!("previous outputs kept in {}", kept.display());
            }
            return Err(err);
        }
        written.push(target);
        info!("wrote {}", target.display());
    }
    Ok(())
}

fn replace<'a>(
    file: NamedTempFile,
    target: &'a Path,
    backup: &Path,
    saved: &mut Vec<(&'a Path, PathBuf)>,
) -> Result<(), BundleError> {
    if target.exists() {
        fs::rename(target, backup).map_err(io_error(target))?;
        saved.push((target, backup.to_path_buf()));
    }
    file.persist(target).map_err(|err| BundleError::Io {
        path: target.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

/// Removes freshly renamed outputs and moves the previous ones back.
/// Returns false if a previous output could not be restored.
fn roll_back(written: &[&Path], saved: &[(&Path, PathBuf)]) -> bool {
    for target in written {
        if let Err(err) = fs::remove_file(target) {
            warn!("failed to remove {}: {}", target.display(), err);
        }
    }
    let mut restored = true;
    for (target, backup) in saved {
        if let Err(err) = fs::rename(backup, target) {
            warn!("failed to restore {}: {}", target.display(), err);
            restored = false;
        }
    }
    restored
}

fn remove_artifacts(sources: &[SourceDocument]) -> usize {
    let mut removed = 0;
    for path in sources.iter().filter_map(SourceDocument::path) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(err) => warn!("failed to remove {}: {}", path.display(), err),
        }
    }
    debug!("removed {} rendered pages", removed);
    removed
}

//! Core entry point for the pdf_bundle crate.
//!
//! Merges independently rendered PDF pages into one document and writes a
//! bookmark tree whose destinations follow the merged page numbering.

pub mod bundle;
pub mod compile;
pub mod destination;
pub mod info;
pub mod manifest;
pub mod merge;
pub mod outline;
pub mod reconstruct;
pub mod source;

#[cfg(test)]
mod testing;

pub use bundle::{BundleConfig, BundleError, BundleOutput, BundleReport, Bundler, SkippedSource};
pub use compile::{compile_outline, CompileError, CompiledOutline};
pub use destination::{Destination, DestinationError, PageGeometry, PageSize, PageTable};
pub use info::DocumentInfo;
pub use manifest::{Manifest, ManifestError, ReadingOrder, SkipReason, SpecKind, SpecListing};
pub use merge::{merge_sources, MergeError, MergedDocument, PageOffsetRecord};
pub use outline::{NodeId, Outline, OutlineNode, OutlineStyle, PageTarget, Visit};
pub use reconstruct::{reconstruct, ReconstructError};
pub use source::{Anchor, DocEntry, EntryMeta, OrderKey, QualifiedId, SourceDocument, SpecEntry};

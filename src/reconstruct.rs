//! Rebuilds a grouped bookmark forest from merge order.
//!
//! Documentation pages are grouped under the section label of the page that
//! opened the section. Specification pages are grouped by kind, joining the
//! group only when it is the immediately preceding top-level entry. Runs of the
//! same kind split by another kind therefore produce separate groups.

use std::collections::HashSet;
use std::fmt;

use log::{debug, warn};

use crate::merge::PageOffsetRecord;
use crate::outline::{NodeId, Outline, OutlineNode, PageTarget};
use crate::source::{DocEntry, EntryMeta, SpecEntry};

/// Errors raised while rebuilding the forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconstructError {
    /// An anchor points past the pages contributed by its source.
    AnchorOutOfRange {
        /// Key of the source that declares the anchor.
        key: String,
        /// Anchor title.
        title: String,
        /// Requested page, relative to the source.
        page: usize,
        /// Pages in the source.
        page_count: usize,
    },
}

impl fmt::Display for ReconstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnchorOutOfRange {
                key,
                title,
                page,
                page_count,
            } => write!(
                f,
                "anchor `{}` of source `{}` targets page {} but the source has {} pages",
                title, key, page, page_count
            ),
        }
    }
}

impl std::error::Error for ReconstructError {}

/// A documentation bookmark with its anchor bookmarks.
struct Leaf {
    node: OutlineNode,
    anchors: Vec<OutlineNode>,
}

/// Section group that has been opened but not yet added to the forest.
struct PendingSection {
    node: OutlineNode,
    children: Vec<Leaf>,
}

#[derive(Default)]
struct Reconstruction {
    outline: Outline,
    groups: HashSet<NodeId>,
    section: Option<PendingSection>,
}

impl Reconstruction {
    fn push_doc(&mut self, record: &PageOffsetRecord, entry: &DocEntry) -> Result<(), ReconstructError> {
        let target = PageTarget::page(record.start_page);

        if let Some(label) = &entry.section {
            self.flush_section();
            self.section = Some(PendingSection {
                node: OutlineNode::new(label.as_str(), target).bold(),
                children: Vec::new(),
            });
            return Ok(());
        }

        let leaf = doc_leaf(record, entry)?;
        match self.section.as_mut() {
            Some(section) => section.children.push(leaf),
            None => {
                let id = self.outline.push_root(leaf.node);
                for anchor in leaf.anchors {
                    self.outline.push_child(id, anchor);
                }
            }
        }
        Ok(())
    }

    fn push_spec(&mut self, record: &PageOffsetRecord, entry: &SpecEntry) {
        let group = match self.outline.last_root() {
            Some(last) if self.is_group_titled(last, &entry.kind_name) => last,
            _ => {
                self.flush_section();
                let group = OutlineNode::new(
                    entry.kind_name.as_str(),
                    PageTarget::page(record.start_page),
                )
                .bold()
                .closed();
                let id = self.outline.push_root(group);
                self.groups.insert(id);
                id
            }
        };

        self.outline.push_child(
            group,
            OutlineNode::new(entry.bookmark_title(), PageTarget::page(record.start_page)),
        );
    }

    fn is_group_titled(&self, id: NodeId, title: &str) -> bool {
        self.groups.contains(&id)
            && self
                .outline
                .node(id)
                .is_some_and(|node| node.title() == title)
    }

    fn flush_section(&mut self) {
        let Some(section) = self.section.take() else {
            return;
        };
        if section.children.is_empty() {
            debug!("dropping empty section group `{}`", section.node.title());
            return;
        }

        let group = self.outline.push_root(section.node);
        self.groups.insert(group);
        for leaf in section.children {
            let id = self.outline.push_child(group, leaf.node);
            for anchor in leaf.anchors {
                self.outline.push_child(id, anchor);
            }
        }
    }
}

fn doc_leaf(record: &PageOffsetRecord, entry: &DocEntry) -> Result<Leaf, ReconstructError> {
    let mut anchors = Vec::with_capacity(entry.anchors.len());
    for anchor in &entry.anchors {
        if anchor.page >= record.page_count {
            return Err(ReconstructError::AnchorOutOfRange {
                key: record.key.clone(),
                title: anchor.title.clone(),
                page: anchor.page,
                page_count: record.page_count,
            });
        }
        anchors.push(OutlineNode::new(
            anchor.title.as_str(),
            PageTarget::position(record.start_page + anchor.page, anchor.x, anchor.y),
        ));
    }

    let node = OutlineNode::new(entry.title.as_str(), PageTarget::page(record.start_page))
        .with_open(anchors.is_empty());
    Ok(Leaf { node, anchors })
}

/// Builds the bookmark forest for merged sources.
///
/// `entries` pairs every offset record with the metadata of its source, in
/// merge order. Records without metadata are left out of the forest; their
/// pages stay in the document.
pub fn reconstruct<'a, I>(entries: I) -> Result<Outline, ReconstructError>
where
    I: IntoIterator<Item = (&'a PageOffsetRecord, Option<&'a EntryMeta>)>,
{
    let mut state = Reconstruction::default();

    for (record, meta) in entries {
        match meta {
            Some(EntryMeta::Doc(entry)) => state.push_doc(record, entry)?,
            Some(EntryMeta::Spec(entry)) => state.push_spec(record, entry),
            None => warn!(
                "source `{}` is not in the reading order, leaving it out of the bookmarks",
                record.key
            ),
        }
    }

    state.flush_section();
    Ok(state.outline)
}

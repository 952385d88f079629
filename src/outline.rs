//! In-memory bookmark forest consumed by the outline compiler.
//!
//! Nodes are stored in an arena owned by [`Outline`] and addressed through
//! [`NodeId`] handles, so parent and sibling relationships never turn into
//! reference cycles. The order in which children are pushed is the document
//! order and becomes the `Prev`/`Next` chain of the compiled outline.

use std::fmt;

/// Location a bookmark jumps to inside the merged document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PageTarget {
    /// Show the whole page with the given zero-based index.
    Page(usize),
    /// Jump to a point on a page, expressed as fractions of the page width and height.
    Position {
        /// Zero-based page index.
        page: usize,
        /// Horizontal position in `0.0..=1.0`.
        x: f32,
        /// Vertical position in `0.0..=1.0`.
        y: f32,
    },
}

impl PageTarget {
    /// Targets an entire page.
    pub fn page(page: usize) -> Self {
        Self::Page(page)
    }

    /// Targets a point on a page. Fractions outside `0.0..=1.0` are clamped.
    pub fn position(page: usize, x: f32, y: f32) -> Self {
        Self::Position {
            page,
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }

    /// Returns the zero-based page index the target points at.
    pub fn page_index(&self) -> usize {
        match *self {
            Self::Page(page) | Self::Position { page, .. } => page,
        }
    }
}

/// Text style applied to a bookmark title.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutlineStyle {
    /// Render the title in italics.
    pub italic: bool,
    /// Render the title in bold.
    pub bold: bool,
}

impl OutlineStyle {
    /// Returns the `/F` flag value: italic is bit 1, bold is bit 2.
    pub fn flags(&self) -> i64 {
        let mut flags = 0;
        if self.italic {
            flags |= 1;
        }
        if self.bold {
            flags |= 2;
        }
        flags
    }
}

/// Handle of a node stored in an [`Outline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node inside its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single bookmark entry.
#[derive(Clone, Debug, PartialEq)]
pub struct OutlineNode {
    title: String,
    target: PageTarget,
    style: OutlineStyle,
    open: bool,
    children: Vec<NodeId>,
}

impl OutlineNode {
    /// Creates an open, unstyled bookmark without children.
    pub fn new(title: impl Into<String>, target: PageTarget) -> Self {
        Self {
            title: title.into(),
            target,
            style: OutlineStyle::default(),
            open: true,
            children: Vec::new(),
        }
    }

    /// Returns the bookmark title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the bookmark destination.
    pub fn target(&self) -> PageTarget {
        self.target
    }

    /// Returns the title style.
    pub fn style(&self) -> OutlineStyle {
        self.style
    }

    /// Returns the children in document order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node's children are shown expanded. Leaves always report `true`.
    pub fn is_open(&self) -> bool {
        self.open || self.children.is_empty()
    }

    /// Marks the title bold and returns the updated node.
    pub fn bold(mut self) -> Self {
        self.style.bold = true;
        self
    }

    /// Marks the title italic and returns the updated node.
    pub fn italic(mut self) -> Self {
        self.style.italic = true;
        self
    }

    /// Sets the expanded state and returns the updated node.
    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    /// Collapses the node and returns it.
    pub fn closed(self) -> Self {
        self.with_open(false)
    }
}

/// Decision returned by a traversal visitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    /// Continue into the node's children.
    Descend,
    /// Skip the node's subtree.
    Skip,
}

/// Forest of bookmark nodes.
#[derive(Clone, Debug, Default)]
pub struct Outline {
    nodes: Vec<OutlineNode>,
    roots: Vec<NodeId>,
}

impl Outline {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the forest has no top-level entries.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Top-level entries in document order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Last top-level entry, if any.
    pub fn last_root(&self) -> Option<NodeId> {
        self.roots.last().copied()
    }

    /// Looks up a node by handle.
    pub fn node(&self, id: NodeId) -> Option<&OutlineNode> {
        self.nodes.get(id.0)
    }

    /// Appends a top-level entry.
    pub fn push_root(&mut self, node: OutlineNode) -> NodeId {
        let id = self.insert(node);
        self.roots.push(id);
        id
    }

    /// Appends `node` as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` was not returned by this outline.
    pub fn push_child(&mut self, parent: NodeId, node: OutlineNode) -> NodeId {
        let id = self.insert(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn insert(&mut self, node: OutlineNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Depth-first preorder walk over the whole forest.
    ///
    /// The visitor receives the node handle, the node and its depth (top level is
    /// `0`). Returning [`Visit::Skip`] prunes the node's subtree.
    pub fn walk<F>(&self, visit: F)
    where
        F: FnMut(NodeId, &OutlineNode, usize) -> Visit,
    {
        self.walk_from(&self.roots, visit);
    }

    /// Depth-first preorder walk starting at the given sibling list.
    pub fn walk_from<F>(&self, start: &[NodeId], mut visit: F)
    where
        F: FnMut(NodeId, &OutlineNode, usize) -> Visit,
    {
        let mut stack: Vec<(NodeId, usize)> = start.iter().rev().map(|&id| (id, 0)).collect();

        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if visit(id, node, depth) == Visit::Descend {
                stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
            }
        }
    }

    /// Every node reachable from the roots in preorder, descending into closed
    /// subtrees as well.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(self.nodes.len());
        self.walk(|id, _, _| {
            ids.push(id);
            Visit::Descend
        });
        ids
    }

    /// Number of entries a viewer shows for `ids` when every open node is expanded.
    ///
    /// Each listed node counts once; its descendants are counted only while the
    /// chain of ancestors below the list stays open.
    pub fn opening_count(&self, ids: &[NodeId]) -> usize {
        let mut count = 0;
        self.walk_from(ids, |_, node, _| {
            count += 1;
            if node.is_open() {
                Visit::Descend
            } else {
                Visit::Skip
            }
        });
        count
    }
}

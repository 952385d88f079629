//! Compilation of an [`Outline`] into PDF outline dictionaries.
//!
//! Compilation runs in two phases. The allocation phase walks the whole forest,
//! closed subtrees included, and reserves one object id per node plus one for
//! the `/Outlines` root. The linking phase then writes `Parent`, `Prev`, `Next`,
//! `First`, `Last` and `Count` using only ids reserved in the first phase, so
//! forward references never need patching.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::debug;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::destination::{resolve, DestinationError, PageGeometry};
use crate::info::text_string;
use crate::outline::{NodeId, Outline};

/// Errors raised while compiling or attaching an outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The linking phase reached a node that the allocation phase never saw.
    UnallocatedNode(NodeId),
    /// A bookmark destination could not be resolved.
    Destination {
        /// Title of the offending bookmark.
        title: String,
        /// Resolution error.
        source: DestinationError,
    },
    /// The document trailer has no `/Root` entry.
    MissingCatalog,
    /// The `/Root` entry does not point at a dictionary.
    InvalidCatalog,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnallocatedNode(node) => write!(
                f,
                "outline node {} was linked without an allocated object id",
                node
            ),
            Self::Destination { title, .. } => {
                write!(f, "bookmark `{}` has an invalid destination", title)
            }
            Self::MissingCatalog => write!(f, "PDF catalog entry is missing"),
            Self::InvalidCatalog => write!(f, "PDF catalog entry is not a dictionary"),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Destination { source, .. } => Some(source),
            Self::UnallocatedNode(_) | Self::MissingCatalog | Self::InvalidCatalog => None,
        }
    }
}

/// Object ids reserved for the outline root and every node.
#[derive(Debug, Default)]
struct ReferenceMap {
    refs: HashMap<NodeId, ObjectId>,
}

impl ReferenceMap {
    fn allocate<A>(outline: &Outline, allocate: &mut A) -> Self
    where
        A: FnMut() -> ObjectId,
    {
        let refs = outline
            .preorder()
            .into_iter()
            .map(|id| (id, allocate()))
            .collect();
        Self { refs }
    }

    fn get(&self, node: NodeId) -> Result<ObjectId, CompileError> {
        self.refs
            .get(&node)
            .copied()
            .ok_or(CompileError::UnallocatedNode(node))
    }
}

/// Outline dictionaries produced by [`compile_outline`], not yet part of a document.
#[derive(Debug, Clone)]
pub struct CompiledOutline {
    root: ObjectId,
    refs: HashMap<NodeId, ObjectId>,
    entries: BTreeMap<ObjectId, Dictionary>,
}

impl CompiledOutline {
    /// Id of the `/Outlines` dictionary.
    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Id allocated for a node.
    pub fn reference(&self, node: NodeId) -> Option<ObjectId> {
        self.refs.get(&node).copied()
    }

    /// Every compiled dictionary, the root included.
    pub fn entries(&self) -> &BTreeMap<ObjectId, Dictionary> {
        &self.entries
    }

    /// Dictionary compiled for `id`.
    pub fn entry(&self, id: ObjectId) -> Option<&Dictionary> {
        self.entries.get(&id)
    }

    /// Number of bookmarks, excluding the root.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Returns `true` when no bookmarks were compiled.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Inserts the dictionaries into `document` and links the root from the catalog.
    pub fn attach(self, document: &mut Document) -> Result<ObjectId, CompileError> {
        let catalog_id = document
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| CompileError::MissingCatalog)?;
        if !document.objects.contains_key(&catalog_id) {
            return Err(CompileError::MissingCatalog);
        }
        document
            .get_object(catalog_id)
            .and_then(Object::as_dict)
            .map_err(|_| CompileError::InvalidCatalog)?;

        let root = self.root;
        for (id, dictionary) in self.entries {
            document.objects.insert(id, Object::Dictionary(dictionary));
        }

        let catalog = document
            .get_object_mut(catalog_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| CompileError::InvalidCatalog)?;
        catalog.set("Outlines", Object::Reference(root));
        catalog.set("PageMode", Object::Name(b"UseOutlines".to_vec()));

        Ok(root)
    }
}

/// Compiles `outline` into outline dictionaries.
///
/// `allocate` hands out fresh object ids, normally `Document::new_object_id`.
/// Returns `Ok(None)` for an empty forest: a document without bookmarks gets no
/// `/Outlines` entry at all.
pub fn compile_outline<G, A>(
    outline: &Outline,
    geometry: &G,
    mut allocate: A,
) -> Result<Option<CompiledOutline>, CompileError>
where
    G: PageGeometry + ?Sized,
    A: FnMut() -> ObjectId,
{
    if outline.is_empty() {
        return Ok(None);
    }

    let root = allocate();
    let refs = ReferenceMap::allocate(outline, &mut allocate);
    debug!("allocated {} outline entries", refs.refs.len());

    let mut entries = BTreeMap::new();
    let mut pending: Vec<(ObjectId, &[NodeId])> = vec![(root, outline.roots())];

    while let Some((parent, siblings)) = pending.pop() {
        for (index, &id) in siblings.iter().enumerate() {
            let node = outline.node(id).ok_or(CompileError::UnallocatedNode(id))?;
            let own = refs.get(id)?;

            let mut dictionary = Dictionary::new();
            dictionary.set("Title", text_string(node.title()));
            dictionary.set("Parent", Object::Reference(parent));

            if index > 0 {
                dictionary.set("Prev", Object::Reference(refs.get(siblings[index - 1])?));
            }
            if let Some(&next) = siblings.get(index + 1) {
                dictionary.set("Next", Object::Reference(refs.get(next)?));
            }

            let children = node.children();
            if let (Some(&first), Some(&last)) = (children.first(), children.last()) {
                dictionary.set("First", Object::Reference(refs.get(first)?));
                dictionary.set("Last", Object::Reference(refs.get(last)?));
                let visible = outline.opening_count(children) as i64;
                let count = if node.is_open() { visible } else { -visible };
                dictionary.set("Count", Object::Integer(count));
                pending.push((own, children));
            }

            let destination =
                resolve(node.target(), geometry).map_err(|source| CompileError::Destination {
                    title: node.title().to_string(),
                    source,
                })?;
            dictionary.set("Dest", destination.to_object());

            let flags = node.style().flags();
            if flags != 0 {
                dictionary.set("F", Object::Integer(flags));
            }

            entries.insert(own, dictionary);
        }
    }

    let roots = outline.roots();
    let mut root_dictionary = Dictionary::new();
    root_dictionary.set("Type", Object::Name(b"Outlines".to_vec()));
    if let (Some(&first), Some(&last)) = (roots.first(), roots.last()) {
        root_dictionary.set("First", Object::Reference(refs.get(first)?));
        root_dictionary.set("Last", Object::Reference(refs.get(last)?));
    }
    root_dictionary.set(
        "Count",
        Object::Integer(outline.opening_count(roots) as i64),
    );
    entries.insert(root, root_dictionary);

    Ok(Some(CompiledOutline {
        root,
        refs: refs.refs,
        entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{PageSize, PageTable};
    use crate::outline::{OutlineNode, PageTarget};
    use std::collections::HashSet;

    const LINK_KEYS: [&[u8]; 5] = [b"Parent", b"Prev", b"Next", b"First", b"Last"];

    fn pages(count: usize) -> PageTable {
        PageTable::new((0..count).map(|index| ((index as u32 + 1, 0), PageSize::new(600.0, 800.0))))
    }

    fn allocator() -> impl FnMut() -> ObjectId {
        let mut next = 100;
        move || {
            next += 1;
            (next, 0)
        }
    }

    fn leaf(title: &str, page: usize) -> OutlineNode {
        OutlineNode::new(title, PageTarget::page(page))
    }

    fn closed_and_open_forest() -> Outline {
        let mut outline = Outline::new();
        let a = outline.push_root(leaf("A", 0).closed());
        outline.push_child(a, leaf("A.1", 0));
        outline.push_child(a, leaf("A.2", 1));
        let b = outline.push_root(leaf("B", 2));
        outline.push_child(b, leaf("B.1", 2));
        outline.push_child(b, leaf("B.2", 3));
        outline.push_child(b, leaf("B.3", 4).bold());
        outline
    }

    fn count_of(compiled: &CompiledOutline, id: ObjectId) -> i64 {
        compiled
            .entry(id)
            .and_then(|dictionary| dictionary.get(b"Count").ok())
            .and_then(|count| count.as_i64().ok())
            .unwrap()
    }

    fn reference(dictionary: &Dictionary, key: &[u8]) -> Option<ObjectId> {
        dictionary.get(key).and_then(Object::as_reference).ok()
    }

    fn title(dictionary: &Dictionary) -> String {
        match dictionary.get(b"Title").unwrap() {
            Object::String(bytes, _) => String::from_utf8(bytes.clone()).unwrap(),
            other => panic!("title is not a string: {:?}", other),
        }
    }

    #[test]
    fn count_sign_follows_open_state() {
        let outline = closed_and_open_forest();
        let compiled = compile_outline(&outline, &pages(5), allocator())
            .unwrap()
            .unwrap();
        let [a, b] = [outline.roots()[0], outline.roots()[1]];

        assert_eq!(count_of(&compiled, compiled.reference(a).unwrap()), -2);
        assert_eq!(count_of(&compiled, compiled.reference(b).unwrap()), 3);
        assert_eq!(count_of(&compiled, compiled.root()), 5);
    }

    #[test]
    fn leaves_have_no_child_links() {
        let outline = closed_and_open_forest();
        let compiled = compile_outline(&outline, &pages(5), allocator())
            .unwrap()
            .unwrap();
        let leaf_id = outline.node(outline.roots()[0]).unwrap().children()[0];
        let entry = compiled.entry(compiled.reference(leaf_id).unwrap()).unwrap();

        assert!(!entry.has(b"First"));
        assert!(!entry.has(b"Last"));
        assert!(!entry.has(b"Count"));
    }

    #[test]
    fn every_link_points_at_an_allocated_entry() {
        let outline = closed_and_open_forest();
        let compiled = compile_outline(&outline, &pages(5), allocator())
            .unwrap()
            .unwrap();
        let allocated: HashSet<ObjectId> = compiled.entries().keys().copied().collect();

        assert_eq!(allocated.len(), outline.len() + 1);
        for dictionary in compiled.entries().values() {
            for key in LINK_KEYS {
                if let Some(target) = reference(dictionary, key) {
                    assert!(allocated.contains(&target), "dangling {:?}", target);
                }
            }
        }
        assert!(!compiled.entry(compiled.root()).unwrap().has(b"Parent"));
    }

    #[test]
    fn first_next_chains_reproduce_child_order() {
        let outline = closed_and_open_forest();
        let compiled = compile_outline(&outline, &pages(5), allocator())
            .unwrap()
            .unwrap();

        fn chain(compiled: &CompiledOutline, parent: ObjectId) -> Vec<String> {
            let mut titles = Vec::new();
            let parent_entry = compiled.entry(parent).unwrap();
            let mut cursor = reference(parent_entry, b"First");
            let mut previous = None;
            while let Some(id) = cursor {
                let entry = compiled.entry(id).unwrap();
                assert_eq!(reference(entry, b"Parent"), Some(parent));
                assert_eq!(reference(entry, b"Prev"), previous);
                titles.push(title(entry));
                for child in chain(compiled, id) {
                    titles.push(format!("  {}", child));
                }
                previous = Some(id);
                cursor = reference(entry, b"Next");
            }
            assert_eq!(reference(parent_entry, b"Last"), previous);
            titles
        }

        assert_eq!(
            chain(&compiled, compiled.root()),
            ["A", "  A.1", "  A.2", "B", "  B.1", "  B.2", "  B.3"]
        );
    }

    #[test]
    fn style_flags_and_destinations_are_written() {
        let outline = closed_and_open_forest();
        let compiled = compile_outline(&outline, &pages(5), allocator())
            .unwrap()
            .unwrap();
        let b = outline.node(outline.roots()[1]).unwrap();
        let bold = compiled.entry(compiled.reference(b.children()[2]).unwrap()).unwrap();

        assert_eq!(bold.get(b"F").unwrap().as_i64().unwrap(), 2);
        let dest = bold.get(b"Dest").unwrap().as_array().unwrap();
        assert!(matches!(dest[0], Object::Reference((5, 0))));
        assert!(matches!(&dest[1], Object::Name(name) if name == b"Fit"));
        assert!(!compiled.entry(compiled.reference(outline.roots()[1]).unwrap()).unwrap().has(b"F"));
    }

    #[test]
    fn empty_forest_compiles_to_nothing() {
        assert!(matches!(
            compile_outline(&Outline::new(), &pages(1), allocator()),
            Ok(None)
        ));
    }

    #[test]
    fn out_of_range_destinations_abort() {
        let mut outline = Outline::new();
        outline.push_root(leaf("Ghost", 7));

        assert!(matches!(
            compile_outline(&outline, &pages(2), allocator()),
            Err(CompileError::Destination { title, .. }) if title == "Ghost"
        ));
    }

    #[test]
    fn attach_links_outline_from_catalog() {
        let mut document = Document::load_mem(&crate::testing::pdf_with_pages(2, 600, 800)).unwrap();
        let table = PageTable::from_document(&document);
        let mut outline = Outline::new();
        outline.push_root(leaf("Only", 1));

        let compiled = compile_outline(&outline, &table, || document.new_object_id())
            .unwrap()
            .unwrap();
        let root = compiled.attach(&mut document).unwrap();

        let catalog_id = document.trailer.get(b"Root").and_then(Object::as_reference).unwrap();
        let catalog = document.get_dictionary(catalog_id).unwrap();
        assert_eq!(reference(catalog, b"Outlines"), Some(root));
        let outlines = document.get_dictionary(root).unwrap();
        assert_eq!(outlines.get(b"Count").unwrap().as_i64().unwrap(), 1);
    }

    #[test]
    fn reference_map_rejects_nodes_it_never_allocated() {
        let mut small = Outline::new();
        small.push_root(leaf("A", 0));
        let refs = ReferenceMap::allocate(&small, &mut allocator());

        let mut larger = Outline::new();
        larger.push_root(leaf("A", 0));
        let stranger = larger.push_root(leaf("B", 1));

        assert_eq!(refs.get(larger.roots()[0]).unwrap(), (101, 0));
        assert!(matches!(
            refs.get(stranger),
            Err(CompileError::UnallocatedNode(node)) if node == stranger
        ));
    }
}

//! Arena-based XML document.
//!
//! - **indextree Arena**: all nodes in one contiguous allocation
//! - **Stable identities**: every node carries a [`NodeIdentity`] that survives
//!   cloning the document and identity-preserving node replacement
//! - **Detach, never free**: deleted or replaced nodes are detached from the
//!   tree but stay in the arena, so a stale [`NodeId`] never aliases a new node

use core::sync::atomic::{AtomicU64, Ordering};

use compact_str::CompactString;
use indextree::{Arena, NodeId};
use scion::{
    Attribute, DiffTree, Fragment, MergeError, MutableTree, NodeIdentity, NodePath,
};

use crate::trace;

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// A fresh identity, unique within the process.
pub(crate) fn fresh_identity() -> NodeIdentity {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

/// Document = Arena + root element.
///
/// Cloning a document keeps every identity: the clone shares lineage with
/// the original and can be diffed against it with
/// [`scion::LineageIdentity`].
#[derive(Debug, Clone)]
pub struct Document {
    /// THE tree - all nodes live here, including detached ones
    pub arena: Arena<NodeData>,

    /// The document element
    pub root: NodeId,
}

/// What goes in each arena slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    pub identity: NodeIdentity,
    pub kind: NodeKind,
}

/// Node types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Element with name and attributes
    Element(ElementData),
    /// Character data (text and CDATA sections alike)
    Text(String),
}

/// Element name and attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// Prefix as written in the source
    pub prefix: Option<CompactString>,
    pub local: CompactString,
    /// Namespace URI the prefix (or default namespace) resolved to
    pub namespace: Option<CompactString>,
    /// Attributes in document order, names unique
    pub attributes: Vec<Attribute>,
}

impl ElementData {
    /// Element from a qualified name like `svg:rect`, without a namespace.
    pub fn new(qualified: &str) -> Self {
        let (prefix, local) = match qualified.split_once(':') {
            Some((prefix, local)) => (Some(CompactString::from(prefix)), local),
            None => (None, qualified),
        };
        Self {
            prefix,
            local: CompactString::from(local),
            namespace: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: &[(&str, &str)]) -> Self {
        self.attributes = attributes
            .iter()
            .map(|(name, value)| Attribute::new(*name, *value))
            .collect();
        self
    }

    /// `prefix:local` or `local`.
    pub fn qualified_name(&self) -> CompactString {
        match &self.prefix {
            Some(prefix) => compact_str::format_compact!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }
}

impl NodeData {
    fn fresh(kind: NodeKind) -> Self {
        Self {
            identity: fresh_identity(),
            kind,
        }
    }
}

impl Document {
    /// A document holding only a root element with the given qualified name.
    pub fn new(root: &str) -> Self {
        Self::with_root(ElementData::new(root))
    }

    pub fn with_root(root: ElementData) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeData::fresh(NodeKind::Element(root)));
        Self { arena, root }
    }

    /// Get immutable reference to node data
    pub fn get(&self, id: NodeId) -> &NodeData {
        self.arena[id].get()
    }

    /// Get mutable reference to node data
    pub fn get_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.arena[id].get_mut()
    }

    /// Element data, if `id` is an element.
    pub fn element_data(&self, id: NodeId) -> Option<&ElementData> {
        match &self.get(id).kind {
            NodeKind::Element(elem) => Some(elem),
            NodeKind::Text(_) => None,
        }
    }

    /// Append a new element under `parent` and return it.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        name: &str,
        attributes: &[(&str, &str)],
    ) -> NodeId {
        let data = ElementData::new(name).with_attributes(attributes);
        let node = self.arena.new_node(NodeData::fresh(NodeKind::Element(data)));
        parent.append(node, &mut self.arena);
        node
    }

    /// Append a new text node under `parent` and return it.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let node = self
            .arena
            .new_node(NodeData::fresh(NodeKind::Text(text.to_owned())));
        parent.append(node, &mut self.arena);
        node
    }

    /// Navigate from the root by child indices.
    pub fn element(&self, path: &[usize]) -> Option<NodeId> {
        let mut current = self.root;
        for &index in path {
            current = current.children(&self.arena).nth(index)?;
        }
        Some(current)
    }

    /// Number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.root.descendants(&self.arena).count()
    }

    /// `node` followed by its ancestors up to the root.
    fn path_from(&self, node: NodeId) -> NodePath<NodeId> {
        node.ancestors(&self.arena).collect()
    }

    fn require_element(&self, node: NodeId) -> Result<(), MergeError> {
        match self.get(node).kind {
            NodeKind::Element(_) => Ok(()),
            NodeKind::Text(_) => Err(MergeError::NotAnElement {
                identity: self.get(node).identity,
            }),
        }
    }

    fn require_detached(&self, node: NodeId) -> Result<(), MergeError> {
        if node == self.root || self.arena[node].parent().is_some() {
            return Err(MergeError::StillAttached {
                identity: self.get(node).identity,
            });
        }
        Ok(())
    }

    fn build(&mut self, fragment: &Fragment) -> NodeId {
        match fragment {
            Fragment::Text(text) => self
                .arena
                .new_node(NodeData::fresh(NodeKind::Text(text.clone()))),
            Fragment::Element {
                prefix,
                local,
                namespace,
                attributes,
                children,
            } => {
                let node = self.arena.new_node(NodeData::fresh(NodeKind::Element(ElementData {
                    prefix: prefix.clone(),
                    local: local.clone(),
                    namespace: namespace.clone(),
                    attributes: attributes.clone(),
                })));
                for child in children {
                    let child = self.build(child);
                    node.append(child, &mut self.arena);
                }
                node
            }
        }
    }
}

impl DiffTree for Document {
    type Node = NodeId;

    fn root(&self) -> NodeId {
        self.root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena[node].parent()
    }

    fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.children(&self.arena)
    }

    fn kind(&self, node: NodeId) -> scion::NodeKind {
        match self.get(node).kind {
            NodeKind::Element(_) => scion::NodeKind::Element,
            NodeKind::Text(_) => scion::NodeKind::Text,
        }
    }

    fn local_name(&self, node: NodeId) -> &str {
        self.element_data(node).map_or("", |elem| elem.local.as_str())
    }

    fn prefix(&self, node: NodeId) -> Option<&str> {
        self.element_data(node)?.prefix.as_deref()
    }

    fn namespace(&self, node: NodeId) -> Option<&str> {
        self.element_data(node)?.namespace.as_deref()
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match &self.get(node).kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    fn attributes(&self, node: NodeId) -> &[Attribute] {
        self.element_data(node)
            .map_or(&[][..], |elem| elem.attributes.as_slice())
    }

    fn identity(&self, node: NodeId) -> NodeIdentity {
        self.get(node).identity
    }

    fn is_attached(&self, node: NodeId) -> bool {
        node.ancestors(&self.arena).last() == Some(self.root)
    }
}

impl MutableTree for Document {
    fn add(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<NodePath<NodeId>, MergeError> {
        self.require_element(parent)?;
        self.require_detached(child)?;

        let placement = match parent.children(&self.arena).nth(index) {
            Some(next) => next.checked_insert_before(child, &mut self.arena),
            None => parent.checked_append(child, &mut self.arena),
        };
        placement.map_err(|_| MergeError::InvalidPlacement {
            identity: self.get(child).identity,
        })?;

        trace!(parent = ?parent, child = ?child, index, "add");
        Ok(self.path_from(parent))
    }

    fn delete(&mut self, node: NodeId) -> Result<NodePath<NodeId>, MergeError> {
        if node == self.root {
            return Err(MergeError::DeleteRoot);
        }
        let parent = self.arena[node].parent();
        node.detach(&mut self.arena);

        trace!(node = ?node, "delete");
        Ok(parent.map(|p| self.path_from(p)).unwrap_or_default())
    }

    fn modify(
        &mut self,
        old: NodeId,
        replacement: NodeId,
    ) -> Result<NodePath<NodeId>, MergeError> {
        self.require_detached(replacement)?;

        let children: Vec<NodeId> = old.children(&self.arena).collect();
        for child in children {
            child.detach(&mut self.arena);
            replacement
                .checked_append(child, &mut self.arena)
                .map_err(|_| MergeError::InvalidPlacement {
                    identity: self.get(child).identity,
                })?;
        }

        if old == self.root {
            self.root = replacement;
        } else {
            old.checked_insert_after(replacement, &mut self.arena)
                .map_err(|_| MergeError::InvalidPlacement {
                    identity: self.get(replacement).identity,
                })?;
            old.detach(&mut self.arena);
        }

        trace!(old = ?old, replacement = ?replacement, "modify");
        Ok(self.path_from(replacement))
    }

    fn reorder_children(
        &mut self,
        parent: NodeId,
        permutation: &[usize],
    ) -> Result<NodePath<NodeId>, MergeError> {
        let children: Vec<NodeId> = parent.children(&self.arena).collect();
        let bad = || MergeError::BadPermutation {
            expected: children.len(),
            got: permutation.len(),
        };
        if permutation.len() != children.len() {
            return Err(bad());
        }

        let mut ordered: Vec<Option<NodeId>> = vec![None; children.len()];
        for (&child, &target) in children.iter().zip(permutation) {
            match ordered.get_mut(target) {
                Some(slot) if slot.is_none() => *slot = Some(child),
                _ => return Err(bad()),
            }
        }

        for &child in &children {
            child.detach(&mut self.arena);
        }
        for child in ordered.into_iter().flatten() {
            parent.append(child, &mut self.arena);
        }

        trace!(parent = ?parent, ?permutation, "reorder_children");
        Ok(self.path_from(parent))
    }

    fn clone_preserving_identity(&mut self, node: NodeId) -> NodeId {
        let data = self.get(node).clone();
        self.arena.new_node(data)
    }

    fn import(&mut self, fragment: &Fragment) -> NodeId {
        self.build(fragment)
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), MergeError> {
        let data = self.get_mut(node);
        match &mut data.kind {
            NodeKind::Text(existing) => {
                text.clone_into(existing);
                Ok(())
            }
            NodeKind::Element(_) => Err(MergeError::NotAText {
                identity: data.identity,
            }),
        }
    }

    fn attributes_mut(&mut self, node: NodeId) -> Result<&mut Vec<Attribute>, MergeError> {
        let data = self.get_mut(node);
        match &mut data.kind {
            NodeKind::Element(elem) => Ok(&mut elem.attributes),
            NodeKind::Text(_) => Err(MergeError::NotAnElement {
                identity: data.identity,
            }),
        }
    }

    fn set_prefix(&mut self, node: NodeId, prefix: Option<&str>) -> Result<(), MergeError> {
        let data = self.get_mut(node);
        match &mut data.kind {
            NodeKind::Element(elem) => {
                elem.prefix = prefix.map(CompactString::from);
                Ok(())
            }
            NodeKind::Text(_) => Err(MergeError::NotAnElement {
                identity: data.identity,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    fn names(doc: &Document, parent: NodeId) -> Vec<String> {
        parent
            .children(&doc.arena)
            .map(|child| match &doc.get(child).kind {
                NodeKind::Element(elem) => elem.qualified_name().to_string(),
                NodeKind::Text(text) => format!("#{text}"),
            })
            .collect()
    }

    #[test]
    fn test_clone_keeps_identities() {
        let mut doc = Document::new("r");
        let a = doc.append_element(doc.root, "a", &[]);
        let copy = doc.clone();
        assert_eq!(doc.identity(a), copy.identity(a));
        assert_eq!(doc.identity(doc.root), copy.identity(copy.root));
    }

    #[test]
    fn test_independent_documents_do_not_share_identities() {
        let a = Document::new("r");
        let b = Document::new("r");
        assert_ne!(a.identity(a.root), b.identity(b.root));
    }

    #[test]
    fn test_add_clamps_index_and_rejects_attached() {
        let mut doc = Document::new("r");
        let a = doc.append_element(doc.root, "a", &[]);
        let fresh = doc.import(&Fragment::Text("t".into()));
        let path = doc.add(doc.root, fresh, 99).unwrap();
        assert_eq!(path.as_slice(), &[doc.root]);
        assert_eq!(names(&doc, doc.root), vec!["a", "#t"]);

        assert!(matches!(
            doc.add(doc.root, a, 0),
            Err(MergeError::StillAttached { .. })
        ));
    }

    #[test]
    fn test_add_under_text_is_rejected() {
        let mut doc = Document::new("r");
        let text = doc.append_text(doc.root, "x");
        let fresh = doc.import(&Fragment::Text("y".into()));
        assert!(matches!(
            doc.add(text, fresh, 0),
            Err(MergeError::NotAnElement { .. })
        ));
    }

    #[test]
    fn test_delete_detaches_subtree() {
        let mut doc = Document::new("r");
        let a = doc.append_element(doc.root, "a", &[]);
        let inner = doc.append_element(a, "inner", &[]);
        doc.delete(a).unwrap();
        assert!(!doc.is_attached(a));
        assert!(!doc.is_attached(inner));
        assert_eq!(doc.find_by_identity(doc.identity(inner)), None);
        assert!(matches!(doc.delete(doc.root), Err(MergeError::DeleteRoot)));
    }

    #[test]
    fn test_modify_moves_children_and_keeps_place() {
        let mut doc = Document::new("r");
        doc.append_element(doc.root, "first", &[]);
        let target = doc.append_element(doc.root, "x", &[("v", "1")]);
        let kid = doc.append_text(target, "kid");
        doc.append_element(doc.root, "last", &[]);

        let replacement = doc.clone_preserving_identity(target);
        doc.attributes_mut(replacement).unwrap()[0].value = "2".into();
        let path = doc.modify(target, replacement).unwrap();

        assert_eq!(path[0], replacement);
        assert_eq!(names(&doc, doc.root), vec!["first", "x", "last"]);
        assert_eq!(doc.parent(kid), Some(replacement));
        assert_eq!(doc.identity(replacement), doc.identity(target));
        assert_eq!(doc.attribute(replacement, "v"), Some("2"));
        assert!(!doc.is_attached(target));
    }

    #[test]
    fn test_modify_root() {
        let mut doc = Document::new("r");
        doc.append_element(doc.root, "a", &[]);
        let old_root = doc.root;
        let replacement = doc.clone_preserving_identity(old_root);
        doc.modify(old_root, replacement).unwrap();
        assert_eq!(doc.root, replacement);
        assert_eq!(names(&doc, doc.root), vec!["a"]);
    }

    #[test]
    fn test_reorder_children_moves_index_i_to_permutation_i() {
        let mut doc = Document::new("r");
        for name in ["a", "b", "c"] {
            doc.append_element(doc.root, name, &[]);
        }
        doc.reorder_children(doc.root, &[1, 2, 0]).unwrap();
        assert_eq!(names(&doc, doc.root), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_reorder_children_rejects_bad_permutations() {
        let mut doc = Document::new("r");
        for name in ["a", "b"] {
            doc.append_element(doc.root, name, &[]);
        }
        assert!(matches!(
            doc.reorder_children(doc.root, &[0]),
            Err(MergeError::BadPermutation {
                expected: 2,
                got: 1
            })
        ));
        assert!(doc.reorder_children(doc.root, &[1, 1]).is_err());
        assert!(doc.reorder_children(doc.root, &[0, 2]).is_err());
        assert_eq!(names(&doc, doc.root), vec!["a", "b"]);
    }

    #[test]
    fn test_set_text_requires_text_node() {
        let mut doc = Document::new("r");
        let text = doc.append_text(doc.root, "old");
        doc.set_text(text, "new").unwrap();
        assert_eq!(doc.text(text), Some("new"));
        assert!(matches!(
            doc.set_text(doc.root, "x"),
            Err(MergeError::NotAText { .. })
        ));
    }

    #[test]
    fn test_import_gives_fresh_identities() {
        let mut doc = Document::new("r");
        let a = doc.append_element(doc.root, "a", &[("id", "1")]);
        doc.append_text(a, "hi");
        let fragment = Fragment::capture(&doc, a);
        assert_eq!(fragment.node_count(), 2);

        let copy = doc.import(&fragment);
        assert_ne!(doc.identity(copy), doc.identity(a));
        assert_eq!(doc.attribute(copy, "id"), Some("1"));
        assert_eq!(doc.text_content(copy), "hi");
        assert!(!doc.is_attached(copy));
    }

    #[test]
    fn test_qualified_names() {
        let elem = ElementData::new("svg:rect");
        assert_eq!(elem.prefix.as_deref(), Some("svg"));
        assert_eq!(elem.local, "rect");
        assert_eq!(elem.qualified_name(), "svg:rect");
    }
}

//! The tree seam.
//!
//! The diff finder only needs read access ([`DiffTree`]); the merge engine also
//! needs a handful of mutation primitives ([`MutableTree`]). Any arena, DOM or
//! persistent tree can take part by implementing these two traits.

use core::fmt;
use core::hash::Hash;

use compact_str::CompactString;
use facet::Facet;
use smallvec::SmallVec;

use crate::error::MergeError;

/// Stable per-node identity. Assigned when a node is created and kept when the
/// node is cloned for mutation, so it survives edits that replace the node.
pub type NodeIdentity = u64;

/// Chain of nodes from the immediate parent (first) up to the root (last).
pub type NodePath<N> = SmallVec<[N; 16]>;

/// Structural kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum NodeKind {
    /// An element with a name, attributes and children
    Element,
    /// A run of character data
    Text,
}

/// An attribute on an element. Names are unique within one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
pub struct Attribute {
    /// Qualified name as written, e.g. `xml:lang`
    pub name: CompactString,
    /// Unescaped value
    pub value: String,
}

impl Attribute {
    /// Create an attribute.
    pub fn new(name: impl Into<CompactString>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, self.value)
    }
}

/// Read access to a tree, as needed by the diff finder.
///
/// `root` is the document element; it has no parent. Text nodes have an empty
/// local name and no attributes.
pub trait DiffTree {
    /// Handle to a node of this tree.
    type Node: Copy + Eq + Hash + fmt::Debug;

    /// The document element.
    fn root(&self) -> Self::Node;

    /// Parent of a node, `None` for the root and for detached nodes.
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Children in document order.
    fn children(&self, node: Self::Node) -> impl Iterator<Item = Self::Node> + '_;

    /// Element or text.
    fn kind(&self, node: Self::Node) -> NodeKind;

    /// Local part of the element name.
    fn local_name(&self, node: Self::Node) -> &str;

    /// Namespace prefix as written, if any.
    fn prefix(&self, node: Self::Node) -> Option<&str>;

    /// Resolved namespace URI, if any.
    fn namespace(&self, node: Self::Node) -> Option<&str>;

    /// Character data of a text node.
    fn text(&self, node: Self::Node) -> Option<&str>;

    /// Attributes of an element, in document order.
    fn attributes(&self, node: Self::Node) -> &[Attribute];

    /// Stable identity of the node.
    fn identity(&self, node: Self::Node) -> NodeIdentity;

    /// Whether the node is currently reachable from the root.
    fn is_attached(&self, node: Self::Node) -> bool;

    /// Find the attached node carrying `identity`.
    fn find_by_identity(&self, identity: NodeIdentity) -> Option<Self::Node> {
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if self.identity(node) == identity {
                return Some(node);
            }
            let children: Vec<_> = self.children(node).collect();
            stack.extend(children.into_iter().rev());
        }
        None
    }

    /// Ancestors of a node, parent first.
    fn ancestors(&self, node: Self::Node) -> NodePath<Self::Node> {
        let mut path = NodePath::new();
        let mut current = self.parent(node);
        while let Some(parent) = current {
            path.push(parent);
            current = self.parent(parent);
        }
        path
    }

    /// `prefix:local`, or just `local` when unprefixed.
    fn qualified_name(&self, node: Self::Node) -> CompactString {
        match self.prefix(node) {
            Some(prefix) => compact_str::format_compact!("{}:{}", prefix, self.local_name(node)),
            None => CompactString::from(self.local_name(node)),
        }
    }

    /// Value of the named attribute.
    fn attribute(&self, node: Self::Node, name: &str) -> Option<&str> {
        self.attributes(node)
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Concatenated direct text children of an element, or the value of a text node.
    fn text_content(&self, node: Self::Node) -> String {
        if let Some(text) = self.text(node) {
            return text.to_owned();
        }
        let mut out = String::new();
        for child in self.children(node) {
            if let Some(text) = self.text(child) {
                out.push_str(text);
            }
        }
        out
    }

    /// Whether any child is an element.
    fn has_element_children(&self, node: Self::Node) -> bool {
        self.children(node)
            .any(|child| self.kind(child) == NodeKind::Element)
    }
}

/// Mutation primitives used by the merge engine.
///
/// Each structural primitive returns the path of nodes whose subtree changed,
/// nearest first, so the caller can refresh any node handles it caches.
pub trait MutableTree: DiffTree {
    /// Insert a detached `child` under `parent` at `index` (clamped to the end).
    fn add(
        &mut self,
        parent: Self::Node,
        child: Self::Node,
        index: usize,
    ) -> Result<NodePath<Self::Node>, MergeError>;

    /// Remove a node and its subtree.
    fn delete(&mut self, node: Self::Node) -> Result<NodePath<Self::Node>, MergeError>;

    /// Put the detached `replacement` in place of `old`. The children of `old`
    /// move under `replacement`.
    fn modify(
        &mut self,
        old: Self::Node,
        replacement: Self::Node,
    ) -> Result<NodePath<Self::Node>, MergeError>;

    /// Reorder the children of `parent`: the child currently at index `i` moves
    /// to index `permutation[i]`.
    fn reorder_children(
        &mut self,
        parent: Self::Node,
        permutation: &[usize],
    ) -> Result<NodePath<Self::Node>, MergeError>;

    /// Shallow, detached copy of a node that keeps its identity.
    fn clone_preserving_identity(&mut self, node: Self::Node) -> Self::Node;

    /// Build a detached copy of a foreign subtree with fresh identities.
    fn import(&mut self, fragment: &Fragment) -> Self::Node;

    /// Replace the character data of a detached text node.
    fn set_text(&mut self, node: Self::Node, text: &str) -> Result<(), MergeError>;

    /// Attributes of a detached element, for editing before [`MutableTree::modify`].
    fn attributes_mut(&mut self, node: Self::Node) -> Result<&mut Vec<Attribute>, MergeError>;

    /// Respell the name of a detached element with another namespace prefix.
    fn set_prefix(&mut self, node: Self::Node, prefix: Option<&str>) -> Result<(), MergeError>;
}

/// An owned snapshot of a subtree, carried by additions so that a difference
/// list does not borrow the tree it was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Fragment {
    /// An element with its attributes and nested children
    Element {
        prefix: Option<CompactString>,
        local: CompactString,
        namespace: Option<CompactString>,
        attributes: Vec<Attribute>,
        children: Vec<Fragment>,
    },
    /// A text node
    Text(String),
}

impl Fragment {
    /// Snapshot `node` and everything below it.
    pub fn capture<T: DiffTree>(tree: &T, node: T::Node) -> Self {
        match tree.kind(node) {
            NodeKind::Text => Fragment::Text(tree.text(node).unwrap_or_default().to_owned()),
            NodeKind::Element => Fragment::Element {
                prefix: tree.prefix(node).map(CompactString::from),
                local: CompactString::from(tree.local_name(node)),
                namespace: tree.namespace(node).map(CompactString::from),
                attributes: tree.attributes(node).to_vec(),
                children: tree
                    .children(node)
                    .map(|child| Fragment::capture(tree, child))
                    .collect(),
            },
        }
    }

    /// Number of nodes in the fragment.
    pub fn node_count(&self) -> usize {
        match self {
            Fragment::Text(_) => 1,
            Fragment::Element { children, .. } => {
                1 + children.iter().map(Fragment::node_count).sum::<usize>()
            }
        }
    }
}

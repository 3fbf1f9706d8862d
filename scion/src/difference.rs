//! The difference model: what changed between two versions of a tree.
//!
//! A [`Difference`] is either an addition, a deletion, or a change to a node
//! present on both sides. Records are self-contained: they describe nodes by
//! identity and carry the new content they need, so a difference list can
//! outlive the trees it was computed from.

use core::fmt;

use compact_str::CompactString;
use facet::Facet;
use smallvec::SmallVec;

use crate::tree::{Attribute, DiffTree, Fragment, NodeIdentity, NodeKind};

/// Classification of a node for reporting and ordinal bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum NodeClass {
    /// An element
    Element,
    /// Text with at least one non-whitespace character
    Text,
    /// Text made only of whitespace (formatting between elements)
    WhiteSpace,
}

impl NodeClass {
    /// Classify a node of `tree`.
    pub fn of<T: DiffTree>(tree: &T, node: T::Node) -> Self {
        match tree.kind(node) {
            NodeKind::Element => NodeClass::Element,
            NodeKind::Text => {
                if tree.text(node).is_some_and(is_whitespace_run) {
                    NodeClass::WhiteSpace
                } else {
                    NodeClass::Text
                }
            }
        }
    }

    /// Siblings of the same bucket share one kind-scoped ordinal sequence.
    pub fn bucket(self) -> NodeKind {
        match self {
            NodeClass::Element => NodeKind::Element,
            NodeClass::Text | NodeClass::WhiteSpace => NodeKind::Text,
        }
    }
}

/// Non-empty and entirely whitespace.
pub(crate) fn is_whitespace_run(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_whitespace)
}

/// Lightweight description of a node on one side of a difference.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct NodeRef {
    /// Identity in the tree the node was read from
    pub identity: NodeIdentity,
    /// Element, text or whitespace
    pub class: NodeClass,
    /// Qualified element name, empty for text
    pub name: CompactString,
}

impl NodeRef {
    /// Describe `node` of `tree`.
    pub fn describe<T: DiffTree>(tree: &T, node: T::Node) -> Self {
        let class = NodeClass::of(tree, node);
        let name = match class {
            NodeClass::Element => tree.qualified_name(node),
            _ => CompactString::default(),
        };
        Self {
            identity: tree.identity(node),
            class,
            name,
        }
    }
}

impl NodeRef {
    /// Namespace prefix of an element name, if written with one.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            NodeClass::Element => write!(f, "<{}>#{}", self.name, self.identity),
            NodeClass::Text => write!(f, "#text#{}", self.identity),
            NodeClass::WhiteSpace => write!(f, "#ws#{}", self.identity),
        }
    }
}

/// One side (old or new) of a difference.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct NodeInfo {
    /// The node itself
    pub node: NodeRef,
    /// Absolute index among all siblings
    pub index: usize,
    /// Rank among siblings of the same bucket (see [`NodeClass::bucket`])
    pub position: usize,
    /// Identities from the immediate parent up to the root, at diff time.
    /// Empty only for the root.
    pub ancestors: SmallVec<[NodeIdentity; 16]>,
}

impl NodeInfo {
    /// Identity of the node.
    pub fn identity(&self) -> NodeIdentity {
        self.node.identity
    }

    /// Identity of the parent at diff time.
    pub fn parent(&self) -> Option<NodeIdentity> {
        self.ancestors.first().copied()
    }

    /// Whether this describes the document root.
    pub fn is_root(&self) -> bool {
        self.ancestors.is_empty()
    }
}

/// What changed on a node present in both trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum ChangeKind {
    /// Text or value content differs
    Token,
    /// Attribute set, attribute values or the element's prefix differ
    Attribute,
    /// Kind-scoped ordinal or child index among siblings differs
    Position,
    /// The pair is structurally incompatible
    Unknown,
}

impl ChangeKind {
    const ALL: [ChangeKind; 4] = [
        ChangeKind::Token,
        ChangeKind::Attribute,
        ChangeKind::Position,
        ChangeKind::Unknown,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A set of [`ChangeKind`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Facet)]
#[facet(transparent)]
pub struct ChangeKinds(u8);

impl ChangeKinds {
    /// The empty set.
    pub const fn empty() -> Self {
        ChangeKinds(0)
    }

    /// Add a kind.
    pub fn insert(&mut self, kind: ChangeKind) {
        self.0 |= kind.bit();
    }

    /// Remove a kind.
    pub fn remove(&mut self, kind: ChangeKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Kinds in declaration order.
    pub fn iter(self) -> impl Iterator<Item = ChangeKind> {
        ChangeKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }

    /// True if the set holds nothing but `Position`.
    pub fn is_position_only(self) -> bool {
        self.0 == ChangeKind::Position.bit()
    }
}

impl FromIterator<ChangeKind> for ChangeKinds {
    fn from_iter<I: IntoIterator<Item = ChangeKind>>(iter: I) -> Self {
        let mut kinds = ChangeKinds::empty();
        for kind in iter {
            kinds.insert(kind);
        }
        kinds
    }
}

impl fmt::Debug for ChangeKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A change to a single attribute of an element.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum AttributeDiff {
    /// The attribute only exists in the new element
    Add {
        attribute: Attribute,
        new_position: usize,
    },
    /// The attribute only exists in the old element
    Delete {
        attribute: Attribute,
        old_position: usize,
    },
    /// Same name on both sides, different value
    Change {
        old: Attribute,
        new: Attribute,
        old_position: usize,
        new_position: usize,
    },
}

impl AttributeDiff {
    /// Name of the affected attribute.
    pub fn name(&self) -> &str {
        match self {
            AttributeDiff::Add { attribute, .. } | AttributeDiff::Delete { attribute, .. } => {
                &attribute.name
            }
            AttributeDiff::Change { new, .. } => &new.name,
        }
    }
}

/// Compare two attribute lists by name. Deletions and value changes come
/// first in old order, then additions in new order. Reordering alone is not
/// reported.
pub fn diff_attributes(old: &[Attribute], new: &[Attribute]) -> Vec<AttributeDiff> {
    let mut diffs = Vec::new();

    for (old_position, attr) in old.iter().enumerate() {
        match new.iter().position(|candidate| candidate.name == attr.name) {
            None => diffs.push(AttributeDiff::Delete {
                attribute: attr.clone(),
                old_position,
            }),
            Some(new_position) if new[new_position].value != attr.value => {
                diffs.push(AttributeDiff::Change {
                    old: attr.clone(),
                    new: new[new_position].clone(),
                    old_position,
                    new_position,
                });
            }
            Some(_) => {}
        }
    }

    for (new_position, attr) in new.iter().enumerate() {
        if !old.iter().any(|candidate| candidate.name == attr.name) {
            diffs.push(AttributeDiff::Add {
                attribute: attr.clone(),
                new_position,
            });
        }
    }

    diffs
}

/// A node present in both trees whose content, attributes or position differ.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Change {
    pub old: NodeInfo,
    pub new: NodeInfo,
    pub kinds: ChangeKinds,
    /// New text content when `kinds` holds [`ChangeKind::Token`]
    pub token: Option<String>,
    /// Per-attribute changes when `kinds` holds [`ChangeKind::Attribute`]
    pub attributes: Vec<AttributeDiff>,
}

impl Change {
    /// A change is only meaningful while it still has a kind.
    pub fn is_valid(&self) -> bool {
        !self.kinds.is_empty()
    }

    /// Token or attribute work, as opposed to a pure move.
    pub fn touches_content(&self) -> bool {
        self.kinds.contains(ChangeKind::Token) || self.kinds.contains(ChangeKind::Attribute)
    }
}

/// One structural edit between two tree versions.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Difference {
    /// A node that only exists in the new tree.
    Add {
        /// Identity of the old-tree parent the node goes under
        parent: NodeIdentity,
        /// Old identity of the nearest preceding sibling that exists on both sides
        after: Option<NodeIdentity>,
        /// Where the node sits in the new tree
        new: NodeInfo,
        /// The subtree to insert
        content: Fragment,
    },
    /// A node that only exists in the old tree.
    Delete { old: NodeInfo },
    /// A node present in both trees.
    Change(Change),
}

impl Difference {
    /// Old-tree parent under which this edit happens.
    pub fn parent(&self) -> Option<NodeIdentity> {
        match self {
            Difference::Add { parent, .. } => Some(*parent),
            Difference::Delete { old } => old.parent(),
            Difference::Change(change) => change.old.parent(),
        }
    }

    /// Old side, if the node existed before.
    pub fn old(&self) -> Option<&NodeInfo> {
        match self {
            Difference::Add { .. } => None,
            Difference::Delete { old } => Some(old),
            Difference::Change(change) => Some(&change.old),
        }
    }

    /// New side, if the node exists after.
    pub fn new_side(&self) -> Option<&NodeInfo> {
        match self {
            Difference::Add { new, .. } => Some(new),
            Difference::Delete { .. } => None,
            Difference::Change(change) => Some(&change.new),
        }
    }

    pub fn as_change(&self) -> Option<&Change> {
        match self {
            Difference::Change(change) => Some(change),
            _ => None,
        }
    }

    /// Whether this difference only concerns formatting whitespace. Callers
    /// that ignore reflowed indentation drop these.
    pub fn is_whitespace_only(&self) -> bool {
        match self {
            Difference::Add { new, .. } => new.node.class == NodeClass::WhiteSpace,
            Difference::Delete { old } => old.node.class == NodeClass::WhiteSpace,
            Difference::Change(change) => {
                change.old.node.class == NodeClass::WhiteSpace
                    && change.new.node.class == NodeClass::WhiteSpace
                    && !change.kinds.contains(ChangeKind::Unknown)
            }
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::Add {
                parent, new, after, ..
            } => {
                write!(
                    f,
                    "Add({} @{} under #{}",
                    new.node, new.index, parent
                )?;
                if let Some(after) = after {
                    write!(f, " after #{after}")?;
                }
                write!(f, ")")
            }
            Difference::Delete { old } => {
                write!(f, "Delete({} @{})", old.node, old.index)
            }
            Difference::Change(change) => {
                write!(f, "Change({} {:?}", change.old.node, change.kinds)?;
                if change.kinds.contains(ChangeKind::Position) {
                    write!(f, " {}→{}", change.old.position, change.new.position)?;
                }
                if let Some(token) = &change.token {
                    write!(f, " token={token:?}")?;
                }
                for attr in &change.attributes {
                    match attr {
                        AttributeDiff::Add { attribute, .. } => write!(f, " +{attribute}")?,
                        AttributeDiff::Delete { attribute, .. } => {
                            write!(f, " -{}", attribute.name)?
                        }
                        AttributeDiff::Change { new, .. } => write!(f, " ~{new}")?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn test_change_kinds_set() {
        let mut kinds: ChangeKinds = [ChangeKind::Token, ChangeKind::Position]
            .into_iter()
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(ChangeKind::Token));
        assert!(!kinds.contains(ChangeKind::Attribute));

        kinds.remove(ChangeKind::Token);
        assert!(kinds.is_position_only());

        kinds.remove(ChangeKind::Position);
        assert!(kinds.is_empty());
        assert_eq!(format!("{kinds:?}"), "{}");
    }

    #[test]
    fn test_diff_attributes_orders_removals_first() {
        let old = vec![
            Attribute::new("id", "1"),
            Attribute::new("class", "a"),
            Attribute::new("lang", "en"),
        ];
        let new = vec![
            Attribute::new("title", "t"),
            Attribute::new("class", "b"),
            Attribute::new("id", "1"),
        ];

        let diffs = diff_attributes(&old, &new);
        assert_eq!(
            diffs,
            vec![
                AttributeDiff::Change {
                    old: Attribute::new("class", "a"),
                    new: Attribute::new("class", "b"),
                    old_position: 1,
                    new_position: 1,
                },
                AttributeDiff::Delete {
                    attribute: Attribute::new("lang", "en"),
                    old_position: 2,
                },
                AttributeDiff::Add {
                    attribute: Attribute::new("title", "t"),
                    new_position: 0,
                },
            ]
        );
    }

    #[test]
    fn test_reordered_attributes_are_not_a_difference() {
        let old = vec![Attribute::new("a", "1"), Attribute::new("b", "2")];
        let new = vec![Attribute::new("b", "2"), Attribute::new("a", "1")];
        assert!(diff_attributes(&old, &new).is_empty());
    }

    #[test]
    fn test_whitespace_run() {
        assert!(is_whitespace_run(" \n\t"));
        assert!(!is_whitespace_run(""));
        assert!(!is_whitespace_run(" x "));
    }
}

//! Deciding whether a node of the old tree and a node of the new tree are
//! "the same" logical node.

use compact_str::CompactString;

use crate::tree::{DiffTree, NodeKind};

/// A correspondence oracle. Pure predicate; configuration only.
pub trait Correspondence {
    /// Whether `a` (in `tree_a`) and `b` (in `tree_b`) denote the same node.
    fn matches<T: DiffTree>(&self, tree_a: &T, a: T::Node, tree_b: &T, b: T::Node) -> bool;

    /// Lineage oracles decide by stable identity alone, so the finder offers
    /// them every sibling, not just elements with the same name.
    fn by_lineage(&self) -> bool {
        false
    }
}

/// Structural correspondence: same element name and namespace, disambiguated
/// by a configured set of identifying attributes.
#[derive(Debug, Clone)]
pub struct AttributeIdentity {
    identifying: Vec<CompactString>,
}

impl Default for AttributeIdentity {
    fn default() -> Self {
        Self::new(["id", "name", "ref"])
    }
}

impl AttributeIdentity {
    /// Use the given attribute names to tell same-named siblings apart.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        Self {
            identifying: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Match same-named elements on name alone.
    pub fn by_name_only() -> Self {
        Self {
            identifying: Vec::new(),
        }
    }

    pub fn identifying_attributes(&self) -> &[CompactString] {
        &self.identifying
    }
}

impl Correspondence for AttributeIdentity {
    fn matches<T: DiffTree>(&self, tree_a: &T, a: T::Node, tree_b: &T, b: T::Node) -> bool {
        if tree_a.kind(a) != NodeKind::Element || tree_b.kind(b) != NodeKind::Element {
            return false;
        }
        if tree_a.local_name(a) != tree_b.local_name(b)
            || tree_a.namespace(a) != tree_b.namespace(b)
        {
            return false;
        }

        // A document has exactly one root.
        if tree_a.parent(a).is_none() {
            return true;
        }

        if self.identifying.is_empty() {
            return true;
        }

        let same_attribute_count = tree_a.attributes(a).len() == tree_b.attributes(b).len();
        let mut agreeing = 0usize;
        let mut differing = 0usize;
        let mut one_sided = 0usize;

        for name in &self.identifying {
            match (tree_a.attribute(a, name), tree_b.attribute(b, name)) {
                (Some(va), Some(vb)) if va == vb => agreeing += 1,
                (Some(_), Some(_)) => {
                    if same_attribute_count {
                        // Same shape, different key: treat as a rename, not an edit.
                        return false;
                    }
                    differing += 1;
                }
                (None, None) => {}
                _ => one_sided += 1,
            }
        }

        if agreeing > 0 {
            return true;
        }
        if differing == 0 && one_sided == 0 {
            return true;
        }
        differing > 0 && one_sided == 0
    }
}

/// Lineage correspondence: two nodes match iff their stable identities are
/// equal. Only meaningful when both trees descend from the same original,
/// e.g. a snapshot taken before an in-place edit.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineageIdentity;

impl Correspondence for LineageIdentity {
    fn matches<T: DiffTree>(&self, tree_a: &T, a: T::Node, tree_b: &T, b: T::Node) -> bool {
        tree_a.identity(a) == tree_b.identity(b)
    }

    fn by_lineage(&self) -> bool {
        true
    }
}

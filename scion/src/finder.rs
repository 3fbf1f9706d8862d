//! The diff finder: walks two trees in lock-step and records what changed.
//!
//! Children are paired per parent only, so matching stays local: a node that
//! moves to a different parent shows up as a deletion plus an addition.

use rapidhash::RapidHashMap as HashMap;
use smallvec::SmallVec;

use crate::correspondence::Correspondence;
use crate::difference::{
    AttributeDiff, Change, ChangeKind, ChangeKinds, Difference, NodeClass, NodeInfo, NodeRef,
    diff_attributes,
};
use crate::optimizer::optimize;
use crate::tree::{DiffTree, Fragment, NodeIdentity, NodeKind};
use crate::{debug, trace};

/// Configuration for [`find_differences`].
#[derive(Debug, Clone)]
pub struct DiffConfig {
    /// Remove position changes that are only a side effect of insertions and
    /// deletions among the same siblings.
    pub optimize: bool,

    /// After regular matching, pair an old element with a new element of the
    /// same name when each is the only unpaired one of that name under their
    /// parents. Ignored for lineage oracles.
    pub unique_name_fallback: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            unique_name_fallback: true,
        }
    }
}

/// Compute the differences that turn `tree_a` into `tree_b`.
pub fn find_differences<T, C>(
    tree_a: &T,
    tree_b: &T,
    oracle: &C,
    config: &DiffConfig,
) -> Vec<Difference>
where
    T: DiffTree,
    C: Correspondence,
{
    let finder = DiffFinder {
        tree_a,
        tree_b,
        oracle,
        config,
    };
    let found = finder.run();
    debug!(count = found.len(), "find_differences: raw");

    if config.optimize {
        let optimized = optimize(found);
        debug!(count = optimized.len(), "find_differences: optimized");
        optimized
    } else {
        found
    }
}

type Ancestors = SmallVec<[NodeIdentity; 16]>;

struct DiffFinder<'a, T: DiffTree, C> {
    tree_a: &'a T,
    tree_b: &'a T,
    oracle: &'a C,
    config: &'a DiffConfig,
}

/// Scratch bookkeeping for the children of one parent. Built when a pair of
/// parents is visited and dropped once their children are processed.
struct SiblingIndex<N> {
    nodes: Vec<N>,
    classes: Vec<NodeClass>,
    /// Kind-scoped ordinal of each child
    ordinals: Vec<usize>,
    /// For text children: index of the nearest preceding non-text sibling
    preceding: Vec<Option<usize>>,
    /// Identities from the parent up to the root
    ancestors: Ancestors,
}

impl<N: Copy> SiblingIndex<N> {
    fn build<T: DiffTree<Node = N>>(tree: &T, parent: N) -> Self {
        let nodes: Vec<N> = tree.children(parent).collect();
        let mut classes = Vec::with_capacity(nodes.len());
        let mut ordinals = Vec::with_capacity(nodes.len());
        let mut preceding = Vec::with_capacity(nodes.len());

        let mut elements = 0usize;
        let mut texts = 0usize;
        let mut last_non_text = None;

        for (index, &node) in nodes.iter().enumerate() {
            let class = NodeClass::of(tree, node);
            match class.bucket() {
                NodeKind::Element => {
                    ordinals.push(elements);
                    elements += 1;
                    preceding.push(None);
                    last_non_text = Some(index);
                }
                NodeKind::Text => {
                    ordinals.push(texts);
                    texts += 1;
                    preceding.push(last_non_text);
                }
            }
            classes.push(class);
        }

        let mut ancestors = Ancestors::new();
        ancestors.push(tree.identity(parent));
        ancestors.extend(tree.ancestors(parent).into_iter().map(|n| tree.identity(n)));

        Self {
            nodes,
            classes,
            ordinals,
            preceding,
            ancestors,
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn info<T: DiffTree<Node = N>>(&self, tree: &T, index: usize) -> NodeInfo {
        NodeInfo {
            node: NodeRef::describe(tree, self.nodes[index]),
            index,
            position: self.ordinals[index],
            ancestors: self.ancestors.clone(),
        }
    }
}

/// Outcome of comparing a paired node's own content.
struct Comparison {
    kinds: ChangeKinds,
    token: Option<String>,
    attributes: Vec<AttributeDiff>,
    descend: bool,
}

impl<T: DiffTree, C: Correspondence> DiffFinder<'_, T, C> {
    fn run(&self) -> Vec<Difference> {
        let mut out = Vec::new();
        let root_a = self.tree_a.root();
        let root_b = self.tree_b.root();

        let root_info = |tree: &T, node: T::Node| NodeInfo {
            node: NodeRef::describe(tree, node),
            index: 0,
            position: 0,
            ancestors: Ancestors::new(),
        };

        let comparison = self.compare(root_a, root_b);
        if !comparison.kinds.is_empty() {
            out.push(Difference::Change(Change {
                old: root_info(self.tree_a, root_a),
                new: root_info(self.tree_b, root_b),
                kinds: comparison.kinds,
                token: comparison.token,
                attributes: comparison.attributes,
            }));
        }
        if !comparison.descend {
            return out;
        }

        // Depth-first over paired parents; scratch state lives in each iteration.
        let mut worklist = vec![(root_a, root_b)];
        while let Some((parent_a, parent_b)) = worklist.pop() {
            let descend = self.diff_children(parent_a, parent_b, &mut out);
            worklist.extend(descend.into_iter().rev());
        }

        out
    }

    /// Compare the content of a paired node. Position is handled by the caller.
    fn compare(&self, a: T::Node, b: T::Node) -> Comparison {
        let (ta, tb) = (self.tree_a, self.tree_b);
        let mut kinds = ChangeKinds::empty();

        match (ta.kind(a), tb.kind(b)) {
            (NodeKind::Text, NodeKind::Text) => {
                let mut token = None;
                if ta.text(a) != tb.text(b) {
                    kinds.insert(ChangeKind::Token);
                    token = tb.text(b).map(str::to_owned);
                }
                Comparison {
                    kinds,
                    token,
                    attributes: Vec::new(),
                    descend: false,
                }
            }
            (NodeKind::Element, NodeKind::Element)
                if ta.local_name(a) == tb.local_name(b) && ta.namespace(a) == tb.namespace(b) =>
            {
                let attributes = diff_attributes(ta.attributes(a), tb.attributes(b));
                if !attributes.is_empty() || ta.prefix(a) != tb.prefix(b) {
                    kinds.insert(ChangeKind::Attribute);
                }

                // Elements holding only text compare that text as their token
                // instead of diffing the text children one by one.
                let leaf = !ta.has_element_children(a) && !tb.has_element_children(b);
                let mut token = None;
                if leaf {
                    let new_text = tb.text_content(b);
                    if ta.text_content(a) != new_text {
                        kinds.insert(ChangeKind::Token);
                        token = Some(new_text);
                    }
                }

                Comparison {
                    kinds,
                    token,
                    attributes,
                    descend: !leaf,
                }
            }
            _ => {
                trace!(a = ?a, b = ?b, "compare: incompatible pair");
                kinds.insert(ChangeKind::Unknown);
                Comparison {
                    kinds,
                    token: None,
                    attributes: Vec::new(),
                    descend: false,
                }
            }
        }
    }

    /// Pair the children of one parent pair, emit their differences, and
    /// return the element pairs to descend into, in new-tree order.
    fn diff_children(
        &self,
        parent_a: T::Node,
        parent_b: T::Node,
        out: &mut Vec<Difference>,
    ) -> Vec<(T::Node, T::Node)> {
        let (ta, tb) = (self.tree_a, self.tree_b);
        let side_a = SiblingIndex::build(ta, parent_a);
        let side_b = SiblingIndex::build(tb, parent_b);
        trace!(
            parent_a = ?parent_a,
            parent_b = ?parent_b,
            children_a = side_a.len(),
            children_b = side_b.len(),
            "diff_children"
        );

        let mut b_for_a: Vec<Option<usize>> = vec![None; side_a.len()];
        let mut a_for_b: Vec<Option<usize>> = vec![None; side_b.len()];

        let mut b_by_name: HashMap<NameKey<'_>, Vec<usize>> = HashMap::default();
        for (j, &node) in side_b.nodes.iter().enumerate() {
            if side_b.classes[j] == NodeClass::Element {
                b_by_name.entry(name_key(tb, node)).or_default().push(j);
            }
        }

        for i in 0..side_a.len() {
            let a = side_a.nodes[i];

            let mut found = None;
            if self.oracle.by_lineage() {
                found = (0..side_b.len()).find(|&j| {
                    a_for_b[j].is_none() && self.oracle.matches(ta, a, tb, side_b.nodes[j])
                });
            }

            if found.is_none() {
                found = match side_a.classes[i] {
                    NodeClass::Element => b_by_name.get(&name_key(ta, a)).and_then(|cands| {
                        cands.iter().copied().find(|&j| {
                            a_for_b[j].is_none()
                                && self.oracle.matches(ta, a, tb, side_b.nodes[j])
                        })
                    }),
                    NodeClass::WhiteSpace => {
                        whitespace_partner(i, &side_a, &side_b, &b_for_a, &a_for_b)
                            .or_else(|| self.equal_text(a, &side_b, &a_for_b))
                    }
                    NodeClass::Text => self.equal_text(a, &side_b, &a_for_b),
                };
            }

            if let Some(j) = found {
                b_for_a[i] = Some(j);
                a_for_b[j] = Some(i);
            }
        }

        if self.config.unique_name_fallback && !self.oracle.by_lineage() {
            self.pair_unique_names(&side_a, &side_b, &mut b_for_a, &mut a_for_b);
        }

        for i in 0..side_a.len() {
            if b_for_a[i].is_none() {
                out.push(Difference::Delete {
                    old: side_a.info(ta, i),
                });
            }
        }

        let parent_identity = ta.identity(parent_a);
        for j in 0..side_b.len() {
            if a_for_b[j].is_some() {
                continue;
            }
            // Nearest preceding element that survives from the old tree.
            let after = (0..j).rev().find_map(|k| match a_for_b[k] {
                Some(i) if side_b.classes[k] == NodeClass::Element => {
                    Some(ta.identity(side_a.nodes[i]))
                }
                _ => None,
            });
            out.push(Difference::Add {
                parent: parent_identity,
                after,
                new: side_b.info(tb, j),
                content: Fragment::capture(tb, side_b.nodes[j]),
            });
        }

        let mut pairs: Vec<(usize, usize)> = b_for_a
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.map(|j| (i, j)))
            .collect();
        pairs.sort_by_key(|&(_, j)| j);

        let mut descend = Vec::new();
        for (i, j) in pairs {
            let (a, b) = (side_a.nodes[i], side_b.nodes[j]);
            let mut comparison = self.compare(a, b);
            // Text crossing an element keeps its ordinal but not its index.
            if !comparison.kinds.contains(ChangeKind::Unknown)
                && (side_a.ordinals[i] != side_b.ordinals[j] || i != j)
            {
                comparison.kinds.insert(ChangeKind::Position);
            }

            if !comparison.kinds.is_empty() {
                out.push(Difference::Change(Change {
                    old: side_a.info(ta, i),
                    new: side_b.info(tb, j),
                    kinds: comparison.kinds,
                    token: comparison.token,
                    attributes: comparison.attributes,
                }));
            }
            if comparison.descend {
                descend.push((a, b));
            }
        }

        descend
    }

    /// First unpaired new text sibling with exactly the same value.
    fn equal_text(
        &self,
        a: T::Node,
        side_b: &SiblingIndex<T::Node>,
        a_for_b: &[Option<usize>],
    ) -> Option<usize> {
        let text = self.tree_a.text(a)?;
        (0..side_b.len()).find(|&j| {
            a_for_b[j].is_none()
                && side_b.classes[j].bucket() == NodeKind::Text
                && self.tree_b.text(side_b.nodes[j]) == Some(text)
        })
    }

    /// Pair leftover elements whose name is unique among the unpaired children
    /// on both sides.
    fn pair_unique_names(
        &self,
        side_a: &SiblingIndex<T::Node>,
        side_b: &SiblingIndex<T::Node>,
        b_for_a: &mut [Option<usize>],
        a_for_b: &mut [Option<usize>],
    ) {
        let mut leftover_a: HashMap<NameKey<'_>, Vec<usize>> = HashMap::default();
        for (i, &node) in side_a.nodes.iter().enumerate() {
            if b_for_a[i].is_none() && side_a.classes[i] == NodeClass::Element {
                leftover_a
                    .entry(name_key(self.tree_a, node))
                    .or_default()
                    .push(i);
            }
        }
        if leftover_a.is_empty() {
            return;
        }

        let mut leftover_b: HashMap<NameKey<'_>, Vec<usize>> = HashMap::default();
        for (j, &node) in side_b.nodes.iter().enumerate() {
            if a_for_b[j].is_none() && side_b.classes[j] == NodeClass::Element {
                leftover_b
                    .entry(name_key(self.tree_b, node))
                    .or_default()
                    .push(j);
            }
        }

        for (name, only_a) in &leftover_a {
            let Some(only_b) = leftover_b.get(name) else {
                continue;
            };
            if let ([i], [j]) = (only_a.as_slice(), only_b.as_slice()) {
                trace!(local = name.0, "pair_unique_names: fallback pair");
                b_for_a[*i] = Some(*j);
                a_for_b[*j] = Some(*i);
            }
        }
    }
}

/// Local name and namespace URI. The prefix is only spelling.
type NameKey<'t> = (&'t str, Option<&'t str>);

fn name_key<T: DiffTree>(tree: &T, node: T::Node) -> NameKey<'_> {
    (tree.local_name(node), tree.namespace(node))
}

/// For whitespace-only text: an unpaired whitespace-only new sibling that
/// follows the counterpart of our preceding element (or that, like us, has no
/// preceding element). Reflowed indentation then pairs up instead of showing
/// as a deletion plus an addition.
fn whitespace_partner<N>(
    i: usize,
    side_a: &SiblingIndex<N>,
    side_b: &SiblingIndex<N>,
    b_for_a: &[Option<usize>],
    a_for_b: &[Option<usize>],
) -> Option<usize> {
    let before_a = side_a.preceding[i];
    (0..side_b.len()).find(|&j| {
        if a_for_b[j].is_some() || side_b.classes[j] != NodeClass::WhiteSpace {
            return false;
        }
        match (before_a, side_b.preceding[j]) {
            (None, None) => true,
            (Some(pa), Some(pb)) => b_for_a[pa] == Some(pb),
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compact_str::CompactString;
    use crate::correspondence::{AttributeIdentity, LineageIdentity};
    use crate::testing::TestTree;
    use facet_testhelpers::test;

    fn kinds_of(diff: &Difference) -> Vec<ChangeKind> {
        diff.as_change()
            .map(|change| change.kinds.iter().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_identical_trees_have_no_differences() {
        let mut a = TestTree::new("r", &[]);
        let x = a.push_element(a.root(), "x", &[("id", "1")]);
        a.push_text(x, "hello");
        a.push_text(a.root(), " ");
        a.push_element(a.root(), "y", &[]);
        let b = a.clone();

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        assert!(diffs.is_empty(), "unexpected differences: {diffs:?}");
    }

    #[test]
    fn test_rename_is_one_change() {
        // <p><x id="1">A</x></p> -> <p><x id="2">B</x></p>
        let mut a = TestTree::new("p", &[]);
        let x = a.push_element(a.root(), "x", &[("id", "1")]);
        a.push_text(x, "A");

        let mut b = TestTree::new("p", &[]);
        let x = b.push_element(b.root(), "x", &[("id", "2")]);
        b.push_text(x, "B");

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        assert_eq!(diffs.len(), 1, "{diffs:?}");
        assert_eq!(
            kinds_of(&diffs[0]),
            vec![ChangeKind::Token, ChangeKind::Attribute]
        );
        let change = diffs[0].as_change().unwrap();
        assert_eq!(change.token.as_deref(), Some("B"));
        assert_eq!(change.old.node.name, "x");
    }

    #[test]
    fn test_rename_without_fallback_is_add_and_delete() {
        let mut a = TestTree::new("p", &[]);
        a.push_element(a.root(), "x", &[("id", "1")]);
        let mut b = TestTree::new("p", &[]);
        b.push_element(b.root(), "x", &[("id", "2")]);

        let config = DiffConfig {
            unique_name_fallback: false,
            ..DiffConfig::default()
        };
        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &config);
        assert_eq!(diffs.len(), 2, "{diffs:?}");
        assert!(matches!(diffs[0], Difference::Delete { .. }));
        assert!(matches!(diffs[1], Difference::Add { .. }));
    }

    #[test]
    fn test_insert_reports_single_add() {
        let mut a = TestTree::new("list", &[]);
        for name in ["a", "b", "c", "d"] {
            a.push_element(a.root(), name, &[]);
        }
        let mut b = TestTree::new("list", &[]);
        for name in ["a", "new", "b", "c", "d"] {
            b.push_element(b.root(), name, &[]);
        }

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        assert_eq!(diffs.len(), 1, "{diffs:?}");
        let Difference::Add {
            parent, after, new, ..
        } = &diffs[0]
        else {
            panic!("expected an add, got {:?}", diffs[0]);
        };
        assert_eq!(*parent, a.identity_of(a.root()));
        assert_eq!(*after, Some(a.identity_of(a.child(a.root(), 0))));
        assert_eq!(new.index, 1);
        assert_eq!(new.position, 1);
    }

    #[test]
    fn test_insert_without_optimizer_flags_positions() {
        let mut a = TestTree::new("list", &[]);
        for name in ["a", "b"] {
            a.push_element(a.root(), name, &[]);
        }
        let mut b = TestTree::new("list", &[]);
        for name in ["new", "a", "b"] {
            b.push_element(b.root(), name, &[]);
        }

        let config = DiffConfig {
            optimize: false,
            ..DiffConfig::default()
        };
        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &config);
        let moved = diffs
            .iter()
            .filter(|d| kinds_of(d).contains(&ChangeKind::Position))
            .count();
        assert_eq!(moved, 2);
    }

    #[test]
    fn test_pure_reorder_flags_every_sibling() {
        let mut a = TestTree::new("r", &[]);
        for name in ["a", "b", "c"] {
            a.push_element(a.root(), name, &[]);
        }
        let mut b = TestTree::new("r", &[]);
        for name in ["c", "a", "b"] {
            b.push_element(b.root(), name, &[]);
        }

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        let moves: Vec<(CompactString, usize, usize)> = diffs
            .iter()
            .filter_map(Difference::as_change)
            .map(|c| {
                assert!(c.kinds.is_position_only());
                (c.old.node.name.clone(), c.old.position, c.new.position)
            })
            .collect();
        assert_eq!(
            moves,
            vec![
                ("c".into(), 2, 0),
                ("a".into(), 0, 1),
                ("b".into(), 1, 2),
            ]
        );
    }

    #[test]
    fn test_text_crossing_an_element_is_a_move() {
        // r[x, <a/>] -> r[<a/>, <n/>, x]: both ordinals stay 0, the indices do not.
        let mut a = TestTree::new("r", &[]);
        a.push_text(a.root(), "x");
        a.push_element(a.root(), "a", &[]);

        let mut b = TestTree::new("r", &[]);
        b.push_element(b.root(), "a", &[]);
        b.push_element(b.root(), "n", &[]);
        b.push_text(b.root(), "x");

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        assert_eq!(diffs.len(), 3, "{diffs:?}");
        assert!(matches!(&diffs[0], Difference::Add { new, .. } if new.index == 1));
        let moves: Vec<(usize, usize, usize)> = diffs[1..]
            .iter()
            .map(|d| {
                let c = d.as_change().unwrap();
                assert!(c.kinds.is_position_only());
                (c.old.position, c.old.index, c.new.index)
            })
            .collect();
        assert_eq!(moves, vec![(0, 1, 0), (0, 0, 2)]);
    }

    #[test]
    fn test_whitespace_reflow_is_whitespace_only() {
        let mut a = TestTree::new("p", &[]);
        a.push_element(a.root(), "a", &[]);
        a.push_text(a.root(), " ");
        a.push_element(a.root(), "b", &[]);

        let mut b = TestTree::new("p", &[]);
        b.push_element(b.root(), "a", &[]);
        b.push_text(b.root(), "  ");
        b.push_element(b.root(), "b", &[]);

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        assert_eq!(diffs.len(), 1, "{diffs:?}");
        assert_eq!(kinds_of(&diffs[0]), vec![ChangeKind::Token]);
        assert!(diffs.iter().all(Difference::is_whitespace_only));
    }

    #[test]
    fn test_identifying_attribute_keeps_siblings_apart() {
        let mut a = TestTree::new("r", &[]);
        a.push_element(a.root(), "item", &[("name", "one"), ("v", "1")]);
        a.push_element(a.root(), "item", &[("name", "two"), ("v", "2")]);

        let mut b = TestTree::new("r", &[]);
        b.push_element(b.root(), "item", &[("name", "two"), ("v", "2")]);
        b.push_element(b.root(), "item", &[("name", "one"), ("v", "1")]);

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        assert_eq!(diffs.len(), 2, "{diffs:?}");
        assert!(diffs.iter().all(|d| kinds_of(d) == vec![ChangeKind::Position]));
    }

    #[test]
    fn test_mismatched_roots_are_unknown() {
        let a = TestTree::new("r", &[]);
        let b = TestTree::new("s", &[]);
        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        assert_eq!(diffs.len(), 1);
        assert_eq!(kinds_of(&diffs[0]), vec![ChangeKind::Unknown]);
    }

    #[test]
    fn test_lineage_pairs_by_identity() {
        let mut a = TestTree::new("r", &[]);
        a.push_element(a.root(), "x", &[]);
        a.push_text(a.root(), "old words");

        // Same lineage: identities carry over, text value was edited in place.
        let mut b = a.clone();
        let text = b.child(b.root(), 1);
        b.set_text_value(text, "new words");

        let diffs = find_differences(&a, &b, &LineageIdentity, &DiffConfig::default());
        assert_eq!(diffs.len(), 1, "{diffs:?}");
        let change = diffs[0].as_change().unwrap();
        assert_eq!(kinds_of(&diffs[0]), vec![ChangeKind::Token]);
        assert_eq!(change.token.as_deref(), Some("new words"));
    }

    #[test]
    fn test_lineage_cross_kind_is_unknown() {
        let mut a = TestTree::new("r", &[]);
        a.push_element(a.root(), "x", &[]);
        let mut b = TestTree::new("r", &[]);
        b.push_text(b.root(), "x");
        // Force the text node to carry the element's identity.
        let text = b.child(b.root(), 0);
        let element_identity = a.identity_of(a.child(a.root(), 0));
        b.set_identity(text, element_identity);
        b.set_identity(b.root(), a.identity_of(a.root()));

        let diffs = find_differences(&a, &b, &LineageIdentity, &DiffConfig::default());
        assert_eq!(diffs.len(), 1, "{diffs:?}");
        assert_eq!(kinds_of(&diffs[0]), vec![ChangeKind::Unknown]);
    }

    #[test]
    fn test_deleted_subtree_is_one_delete() {
        let mut a = TestTree::new("r", &[]);
        let gone = a.push_element(a.root(), "section", &[]);
        a.push_element(gone, "para", &[]);
        a.push_element(gone, "para", &[]);
        a.push_element(a.root(), "kept", &[]);

        let mut b = TestTree::new("r", &[]);
        b.push_element(b.root(), "kept", &[]);

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        assert_eq!(diffs.len(), 1, "{diffs:?}");
        let Difference::Delete { old } = &diffs[0] else {
            panic!("expected delete");
        };
        assert_eq!(old.node.name, "section");
        assert_eq!(old.index, 0);
        assert_eq!(old.ancestors.as_slice(), &[a.identity_of(a.root())]);
    }

    #[test]
    fn test_nested_changes_are_depth_first() {
        let mut a = TestTree::new("r", &[]);
        let s1 = a.push_element(a.root(), "s", &[("id", "1")]);
        a.push_element(s1, "leaf", &[("v", "a")]);
        let s2 = a.push_element(a.root(), "s", &[("id", "2")]);
        a.push_element(s2, "leaf", &[("v", "b")]);

        let mut b = TestTree::new("r", &[]);
        let s1 = b.push_element(b.root(), "s", &[("id", "1")]);
        b.push_element(s1, "leaf", &[("v", "A")]);
        let s2 = b.push_element(b.root(), "s", &[("id", "2")]);
        b.push_element(s2, "leaf", &[("v", "B")]);

        let diffs = find_differences(&a, &b, &AttributeIdentity::default(), &DiffConfig::default());
        let values: Vec<_> = diffs
            .iter()
            .filter_map(Difference::as_change)
            .map(|c| c.attributes[0].name().to_owned())
            .collect();
        assert_eq!(values, vec!["v", "v"]);
        assert_eq!(diffs[0].old().unwrap().ancestors.len(), 2);
    }
}

//! The merge engine: replays a difference list onto a live tree.
//!
//! Differences are never mutated here. Everything learned while applying them
//! (where a node lives now, which parent it was placed under) goes into an
//! [`IdentityTable`] that is handed back to the caller.
//!
//! Work happens in two phases. The content phase rewrites text and attributes
//! node by node; the structural phase then handles each parent once: deletions,
//! then additions and moves, finishing with a single reorder of its children.

use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};
use smallvec::SmallVec;

use crate::difference::{AttributeDiff, Change, ChangeKind, Difference, NodeInfo};
use crate::error::MergeError;
use crate::tree::{Attribute, DiffTree, Fragment, MutableTree, NodeIdentity, NodeKind, NodePath};
use crate::{debug, trace};

type Identities = SmallVec<[NodeIdentity; 16]>;

/// Side table kept by the merge: identity to live node, identity to the
/// parent it was placed under, and cached ancestor chains.
#[derive(Debug, Clone)]
pub struct IdentityTable<N> {
    live: HashMap<NodeIdentity, N>,
    placed_under: HashMap<NodeIdentity, NodeIdentity>,
    ancestry: HashMap<NodeIdentity, Identities>,
}

impl<N> Default for IdentityTable<N> {
    fn default() -> Self {
        Self {
            live: HashMap::default(),
            placed_under: HashMap::default(),
            ancestry: HashMap::default(),
        }
    }
}

impl<N: Copy> IdentityTable<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known live node for `identity`. May be stale; check it against
    /// the tree before use.
    pub fn node(&self, identity: NodeIdentity) -> Option<N> {
        self.live.get(&identity).copied()
    }

    /// Parent a node was placed under during the structural phase.
    pub fn placed_under(&self, identity: NodeIdentity) -> Option<NodeIdentity> {
        self.placed_under.get(&identity).copied()
    }

    /// Number of identities with a known live node.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn record(&mut self, identity: NodeIdentity, node: N) {
        self.live.insert(identity, node);
    }

    fn record_path<T: DiffTree<Node = N>>(&mut self, tree: &T, path: &NodePath<N>) {
        for &node in path {
            self.live.insert(tree.identity(node), node);
        }
    }

    fn forget(&mut self, identity: NodeIdentity) {
        self.live.remove(&identity);
        self.placed_under.remove(&identity);
        self.ancestry.remove(&identity);
    }

    fn place(&mut self, identity: NodeIdentity, parent: NodeIdentity) {
        self.placed_under.insert(identity, parent);
        self.ancestry.remove(&identity);
    }
}

/// Identity of the parent the node ends up under. Moves never cross
/// parents, so this is the old parent unless the merge recorded otherwise.
/// `None` for deletions and for the root.
pub fn new_parent<N: Copy>(difference: &Difference, table: &IdentityTable<N>) -> Option<NodeIdentity> {
    match difference {
        Difference::Add { parent, .. } => Some(*parent),
        Difference::Delete { .. } => None,
        Difference::Change(change) => table
            .placed_under(change.old.identity())
            .or_else(|| change.old.parent()),
    }
}

/// Identities from the node's new parent up to the root of the live tree.
/// Walks the tree lazily and caches each chain in the table.
pub fn new_ancestors<T: DiffTree>(
    difference: &Difference,
    table: &mut IdentityTable<T::Node>,
    tree: &T,
) -> SmallVec<[NodeIdentity; 16]> {
    let Some(parent) = new_parent(difference, table) else {
        return SmallVec::new();
    };

    if let Some(cached) = table.ancestry.get(&parent) {
        return cached.clone();
    }

    let live_parent = table
        .node(parent)
        .filter(|&node| tree.is_attached(node) && tree.identity(node) == parent)
        .or_else(|| tree.find_by_identity(parent));

    let chain: Identities = match live_parent {
        Some(node) => {
            let mut chain = Identities::new();
            chain.push(parent);
            chain.extend(tree.ancestors(node).into_iter().map(|n| tree.identity(n)));
            table.record(parent, node);
            chain
        }
        // Parent not in the live tree (yet); fall back to what the diff saw.
        None => match difference.old() {
            Some(old) => old.ancestors.clone(),
            None => {
                let mut chain = Identities::new();
                chain.push(parent);
                chain
            }
        },
    };

    table.ancestry.insert(parent, chain.clone());
    chain
}

/// What a successful merge leaves behind.
#[derive(Debug, Clone)]
pub struct MergeOutcome<N> {
    /// Live node locations and placements learned while merging
    pub table: IdentityTable<N>,
    /// Live node created for each addition, keyed by its index in the
    /// difference list
    pub added: Vec<(usize, N)>,
}

impl<N: Copy> MergeOutcome<N> {
    /// The node inserted for the addition at `index` in the difference list.
    pub fn added_node(&self, index: usize) -> Option<N> {
        self.added
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, node)| *node)
    }
}

/// Apply `differences` to `target`.
///
/// Fails fast: on error the tree may be partially updated and should be
/// discarded.
pub fn merge<T: MutableTree>(
    target: &mut T,
    differences: &[Difference],
) -> Result<MergeOutcome<T::Node>, MergeError> {
    let plan = Plan::partition(differences)?;
    debug!(
        content = plan.content.len(),
        parents = plan.structural.len(),
        "merge: partitioned"
    );

    let mut merger = Merger {
        target,
        table: IdentityTable::new(),
        added: Vec::new(),
    };

    for change in &plan.content {
        merger.apply_content(change)?;
    }
    for batch in &plan.structural {
        merger.apply_structure(batch)?;
    }

    Ok(MergeOutcome {
        table: merger.table,
        added: merger.added,
    })
}

/// Structural work under one parent.
struct ParentBatch<'d> {
    parent: NodeIdentity,
    /// Ancestors of the parent, when some difference tells us
    parent_ancestors: Option<&'d [NodeIdentity]>,
    deletes: Vec<&'d NodeInfo>,
    moves: Vec<&'d Change>,
    adds: Vec<(usize, &'d NodeInfo, &'d Fragment)>,
}

impl<'d> ParentBatch<'d> {
    fn new(parent: NodeIdentity) -> Self {
        Self {
            parent,
            parent_ancestors: None,
            deletes: Vec::new(),
            moves: Vec::new(),
            adds: Vec::new(),
        }
    }

    fn learn_ancestors(&mut self, info: &'d NodeInfo) {
        if self.parent_ancestors.is_none() && !info.ancestors.is_empty() {
            self.parent_ancestors = Some(&info.ancestors[1..]);
        }
    }
}

struct Plan<'d> {
    content: Vec<&'d Change>,
    structural: Vec<ParentBatch<'d>>,
}

impl<'d> Plan<'d> {
    fn partition(differences: &'d [Difference]) -> Result<Self, MergeError> {
        let mut content = Vec::new();
        let mut structural: Vec<ParentBatch<'d>> = Vec::new();
        let mut batch_of: HashMap<NodeIdentity, usize> = HashMap::default();

        let mut batch = |parent: NodeIdentity, structural: &mut Vec<ParentBatch<'d>>| -> usize {
            *batch_of.entry(parent).or_insert_with(|| {
                structural.push(ParentBatch::new(parent));
                structural.len() - 1
            })
        };

        for (index, difference) in differences.iter().enumerate() {
            match difference {
                Difference::Add {
                    parent,
                    new,
                    content: fragment,
                    ..
                } => {
                    let at = batch(*parent, &mut structural);
                    structural[at].adds.push((index, new, fragment));
                }
                Difference::Delete { old } => {
                    let Some(parent) = old.parent() else {
                        return Err(MergeError::DeleteRoot);
                    };
                    let at = batch(parent, &mut structural);
                    structural[at].learn_ancestors(old);
                    structural[at].deletes.push(old);
                }
                Difference::Change(change) => {
                    if change.kinds.contains(ChangeKind::Unknown) {
                        return Err(MergeError::UnknownChange {
                            identity: change.old.identity(),
                        });
                    }
                    if change.touches_content() {
                        content.push(change);
                    }
                    if change.kinds.contains(ChangeKind::Position) {
                        if let Some(parent) = change.old.parent() {
                            let at = batch(parent, &mut structural);
                            structural[at].learn_ancestors(&change.old);
                            structural[at].moves.push(change);
                        }
                    }
                }
            }
        }

        Ok(Self {
            content,
            structural,
        })
    }
}

struct Merger<'t, T: MutableTree> {
    target: &'t mut T,
    table: IdentityTable<T::Node>,
    added: Vec<(usize, T::Node)>,
}

impl<T: MutableTree> Merger<'_, T> {
    /// Find the live node for `identity`: the table first, then a walk down
    /// from the root along the recorded ancestors, then a full search.
    fn resolve(
        &mut self,
        identity: NodeIdentity,
        ancestors: Option<&[NodeIdentity]>,
    ) -> Result<T::Node, MergeError> {
        let tree = &*self.target;

        if let Some(node) = self.table.node(identity) {
            if tree.is_attached(node) && tree.identity(node) == identity {
                return Ok(node);
            }
        }

        let walked = ancestors.and_then(|ancestors| walk_down(tree, ancestors, identity));
        let found = walked.or_else(|| {
            trace!(identity, "resolve: falling back to a full search");
            tree.find_by_identity(identity)
        });

        match found {
            Some(node) => {
                self.table.record(identity, node);
                Ok(node)
            }
            None => Err(MergeError::NodeNotFound { identity }),
        }
    }

    fn note(&mut self, path: &NodePath<T::Node>) {
        self.table.record_path(&*self.target, path);
    }

    fn apply_content(&mut self, change: &Change) -> Result<(), MergeError> {
        let identity = change.old.identity();
        trace!(node = %change.old.node, kinds = ?change.kinds, "merge: content");

        if change.kinds.contains(ChangeKind::Token) {
            let token = change.token.as_deref().unwrap_or_default();
            let node = self.resolve(identity, Some(&change.old.ancestors))?;
            match self.target.kind(node) {
                NodeKind::Text => {
                    let replacement = self.target.clone_preserving_identity(node);
                    self.target.set_text(replacement, token)?;
                    let path = self.target.modify(node, replacement)?;
                    self.table.record(identity, replacement);
                    self.note(&path);
                }
                NodeKind::Element => self.replace_text_children(node, token)?,
            }
        }

        if change.kinds.contains(ChangeKind::Attribute) {
            let node = self.resolve(identity, Some(&change.old.ancestors))?;
            if self.target.kind(node) != NodeKind::Element {
                return Err(MergeError::NotAnElement { identity });
            }
            let replacement = self.target.clone_preserving_identity(node);
            apply_attribute_diffs(self.target.attributes_mut(replacement)?, &change.attributes);
            let prefix = change.new.node.prefix();
            if self.target.prefix(replacement) != prefix {
                self.target.set_prefix(replacement, prefix)?;
            }
            let path = self.target.modify(node, replacement)?;
            self.table.record(identity, replacement);
            self.note(&path);
        }

        Ok(())
    }

    /// Token change on an element: its text children are replaced by a single
    /// text node holding the new content.
    fn replace_text_children(&mut self, element: T::Node, token: &str) -> Result<(), MergeError> {
        let element_identity = self.target.identity(element);
        let texts: Vec<T::Node> = self
            .target
            .children(element)
            .filter(|&child| self.target.kind(child) == NodeKind::Text)
            .collect();
        for text in texts {
            let path = self.target.delete(text)?;
            self.note(&path);
        }

        if !token.is_empty() {
            let element = self.resolve(element_identity, None)?;
            let text = self.target.import(&Fragment::Text(token.to_owned()));
            let path = self.target.add(element, text, 0)?;
            let text_identity = self.target.identity(text);
            self.table.record(text_identity, text);
            self.table.place(text_identity, element_identity);
            self.note(&path);
        }
        Ok(())
    }

    fn apply_structure(&mut self, batch: &ParentBatch<'_>) -> Result<(), MergeError> {
        let parent_identity = batch.parent;
        trace!(
            parent = parent_identity,
            deletes = batch.deletes.len(),
            moves = batch.moves.len(),
            adds = batch.adds.len(),
            "merge: structure"
        );

        self.resolve(parent_identity, batch.parent_ancestors)?;

        for old in &batch.deletes {
            let node = self.resolve(old.identity(), Some(&old.ancestors))?;
            let path = self.target.delete(node)?;
            self.table.forget(old.identity());
            self.note(&path);
        }

        let parent = self.resolve(parent_identity, batch.parent_ancestors)?;
        let mut worksheet: Vec<NodeIdentity> = self
            .target
            .children(parent)
            .map(|child| self.target.identity(child))
            .collect();

        let subjects: HashSet<NodeIdentity> =
            batch.moves.iter().map(|change| change.old.identity()).collect();
        worksheet.retain(|identity| !subjects.contains(identity));

        enum Placement<'d> {
            Move(NodeIdentity),
            Add(usize, &'d Fragment),
        }

        let mut placements: Vec<(usize, Placement<'_>)> = batch
            .moves
            .iter()
            .map(|change| (change.new.index, Placement::Move(change.old.identity())))
            .chain(
                batch
                    .adds
                    .iter()
                    .map(|&(index, new, fragment)| (new.index, Placement::Add(index, fragment))),
            )
            .collect();
        placements.sort_by_key(|(index, _)| *index);

        for (index, placement) in placements {
            let identity = match placement {
                Placement::Move(identity) => identity,
                Placement::Add(diff_index, fragment) => {
                    let parent = self.resolve(parent_identity, batch.parent_ancestors)?;
                    let node = self.target.import(fragment);
                    let at = index.min(self.target.children(parent).count());
                    let path = self.target.add(parent, node, at)?;
                    let identity = self.target.identity(node);
                    self.table.record(identity, node);
                    self.note(&path);
                    self.added.push((diff_index, node));
                    identity
                }
            };
            self.table.place(identity, parent_identity);
            worksheet.insert(index.min(worksheet.len()), identity);
        }

        let parent = self.resolve(parent_identity, batch.parent_ancestors)?;
        let physical: Vec<NodeIdentity> = self
            .target
            .children(parent)
            .map(|child| self.target.identity(child))
            .collect();
        if physical.len() != worksheet.len() {
            return Err(MergeError::ChildCountMismatch {
                worksheet: worksheet.len(),
                live: physical.len(),
            });
        }

        let target_index: HashMap<NodeIdentity, usize> = worksheet
            .iter()
            .enumerate()
            .map(|(index, &identity)| (identity, index))
            .collect();
        let permutation = physical
            .iter()
            .map(|identity| {
                target_index
                    .get(identity)
                    .copied()
                    .ok_or(MergeError::WorksheetMismatch {
                        identity: *identity,
                    })
            })
            .collect::<Result<Vec<usize>, _>>()?;

        if permutation.iter().enumerate().any(|(i, &p)| i != p) {
            let path = self.target.reorder_children(parent, &permutation)?;
            self.note(&path);
        }

        let parent = self.resolve(parent_identity, batch.parent_ancestors)?;
        let found = self.target.identity(parent);
        if found != parent_identity {
            return Err(MergeError::ParentMismatch {
                expected: parent_identity,
                found,
            });
        }
        Ok(())
    }
}

/// Follow `ancestors` (parent first, root last) down from the root, then
/// pick the child carrying `identity`.
fn walk_down<T: DiffTree>(
    tree: &T,
    ancestors: &[NodeIdentity],
    identity: NodeIdentity,
) -> Option<T::Node> {
    let root = tree.root();
    let Some((&top, rest)) = ancestors.split_last() else {
        return (tree.identity(root) == identity).then_some(root);
    };
    if tree.identity(root) != top {
        return None;
    }

    let mut current = root;
    for &step in rest.iter().rev().chain(core::iter::once(&identity)) {
        current = tree
            .children(current)
            .find(|&child| tree.identity(child) == step)?;
    }
    Some(current)
}

/// Edit an attribute list: removals and value changes in their listed order,
/// then additions at their new positions. An addition replaces an attribute
/// of the same name.
fn apply_attribute_diffs(attributes: &mut Vec<Attribute>, diffs: &[AttributeDiff]) {
    for diff in diffs {
        match diff {
            AttributeDiff::Delete { attribute, .. } => {
                attributes.retain(|existing| existing.name != attribute.name);
            }
            AttributeDiff::Change { new, .. } => {
                match attributes.iter_mut().find(|existing| existing.name == new.name) {
                    Some(existing) => existing.value.clone_from(&new.value),
                    None => attributes.push(new.clone()),
                }
            }
            AttributeDiff::Add { .. } => {}
        }
    }

    let mut additions: Vec<(usize, &Attribute)> = diffs
        .iter()
        .filter_map(|diff| match diff {
            AttributeDiff::Add {
                attribute,
                new_position,
            } => Some((*new_position, attribute)),
            _ => None,
        })
        .collect();
    additions.sort_by_key(|(position, _)| *position);

    for (position, attribute) in additions {
        attributes.retain(|existing| existing.name != attribute.name);
        let at = position.min(attributes.len());
        attributes.insert(at, attribute.clone());
    }
}

//! Removes position changes that are only a side effect of other edits.
//!
//! Inserting one element at the front of a list shifts every later sibling by
//! one. Those siblings did not move relative to each other, so reporting them
//! as moved would make the merge reorder nodes the user never touched.
//!
//! A position is explained only when both the kind-scoped ordinal and the
//! child index are. The index replay counts every sibling regardless of kind,
//! which catches text that moved across an element.

use rapidhash::RapidHashMap as HashMap;

use crate::difference::{ChangeKind, Difference};
use crate::trace;
use crate::tree::{NodeIdentity, NodeKind};

/// Deleted old positions and added new positions among a set of siblings.
#[derive(Default)]
struct SiblingEdits {
    deleted: Vec<usize>,
    added: Vec<usize>,
}

impl SiblingEdits {
    /// Where a surviving node ends up once the deletions and additions of its
    /// siblings have been applied but nothing has moved.
    fn working_position(&self, old_position: usize, new_position: usize) -> usize {
        let deleted_before = self.deleted.partition_point(|&p| p < old_position);
        let added_before = self.added.partition_point(|&p| p < new_position);
        old_position - deleted_before + added_before
    }

    fn explains(edits: Option<&Self>, old_position: usize, new_position: usize) -> bool {
        let working = match edits {
            Some(edits) => edits.working_position(old_position, new_position),
            None => old_position,
        };
        working == new_position
    }
}

/// Clear [`ChangeKind::Position`] where the node's new place is explained
/// by additions and deletions among its siblings. Changes left without any
/// kind are dropped. The relative order of the remaining differences is kept.
pub fn optimize(differences: Vec<Difference>) -> Vec<Difference> {
    // Ordinals per (parent, bucket), child indices per parent.
    let mut ordinals: HashMap<(NodeIdentity, NodeKind), SiblingEdits> = HashMap::default();
    let mut indices: HashMap<NodeIdentity, SiblingEdits> = HashMap::default();

    for difference in &differences {
        match difference {
            Difference::Add { parent, new, .. } => {
                ordinals
                    .entry((*parent, new.node.class.bucket()))
                    .or_default()
                    .added
                    .push(new.position);
                indices.entry(*parent).or_default().added.push(new.index);
            }
            Difference::Delete { old } => {
                if let Some(parent) = old.parent() {
                    ordinals
                        .entry((parent, old.node.class.bucket()))
                        .or_default()
                        .deleted
                        .push(old.position);
                    indices.entry(parent).or_default().deleted.push(old.index);
                }
            }
            Difference::Change(_) => {}
        }
    }
    for edits in ordinals.values_mut().chain(indices.values_mut()) {
        edits.deleted.sort_unstable();
        edits.added.sort_unstable();
    }

    differences
        .into_iter()
        .filter_map(|difference| {
            let Difference::Change(mut change) = difference else {
                return Some(difference);
            };
            if !change.kinds.contains(ChangeKind::Position) {
                return Some(Difference::Change(change));
            }
            let Some(parent) = change.old.parent() else {
                return Some(Difference::Change(change));
            };

            let key = (parent, change.old.node.class.bucket());
            let ordinal_explained = SiblingEdits::explains(
                ordinals.get(&key),
                change.old.position,
                change.new.position,
            );
            let index_explained = SiblingEdits::explains(
                indices.get(&parent),
                change.old.index,
                change.new.index,
            );

            if ordinal_explained && index_explained {
                trace!(
                    node = %change.old.node,
                    from = change.old.position,
                    to = change.new.position,
                    "optimize: position explained by sibling edits"
                );
                change.kinds.remove(ChangeKind::Position);
            }

            change.is_valid().then_some(Difference::Change(change))
        })
        .collect()
}

//! # Scion
//!
//! Identity-preserving structural diff and merge for ordered, attributed trees.
//!
//! A scion is the cutting grafted onto a living rootstock: this crate computes
//! what changed between two versions of a tree and grafts those changes onto a
//! live copy of the old one, keeping every surviving node's identity.
//!
//! ## Algorithm Overview
//!
//! 1. **Correspondence**: a [`Correspondence`] oracle decides whether two
//!    nodes are the same logical node. [`AttributeIdentity`] compares element
//!    names and a set of identifying attributes; [`LineageIdentity`] compares
//!    stable identities of trees that share an ancestor.
//! 2. **Finding**: the [`find_differences`] walk pairs children parent by
//!    parent and records additions, deletions and changes (token, attribute,
//!    position).
//! 3. **Optimizing**: [`optimize`] drops position changes that are only the
//!    echo of an insertion or deletion among the same siblings.
//! 4. **Merging**: [`merge`] replays the list onto a [`MutableTree`], content
//!    first, then one structural batch per parent.
//!
//! Matching is greedy and local. No minimal edit script is attempted, and a
//! node moved to another parent is reported as deleted and re-added.
//!
//! ## Usage
//!
//! ```ignore
//! use scion::{AttributeIdentity, diff_and_apply};
//!
//! let applied = diff_and_apply(&mut live, &edited, &AttributeIdentity::default())?;
//! for difference in &applied {
//!     println!("{difference}");
//! }
//! ```

#![warn(clippy::std_instead_of_core)]

mod tracing_macros;
use tracing_macros::{debug, trace};

/// Correspondence oracles
pub mod correspondence;
/// Difference records
pub mod difference;
mod error;
/// The diff finder
pub mod finder;
/// Replaying differences onto a live tree
pub mod merge;
mod optimizer;
mod prepare;
/// Tree access traits
pub mod tree;

#[cfg(test)]
mod testing;

pub use correspondence::{AttributeIdentity, Correspondence, LineageIdentity};
pub use difference::{
    AttributeDiff, Change, ChangeKind, ChangeKinds, Difference, NodeClass, NodeInfo, NodeRef,
    diff_attributes,
};
pub use error::MergeError;
pub use finder::{DiffConfig, find_differences};
pub use merge::{IdentityTable, MergeOutcome, merge, new_ancestors, new_parent};
pub use optimizer::optimize;
pub use prepare::Preparation;
pub use tree::{
    Attribute, DiffTree, Fragment, MutableTree, NodeIdentity, NodeKind, NodePath,
};

/// Compute the differences that turn `old` into `new`, with the default
/// [`DiffConfig`].
pub fn diff<T, C>(old: &T, new: &T, oracle: &C) -> Vec<Difference>
where
    T: DiffTree,
    C: Correspondence,
{
    find_differences(old, new, oracle, &DiffConfig::default())
}

/// Diff `live` against `new` and apply the result to `live` in place.
///
/// Returns the applied differences. On error `live` may be partially updated.
pub fn diff_and_apply<T, C>(live: &mut T, new: &T, oracle: &C) -> Result<Vec<Difference>, MergeError>
where
    T: MutableTree,
    C: Correspondence,
{
    let differences = diff(&*live, new, oracle);
    debug!(count = differences.len(), "diff_and_apply");
    merge(live, &differences)?;
    Ok(differences)
}

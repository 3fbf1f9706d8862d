use facet::Facet;

use crate::tree::NodeIdentity;

/// Errors raised while replaying differences onto a live tree.
///
/// Every variant is an invariant violation: the merge stops at the first one
/// and the target tree must be considered inconsistent.
#[derive(Facet, Debug)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum MergeError {
    /// no live node carries identity {identity}
    NodeNotFound { identity: NodeIdentity },

    /// node {identity} is not an element
    NotAnElement { identity: NodeIdentity },

    /// node {identity} is not a text node
    NotAText { identity: NodeIdentity },

    /// node {identity} must be detached before it is placed
    StillAttached { identity: NodeIdentity },

    /// node {identity} cannot be placed there
    InvalidPlacement { identity: NodeIdentity },

    /// the document root cannot be deleted
    DeleteRoot,

    /// permutation has {got} entries but the parent has {expected} children
    BadPermutation { expected: usize, got: usize },

    /// worksheet holds {worksheet} children but the parent has {live}
    ChildCountMismatch { worksheet: usize, live: usize },

    /// child {identity} is missing from the worksheet
    WorksheetMismatch { identity: NodeIdentity },

    /// parent identity changed from {expected} to {found} during a batch
    ParentMismatch {
        expected: NodeIdentity,
        found: NodeIdentity,
    },

    /// change on node {identity} is structurally incompatible and cannot be applied
    UnknownChange { identity: NodeIdentity },
}

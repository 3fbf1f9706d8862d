//! Two-phase updates: compute the differences away from the live tree, apply
//! them later on the thread that owns it.

use crate::difference::Difference;

/// The result of preparing an update off the edit thread.
#[derive(Debug, Clone)]
pub enum Preparation<D, E> {
    /// No earlier snapshot existed: the parsed tree is used as-is.
    Fresh(D),
    /// Differences between the previous snapshot and the new tree. `snapshot`
    /// is the freshly built new tree. Its identities are unrelated to the live
    /// tree, so it must not be diffed against in the next round: use a clone
    /// of the live tree taken after applying the differences instead.
    Diffed {
        snapshot: D,
        differences: Vec<Difference>,
    },
    /// Preparation failed; the live tree must stay untouched.
    Failed(E),
}

impl<D, E> Preparation<D, E> {
    pub fn has_errors(&self) -> bool {
        matches!(self, Preparation::Failed(_))
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Preparation::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Differences to apply; empty for fresh and failed preparations.
    pub fn differences(&self) -> &[Difference] {
        match self {
            Preparation::Diffed { differences, .. } => differences,
            _ => &[],
        }
    }

    /// The tree produced by the preparation, if any. Only a [`Preparation::Fresh`]
    /// tree shares lineage with what the live tree becomes.
    pub fn snapshot(&self) -> Option<&D> {
        match self {
            Preparation::Fresh(snapshot) | Preparation::Diffed { snapshot, .. } => Some(snapshot),
            Preparation::Failed(_) => None,
        }
    }

    /// Split into the snapshot and its differences, or the error.
    pub fn into_result(self) -> Result<(D, Vec<Difference>), E> {
        match self {
            Preparation::Fresh(snapshot) => Ok((snapshot, Vec::new())),
            Preparation::Diffed {
                snapshot,
                differences,
            } => Ok((snapshot, differences)),
            Preparation::Failed(error) => Err(error),
        }
    }
}

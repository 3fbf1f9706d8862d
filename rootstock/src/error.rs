use facet::Facet;
use scion::MergeError;

/// Errors that can occur while parsing XML into a [`crate::Document`].
#[derive(Facet, Debug)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum ParseError {
    /// malformed XML at byte {position}: {message}
    Syntax { position: u64, message: String },

    /// document has no root element
    NoRoot,

    /// second root element at byte {position}
    MultipleRoots { position: u64 },

    /// end tag `{found}` does not close `{expected}`
    UnbalancedTag { expected: String, found: String },

    /// element `{name}` is never closed
    Unclosed { name: String },

    /// namespace prefix `{prefix}` is not declared
    UnboundPrefix { prefix: String },

    /// character data outside the root element at byte {position}
    ContentOutsideRoot { position: u64 },
}

/// Errors from the text-driven sync entry points.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// The new source did not parse; nothing was applied.
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    /// Applying the differences failed; the live document is inconsistent.
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),
}

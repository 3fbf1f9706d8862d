//! Arena XML document that receives scion diffs in place.
//!
//! rootstock provides:
//! - **Document**: an indextree arena of elements and text with stable node
//!   identities, implementing scion's tree traits
//! - **Parsing**: quick-xml based, whitespace preserving, namespace aware
//! - **Serialization**: compact XML output
//! - **Sync**: bring a live document in line with new source text while every
//!   surviving node keeps its identity, optionally in two phases across threads
//!
//! # Example
//!
//! ```rust
//! use rootstock::{Document, SyncConfig, sync};
//!
//! let mut live: Document = r#"<list><item id="a">one</item></list>"#.parse().unwrap();
//! let applied = sync(
//!     &mut live,
//!     r#"<list><item id="a">uno</item><item id="b">dos</item></list>"#,
//!     &SyncConfig::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(applied.len(), 2);
//! assert_eq!(
//!     live.to_xml(),
//!     r#"<list><item id="a">uno</item><item id="b">dos</item></list>"#
//! );
//! ```

mod tracing_macros;
use tracing_macros::{debug, trace};

pub mod dom;
mod error;
mod parser;
mod serialize;
pub mod sync;

pub use dom::{Document, ElementData, NodeData, NodeKind};
pub use error::{ParseError, SyncError};
pub use parser::parse;
pub use sync::{MatchBy, SyncConfig, apply_preparation, diff_documents, diff_str, prepare, sync};

// The core crate, for oracles and difference types
pub use scion;

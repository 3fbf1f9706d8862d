//! Text-driven updates of a live document.
//!
//! [`sync`] does everything on the calling thread. [`prepare`] splits the
//! work: parsing and diffing can run on a worker thread against a snapshot,
//! and only [`apply_preparation`] touches the live document.

use compact_str::CompactString;
use scion::{
    AttributeIdentity, DiffConfig, Difference, LineageIdentity, Preparation, find_differences,
    merge,
};

use crate::debug;
use crate::dom::Document;
use crate::error::{ParseError, SyncError};
use crate::parser::parse;

/// How nodes of the two documents are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchBy {
    /// Element name plus identifying attributes. Works for independently
    /// parsed documents.
    #[default]
    Attributes,
    /// Node identity. Only for documents that share lineage, such as a
    /// document and an edited clone of it.
    Lineage,
}

/// Configuration for diffing and syncing documents.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Attributes that tell same-named siblings apart
    pub identifying_attributes: Vec<CompactString>,
    pub match_by: MatchBy,
    /// See [`DiffConfig::optimize`]
    pub optimize: bool,
    /// See [`DiffConfig::unique_name_fallback`]
    pub unique_name_fallback: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let diff = DiffConfig::default();
        Self {
            identifying_attributes: AttributeIdentity::default()
                .identifying_attributes()
                .to_vec(),
            match_by: MatchBy::default(),
            optimize: diff.optimize,
            unique_name_fallback: diff.unique_name_fallback,
        }
    }
}

impl SyncConfig {
    fn diff_config(&self) -> DiffConfig {
        DiffConfig {
            optimize: self.optimize,
            unique_name_fallback: self.unique_name_fallback,
        }
    }
}

/// Differences that turn `old` into `new`.
pub fn diff_documents(old: &Document, new: &Document, config: &SyncConfig) -> Vec<Difference> {
    let diff_config = config.diff_config();
    match config.match_by {
        MatchBy::Attributes => {
            let oracle = AttributeIdentity::new(config.identifying_attributes.iter().cloned());
            find_differences(old, new, &oracle, &diff_config)
        }
        MatchBy::Lineage => find_differences(old, new, &LineageIdentity, &diff_config),
    }
}

/// Parse both sources and diff them.
pub fn diff_str(old: &str, new: &str, config: &SyncConfig) -> Result<Vec<Difference>, ParseError> {
    let old = parse(old)?;
    let new = parse(new)?;
    Ok(diff_documents(&old, &new, config))
}

/// Bring `live` in line with `source`, keeping the identity of every node
/// that survives. Returns the applied differences.
pub fn sync(live: &mut Document, source: &str, config: &SyncConfig) -> Result<Vec<Difference>, SyncError> {
    let new = parse(source)?;
    let differences = diff_documents(live, &new, config);
    debug!(count = differences.len(), "sync: applying");
    merge(live, &differences)?;
    Ok(differences)
}

/// Parse `source` and diff it against `snapshot`, without touching the live
/// document. Safe to run on any thread.
///
/// `snapshot` must share lineage with the live document the result will be
/// applied to: a clone of it, or the snapshot returned by
/// [`apply_preparation`].
pub fn prepare(
    snapshot: Option<&Document>,
    source: &str,
    config: &SyncConfig,
) -> Preparation<Document, SyncError> {
    let new = match parse(source) {
        Ok(doc) => doc,
        Err(err) => return Preparation::Failed(SyncError::Parse(err)),
    };
    match snapshot {
        None => Preparation::Fresh(new),
        Some(previous) => {
            let differences = diff_documents(previous, &new, config);
            debug!(count = differences.len(), "prepare: diffed");
            Preparation::Diffed {
                snapshot: new,
                differences,
            }
        }
    }
}

/// Apply a preparation to the live document. A fresh preparation replaces
/// the live document outright.
///
/// Returns the snapshot to pass to the next [`prepare`], and the differences
/// that were applied. The snapshot is a clone of the updated live document,
/// so the next round's differences name nodes that exist in `live`.
pub fn apply_preparation(
    preparation: Preparation<Document, SyncError>,
    live: &mut Document,
) -> Result<(Document, Vec<Difference>), SyncError> {
    match preparation {
        Preparation::Fresh(parsed) => {
            *live = parsed;
            Ok((live.clone(), Vec::new()))
        }
        Preparation::Diffed { differences, .. } => {
            merge(live, &differences)?;
            Ok((live.clone(), differences))
        }
        Preparation::Failed(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.identifying_attributes, vec!["id", "name", "ref"]);
        assert_eq!(config.match_by, MatchBy::Attributes);
        assert!(config.optimize);
        assert!(config.unique_name_fallback);
    }

    #[test]
    fn test_sync_updates_in_place() {
        let mut live = parse(r#"<r><a id="1">x</a><b/></r>"#).unwrap();
        let a = live.element(&[0]).unwrap();
        let a_identity = scion::DiffTree::identity(&live, a);

        sync(&mut live, r#"<r><a id="1">y</a><b/><c/></r>"#, &SyncConfig::default()).unwrap();

        assert_eq!(live.to_xml(), r#"<r><a id="1">y</a><b/><c/></r>"#);
        let a = live.element(&[0]).unwrap();
        assert_eq!(scion::DiffTree::identity(&live, a), a_identity);
    }

    #[test]
    fn test_sync_parse_error_leaves_live_untouched() {
        let mut live = parse("<r><a/></r>").unwrap();
        let err = sync(&mut live, "<r><a></r>", &SyncConfig::default()).unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
        assert_eq!(live.to_xml(), "<r><a/></r>");
    }

    #[test]
    fn test_sync_error_wraps_its_source() {
        let mut live = parse("<r/>").unwrap();
        let err = sync(&mut live, "<r>", &SyncConfig::default()).unwrap_err();
        assert!(err.to_string().starts_with("parse failed: "), "{err}");
        assert!(core::error::Error::source(&err).is_some());

        let merge: SyncError = scion::MergeError::DeleteRoot.into();
        assert!(matches!(merge, SyncError::Merge(scion::MergeError::DeleteRoot)));
    }

    #[test]
    fn test_lineage_diff_of_edited_clone() {
        let old = parse("<r><a/><b/></r>").unwrap();
        let mut new = old.clone();
        let b = new.element(&[1]).unwrap();
        new.append_text(b, "hello");

        let config = SyncConfig {
            match_by: MatchBy::Lineage,
            ..SyncConfig::default()
        };
        let diffs = diff_documents(&old, &new, &config);
        assert_eq!(diffs.len(), 1, "{diffs:?}");
        assert_eq!(diffs[0].as_change().unwrap().token.as_deref(), Some("hello"));
    }
}

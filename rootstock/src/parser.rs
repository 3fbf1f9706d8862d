//! XML parser that builds a [`Document`] using quick-xml's streaming reader.
//!
//! Whitespace is kept exactly as written. Adjacent text and CDATA sections
//! become one text node. Comments, processing instructions and the doctype are
//! skipped. Namespace declarations stay on the element as ordinary attributes
//! and are also used to resolve element prefixes.

use compact_str::CompactString;
use indextree::NodeId;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::debug;
use crate::dom::{Document, ElementData, NodeData, NodeKind, fresh_identity};
use crate::error::ParseError;
use scion::Attribute;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Parse an XML string into a document.
pub fn parse(xml: &str) -> Result<Document, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text_start = false;
    reader.config_mut().trim_text_end = false;
    // Mismatched end tags are reported as `UnbalancedTag` below.
    reader.config_mut().check_end_names = false;

    let mut builder = Builder::default();
    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| ParseError::Syntax {
            position,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let element = builder.open(&e, position)?;
                builder.stack.push(element);
            }
            Event::Empty(e) => {
                builder.open(&e, position)?;
                builder.scopes.pop();
            }
            Event::End(e) => {
                builder.flush_text(position)?;
                let found = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let Some(open) = builder.stack.pop() else {
                    return Err(ParseError::UnbalancedTag {
                        expected: String::new(),
                        found,
                    });
                };
                let expected = builder.qualified_name(open);
                if expected != found {
                    return Err(ParseError::UnbalancedTag { expected, found });
                }
                builder.scopes.pop();
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| ParseError::Syntax {
                    position,
                    message: err.to_string(),
                })?;
                builder.pending.push_str(&text);
            }
            Event::CData(e) => {
                let text = core::str::from_utf8(&e).map_err(|err| ParseError::Syntax {
                    position,
                    message: err.to_string(),
                })?;
                builder.pending.push_str(text);
            }
            Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    builder.flush_text(reader.buffer_position() as u64)?;
    if let Some(open) = builder.stack.last() {
        return Err(ParseError::Unclosed {
            name: builder.qualified_name(*open),
        });
    }
    let doc = builder.doc.ok_or(ParseError::NoRoot)?;
    debug!(nodes = doc.node_count(), "parsed document");
    Ok(doc)
}

impl core::str::FromStr for Document {
    type Err = ParseError;

    fn from_str(xml: &str) -> Result<Self, Self::Err> {
        parse(xml)
    }
}

/// One namespace declaration: prefix (`None` for the default namespace) to URI.
/// An empty URI undeclares the default namespace.
type Declaration = (Option<CompactString>, CompactString);

#[derive(Default)]
struct Builder {
    doc: Option<Document>,
    stack: Vec<NodeId>,
    /// Declarations made by each open element, innermost last
    scopes: Vec<Vec<Declaration>>,
    pending: String,
}

impl Builder {
    fn qualified_name(&self, node: NodeId) -> String {
        self.doc
            .as_ref()
            .and_then(|doc| doc.element_data(node))
            .map(|elem| elem.qualified_name().to_string())
            .unwrap_or_default()
    }

    fn resolve(&self, prefix: Option<&str>) -> Result<Option<CompactString>, ParseError> {
        if prefix == Some("xml") {
            return Ok(Some(CompactString::from(XML_NAMESPACE)));
        }
        let declared = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(declared, _)| declared.as_deref() == prefix);

        match (declared, prefix) {
            (Some((_, uri)), _) if uri.is_empty() => Ok(None),
            (Some((_, uri)), _) => Ok(Some(uri.clone())),
            (None, None) => Ok(None),
            (None, Some(prefix)) => Err(ParseError::UnboundPrefix {
                prefix: prefix.to_owned(),
            }),
        }
    }

    /// Create the element for a start or empty tag and attach it. Pushes the
    /// element's namespace scope; the caller pops it when the element closes.
    fn open(&mut self, start: &BytesStart<'_>, position: u64) -> Result<NodeId, ParseError> {
        self.flush_text(position)?;

        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut element = ElementData::new(&name);
        let mut scope = Vec::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|err| ParseError::Syntax {
                position,
                message: err.to_string(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| ParseError::Syntax {
                    position,
                    message: err.to_string(),
                })?
                .into_owned();

            if key == "xmlns" {
                scope.push((None, CompactString::from(value.as_str())));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.push((Some(CompactString::from(prefix)), CompactString::from(value.as_str())));
            }
            element.attributes.push(Attribute::new(key, value));
        }

        self.scopes.push(scope);
        element.namespace = self.resolve(element.prefix.as_deref())?;

        if self.doc.is_none() {
            let doc = Document::with_root(element);
            let root = doc.root;
            self.doc = Some(doc);
            return Ok(root);
        }
        let (Some(doc), Some(&parent)) = (self.doc.as_mut(), self.stack.last()) else {
            return Err(ParseError::MultipleRoots { position });
        };
        let node = doc.arena.new_node(NodeData {
            identity: fresh_identity(),
            kind: NodeKind::Element(element),
        });
        parent.append(node, &mut doc.arena);
        Ok(node)
    }

    /// Turn accumulated character data into a text node under the open element.
    fn flush_text(&mut self, position: u64) -> Result<(), ParseError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let text = core::mem::take(&mut self.pending);

        match (&mut self.doc, self.stack.last()) {
            (Some(doc), Some(&parent)) => {
                doc.append_text(parent, &text);
                Ok(())
            }
            // Formatting around the document element
            _ if text.chars().all(char::is_whitespace) => Ok(()),
            _ => Err(ParseError::ContentOutsideRoot { position }),
        }
    }
}

//! Compact XML serialization.

use indextree::NodeId;

use crate::dom::{Document, ElementData, NodeKind};

impl Document {
    /// Serialize the tree reachable from the root. Attributes keep their
    /// stored order; childless elements are written as `<x/>`.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_node(&mut out, self.root);
        out
    }

    /// Serialize one subtree.
    pub fn node_to_xml(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(&mut out, node);
        out
    }

    fn write_node(&self, out: &mut String, node: NodeId) {
        match &self.get(node).kind {
            NodeKind::Element(elem) => self.write_element(out, node, elem),
            NodeKind::Text(text) => escape_text(out, text),
        }
    }

    fn write_element(&self, out: &mut String, node: NodeId, elem: &ElementData) {
        let name = elem.qualified_name();
        out.push('<');
        out.push_str(&name);

        for attr in &elem.attributes {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            escape_attribute(out, &attr.value);
            out.push('"');
        }

        let mut children = node.children(&self.arena).peekable();
        if children.peek().is_none() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        for child in children {
            self.write_node(out, child);
        }
        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("&#10;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;
    use facet_testhelpers::test;

    #[test]
    fn test_to_xml_roundtrips_source() {
        let src = "<r a=\"1\">\n  <x/>\n  <y k=\"&lt;&amp;&quot;\">t &amp; u</y>\n</r>";
        let doc = parse(src).unwrap();
        assert_eq!(doc.to_xml(), src);
    }

    #[test]
    fn test_empty_element_is_self_closing() {
        let doc = parse("<r><a></a></r>").unwrap();
        assert_eq!(doc.to_xml(), "<r><a/></r>");
    }

    #[test]
    fn test_prefixed_names() {
        let doc = parse(r#"<s:r xmlns:s="urn:s"><s:a>x</s:a></s:r>"#).unwrap();
        assert_eq!(doc.to_xml(), r#"<s:r xmlns:s="urn:s"><s:a>x</s:a></s:r>"#);
    }

    #[test]
    fn test_subtree() {
        let doc = parse("<r><a><b/></a></r>").unwrap();
        let a = doc.element(&[0]).unwrap();
        assert_eq!(doc.node_to_xml(a), "<a><b/></a>");
    }
}

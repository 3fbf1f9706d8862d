//! A minimal read-only tree for unit tests of the finder and the oracles.

use core::sync::atomic::{AtomicU64, Ordering};

use compact_str::CompactString;

use crate::tree::{Attribute, DiffTree, NodeIdentity, NodeKind};

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

fn fresh_identity() -> NodeIdentity {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
struct TestNode {
    identity: NodeIdentity,
    kind: NodeKind,
    name: CompactString,
    text: Option<String>,
    attributes: Vec<Attribute>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Vec-backed tree. Node handles are indices; identities are unique across
/// every tree built in the test binary unless set explicitly.
#[derive(Debug, Clone)]
pub(crate) struct TestTree {
    nodes: Vec<TestNode>,
}

impl TestTree {
    pub(crate) fn new(root: &str, attributes: &[(&str, &str)]) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.push(None, NodeKind::Element, root, None, attributes);
        tree
    }

    fn push(
        &mut self,
        parent: Option<usize>,
        kind: NodeKind,
        name: &str,
        text: Option<&str>,
        attributes: &[(&str, &str)],
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TestNode {
            identity: fresh_identity(),
            kind,
            name: name.into(),
            text: text.map(str::to_owned),
            attributes: attributes
                .iter()
                .map(|(name, value)| Attribute::new(*name, *value))
                .collect(),
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        index
    }

    pub(crate) fn push_element(
        &mut self,
        parent: usize,
        name: &str,
        attributes: &[(&str, &str)],
    ) -> usize {
        self.push(Some(parent), NodeKind::Element, name, None, attributes)
    }

    pub(crate) fn push_text(&mut self, parent: usize, text: &str) -> usize {
        self.push(Some(parent), NodeKind::Text, "", Some(text), &[])
    }

    pub(crate) fn child(&self, parent: usize, index: usize) -> usize {
        self.nodes[parent].children[index]
    }

    pub(crate) fn identity_of(&self, node: usize) -> NodeIdentity {
        self.nodes[node].identity
    }

    pub(crate) fn set_identity(&mut self, node: usize, identity: NodeIdentity) {
        self.nodes[node].identity = identity;
    }

    pub(crate) fn set_text_value(&mut self, node: usize, text: &str) {
        self.nodes[node].text = Some(text.to_owned());
    }
}

impl DiffTree for TestTree {
    type Node = usize;

    fn root(&self) -> usize {
        0
    }

    fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].parent
    }

    fn children(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[node].children.iter().copied()
    }

    fn kind(&self, node: usize) -> NodeKind {
        self.nodes[node].kind
    }

    fn local_name(&self, node: usize) -> &str {
        &self.nodes[node].name
    }

    fn prefix(&self, _node: usize) -> Option<&str> {
        None
    }

    fn namespace(&self, _node: usize) -> Option<&str> {
        None
    }

    fn text(&self, node: usize) -> Option<&str> {
        self.nodes[node].text.as_deref()
    }

    fn attributes(&self, node: usize) -> &[Attribute] {
        &self.nodes[node].attributes
    }

    fn identity(&self, node: usize) -> NodeIdentity {
        self.nodes[node].identity
    }

    fn is_attached(&self, node: usize) -> bool {
        node < self.nodes.len()
    }
}

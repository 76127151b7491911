mod data;
mod parse;

pub mod diff;
pub mod serializer;

pub use self::data::{DataParsoid, DiffMarks, LoadOptions, NodeData};
pub use self::parse::DomParseError;

use self::data::DataStore;
use std::fmt;

/// Index of a node inside its owning [`Document`] arena. IDs are never
/// reused; a detached node stays in the arena until the document is
/// dropped.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomAttr {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub name: String,
    pub attrs: Vec<DomAttr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) data_id: Option<usize>,
}

/// An arena-backed document tree plus the side-band data store its
/// nodes index into. The store lives and dies with the document.
#[derive(Debug)]
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    pub(crate) store: DataStore,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
                data_id: None,
            }],
            store: DataStore::default(),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());

        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
            data_id: None,
        });

        id
    }

    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Element(ElementData {
            name: name.into(),
            attrs: Vec::new(),
        }))
    }

    pub fn create_element_with_attrs(
        &mut self,
        name: impl Into<String>,
        attrs: &[(&str, &str)],
    ) -> NodeId {
        let node = self.create_element(name);

        for (attr_name, value) in attrs {
            self.set_attr(node, attr_name, *value);
        }

        node
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, data: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Comment(data.into()))
    }

    #[inline]
    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    #[inline]
    pub fn kind_mut(&mut self, node: NodeId) -> &mut NodeKind {
        &mut self.nodes[node.0].kind
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.kind(node), NodeKind::Element(_))
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            NodeKind::Element(el) => Some(el.name.as_str()),
            _ => None,
        }
    }

    pub fn is_element_named(&self, node: NodeId, name: &str) -> bool {
        self.tag_name(node) == Some(name)
    }

    pub fn text_content(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    #[inline]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).first().copied()
    }

    pub fn index_in_parent(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;

        self.children(parent).iter().position(|&c| c == node)
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let idx = self.index_in_parent(node)?;

        if idx == 0 {
            None
        } else {
            Some(self.children(self.parent(node)?)[idx - 1])
        }
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let idx = self.index_in_parent(node)?;

        self.children(parent).get(idx + 1).copied()
    }

    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            let children = &mut self.nodes[parent.0].children;

            if let Some(idx) = children.iter().position(|&c| c == node) {
                children.remove(idx);
            }
        }
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        assert!(parent != child, "A node can't be its own child.");

        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Inserts `child` as the `idx`-th child of `parent`.
    pub fn insert_at(&mut self, parent: NodeId, idx: usize, child: NodeId) {
        assert!(parent != child, "A node can't be its own child.");

        self.detach(child);

        let len = self.nodes[parent.0].children.len();
        let idx = idx.min(len);

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(idx, child);
    }

    pub fn attrs(&self, node: NodeId) -> &[DomAttr] {
        match self.kind(node) {
            NodeKind::Element(el) => &el.attrs,
            _ => &[],
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attrs(node)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();

        if let NodeKind::Element(el) = self.kind_mut(node) {
            if let Some(attr) = el.attrs.iter_mut().find(|a| a.name == name) {
                attr.value = value;
            } else {
                el.attrs.push(DomAttr {
                    name: name.to_string(),
                    value,
                });
            }
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element(el) = self.kind_mut(node) {
            if let Some(idx) = el.attrs.iter().position(|a| a.name == name) {
                return Some(el.attrs.remove(idx).value);
            }
        }

        None
    }

    pub fn about(&self, node: NodeId) -> Option<&str> {
        self.attr(node, "about")
    }

    pub fn typeof_contains(&self, node: NodeId, value: &str) -> bool {
        self.attr(node, "typeof")
            .map(|t| t.split_ascii_whitespace().any(|v| v == value))
            .unwrap_or(false)
    }

    pub fn typeof_starts_with(&self, node: NodeId, prefix: &str) -> bool {
        self.attr(node, "typeof")
            .map(|t| t.split_ascii_whitespace().any(|v| v.starts_with(prefix)))
            .unwrap_or(false)
    }

    /// First element of an `about`-group carrying the encapsulation
    /// `typeof` and the `data-mw` payload.
    pub fn is_encapsulation_wrapper(&self, node: NodeId) -> bool {
        if self.about(node).is_none() {
            return false;
        }

        self.attr(node, "typeof")
            .map(|t| {
                t.split_ascii_whitespace().any(|v| {
                    v == "mw:Transclusion"
                        || v.starts_with("mw:Transclusion/")
                        || v.starts_with("mw:Extension/")
                })
            })
            .unwrap_or(false)
    }

    /// Pre-order traversal of the subtree rooted at `node`, excluding
    /// `node` itself.
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(node).to_vec();

        stack.reverse();

        Descendants { doc: self, stack }
    }

    /// Body element of a full document tree, if there is one.
    pub fn body(&self) -> Option<NodeId> {
        let html = self
            .children(self.root())
            .iter()
            .copied()
            .find(|&n| self.is_element_named(n, "html"))?;

        self.children(html)
            .iter()
            .copied()
            .find(|&n| self.is_element_named(n, "body"))
    }
}

pub struct Descendants<'d> {
    doc: &'d Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;

        for &child in self.doc.children(node).iter().rev() {
            self.stack.push(child);
        }

        Some(node)
    }
}

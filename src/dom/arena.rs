//! Arena-backed document tree
//!
//! All nodes live in one vector; links are indices into it. Several
//! documents may share an arena so that a frame element can point at the
//! document it embeds.

use std::collections::HashMap;

use super::xml::{self, DocumentError};
use super::{DocumentTree, DocumentTreeMut, NodeKind};

/// Index of a node within an [`ArenaDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Document,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }
}

/// Mutable in-memory document tree
#[derive(Debug, Clone)]
pub struct ArenaDocument {
    nodes: Vec<Node>,
    document: NodeId,
    /// Frame element -> embedded document node
    frames: HashMap<NodeId, NodeId>,
}

impl Default for ArenaDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaDocument {
    /// Create an arena holding one empty document
    pub fn new() -> Self {
        let mut arena = Self {
            nodes: Vec::new(),
            document: NodeId(0),
            frames: HashMap::new(),
        };
        arena.document = arena.alloc(NodeData::Document);
        arena
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(data));
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    /// The main document node
    pub fn document(&self) -> NodeId {
        self.document
    }

    /// First element child of a document node
    pub fn root_element(&self, document: NodeId) -> Option<NodeId> {
        self.children(document)
            .into_iter()
            .find(|&child| self.kind(child) == NodeKind::Element)
    }

    /// Allocate an additional, empty document node
    pub fn create_document(&mut self) -> NodeId {
        self.alloc(NodeData::Document)
    }

    /// Allocate a detached element
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.alloc(NodeData::Element {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    pub(crate) fn create_element_owned(
        &mut self,
        name: String,
        attrs: Vec<(String, String)>,
    ) -> NodeId {
        self.alloc(NodeData::Element { name, attrs })
    }

    pub(crate) fn create_comment(&mut self, text: String) -> NodeId {
        self.alloc(NodeData::Comment(text))
    }

    /// Append a detached node as the last child of `parent`
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last = self.node(parent).last_child;
        {
            let node = self.node_mut(child);
            node.parent = Some(parent);
            node.prev_sibling = last;
            node.next_sibling = None;
        }
        match last {
            Some(last) => self.node_mut(last).next_sibling = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(parent).last_child = Some(child);
    }

    /// Parse `xhtml` into a new document of this arena and attach it to `frame`
    pub fn embed_document(&mut self, frame: NodeId, xhtml: &str) -> Result<NodeId, DocumentError> {
        let document = self.create_document();
        xml::parse_into(self, document, xhtml)?;
        self.frames.insert(frame, document);
        Ok(document)
    }

    /// All nodes below `node`, in document order (not crossing frames)
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).into_iter().rev());
        }
        out
    }

    /// First element of the main document carrying the given id
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.document)
            .into_iter()
            .find(|&node| self.kind(node) == NodeKind::Element && self.id(node) == Some(id))
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }
}

impl DocumentTree for ArenaDocument {
    type Node = NodeId;

    fn kind(&self, node: NodeId) -> NodeKind {
        match self.data(node) {
            NodeData::Document => NodeKind::Document,
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Other,
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.node(node).first_child;
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.node(child).next_sibling;
        }
        out
    }

    fn local_name(&self, node: NodeId) -> Option<&str> {
        match self.data(node) {
            NodeData::Element { name, .. } => {
                Some(name.rsplit(':').next().unwrap_or(name.as_str()))
            }
            _ => None,
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.data(node) {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match self.data(node) {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    fn content_document(&self, node: NodeId) -> Option<NodeId> {
        self.frames.get(&node).copied()
    }
}

impl DocumentTreeMut for ArenaDocument {
    fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    fn set_text(&mut self, node: NodeId, text: String) {
        if let NodeData::Text(current) = &mut self.node_mut(node).data {
            *current = text;
        }
    }

    fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.node(reference).parent else {
            return;
        };
        let prev = self.node(reference).prev_sibling;
        {
            let new = self.node_mut(node);
            new.parent = Some(parent);
            new.prev_sibling = prev;
            new.next_sibling = Some(reference);
        }
        self.node_mut(reference).prev_sibling = Some(node);
        match prev {
            Some(prev) => self.node_mut(prev).next_sibling = Some(node),
            None => self.node_mut(parent).first_child = Some(node),
        }
    }

    fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.node(reference).parent else {
            return;
        };
        let next = self.node(reference).next_sibling;
        {
            let new = self.node_mut(node);
            new.parent = Some(parent);
            new.prev_sibling = Some(reference);
            new.next_sibling = next;
        }
        self.node_mut(reference).next_sibling = Some(node);
        match next {
            Some(next) => self.node_mut(next).prev_sibling = Some(node),
            None => self.node_mut(parent).last_child = Some(node),
        }
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.node(node).parent else {
            return;
        };
        let prev = self.node(node).prev_sibling;
        let next = self.node(node).next_sibling;
        match prev {
            Some(prev) => self.node_mut(prev).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        let detached = self.node_mut(node);
        detached.parent = None;
        detached.prev_sibling = None;
        detached.next_sibling = None;
    }
}

//! Host tree abstraction
//!
//! The CFI engine never owns document nodes. It walks whatever tree the host
//! hands it through the [`DocumentTree`] capability set, and mutates it only
//! through [`DocumentTreeMut`] when a marker is injected.
//!
//! [`ArenaDocument`] is the in-crate implementation used by the bridge
//! service and the tests; it is populated from XHTML by [`xml::parse_xhtml`].

mod arena;
pub mod xml;

use std::fmt;

pub use arena::{ArenaDocument, NodeId};
pub use xml::{parse_xhtml, serialize, DocumentError};

/// Node kinds the engine can discriminate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A document node (owner of a root element)
    Document,
    /// An element node
    Element,
    /// A text node (CDATA is folded into text)
    Text,
    /// Anything else (comments, processing instructions); ignored by CFI
    Other,
}

/// Read access to a host document tree
pub trait DocumentTree {
    /// Handle to a node owned by the host
    type Node: Copy + Eq + fmt::Debug;

    /// Kind of a node
    fn kind(&self, node: Self::Node) -> NodeKind;

    /// Parent of a node, `None` for document nodes and detached nodes
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Children in document order
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Local tag name of an element
    fn local_name(&self, node: Self::Node) -> Option<&str>;

    /// Attribute value of an element
    fn attribute(&self, node: Self::Node, name: &str) -> Option<&str>;

    /// Character data of a text node
    fn text(&self, node: Self::Node) -> Option<&str>;

    /// Document embedded by a frame-like element, if any
    fn content_document(&self, _node: Self::Node) -> Option<Self::Node> {
        None
    }

    fn id(&self, node: Self::Node) -> Option<&str> {
        self.attribute(node, "id")
    }

    fn has_class(&self, node: Self::Node, class: &str) -> bool {
        self.attribute(node, "class")
            .map(|classes| classes.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Length of a text node in UTF-16 code units, the unit CFI offsets
    /// are counted in
    fn text_len(&self, node: Self::Node) -> usize {
        self.text(node).map(utf16_len).unwrap_or(0)
    }

    /// Short human-readable description used in error diagnostics
    fn describe(&self, node: Self::Node) -> String {
        match self.kind(node) {
            NodeKind::Document => "#document".to_string(),
            NodeKind::Text => "#text".to_string(),
            NodeKind::Other => "#other".to_string(),
            NodeKind::Element => {
                let name = self.local_name(node).unwrap_or("?");
                match self.id(node) {
                    Some(id) => format!("<{}#{}>", name, id),
                    None => format!("<{}>", name),
                }
            }
        }
    }
}

/// Structural mutations needed by the marker injector
pub trait DocumentTreeMut: DocumentTree {
    /// Create a detached text node
    fn create_text(&mut self, text: &str) -> Self::Node;

    /// Replace the character data of a text node
    fn set_text(&mut self, node: Self::Node, text: String);

    /// Insert a detached node as the previous sibling of `reference`
    fn insert_before(&mut self, reference: Self::Node, node: Self::Node);

    /// Insert a detached node as the next sibling of `reference`
    fn insert_after(&mut self, reference: Self::Node, node: Self::Node);

    /// Remove a node (and its subtree) from its parent
    fn detach(&mut self, node: Self::Node);
}

/// Length of `text` in UTF-16 code units
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Byte index of the position `units` UTF-16 code units into `text`, or
/// `None` past the end. A position inside a surrogate pair rounds down to
/// the start of its character.
pub(crate) fn utf16_to_byte(text: &str, units: usize) -> Option<usize> {
    let mut consumed = 0;
    for (i, ch) in text.char_indices() {
        let next = consumed + ch.len_utf16();
        if next > units {
            return Some(i);
        }
        consumed = next;
    }
    (consumed == units).then_some(text.len())
}

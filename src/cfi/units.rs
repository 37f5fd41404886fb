//! Logical units of a node's children
//!
//! Marker injection splits one text node into several physical ones. To keep
//! indices stable, children are grouped in two passes: filter, then merge
//! every run of adjacent text nodes into a single logical run.

use crate::dom::{DocumentTree, NodeKind};

use super::blacklist::Blacklist;
use super::error::{CfiError, Result};

/// One addressable child position
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Unit<N> {
    Element(N),
    Text(Vec<N>),
}

/// A non-empty logical text run and the number of elements before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextRun<N> {
    pub slot: usize,
    pub nodes: Vec<N>,
}

/// Element children that survive the blacklist
pub(crate) fn filtered_elements<T: DocumentTree>(
    tree: &T,
    node: T::Node,
    blacklist: &Blacklist,
) -> Vec<T::Node> {
    tree.children(node)
        .into_iter()
        .filter(|&child| tree.kind(child) == NodeKind::Element && !blacklist.excludes(tree, child))
        .collect()
}

/// Filtered children grouped into elements and merged text runs
pub(crate) fn logical_units<T: DocumentTree>(
    tree: &T,
    node: T::Node,
    blacklist: &Blacklist,
) -> Vec<Unit<T::Node>> {
    // First pass: keep indexable nodes only.
    let filtered = tree.children(node).into_iter().filter(|&child| match tree.kind(child) {
        NodeKind::Text => true,
        NodeKind::Element => !blacklist.excludes(tree, child),
        NodeKind::Document | NodeKind::Other => false,
    });

    // Second pass: merge adjacent text nodes.
    let mut units: Vec<Unit<T::Node>> = Vec::new();
    for child in filtered {
        if tree.kind(child) == NodeKind::Text {
            if let Some(Unit::Text(run)) = units.last_mut() {
                run.push(child);
                continue;
            }
            units.push(Unit::Text(vec![child]));
        } else {
            units.push(Unit::Element(child));
        }
    }
    units
}

/// Non-empty text runs of `node`, each tagged with its slot. A run made
/// only of empty text nodes does not occupy its slot.
pub(crate) fn text_runs<T: DocumentTree>(
    tree: &T,
    node: T::Node,
    blacklist: &Blacklist,
) -> Vec<TextRun<T::Node>> {
    let mut slot = 0;
    let mut runs = Vec::new();
    for unit in logical_units(tree, node, blacklist) {
        match unit {
            Unit::Element(_) => slot += 1,
            Unit::Text(nodes) if run_len(tree, &nodes) > 0 => runs.push(TextRun { slot, nodes }),
            Unit::Text(_) => {}
        }
    }
    runs
}

/// Concatenated character data of a run
pub(crate) fn run_text<T: DocumentTree>(tree: &T, nodes: &[T::Node]) -> String {
    nodes.iter().filter_map(|&node| tree.text(node)).collect()
}

/// Total length of a run in UTF-16 code units
pub(crate) fn run_len<T: DocumentTree>(tree: &T, nodes: &[T::Node]) -> usize {
    nodes.iter().map(|&node| tree.text_len(node)).sum()
}

/// Map an offset into the visible text content of `element` to a text node
/// and a local offset. Text inside blacklisted subtrees is not counted. An
/// offset on the boundary of two text nodes resolves to the end of the
/// earlier one.
pub fn text_position_in<T: DocumentTree>(
    tree: &T,
    element: T::Node,
    offset: usize,
    blacklist: &Blacklist,
) -> Result<(T::Node, usize)> {
    let mut consumed = 0;
    let mut stack: Vec<T::Node> = tree.children(element).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        match tree.kind(node) {
            NodeKind::Text => {
                let len = tree.text_len(node);
                if len > 0 && offset <= consumed + len {
                    return Ok((node, offset - consumed));
                }
                consumed += len;
            }
            NodeKind::Element if !blacklist.excludes(tree, node) => {
                stack.extend(tree.children(node).into_iter().rev());
            }
            _ => {}
        }
    }
    Err(CfiError::OutOfRange {
        target_index: offset,
        max_index: Some(consumed),
    })
}

//! Marker injection
//!
//! Places a host-created marker element at a logical offset inside a text
//! run, splitting a physical text node when the offset falls inside it.
//! Markers are expected to be blacklisted so that existing CFIs keep
//! resolving to the same logical positions.

use crate::dom::{utf16_to_byte, DocumentTreeMut, NodeKind};

use super::error::{CfiError, Result};
use super::resolver::TextPosition;

/// Insert `marker` at `offset` UTF-16 code units into `run`. Returns the parent of
/// the run.
pub fn inject_marker<T: DocumentTreeMut>(
    tree: &mut T,
    run: &[T::Node],
    offset: usize,
    marker: T::Node,
) -> Result<T::Node> {
    let first = *run
        .first()
        .ok_or_else(|| CfiError::text_terminus("cannot inject a marker into an empty text run"))?;
    let parent = tree.parent(first).ok_or_else(|| CfiError::NodeType {
        node: tree.describe(first),
        expected: "a node attached to a document",
    })?;

    if offset == 0 {
        tree.insert_before(first, marker);
        tracing::debug!(offset, "marker injected before text run");
        return Ok(parent);
    }

    let mut consumed = 0;
    for &node in run {
        let end = consumed + tree.text_len(node);
        if end == offset {
            tree.insert_after(node, marker);
            tracing::debug!(offset, "marker injected after text node");
            return Ok(parent);
        }
        if end > offset {
            let text = tree.text(node).unwrap_or_default().to_string();
            let split = utf16_to_byte(&text, offset - consumed).unwrap_or(text.len());
            let (head, tail) = text.split_at(split);
            let tail = tree.create_text(tail);
            tree.set_text(node, head.to_string());
            tree.insert_after(node, tail);
            tree.insert_after(node, marker);
            tracing::debug!(offset, local = offset - consumed, "marker injected by splitting text node");
            return Ok(parent);
        }
        consumed = end;
    }

    Err(CfiError::text_terminus(format!(
        "offset {} exceeds text length {}",
        offset, consumed
    )))
}

/// Insert `marker` at a resolved text position
pub fn inject_marker_at<T: DocumentTreeMut>(
    tree: &mut T,
    position: &TextPosition<T::Node>,
    marker: T::Node,
) -> Result<T::Node> {
    inject_marker(tree, &position.nodes, position.offset.unwrap_or(0), marker)
}

/// Detach `marker` and join the text nodes it separated
pub fn remove_marker<T: DocumentTreeMut>(tree: &mut T, marker: T::Node) {
    let Some(parent) = tree.parent(marker) else {
        return;
    };
    let siblings = tree.children(parent);
    let Some(at) = siblings.iter().position(|&node| node == marker) else {
        return;
    };
    tree.detach(marker);

    let (Some(&before), Some(&after)) = (
        at.checked_sub(1).and_then(|i| siblings.get(i)),
        siblings.get(at + 1),
    ) else {
        return;
    };
    if tree.kind(before) == NodeKind::Text && tree.kind(after) == NodeKind::Text {
        let joined = format!(
            "{}{}",
            tree.text(before).unwrap_or_default(),
            tree.text(after).unwrap_or_default()
        );
        tree.set_text(before, joined);
        tree.detach(after);
    }
}

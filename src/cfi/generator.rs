//! CFI Generator
//!
//! Generates CFI paths from element and text positions in a host tree, and
//! builds paths programmatically.

use crate::dom::{DocumentTree, NodeKind};

use super::blacklist::Blacklist;
use super::error::{CfiError, Result};
use super::types::*;
use super::units::{filtered_elements, text_runs};

/// Where upward path generation stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Stop below the content document's root element and prefix `!`
    ContentDocumentRoot,
    /// Stop below the package document's root element, no indirection
    PackageDocumentRoot,
}

/// Generates paths over a tree with a fixed blacklist
pub struct Generator<'a, T: DocumentTree> {
    tree: &'a T,
    blacklist: &'a Blacklist,
}

impl<'a, T: DocumentTree> Generator<'a, T> {
    pub fn new(tree: &'a T, blacklist: &'a Blacklist) -> Self {
        Self { tree, blacklist }
    }

    /// Element steps from the root element down to `element`
    pub fn element_steps(&self, element: T::Node, boundary: Boundary) -> Result<CfiPath> {
        if self.tree.kind(element) != NodeKind::Element {
            return Err(CfiError::NodeType {
                node: self.tree.describe(element),
                expected: "an element",
            });
        }

        let mut steps = Vec::new();
        let mut current = element;
        loop {
            let parent = self.tree.parent(current).ok_or_else(|| CfiError::NodeType {
                node: self.tree.describe(current),
                expected: "a node attached to a document",
            })?;
            if self.tree.kind(parent) == NodeKind::Document {
                if self.blacklist.excludes(self.tree, current) {
                    return Err(self.excluded(current));
                }
                break;
            }

            let position = filtered_elements(self.tree, parent, self.blacklist)
                .into_iter()
                .position(|sibling| sibling == current)
                .ok_or_else(|| self.excluded(current))?;
            let index = ((position + 1) * 2) as u32;
            steps.push(match self.tree.id(current) {
                Some(id) => CfiStep::index_with_id(index, id),
                None => CfiStep::index(index),
            });
            current = parent;
        }

        if boundary == Boundary::ContentDocumentRoot {
            steps.push(CfiStep::indirection());
        }
        steps.reverse();
        Ok(CfiPath::with_steps(steps))
    }

    /// Content path addressing `element`
    pub fn from_element(&self, element: T::Node) -> Result<CfiPath> {
        let path = self.element_steps(element, Boundary::ContentDocumentRoot)?;
        tracing::debug!(path = %path, "generated element CFI");
        Ok(path)
    }

    /// Content path addressing `offset` UTF-16 code units into the text node
    /// `text`.
    /// The emitted offset is relative to the whole logical text run.
    pub fn from_text_position(&self, text: T::Node, offset: usize) -> Result<CfiPath> {
        if self.tree.kind(text) != NodeKind::Text {
            return Err(CfiError::NodeType {
                node: self.tree.describe(text),
                expected: "a text node",
            });
        }
        let len = self.tree.text_len(text);
        if offset > len {
            return Err(CfiError::OutOfRange {
                target_index: offset,
                max_index: Some(len),
            });
        }
        let parent = self.tree.parent(text).ok_or_else(|| CfiError::NodeType {
            node: self.tree.describe(text),
            expected: "a node attached to a document",
        })?;

        let run = text_runs(self.tree, parent, self.blacklist)
            .into_iter()
            .find(|run| run.nodes.contains(&text))
            .ok_or_else(|| CfiError::NodeType {
                node: self.tree.describe(text),
                expected: "an indexable text node",
            })?;
        let preceding: usize = run
            .nodes
            .iter()
            .take_while(|&&node| node != text)
            .map(|&node| self.tree.text_len(node))
            .sum();

        let mut path = self.element_steps(parent, Boundary::ContentDocumentRoot)?;
        path.push(CfiStep::index((run.slot * 2 + 1) as u32));
        path.set_character_offset((preceding + offset) as u32);
        tracing::debug!(path = %path, "generated text CFI");
        Ok(path)
    }

    /// Range CFI between two text positions, split at the longest common
    /// element-step prefix
    pub fn range(&self, start: (T::Node, usize), end: (T::Node, usize)) -> Result<Cfi> {
        let start = self.from_text_position(start.0, start.1)?;
        let end = self.from_text_position(end.0, end.1)?;

        let common = start
            .steps
            .iter()
            .zip(end.steps.iter())
            .take_while(|(a, b)| a.kind() != StepKind::Text && a.step_type == b.step_type)
            .count();

        let parent = CfiPath::with_steps(start.steps[..common].to_vec());
        let relative = |path: &CfiPath| CfiPath {
            steps: path.steps[common..].to_vec(),
            character_offset: path.character_offset.clone(),
        };
        Ok(Cfi::with_range(
            parent,
            CfiRange {
                start: relative(&start),
                end: relative(&end),
            },
        ))
    }

    fn excluded(&self, node: T::Node) -> CfiError {
        CfiError::NodeType {
            node: self.tree.describe(node),
            expected: "a node not excluded by the blacklist",
        }
    }
}

/// Content path addressing `element`
pub fn generate_from_element<T: DocumentTree>(
    tree: &T,
    element: T::Node,
    blacklist: &Blacklist,
) -> Result<CfiPath> {
    Generator::new(tree, blacklist).from_element(element)
}

/// Content path addressing a character offset in a text node
pub fn generate_from_text_position<T: DocumentTree>(
    tree: &T,
    text: T::Node,
    offset: usize,
    blacklist: &Blacklist,
) -> Result<CfiPath> {
    Generator::new(tree, blacklist).from_text_position(text, offset)
}

/// Range CFI between two text positions
pub fn generate_range<T: DocumentTree>(
    tree: &T,
    start: (T::Node, usize),
    end: (T::Node, usize),
    blacklist: &Blacklist,
) -> Result<Cfi> {
    Generator::new(tree, blacklist).range(start, end)
}

/// Builder for constructing CFIs programmatically
#[derive(Debug, Clone, Default)]
pub struct CfiBuilder {
    path: CfiPath,
}

impl CfiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the spine step of the package document (/6 in EPUB 3)
    pub fn package_step(mut self) -> Self {
        self.path.push(CfiStep::index(6));
        self
    }

    /// Add a spine item step. Index 0 -> /2, index 1 -> /4, etc.
    pub fn spine_item(mut self, index: usize) -> Self {
        self.path.push(CfiStep::index(even(index)));
        self
    }

    pub fn spine_item_with_id(mut self, index: usize, id: impl Into<String>) -> Self {
        self.path.push(CfiStep::index_with_id(even(index), id));
        self
    }

    /// Add an indirection step (entering a content document)
    pub fn indirection(mut self) -> Self {
        self.path.push(CfiStep::indirection());
        self
    }

    /// Add a child element step. Index 0 -> /2, index 1 -> /4, etc.
    pub fn element(mut self, index: usize) -> Self {
        self.path.push(CfiStep::index(even(index)));
        self
    }

    pub fn element_with_id(mut self, index: usize, id: impl Into<String>) -> Self {
        self.path.push(CfiStep::index_with_id(even(index), id));
        self
    }

    /// Add a text run step. Slot 0 -> /1, slot 1 -> /3, etc.
    pub fn text_node(mut self, slot: usize) -> Self {
        self.path.push(CfiStep::index((slot * 2 + 1) as u32));
        self
    }

    /// Append the steps of an existing path (for example a generated
    /// content path) and take over its offset
    pub fn append(mut self, path: &CfiPath) -> Self {
        self.path = self.path.join(path);
        self
    }

    pub fn character_offset(mut self, offset: u32) -> Self {
        self.path.set_character_offset(offset);
        self
    }

    /// Set the character offset with a text assertion for validation
    pub fn character_offset_with_assertion(
        mut self,
        offset: u32,
        prefix: Option<String>,
        suffix: Option<String>,
    ) -> Self {
        self.path.character_offset = Some(CharacterOffset {
            offset,
            assertion: Some(TextAssertion {
                prefix,
                suffix,
                parameters: Vec::new(),
            }),
        });
        self
    }

    pub fn build(self) -> Cfi {
        Cfi::new(self.path)
    }

    pub fn path(&self) -> &CfiPath {
        &self.path
    }
}

fn even(index: usize) -> u32 {
    ((index + 1) * 2) as u32
}

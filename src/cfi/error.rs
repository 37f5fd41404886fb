//! CFI engine errors

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, CfiError>;

/// Malformed CFI text. Positions are byte offsets into the trimmed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("Empty CFI string")]
    Empty,

    #[error("CFI must start with 'epubcfi('")]
    MissingPrefix,

    #[error("CFI must end with ')'")]
    MissingClosingParen,

    #[error("Expected '/' or '!' at position {0}")]
    ExpectedStep(usize),

    #[error("Expected number at position {0}")]
    ExpectedNumber(usize),

    #[error("Step index must be positive at position {0}")]
    ZeroIndex(usize),

    #[error("Unclosed bracket at position {0}")]
    UnclosedBracket(usize),

    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("Empty path at position {0}")]
    EmptyPath(usize),

    #[error("Invalid range format")]
    InvalidRange,
}

/// Which kind of terminating condition could not be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminusKind {
    Text,
    Element,
}

impl fmt::Display for TerminusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminusKind::Text => write!(f, "text"),
            TerminusKind::Element => write!(f, "element"),
        }
    }
}

/// What an assertion was checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionKind {
    Id,
    Text,
}

/// An id or text assertion that did not hold on the located node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionMismatch {
    pub kind: AssertionKind,
    /// Index of the step in the content path that carried the assertion
    pub step: usize,
    /// The asserted value
    pub expected: String,
    /// What the document actually has there
    pub found: Option<String>,
}

impl fmt::Display for AssertionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            AssertionKind::Id => "id",
            AssertionKind::Text => "text",
        };
        write!(
            f,
            "{} assertion '{}' at step {} does not match {}",
            kind,
            self.expected,
            self.step,
            self.found
                .as_deref()
                .map(|found| format!("'{}'", found))
                .unwrap_or_else(|| "nothing".to_string())
        )
    }
}

/// Engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfiError {
    #[error("CFI syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Node type error at {node}: expected {expected}")]
    NodeType { node: String, expected: &'static str },

    #[error(
        "Index {target_index} out of range (max valid index: {})",
        .max_index.map_or_else(|| "none".to_string(), |max| max.to_string())
    )]
    OutOfRange {
        target_index: usize,
        max_index: Option<usize>,
    },

    #[error("{kind} terminus not satisfied: {condition}")]
    Terminus {
        kind: TerminusKind,
        condition: String,
    },

    #[error("Assertion mismatch: {0}")]
    AssertionMismatch(AssertionMismatch),
}

impl CfiError {
    pub(crate) fn out_of_range(target_index: usize, count: usize) -> Self {
        CfiError::OutOfRange {
            target_index,
            max_index: count.checked_sub(1),
        }
    }

    pub(crate) fn text_terminus(condition: impl Into<String>) -> Self {
        CfiError::Terminus {
            kind: TerminusKind::Text,
            condition: condition.into(),
        }
    }
}

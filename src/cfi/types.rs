//! CFI (Canonical Fragment Identifier) path model
//!
//! Format: epubcfi(/6/4[chap01ref]!/4/2/22/3:268)
//!
//! Reference: <https://idpf.org/epub/linking/cfi/epub-cfi.html>

use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete EPUB CFI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cfi {
    /// The path, or the common parent path of a range
    pub path: CfiPath,
    /// Relative start and end paths (for selections)
    pub range: Option<CfiRange>,
}

/// A CFI path (sequence of steps)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CfiPath {
    pub steps: Vec<CfiStep>,
    /// Terminating character offset, always after the last step
    pub character_offset: Option<CharacterOffset>,
}

/// A CFI range (for text selections)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfiRange {
    /// Start of the range (relative to the parent path)
    pub start: CfiPath,
    /// End of the range (relative to the parent path)
    pub end: CfiPath,
}

/// A single step in a CFI path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfiStep {
    pub step_type: StepType,
    /// Optional ID assertion [id]
    pub id_assertion: Option<String>,
    /// Optional text assertion (side bias)
    pub text_assertion: Option<TextAssertion>,
    /// Parameters attached to the id assertion, `[id;k=v]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<(String, String)>,
}

/// Raw step value as written in the CFI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    /// `/N`: even N selects a child element, odd N a logical text run
    Index(u32),
    /// `!`: steps into a referenced document
    Indirection,
}

/// What a step addresses, derived from its index parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Element,
    Text,
    Indirection,
}

/// Text location assertion for disambiguation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TextAssertion {
    /// Text before the location
    pub prefix: Option<String>,
    /// Text after the location
    pub suffix: Option<String>,
    /// Additional parameters
    pub parameters: Vec<(String, String)>,
}

/// Character offset within a logical text run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterOffset {
    /// Offset in UTF-16 code units (0-based)
    pub offset: u32,
    /// Optional text assertion for validation
    pub assertion: Option<TextAssertion>,
}

impl Cfi {
    pub fn new(path: CfiPath) -> Self {
        Self { path, range: None }
    }

    pub fn with_range(path: CfiPath, range: CfiRange) -> Self {
        Self {
            path,
            range: Some(range),
        }
    }

    /// Join a document-level prefix and a content-document component.
    ///
    /// A content component produced by the generator already begins with
    /// the indirection step, so the two are concatenated as they stand.
    pub fn from_components(package: &CfiPath, content: &CfiPath) -> Self {
        let mut steps = package.steps.clone();
        steps.extend(content.steps.iter().cloned());
        Self::new(CfiPath {
            steps,
            character_offset: content.character_offset.clone(),
        })
    }

    /// Check if this CFI represents a range (text selection)
    pub fn is_range(&self) -> bool {
        self.range.is_some()
    }

    /// Absolute path of the range start (or the path itself)
    pub fn range_start(&self) -> CfiPath {
        match &self.range {
            Some(range) => self.path.join(&range.start),
            None => self.path.clone(),
        }
    }

    /// Absolute path of the range end (or the path itself)
    pub fn range_end(&self) -> CfiPath {
        match &self.range {
            Some(range) => self.path.join(&range.end),
            None => self.path.clone(),
        }
    }

    /// Steps before the first indirection: the opaque package-document prefix
    pub fn package_path(&self) -> CfiPath {
        self.path.package_part()
    }

    /// Steps after the first indirection, with the character offset.
    /// A CFI without any indirection is content-relative as a whole.
    pub fn content_path(&self) -> CfiPath {
        self.path.content_part()
    }

    /// Get the spine index if this CFI references a spine item (/6/N)
    pub fn spine_index(&self) -> Option<u32> {
        match self.path.steps.as_slice() {
            [first, second, ..] => match (first.step_type, second.step_type) {
                (StepType::Index(6), StepType::Index(n)) if n % 2 == 0 => {
                    Some((n / 2).saturating_sub(1))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

impl CfiPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: Vec<CfiStep>) -> Self {
        Self {
            steps,
            character_offset: None,
        }
    }

    pub fn push(&mut self, step: CfiStep) {
        self.steps.push(step);
    }

    pub fn set_character_offset(&mut self, offset: u32) {
        self.character_offset = Some(CharacterOffset {
            offset,
            assertion: None,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.character_offset.is_none()
    }

    /// Append a relative path; its offset replaces ours
    pub fn join(&self, relative: &CfiPath) -> CfiPath {
        let mut steps = self.steps.clone();
        steps.extend(relative.steps.iter().cloned());
        CfiPath {
            steps,
            character_offset: relative.character_offset.clone(),
        }
    }

    fn first_indirection(&self) -> Option<usize> {
        self.steps.iter().position(CfiStep::is_indirection)
    }

    fn package_part(&self) -> CfiPath {
        match self.first_indirection() {
            Some(at) => CfiPath::with_steps(self.steps[..at].to_vec()),
            None => CfiPath::new(),
        }
    }

    fn content_part(&self) -> CfiPath {
        let from = self.first_indirection().map(|at| at + 1).unwrap_or(0);
        CfiPath {
            steps: self.steps[from..].to_vec(),
            character_offset: self.character_offset.clone(),
        }
    }
}

impl CfiStep {
    pub fn index(index: u32) -> Self {
        Self {
            step_type: StepType::Index(index),
            id_assertion: None,
            text_assertion: None,
            parameters: Vec::new(),
        }
    }

    pub fn index_with_id(index: u32, id: impl Into<String>) -> Self {
        Self {
            id_assertion: Some(id.into()),
            ..Self::index(index)
        }
    }

    pub fn indirection() -> Self {
        Self {
            step_type: StepType::Indirection,
            id_assertion: None,
            text_assertion: None,
            parameters: Vec::new(),
        }
    }

    pub fn is_indirection(&self) -> bool {
        matches!(self.step_type, StepType::Indirection)
    }

    pub fn kind(&self) -> StepKind {
        match self.step_type {
            StepType::Indirection => StepKind::Indirection,
            StepType::Index(n) if n % 2 == 0 => StepKind::Element,
            StepType::Index(_) => StepKind::Text,
        }
    }

    /// Raw index value if this is an index step
    pub fn value(&self) -> Option<u32> {
        match self.step_type {
            StepType::Index(n) => Some(n),
            StepType::Indirection => None,
        }
    }
}

/// Escape the characters that are special inside CFI assertions
pub(crate) fn escape_assertion(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '^' | '[' | ']' | '(' | ')' | ',' | ';' | '=') {
            out.push('^');
        }
        out.push(ch);
    }
    out
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi({}", self.path)?;
        if let Some(ref range) = self.range {
            write!(f, ",{},{}", range.start, range.end)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CfiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        if let Some(ref offset) = self.character_offset {
            write!(f, ":{}", offset.offset)?;
            if let Some(ref assertion) = offset.assertion {
                write!(f, "{}", assertion)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for CfiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_type {
            StepType::Index(n) => write!(f, "/{}", n)?,
            StepType::Indirection => write!(f, "!")?,
        }
        if self.id_assertion.is_some() || !self.parameters.is_empty() {
            write!(f, "[{}", escape_assertion(self.id_assertion.as_deref().unwrap_or("")))?;
            for (key, value) in &self.parameters {
                write!(f, ";{}={}", escape_assertion(key), escape_assertion(value))?;
            }
            write!(f, "]")?;
        }
        if let Some(ref assertion) = self.text_assertion {
            write!(f, "{}", assertion)?;
        }
        Ok(())
    }
}

impl fmt::Display for TextAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        if let Some(ref prefix) = self.prefix {
            write!(f, "{}", escape_assertion(prefix))?;
        }
        write!(f, ",")?;
        if let Some(ref suffix) = self.suffix {
            write!(f, "{}", escape_assertion(suffix))?;
        }
        for (key, value) in &self.parameters {
            write!(f, ";{}={}", escape_assertion(key), escape_assertion(value))?;
        }
        write!(f, "]")
    }
}

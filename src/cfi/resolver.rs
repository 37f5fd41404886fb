//! CFI resolution
//!
//! Walks a parsed path over a host tree, left to right, and reports the
//! element or text position it addresses. Any failing step aborts with a
//! typed error; nothing partial is returned.

use crate::dom::{DocumentTree, NodeKind};

use super::blacklist::Blacklist;
use super::error::{AssertionKind, AssertionMismatch, CfiError, Result, TerminusKind};
use super::types::{Cfi, CfiPath, CfiStep, StepKind, TextAssertion};
use super::units::{filtered_elements, run_len, run_text, text_runs};

/// A position inside a logical text run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPosition<N> {
    /// Physical text nodes forming the run, in document order
    pub nodes: Vec<N>,
    /// Offset into the reassembled run text, if the path carried one
    pub offset: Option<usize>,
}

impl<N: Copy + Eq> TextPosition<N> {
    /// Map the logical offset to a physical node and a local offset.
    /// A boundary between two nodes resolves to the end of the earlier one.
    pub fn locate<T>(&self, tree: &T) -> Option<(N, usize)>
    where
        T: DocumentTree<Node = N>,
    {
        let offset = self.offset.unwrap_or(0);
        let mut consumed = 0;
        for &node in &self.nodes {
            let len = tree.text_len(node);
            if offset <= consumed + len {
                return Some((node, offset - consumed));
            }
            consumed += len;
        }
        None
    }

    /// Reassembled text of the run
    pub fn text<T>(&self, tree: &T) -> String
    where
        T: DocumentTree<Node = N>,
    {
        run_text(tree, &self.nodes)
    }
}

/// What a path addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget<N> {
    Element(N),
    Text(TextPosition<N>),
}

/// Resolved target plus the advisory assertion failures met on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<N> {
    pub target: ResolvedTarget<N>,
    pub assertion_mismatches: Vec<AssertionMismatch>,
}

/// Both ends of a range CFI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange<N> {
    pub start: Resolution<N>,
    pub end: Resolution<N>,
}

/// Walks CFI paths over a tree with a fixed blacklist
pub struct Resolver<'a, T: DocumentTree> {
    tree: &'a T,
    blacklist: &'a Blacklist,
    strict_assertions: bool,
}

impl<'a, T: DocumentTree> Resolver<'a, T> {
    pub fn new(tree: &'a T, blacklist: &'a Blacklist) -> Self {
        Self {
            tree,
            blacklist,
            strict_assertions: false,
        }
    }

    /// Fail on id/text assertion mismatches instead of collecting them
    pub fn strict_assertions(mut self, strict: bool) -> Self {
        self.strict_assertions = strict;
        self
    }

    /// Resolve the content-document part of `cfi` against `document`.
    /// For a range CFI this resolves the start.
    pub fn resolve(&self, cfi: &Cfi, document: T::Node) -> Result<Resolution<T::Node>> {
        tracing::debug!(cfi = %cfi, "resolving CFI");
        let path = Cfi::new(cfi.range_start()).content_path();
        self.resolve_path(&path, document)
    }

    /// Resolve both ends of a range CFI
    pub fn resolve_range(&self, cfi: &Cfi, document: T::Node) -> Result<ResolvedRange<T::Node>> {
        tracing::debug!(cfi = %cfi, "resolving CFI range");
        let start = Cfi::new(cfi.range_start()).content_path();
        let end = Cfi::new(cfi.range_end()).content_path();
        Ok(ResolvedRange {
            start: self.resolve_path(&start, document)?,
            end: self.resolve_path(&end, document)?,
        })
    }

    /// Resolve content-relative steps, starting at the root element of
    /// `document`
    pub fn resolve_path(&self, path: &CfiPath, document: T::Node) -> Result<Resolution<T::Node>> {
        let root = self.enter_document(document)?;
        self.resolve_from(path, root)
    }

    /// Resolve steps relative to an arbitrary starting element
    pub fn resolve_from(&self, path: &CfiPath, start: T::Node) -> Result<Resolution<T::Node>> {
        let mut current = start;
        let mut run: Option<Vec<T::Node>> = None;
        let mut mismatches = Vec::new();

        for (index, step) in path.steps.iter().enumerate() {
            if run.is_some() {
                return Err(CfiError::NodeType {
                    node: "#text".to_string(),
                    expected: "an element (text steps terminate a path)",
                });
            }

            match step.kind() {
                StepKind::Element => {
                    current = self.element_step(step, current)?;
                    tracing::trace!(step = index, node = %self.tree.describe(current), "element step");
                }
                StepKind::Text => {
                    run = Some(self.text_step(step, current)?);
                    tracing::trace!(step = index, "text step");
                }
                StepKind::Indirection => {
                    let document = self.tree.content_document(current).ok_or_else(|| {
                        CfiError::NodeType {
                            node: self.tree.describe(current),
                            expected: "an element embedding a document",
                        }
                    })?;
                    current = self.enter_document(document)?;
                    tracing::trace!(step = index, node = %self.tree.describe(current), "indirection step");
                }
            }

            if run.is_none() {
                if let Some(expected) = &step.id_assertion {
                    let found = self.tree.id(current);
                    if found != Some(expected.as_str()) {
                        self.record(
                            &mut mismatches,
                            AssertionMismatch {
                                kind: AssertionKind::Id,
                                step: index,
                                expected: expected.clone(),
                                found: found.map(str::to_string),
                            },
                        )?;
                    }
                }
            }
        }

        let offset = path.character_offset.as_ref();
        let target = match (run, offset) {
            (Some(nodes), _) => {
                let position = TextPosition {
                    nodes,
                    offset: offset.map(|o| o.offset as usize),
                };
                self.check_offset(&position, path, &mut mismatches)?;
                ResolvedTarget::Text(position)
            }
            (None, Some(offset)) => {
                // An offset after an element step addresses the element's
                // leading text run, as if the path ended in "/1".
                let nodes = text_runs(self.tree, current, self.blacklist)
                    .into_iter()
                    .find(|run| run.slot == 0)
                    .map(|run| run.nodes)
                    .ok_or_else(|| {
                        CfiError::text_terminus(format!(
                            "{} has no leading text for offset {}",
                            self.tree.describe(current),
                            offset.offset
                        ))
                    })?;
                let position = TextPosition {
                    nodes,
                    offset: Some(offset.offset as usize),
                };
                self.check_offset(&position, path, &mut mismatches)?;
                ResolvedTarget::Text(position)
            }
            (None, None) => ResolvedTarget::Element(current),
        };

        Ok(Resolution {
            target,
            assertion_mismatches: mismatches,
        })
    }

    /// Resolve the package-document prefix of `cfi` to the element it names
    /// (normally a spine itemref)
    pub fn resolve_package_item(&self, cfi: &Cfi, package_document: T::Node) -> Result<T::Node> {
        let prefix = cfi.package_path();
        if prefix.steps.is_empty() {
            return Err(CfiError::Terminus {
                kind: TerminusKind::Element,
                condition: "CFI has no package document prefix".to_string(),
            });
        }
        match self.resolve_path(&prefix, package_document)?.target {
            ResolvedTarget::Element(node) => Ok(node),
            ResolvedTarget::Text(_) => Err(CfiError::NodeType {
                node: "#text".to_string(),
                expected: "a package document element",
            }),
        }
    }

    fn enter_document(&self, document: T::Node) -> Result<T::Node> {
        filtered_elements(self.tree, document, self.blacklist)
            .into_iter()
            .next()
            .ok_or_else(|| CfiError::Terminus {
                kind: TerminusKind::Element,
                condition: "document has no root element".to_string(),
            })
    }

    fn element_step(&self, step: &CfiStep, current: T::Node) -> Result<T::Node> {
        let value = step.value().unwrap_or(0) as usize;
        let target = (value / 2).saturating_sub(1);
        let elements = filtered_elements(self.tree, current, self.blacklist);
        elements
            .get(target)
            .copied()
            .ok_or_else(|| CfiError::out_of_range(target, elements.len()))
    }

    fn text_step(&self, step: &CfiStep, current: T::Node) -> Result<Vec<T::Node>> {
        if self.tree.kind(current) != NodeKind::Element {
            return Err(CfiError::NodeType {
                node: self.tree.describe(current),
                expected: "an element containing text",
            });
        }
        let value = step.value().unwrap_or(1) as usize;
        let slot = (value - 1) / 2;
        let runs = text_runs(self.tree, current, self.blacklist);
        let max_index = runs.last().map(|run| run.slot);
        runs.into_iter()
            .find(|run| run.slot == slot)
            .map(|run| run.nodes)
            .ok_or(CfiError::OutOfRange {
                target_index: slot,
                max_index,
            })
    }

    fn check_offset(
        &self,
        position: &TextPosition<T::Node>,
        path: &CfiPath,
        mismatches: &mut Vec<AssertionMismatch>,
    ) -> Result<()> {
        let Some(offset) = position.offset else {
            return Ok(());
        };
        let len = run_len(self.tree, &position.nodes);
        if offset > len {
            return Err(CfiError::text_terminus(format!(
                "offset {} exceeds text length {}",
                offset, len
            )));
        }
        let assertion = path
            .character_offset
            .as_ref()
            .and_then(|o| o.assertion.as_ref());
        if let Some(assertion) = assertion {
            let text = position.text(self.tree);
            if let Some(mismatch) = check_text_assertion(&text, offset, assertion, path.steps.len()) {
                self.record(mismatches, mismatch)?;
            }
        }
        Ok(())
    }

    fn record(&self, mismatches: &mut Vec<AssertionMismatch>, mismatch: AssertionMismatch) -> Result<()> {
        tracing::warn!(%mismatch, "CFI assertion mismatch");
        if self.strict_assertions {
            return Err(CfiError::AssertionMismatch(mismatch));
        }
        mismatches.push(mismatch);
        Ok(())
    }
}

/// Compare the context around `offset` with a text assertion
fn check_text_assertion(
    text: &str,
    offset: usize,
    assertion: &TextAssertion,
    step: usize,
) -> Option<AssertionMismatch> {
    let split = crate::dom::utf16_to_byte(text, offset).unwrap_or(text.len());
    let (before, after) = text.split_at(split);
    let prefix_ok = assertion
        .prefix
        .as_deref()
        .map_or(true, |prefix| before.ends_with(prefix));
    let suffix_ok = assertion
        .suffix
        .as_deref()
        .map_or(true, |suffix| after.starts_with(suffix));
    if prefix_ok && suffix_ok {
        return None;
    }

    let expected = format!(
        "{},{}",
        assertion.prefix.as_deref().unwrap_or(""),
        assertion.suffix.as_deref().unwrap_or("")
    );
    let context = |s: &str, n: usize, tail: bool| -> String {
        let chars: Vec<char> = s.chars().collect();
        if tail {
            chars[chars.len().saturating_sub(n)..].iter().collect()
        } else {
            chars[..n.min(chars.len())].iter().collect()
        }
    };
    let prefix_len = assertion.prefix.as_deref().map_or(0, |p| p.chars().count());
    let suffix_len = assertion.suffix.as_deref().map_or(0, |s| s.chars().count());
    Some(AssertionMismatch {
        kind: AssertionKind::Text,
        step,
        expected,
        found: Some(format!(
            "{},{}",
            context(before, prefix_len, true),
            context(after, suffix_len, false)
        )),
    })
}

/// Resolve the content-document part of `cfi` against `document`
pub fn resolve<T: DocumentTree>(
    cfi: &Cfi,
    tree: &T,
    document: T::Node,
    blacklist: &Blacklist,
) -> Result<Resolution<T::Node>> {
    Resolver::new(tree, blacklist).resolve(cfi, document)
}

/// Resolve both ends of a range CFI
pub fn resolve_range<T: DocumentTree>(
    cfi: &Cfi,
    tree: &T,
    document: T::Node,
    blacklist: &Blacklist,
) -> Result<ResolvedRange<T::Node>> {
    Resolver::new(tree, blacklist).resolve_range(cfi, document)
}

/// Resolve the package-document prefix of `cfi` to the element it names
pub fn resolve_package_item<T: DocumentTree>(
    cfi: &Cfi,
    tree: &T,
    package_document: T::Node,
    blacklist: &Blacklist,
) -> Result<T::Node> {
    Resolver::new(tree, blacklist).resolve_package_item(cfi, package_document)
}

/// Manifest `href` of the item an itemref points at
pub fn spine_item_href<T: DocumentTree>(
    tree: &T,
    package_document: T::Node,
    itemref: T::Node,
) -> Result<String> {
    let idref = tree.attribute(itemref, "idref").ok_or_else(|| CfiError::NodeType {
        node: tree.describe(itemref),
        expected: "an itemref element with an idref",
    })?;

    let mut stack = tree.children(package_document);
    stack.reverse();
    while let Some(node) = stack.pop() {
        if tree.kind(node) == NodeKind::Element
            && tree.local_name(node) == Some("item")
            && tree.id(node) == Some(idref)
        {
            if let Some(href) = tree.attribute(node, "href") {
                return Ok(href.to_string());
            }
        }
        let mut children = tree.children(node);
        children.reverse();
        stack.extend(children);
    }

    Err(CfiError::Terminus {
        kind: TerminusKind::Element,
        condition: format!("no manifest item with id '{}'", idref),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::parser::parse;
    use crate::dom::{parse_xhtml, ArenaDocument, DocumentTreeMut, NodeId};

    const CHAPTER: &str = r#"<html><head><title>Ch</title></head><body id="body01"><section><p id="para">Hello, world</p><p>First<em>mid</em>Last</p></section><iframe id="frame"/></body></html>"#;

    fn chapter() -> ArenaDocument {
        parse_xhtml(CHAPTER).unwrap()
    }

    fn resolve_str(doc: &ArenaDocument, cfi: &str, blacklist: &Blacklist) -> Result<Resolution<NodeId>> {
        resolve(&parse(cfi).unwrap(), doc, doc.document(), blacklist)
    }

    fn element(resolution: Resolution<NodeId>) -> NodeId {
        match resolution.target {
            ResolvedTarget::Element(node) => node,
            other => panic!("expected element, got {:?}", other),
        }
    }

    fn text(resolution: Resolution<NodeId>) -> TextPosition<NodeId> {
        match resolution.target {
            ResolvedTarget::Text(position) => position,
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_element_steps() {
        let doc = chapter();
        let node = element(resolve_str(&doc, "epubcfi(/6/4!/4/2/2)", &Blacklist::new()).unwrap());
        assert_eq!(node, doc.find_by_id("para").unwrap());
    }

    #[test]
    fn test_end_to_end_offset_on_element() {
        let doc = chapter();
        let position = text(resolve_str(&doc, "epubcfi(/6/4!/4/2/2:5)", &Blacklist::new()).unwrap());
        let para = doc.find_by_id("para").unwrap();
        assert_eq!(position.nodes, doc.children(para));
        assert_eq!(position.offset, Some(5));
        assert_eq!(position.locate(&doc), Some((doc.children(para)[0], 5)));
    }

    #[test]
    fn test_text_steps_use_slots() {
        let doc = chapter();
        let position = text(resolve_str(&doc, "epubcfi(/6/4!/4/2/4/3:2)", &Blacklist::new()).unwrap());
        assert_eq!(position.text(&doc), "Last");
        assert_eq!(position.offset, Some(2));

        let err = resolve_str(&doc, "epubcfi(/6/4!/4/2/4/5)", &Blacklist::new()).unwrap_err();
        assert_eq!(
            err,
            CfiError::OutOfRange {
                target_index: 2,
                max_index: Some(1)
            }
        );
    }

    #[test]
    fn test_out_of_range_element() {
        let doc = parse_xhtml("<html><body><a/><b/><c/></body></html>").unwrap();
        let err = resolve_str(&doc, "epubcfi(!/2/100)", &Blacklist::new()).unwrap_err();
        assert_eq!(
            err,
            CfiError::OutOfRange {
                target_index: 49,
                max_index: Some(2)
            }
        );
    }

    #[test]
    fn test_offset_beyond_text_is_terminus_error() {
        let doc = chapter();
        let err = resolve_str(&doc, "epubcfi(/6/4!/4/2/2/1:13)", &Blacklist::new()).unwrap_err();
        assert!(matches!(err, CfiError::Terminus { kind: TerminusKind::Text, .. }));
        assert!(resolve_str(&doc, "epubcfi(/6/4!/4/2/2/1:12)", &Blacklist::new()).is_ok());
    }

    #[test]
    fn test_step_after_text_step_is_rejected() {
        let doc = chapter();
        let err = resolve_str(&doc, "epubcfi(/6/4!/4/2/2/1/2)", &Blacklist::new()).unwrap_err();
        assert!(matches!(err, CfiError::NodeType { .. }));
    }

    #[test]
    fn test_id_assertions_are_advisory_unless_strict() {
        let doc = chapter();
        let cfi = parse("epubcfi(/6/4!/4[wrong]/2/2[para])").unwrap();
        let blacklist = Blacklist::new();

        let resolution = resolve(&cfi, &doc, doc.document(), &blacklist).unwrap();
        assert_eq!(resolution.assertion_mismatches.len(), 1);
        let mismatch = &resolution.assertion_mismatches[0];
        assert_eq!(mismatch.kind, AssertionKind::Id);
        assert_eq!(mismatch.step, 0);
        assert_eq!(mismatch.found.as_deref(), Some("body01"));

        let err = Resolver::new(&doc, &blacklist)
            .strict_assertions(true)
            .resolve(&cfi, doc.document())
            .unwrap_err();
        assert!(matches!(err, CfiError::AssertionMismatch(_)));
    }

    #[test]
    fn test_text_assertions() {
        let doc = chapter();
        let ok = resolve_str(&doc, "epubcfi(/6/4!/4/2/2/1:5[Hello,^, w])", &Blacklist::new()).unwrap();
        assert!(ok.assertion_mismatches.is_empty());

        let bad = resolve_str(&doc, "epubcfi(/6/4!/4/2/2/1:5[Help,])", &Blacklist::new()).unwrap();
        assert_eq!(bad.assertion_mismatches.len(), 1);
        assert_eq!(bad.assertion_mismatches[0].found.as_deref(), Some("ello,"));
    }

    #[test]
    fn test_blacklist_changes_indices() {
        let doc = parse_xhtml(
            r#"<html><body><div class="chrome"/><p id="target">t</p></body></html>"#,
        )
        .unwrap();
        let blacklist = Blacklist::new().with_class("chrome");
        let node = element(resolve_str(&doc, "epubcfi(!/2/2)", &blacklist).unwrap());
        assert_eq!(node, doc.find_by_id("target").unwrap());
    }

    #[test]
    fn test_indirection_into_frame() {
        let mut doc = chapter();
        let frame = doc.find_by_id("frame").unwrap();
        doc.embed_document(frame, r#"<html><body><p>inner text</p></body></html>"#)
            .unwrap();

        let position = text(resolve_str(&doc, "epubcfi(/6/4!/4/4!/2/2/1:6)", &Blacklist::new()).unwrap());
        assert_eq!(position.text(&doc), "inner text");

        let err = resolve_str(&doc, "epubcfi(/6/4!/4/2!/2)", &Blacklist::new()).unwrap_err();
        assert!(matches!(err, CfiError::NodeType { .. }));
    }

    #[test]
    fn test_split_run_resolves_against_reassembled_text() {
        let mut doc = chapter();
        let para = doc.find_by_id("para").unwrap();
        let original = doc.children(para)[0];
        doc.set_text(original, "Hello".to_string());
        let tail = doc.create_text(", world");
        doc.insert_after(original, tail);

        let position = text(resolve_str(&doc, "epubcfi(/6/4!/4/2/2/1:8)", &Blacklist::new()).unwrap());
        assert_eq!(position.nodes, vec![original, tail]);
        assert_eq!(position.locate(&doc), Some((tail, 3)));
        assert_eq!(position.text(&doc), "Hello, world");
    }

    #[test]
    fn test_range_resolution() {
        let doc = chapter();
        let cfi = parse("epubcfi(/6/4!/4/2,/2/1:0,/4/3:4)").unwrap();
        let range = resolve_range(&cfi, &doc, doc.document(), &Blacklist::new()).unwrap();
        assert_eq!(text(range.start).text(&doc), "Hello, world");
        let end = text(range.end);
        assert_eq!(end.text(&doc), "Last");
        assert_eq!(end.offset, Some(4));
    }

    #[test]
    fn test_package_item_and_href() {
        let package = parse_xhtml(
            r#"<package><metadata/><manifest><item id="c1" href="c1.xhtml"/><item id="c2" href="text/c2.xhtml"/></manifest><spine><itemref idref="c1"/><itemref idref="c2"/></spine></package>"#,
        )
        .unwrap();
        let cfi = parse("epubcfi(/6/4!/4/2/1:0)").unwrap();
        let blacklist = Blacklist::new();
        let resolver = Resolver::new(&package, &blacklist);

        let itemref = resolver.resolve_package_item(&cfi, package.document()).unwrap();
        assert_eq!(package.attribute(itemref, "idref"), Some("c2"));
        assert_eq!(
            spine_item_href(&package, package.document(), itemref).unwrap(),
            "text/c2.xhtml"
        );

        let no_prefix = parse("epubcfi(!/4)").unwrap();
        assert!(resolve_package_item(&no_prefix, &package, package.document(), &blacklist).is_err());
    }

    #[test]
    fn test_offsets_count_utf16_code_units() {
        let doc = parse_xhtml(r#"<html><body><p id="p">a😀b</p></body></html>"#).unwrap();
        let p = doc.find_by_id("p").unwrap();
        let node = doc.children(p)[0];

        // Before "b": one unit for "a", two for the emoji
        let position = text(resolve_str(&doc, "epubcfi(!/2/2/1:3[,b])", &Blacklist::new()).unwrap());
        assert_eq!(position.locate(&doc), Some((node, 3)));

        let resolution = resolve_str(&doc, "epubcfi(!/2/2/1:4[\u{1F600}b,])", &Blacklist::new()).unwrap();
        assert!(resolution.assertion_mismatches.is_empty());

        let err = resolve_str(&doc, "epubcfi(!/2/2/1:5)", &Blacklist::new()).unwrap_err();
        assert!(matches!(err, CfiError::Terminus { .. }));
    }
}

//! Node filtering shared by resolution and generation
//!
//! Injected markers, reader chrome and similar host additions must not shift
//! child indices, so any element matching the blacklist is skipped when
//! children are counted. The resolver and the generator both go through
//! [`Blacklist::excludes`]; if they ever disagreed, a generated CFI would
//! resolve somewhere else.

use serde::{Deserialize, Serialize};

use crate::dom::{DocumentTree, NodeKind};

/// Class, element and id filters excluded from child indexing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Blacklist {
    pub classes: Vec<String>,
    pub elements: Vec<String>,
    pub ids: Vec<String>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.elements.push(element.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    /// Union of two blacklists
    pub fn merge(&self, other: &Blacklist) -> Blacklist {
        fn union(a: &[String], b: &[String]) -> Vec<String> {
            let mut out = a.to_vec();
            for item in b {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            out
        }
        Blacklist {
            classes: union(&self.classes, &other.classes),
            elements: union(&self.elements, &other.elements),
            ids: union(&self.ids, &other.ids),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.elements.is_empty() && self.ids.is_empty()
    }

    /// Whether `node` is skipped when counting children. Only elements can
    /// be excluded.
    pub fn excludes<T: DocumentTree>(&self, tree: &T, node: T::Node) -> bool {
        if tree.kind(node) != NodeKind::Element {
            return false;
        }
        if self.classes.iter().any(|class| tree.has_class(node, class)) {
            return true;
        }
        if let Some(name) = tree.local_name(node) {
            if self
                .elements
                .iter()
                .any(|element| element.eq_ignore_ascii_case(name))
            {
                return true;
            }
        }
        match tree.id(node) {
            Some(id) => self.ids.iter().any(|excluded| excluded == id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_xhtml;

    #[test]
    fn test_excludes_by_class_element_and_id() {
        let doc = parse_xhtml(
            r#"<html><body><span class="a cfi-marker"/><aside/><p id="skip"/><p id="keep">t</p></body></html>"#,
        )
        .unwrap();
        let html = doc.root_element(doc.document()).unwrap();
        let body = doc.children(html)[0];
        let children = doc.children(body);

        let blacklist = Blacklist::new()
            .with_class("cfi-marker")
            .with_element("ASIDE")
            .with_id("skip");

        let excluded: Vec<bool> = children.iter().map(|&c| blacklist.excludes(&doc, c)).collect();
        assert_eq!(excluded, vec![true, true, true, false]);

        let text = doc.children(children[3])[0];
        assert!(!blacklist.excludes(&doc, text));
        assert!(!Blacklist::new().excludes(&doc, children[0]));
    }

    #[test]
    fn test_merge_deduplicates() {
        let a = Blacklist::new().with_class("m").with_id("x");
        let b = Blacklist::new().with_class("m").with_element("nav");
        let merged = a.merge(&b);
        assert_eq!(merged.classes, vec!["m".to_string()]);
        assert_eq!(merged.elements, vec!["nav".to_string()]);
        assert_eq!(merged.ids, vec!["x".to_string()]);
        assert!(!merged.is_empty());
        assert!(Blacklist::default().is_empty());
    }
}

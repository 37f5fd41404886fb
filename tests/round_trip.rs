//! Generate/resolve round trips over generated chapters, before and after
//! marker injection, plus step numbering and blacklist agreement.

use proptest::prelude::*;

use epub_cfi::cfi::{
    generate_from_element, generate_from_text_position, inject_marker_at, parse, remove_marker,
    resolve, Blacklist, Cfi, CfiStep, ResolvedTarget, StepKind, StepType, TextPosition,
};
use epub_cfi::dom::{parse_xhtml, ArenaDocument, DocumentTree, NodeId, NodeKind};

const MARKER_CLASS: &str = "cfi-marker";

/// Paragraphs of the form `lead<em>x</em>tail`
fn chapter(paragraphs: &[(String, String)]) -> String {
    let mut xhtml = String::from(r#"<html><head/><body id="body">"#);
    for (lead, tail) in paragraphs {
        xhtml.push_str(&format!("<p>{}<em>x</em>{}</p>", lead, tail));
    }
    xhtml.push_str("</body></html>");
    xhtml
}

fn text_at(doc: &ArenaDocument, cfi: &Cfi, blacklist: &Blacklist) -> TextPosition<NodeId> {
    match resolve(cfi, doc, doc.document(), blacklist).unwrap().target {
        ResolvedTarget::Text(position) => position,
        other => panic!("expected text target, got {:?}", other),
    }
}

/// Paragraphs of the form `text<span class="cfi-marker">m</span><em>x</em>text`,
/// each optionally preceded by a `div.chrome`
fn decorated_chapter(paragraphs: &[(String, bool, bool)]) -> String {
    let mut xhtml = String::from(r#"<html><head/><body id="body">"#);
    for (text, chrome, marked) in paragraphs {
        if *chrome {
            xhtml.push_str(r#"<div class="chrome">menu</div>"#);
        }
        let marker = if *marked {
            r#"<span class="cfi-marker">m</span>"#
        } else {
            ""
        };
        xhtml.push_str(&format!("<p>{}{}<em>x</em>{}</p>", text, marker, text));
    }
    xhtml.push_str("</body></html>");
    xhtml
}

/// Elements that are neither blacklisted nor inside a blacklisted element
fn indexable_elements(doc: &ArenaDocument, blacklist: &Blacklist) -> Vec<NodeId> {
    doc.descendants(doc.document())
        .into_iter()
        .filter(|&node| doc.kind(node) == NodeKind::Element)
        .filter(|&node| {
            let mut current = Some(node);
            while let Some(n) = current {
                if doc.kind(n) == NodeKind::Element && blacklist.excludes(doc, n) {
                    return false;
                }
                current = doc.parent(n);
            }
            true
        })
        .collect()
}

fn paragraphs() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-zé😀 ,.]{1,30}", "[a-zé😀 ,.]{1,30}"), 1..6)
}

fn decorated_paragraphs() -> impl Strategy<Value = Vec<(String, bool, bool)>> {
    prop::collection::vec(("[a-zé😀 ,.]{1,20}", any::<bool>(), any::<bool>()), 1..6)
}

proptest! {
    #[test]
    fn prop_generated_cfi_resolves_to_same_position(
        paragraphs in paragraphs(),
        which in any::<prop::sample::Index>(),
        tail in any::<bool>(),
        offset in any::<prop::sample::Index>(),
    ) {
        let doc = parse_xhtml(&chapter(&paragraphs)).unwrap();
        let blacklist = Blacklist::new().with_class(MARKER_CLASS);
        let body = doc.find_by_id("body").unwrap();
        let p = doc.children(body)[which.index(paragraphs.len())];
        let text = doc.children(p)[if tail { 2 } else { 0 }];
        let offset = offset.index(doc.text_len(text) + 1);

        let path = generate_from_text_position(&doc, text, offset, &blacklist).unwrap();
        let cfi = parse(&Cfi::new(path).to_string()).unwrap();
        let position = text_at(&doc, &cfi, &blacklist);

        prop_assert_eq!(position.locate(&doc), Some((text, offset)));
    }

    #[test]
    fn prop_markers_do_not_move_positions(
        paragraphs in paragraphs(),
        which in any::<prop::sample::Index>(),
        tail in any::<bool>(),
        offset in any::<prop::sample::Index>(),
        markers in prop::collection::vec(any::<prop::sample::Index>(), 1..5),
    ) {
        let mut doc = parse_xhtml(&chapter(&paragraphs)).unwrap();
        let blacklist = Blacklist::new().with_class(MARKER_CLASS);
        let body = doc.find_by_id("body").unwrap();
        let p = doc.children(body)[which.index(paragraphs.len())];
        let text = doc.children(p)[if tail { 2 } else { 0 }];
        let len = doc.text_len(text);
        let original_text = doc.text(text).unwrap_or_default().to_string();
        let offset = offset.index(len + 1);

        let path = generate_from_text_position(&doc, text, offset, &blacklist).unwrap();
        let cfi = Cfi::new(path.clone());

        let mut injected = Vec::new();
        for at in &markers {
            let mut marker_path = path.clone();
            marker_path.set_character_offset(at.index(len + 1) as u32);
            let position = text_at(&doc, &Cfi::new(marker_path), &blacklist);
            let marker = doc.create_element("span", &[("class", MARKER_CLASS)]);
            inject_marker_at(&mut doc, &position, marker).unwrap();
            injected.push(marker);
        }

        let moved = text_at(&doc, &cfi, &blacklist);
        prop_assert_eq!(moved.text(&doc), original_text);
        prop_assert_eq!(moved.offset, Some(offset));

        // Generating from the split node gives the same CFI back
        let (node, local) = moved.locate(&doc).unwrap();
        let regenerated = generate_from_text_position(&doc, node, local, &blacklist).unwrap();
        prop_assert_eq!(regenerated.to_string(), cfi.path.to_string());

        for marker in injected.into_iter().rev() {
            remove_marker(&mut doc, marker);
        }
        let restored = text_at(&doc, &cfi, &blacklist);
        prop_assert_eq!(restored.locate(&doc), Some((text, offset)));
        prop_assert_eq!(doc.children(p).len(), 3);
    }
}

proptest! {
    #[test]
    fn prop_generated_element_cfi_resolves_to_element(
        paragraphs in decorated_paragraphs(),
        which in any::<prop::sample::Index>(),
    ) {
        let doc = parse_xhtml(&decorated_chapter(&paragraphs)).unwrap();
        let blacklist = Blacklist::new().with_class(MARKER_CLASS);
        let elements = indexable_elements(&doc, &blacklist);
        let element = elements[which.index(elements.len())];

        let path = generate_from_element(&doc, element, &blacklist).unwrap();
        let cfi = parse(&Cfi::new(path).to_string()).unwrap();
        let resolution = resolve(&cfi, &doc, doc.document(), &blacklist).unwrap();

        prop_assert_eq!(resolution.target, ResolvedTarget::Element(element));
    }

    #[test]
    fn prop_element_steps_even_and_text_steps_odd(paragraphs in decorated_paragraphs()) {
        let doc = parse_xhtml(&decorated_chapter(&paragraphs)).unwrap();
        let blacklist = Blacklist::new().with_class(MARKER_CLASS);

        for element in indexable_elements(&doc, &blacklist) {
            let path = generate_from_element(&doc, element, &blacklist).unwrap();
            for step in &path.steps {
                match step.step_type {
                    StepType::Indirection => {}
                    StepType::Index(n) => {
                        prop_assert!(n >= 2 && n % 2 == 0, "step {} in {}", n, path);
                    }
                }
            }

            // Sibling elements in document order get increasing indices
            let last_steps: Vec<u32> = doc
                .children(element)
                .into_iter()
                .filter(|&c| doc.kind(c) == NodeKind::Element && !blacklist.excludes(&doc, c))
                .map(|c| {
                    generate_from_element(&doc, c, &blacklist)
                        .unwrap()
                        .steps
                        .last()
                        .and_then(CfiStep::value)
                        .unwrap()
                })
                .collect();
            prop_assert!(last_steps.windows(2).all(|w| w[0] < w[1]), "{:?}", last_steps);

            for text in doc.children(element) {
                if doc.kind(text) != NodeKind::Text {
                    continue;
                }
                let path = generate_from_text_position(&doc, text, 0, &blacklist).unwrap();
                let (last, parents) = path.steps.split_last().unwrap();
                prop_assert_eq!(last.kind(), StepKind::Text);
                prop_assert!(last.value().unwrap() % 2 == 1);
                prop_assert!(parents.iter().all(|step| step.kind() != StepKind::Text));
            }
        }
    }

    #[test]
    fn prop_blacklists_agreeing_on_a_paragraph_address_it_alike(
        paragraphs in decorated_paragraphs(),
        which in any::<prop::sample::Index>(),
        tail in any::<bool>(),
        offset in any::<prop::sample::Index>(),
    ) {
        let doc = parse_xhtml(&decorated_chapter(&paragraphs)).unwrap();
        let markers_only = Blacklist::new().with_class(MARKER_CLASS);
        let with_chrome = markers_only.clone().with_class("chrome");

        let body = doc.find_by_id("body").unwrap();
        let ps: Vec<NodeId> = doc
            .children(body)
            .into_iter()
            .filter(|&c| doc.local_name(c) == Some("p"))
            .collect();
        let p = ps[which.index(ps.len())];
        let texts: Vec<NodeId> = doc
            .children(p)
            .into_iter()
            .filter(|&c| doc.kind(c) == NodeKind::Text)
            .collect();
        let text = if tail { texts[texts.len() - 1] } else { texts[0] };
        let offset = offset.index(doc.text_len(text) + 1);

        let narrow = generate_from_text_position(&doc, text, offset, &markers_only).unwrap();
        let wide = generate_from_text_position(&doc, text, offset, &with_chrome).unwrap();
        // Steps inside the paragraph do not depend on the chrome filter
        prop_assert_eq!(narrow.steps.last(), wide.steps.last());
        prop_assert_eq!(&narrow.character_offset, &wide.character_offset);

        for (path, blacklist) in [(narrow, &markers_only), (wide, &with_chrome)] {
            let position = text_at(&doc, &Cfi::new(path), blacklist);
            prop_assert_eq!(position.locate(&doc), Some((text, offset)));

            let element = generate_from_element(&doc, p, blacklist).unwrap();
            let resolution = resolve(&Cfi::new(element), &doc, doc.document(), blacklist).unwrap();
            prop_assert_eq!(resolution.target, ResolvedTarget::Element(p));
        }
    }
}

#[test]
fn test_marked_chapter_keeps_sibling_indices() {
    let mut doc = parse_xhtml(&chapter(&[
        ("one".to_string(), "two".to_string()),
        ("three".to_string(), "four".to_string()),
    ]))
    .unwrap();
    let blacklist = Blacklist::new().with_class(MARKER_CLASS);
    let cfi = parse("epubcfi(/6/4!/4/4/3:2)").unwrap();
    assert_eq!(text_at(&doc, &cfi, &blacklist).text(&doc), "four");

    let start = parse("epubcfi(/6/4!/4/2/1:0)").unwrap();
    let position = text_at(&doc, &start, &blacklist);
    let marker = doc.create_element("span", &[("class", MARKER_CLASS)]);
    inject_marker_at(&mut doc, &position, marker).unwrap();

    let position = text_at(&doc, &cfi, &blacklist);
    assert_eq!(position.text(&doc), "four");
    assert_eq!(position.offset, Some(2));
}

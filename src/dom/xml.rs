//! XHTML reading and writing for [`ArenaDocument`]
//!
//! Content documents are well-formed XML, so quick-xml is enough: there is no
//! HTML error recovery here. The handful of HTML named entities that show up
//! in real EPUBs are resolved on the way in; any other entity reference is
//! kept as literal text.

use quick_xml::escape::unescape_with;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use super::arena::{ArenaDocument, NodeData, NodeId};
use super::{DocumentTree, DocumentTreeMut, NodeKind};

/// Errors raised while reading or writing a document
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Unexpected closing tag </{0}>")]
    UnexpectedClose(String),

    #[error("Unclosed element <{0}>")]
    Unclosed(String),

    #[error("Document has no root element")]
    NoRootElement,
}

/// Parse an XHTML content document into a fresh arena
pub fn parse_xhtml(input: &str) -> Result<ArenaDocument, DocumentError> {
    let mut arena = ArenaDocument::new();
    let document = arena.document();
    parse_into(&mut arena, document, input)?;
    Ok(arena)
}

pub(crate) fn parse_into(
    arena: &mut ArenaDocument,
    document: NodeId,
    input: &str,
) -> Result<(), DocumentError> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<NodeId> = vec![document];

    loop {
        let current = *stack.last().unwrap_or(&document);
        match reader.read_event()? {
            Event::Start(start) => {
                let element = element_from(arena, &start)?;
                arena.append(current, element);
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = element_from(arena, &start)?;
                arena.append(current, element);
            }
            Event::End(end) => {
                if stack.len() <= 1 {
                    let name = String::from_utf8(end.name().as_ref().to_vec())?;
                    return Err(DocumentError::UnexpectedClose(name));
                }
                stack.pop();
            }
            Event::Text(text) => {
                let raw = String::from_utf8(text.into_inner().into_owned())?;
                append_text(arena, current, &unescape_lenient(&raw));
            }
            Event::CData(cdata) => {
                let text = String::from_utf8(cdata.into_inner().into_owned())?;
                append_text(arena, current, &text);
            }
            Event::Comment(comment) => {
                let text = String::from_utf8(comment.into_inner().into_owned())?;
                let node = arena.create_comment(text);
                arena.append(current, node);
            }
            Event::Eof => break,
            // Declarations, processing instructions and doctypes carry no
            // addressable content.
            _ => {}
        }
    }

    if stack.len() > 1 {
        let open = stack[stack.len() - 1];
        let name = arena.local_name(open).unwrap_or("?").to_string();
        return Err(DocumentError::Unclosed(name));
    }
    if arena.root_element(document).is_none() {
        return Err(DocumentError::NoRootElement);
    }
    Ok(())
}

fn element_from(arena: &mut ArenaDocument, start: &BytesStart<'_>) -> Result<NodeId, DocumentError> {
    let name = String::from_utf8(start.name().as_ref().to_vec())?;
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8(attr.key.as_ref().to_vec())?;
        let value = unescape_lenient(&String::from_utf8(attr.value.to_vec())?);
        attrs.push((key, value));
    }
    Ok(arena.create_element_owned(name, attrs))
}

/// Text directly following text (CDATA next to character data) is folded
/// into one node, the way a DOM parser normalizes it.
fn append_text(arena: &mut ArenaDocument, parent: NodeId, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(&last) = arena.children(parent).last() {
        if let Some(existing) = arena.text(last) {
            let merged = format!("{}{}", existing, text);
            arena.set_text(last, merged);
            return;
        }
    }
    let node = arena.create_text(text);
    arena.append(parent, node);
}

/// Resolve XML and known HTML entities. An unknown or malformed reference
/// stays in the text as written.
fn unescape_lenient(raw: &str) -> String {
    if let Ok(text) = unescape_with(raw, resolve_html_entity) {
        return text.into_owned();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            rest = tail;
            break;
        };
        let reference = &tail[..=semi];
        match unescape_with(reference, resolve_html_entity) {
            Ok(text) => out.push_str(&text),
            Err(_) => out.push_str(reference),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

fn resolve_html_entity(name: &str) -> Option<&'static str> {
    let value = match name {
        "nbsp" => "\u{a0}",
        "ensp" => "\u{2002}",
        "emsp" => "\u{2003}",
        "thinsp" => "\u{2009}",
        "shy" => "\u{ad}",
        "zwnj" => "\u{200c}",
        "zwj" => "\u{200d}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "hellip" => "\u{2026}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        _ => return None,
    };
    Some(value)
}

/// Serialize `node` and its subtree back to markup
pub fn serialize(arena: &ArenaDocument, node: NodeId) -> Result<String, DocumentError> {
    let mut writer = Writer::new(Vec::new());
    write_node(arena, node, &mut writer)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_node(
    arena: &ArenaDocument,
    node: NodeId,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), DocumentError> {
    match arena.data(node) {
        NodeData::Document => {
            for child in arena.children(node) {
                write_node(arena, child, writer)?;
            }
        }
        NodeData::Element { name, attrs } => {
            let mut start = BytesStart::new(name.as_str());
            for (key, value) in attrs {
                start.push_attribute((key.as_str(), value.as_str()));
            }
            let children = arena.children(node);
            if children.is_empty() {
                writer.write_event(Event::Empty(start))?;
            } else {
                writer.write_event(Event::Start(start))?;
                for child in children {
                    write_node(arena, child, writer)?;
                }
                writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
            }
        }
        NodeData::Text(text) => {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        NodeData::Comment(text) => {
            writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?;
        }
    }
    Ok(())
}

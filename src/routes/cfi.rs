//! CFI API endpoints
//!
//! Stateless bridge between a reader UI and the engine: every request
//! carries the XHTML it is about, which is parsed into a fresh arena.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::cfi::{
    compare_reading_order, generate_from_element, generate_from_text_position, generate_range,
    inject_marker_at, parse, text_position_in, AssertionMismatch, Blacklist, Cfi, Resolution,
    ResolvedTarget, Resolver,
};
use crate::dom::{parse_xhtml, serialize, ArenaDocument, DocumentTree, DocumentTreeMut, NodeId};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the CFI router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/parse", post(parse_cfi))
        .route("/resolve", post(resolve_cfi))
        .route("/mark", post(mark_cfi))
        .route("/generate", post(generate_cfi))
        .route("/selection", post(selection_cfi))
        .route("/compare", post(compare_cfis))
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub cfi: String,
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    /// Canonical serialization
    pub cfi: String,
    #[serde(rename = "isRange")]
    pub is_range: bool,
    #[serde(rename = "spineIndex")]
    pub spine_index: Option<u32>,
    #[serde(rename = "packagePath")]
    pub package_path: String,
    #[serde(rename = "contentPath")]
    pub content_path: String,
    pub parsed: Cfi,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub cfi: String,
    /// XHTML content document
    pub document: String,
    pub blacklist: Option<Blacklist>,
    pub strict: Option<bool>,
}

/// Description of a resolved location
#[derive(Debug, Serialize, PartialEq)]
pub struct TargetInfo {
    /// "element" or "text"
    pub kind: &'static str,
    /// The element itself, or the element holding the text run
    pub node: String,
    pub id: Option<String>,
    pub text: Option<String>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub target: TargetInfo,
    /// End of a range CFI
    pub end: Option<TargetInfo>,
    #[serde(rename = "assertionMismatches")]
    pub assertion_mismatches: Vec<AssertionMismatch>,
}

#[derive(Debug, Deserialize)]
pub struct MarkRequest {
    pub cfi: String,
    pub document: String,
    pub blacklist: Option<Blacklist>,
    #[serde(rename = "markerId")]
    pub marker_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkResponse {
    /// The document with marker elements inserted
    pub document: String,
    #[serde(rename = "markerClass")]
    pub marker_class: String,
    pub markers: usize,
    #[serde(rename = "assertionMismatches")]
    pub assertion_mismatches: Vec<AssertionMismatch>,
}

/// A position named by an element id and an optional offset (UTF-16 code
/// units) into the element's visible text content
#[derive(Debug, Clone, Deserialize)]
pub struct Anchor {
    #[serde(rename = "elementId")]
    pub element_id: String,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub document: String,
    pub anchor: Anchor,
    /// CFI whose package prefix is reused (typically the chapter's base CFI)
    pub base: Option<String>,
    pub blacklist: Option<Blacklist>,
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub document: String,
    pub start: Anchor,
    pub end: Anchor,
    pub base: Option<String>,
    pub blacklist: Option<Blacklist>,
}

#[derive(Debug, Serialize)]
pub struct CfiResponse {
    pub cfi: String,
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    /// -1, 0 or 1
    pub ordering: i8,
}

/// Parse and canonicalize a CFI
async fn parse_cfi(Json(req): Json<ParseRequest>) -> Result<Json<ParseResponse>> {
    let cfi = parse(&req.cfi)?;
    Ok(Json(ParseResponse {
        cfi: cfi.to_string(),
        is_range: cfi.is_range(),
        spine_index: cfi.spine_index(),
        package_path: cfi.package_path().to_string(),
        content_path: cfi.content_path().to_string(),
        parsed: cfi,
    }))
}

/// Resolve a CFI against a content document
async fn resolve_cfi(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>> {
    let cfi = parse(&req.cfi)?;
    let doc = load(&state, &req.document)?;
    let blacklist = state.blacklist(req.blacklist.as_ref());
    let strict = req.strict.unwrap_or(state.config().engine.strict_assertions);
    let resolver = Resolver::new(&doc, &blacklist).strict_assertions(strict);

    if cfi.is_range() {
        let range = resolver.resolve_range(&cfi, doc.document())?;
        let mut assertion_mismatches = range.start.assertion_mismatches.clone();
        assertion_mismatches.extend(range.end.assertion_mismatches.iter().cloned());
        return Ok(Json(ResolveResponse {
            target: describe_target(&doc, &range.start),
            end: Some(describe_target(&doc, &range.end)),
            assertion_mismatches,
        }));
    }

    let resolution = resolver.resolve(&cfi, doc.document())?;
    Ok(Json(ResolveResponse {
        target: describe_target(&doc, &resolution),
        end: None,
        assertion_mismatches: resolution.assertion_mismatches,
    }))
}

/// Resolve a CFI and inject marker elements at its location(s)
async fn mark_cfi(
    State(state): State<AppState>,
    Json(req): Json<MarkRequest>,
) -> Result<Json<MarkResponse>> {
    let cfi = parse(&req.cfi)?;
    let mut doc = load(&state, &req.document)?;
    let blacklist = state.blacklist(req.blacklist.as_ref());
    let marker_class = state.config().engine.marker_class.clone();
    let strict = state.config().engine.strict_assertions;

    let ends = if cfi.is_range() {
        vec![Cfi::new(cfi.range_start()), Cfi::new(cfi.range_end())]
    } else {
        vec![cfi]
    };

    let mut assertion_mismatches = Vec::new();
    for (i, end) in ends.iter().enumerate() {
        // Re-resolve after each injection; the marker class is blacklisted,
        // so logical positions are unchanged by the previous marker.
        let resolution = Resolver::new(&doc, &blacklist)
            .strict_assertions(strict)
            .resolve(end, doc.document())?;
        assertion_mismatches.extend(resolution.assertion_mismatches);

        let marker_id = req.marker_id.as_ref().map(|id| match ends.len() {
            1 => id.clone(),
            _ => format!("{}-{}", id, if i == 0 { "start" } else { "end" }),
        });
        let mut attrs = vec![("class", marker_class.as_str())];
        if let Some(id) = marker_id.as_deref() {
            attrs.push(("id", id));
        }
        let marker = doc.create_element("span", &attrs);

        match resolution.target {
            ResolvedTarget::Element(node) => doc.insert_before(node, marker),
            ResolvedTarget::Text(position) => {
                inject_marker_at(&mut doc, &position, marker)?;
            }
        }
    }

    tracing::debug!(cfi = %req.cfi, markers = ends.len(), "marked document");
    Ok(Json(MarkResponse {
        document: serialize(&doc, doc.document())?,
        marker_class,
        markers: ends.len(),
        assertion_mismatches,
    }))
}

/// Generate a CFI for an anchor, reusing the package prefix of `base`
async fn generate_cfi(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<CfiResponse>> {
    let base = req.base.as_deref().map(parse).transpose()?;
    let doc = load(&state, &req.document)?;
    let blacklist = state.blacklist(req.blacklist.as_ref());

    let element = find_anchor(&doc, &req.anchor)?;
    let content = match req.anchor.offset {
        None => generate_from_element(&doc, element, &blacklist)?,
        Some(offset) => {
            let (text, local) = text_position_in(&doc, element, offset, &blacklist)?;
            generate_from_text_position(&doc, text, local, &blacklist)?
        }
    };

    let cfi = match &base {
        Some(base) => Cfi::from_components(&base.package_path(), &content),
        None => Cfi::new(content),
    };
    tracing::debug!(cfi = %cfi, "generated CFI");
    Ok(Json(CfiResponse {
        cfi: cfi.to_string(),
    }))
}

/// Generate a range CFI for a selection between two anchors
async fn selection_cfi(
    State(state): State<AppState>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<CfiResponse>> {
    let base = req.base.as_deref().map(parse).transpose()?;
    let doc = load(&state, &req.document)?;
    let blacklist = state.blacklist(req.blacklist.as_ref());

    let start_element = find_anchor(&doc, &req.start)?;
    let end_element = find_anchor(&doc, &req.end)?;
    let start = text_position_in(&doc, start_element, req.start.offset.unwrap_or(0), &blacklist)?;
    let end = text_position_in(&doc, end_element, req.end.offset.unwrap_or(0), &blacklist)?;

    let mut cfi = generate_range(&doc, start, end, &blacklist)?;
    if let Some(base) = &base {
        cfi.path = base.package_path().join(&cfi.path);
    }
    Ok(Json(CfiResponse {
        cfi: cfi.to_string(),
    }))
}

/// Compare two CFIs in reading order
async fn compare_cfis(Json(req): Json<CompareRequest>) -> Result<Json<CompareResponse>> {
    let a = parse(&req.a)?;
    let b = parse(&req.b)?;
    let ordering = match compare_reading_order(&a, &b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    Ok(Json(CompareResponse { ordering }))
}

fn load(state: &AppState, document: &str) -> Result<ArenaDocument> {
    let limit = state.config().engine.max_document_bytes;
    if document.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: document.len(),
            limit,
        });
    }
    Ok(parse_xhtml(document)?)
}

fn find_anchor(doc: &ArenaDocument, anchor: &Anchor) -> Result<NodeId> {
    doc.find_by_id(&anchor.element_id)
        .ok_or_else(|| AppError::NotFound(format!("No element with id '{}'", anchor.element_id)))
}

fn describe_target(doc: &ArenaDocument, resolution: &Resolution<NodeId>) -> TargetInfo {
    match &resolution.target {
        ResolvedTarget::Element(node) => TargetInfo {
            kind: "element",
            node: doc.describe(*node),
            id: doc.id(*node).map(str::to_string),
            text: None,
            offset: None,
        },
        ResolvedTarget::Text(position) => {
            let holder = position.nodes.first().and_then(|&n| doc.parent(n));
            TargetInfo {
                kind: "text",
                node: holder.map(|n| doc.describe(n)).unwrap_or_default(),
                id: holder.and_then(|n| doc.id(n)).map(str::to_string),
                text: Some(position.text(doc)),
                offset: position.offset,
            }
        }
    }
}

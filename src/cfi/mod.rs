//! CFI (Canonical Fragment Identifier) engine for EPUB
//!
//! Parses, resolves, generates and compares EPUB CFI strings, and injects
//! position markers into content documents. The engine works on any host
//! tree implementing [`crate::dom::DocumentTree`].
//!
//! # Example CFI
//!
//! ```text
//! epubcfi(/6/4[chapter1]!/4/2/1:42)
//!         │  │          │ │ │ │ └── character offset 42
//!         │  │          │ │ │ └──── text run (odd = text)
//!         │  │          │ │ └────── element index
//!         │  │          │ └──────── element index (body)
//!         │  │          └────────── indirection (into content doc)
//!         │  └───────────────────── spine item with ID
//!         └──────────────────────── spine element
//! ```
//!
//! Child indices skip blacklisted elements and count adjacent text nodes as
//! one logical run, so markers injected by the host never shift a CFI.
//!
//! # Usage
//!
//! ```
//! use epub_cfi::cfi::{parse, resolve, Blacklist, ResolvedTarget};
//! use epub_cfi::dom::parse_xhtml;
//!
//! let doc = parse_xhtml("<html><body><p>Hello, world</p></body></html>").unwrap();
//! let cfi = parse("epubcfi(/6/4!/2/2:5)").unwrap();
//! let resolution = resolve(&cfi, &doc, doc.document(), &Blacklist::new()).unwrap();
//! assert!(matches!(resolution.target, ResolvedTarget::Text(_)));
//! ```

mod blacklist;
mod comparator;
mod error;
mod generator;
mod marker;
mod parser;
mod resolver;
mod types;
mod units;

pub use types::{
    CharacterOffset, Cfi, CfiPath, CfiRange, CfiStep, StepKind, StepType, TextAssertion,
};

pub use error::{
    AssertionKind, AssertionMismatch, CfiError, Result, SyntaxError, TerminusKind,
};

pub use parser::{parse, try_parse};

pub use blacklist::Blacklist;

pub use resolver::{
    resolve, resolve_package_item, resolve_range, spine_item_href, Resolution, ResolvedRange,
    ResolvedTarget, Resolver, TextPosition,
};

pub use generator::{
    generate_from_element, generate_from_text_position, generate_range, Boundary, CfiBuilder,
    Generator,
};

pub use marker::{inject_marker, inject_marker_at, remove_marker};

pub use units::text_position_in;

pub use comparator::{
    compare_cfi_strings, compare_reading_order, is_after, is_before, is_in_range,
};

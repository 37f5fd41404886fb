//! EPUB CFI engine
//!
//! Parses, resolves, generates and compares EPUB Canonical Fragment
//! Identifiers over a host document tree, and serves the engine to reader
//! front-ends over HTTP.
//!
//! # Modules
//!
//! - `cfi`: the engine (path model, parser, resolver, generator, markers)
//! - `dom`: host tree abstraction and an arena-backed XHTML implementation
//! - `routes`: the bridge service built on axum

pub mod cfi;
pub mod config;
pub mod dom;
pub mod error;
pub mod routes;
pub mod state;

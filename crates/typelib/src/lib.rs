//! COM type libraries
//!
//! Compiles the IDL subset COM servers describe themselves with into a
//! [`TypeLibrary`], stores and loads it as a binary `.tlb`, and generates
//! typed Rust proxies from it.
//!
//! # Architecture
//!
//! 1. Lexer: tokenizes IDL source
//! 2. Parser: builds a syntax tree
//! 3. Semantic analysis: resolves names and assigns opnums
//! 4. `tlb`: the binary library format
//! 5. Codegen: proxy source for the harness
//!
//! # Example
//!
//! ```ignore
//! use comharness_typelib::{compile, codegen::{generate_proxies, ProxyOptions}};
//!
//! let lib = compile(r#"
//!     [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a14)]
//!     interface IHen : IUnknown { HRESULT Cluck(); };
//! "#)?;
//! assert_eq!(lib.interface("IHen").unwrap().methods[0].opnum, 3);
//! let source = generate_proxies(&lib, &ProxyOptions::default())?;
//! ```

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod library;
pub mod parser;
pub mod semantic;
pub mod tlb;
mod error;

pub use codegen::{generate_proxies, ProxyOptions};
pub use error::{Result, Span, TypeLibError};
pub use library::*;

use std::path::Path;

/// Parse IDL without analysing it
pub fn parse(idl: &str) -> Result<ast::File> {
    parser::parse(idl)
}

/// Compile IDL source to a type library
pub fn compile(idl: &str) -> Result<TypeLibrary> {
    semantic::analyze(&parser::parse(idl)?)
}

/// Compile an IDL file. A file without a `library` block is named after the
/// file.
pub fn compile_file(path: impl AsRef<Path>) -> Result<TypeLibrary> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;
    let file = parser::parse(&source)?;
    let mut lib = semantic::analyze(&file)?;
    if file.library().is_none() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            lib.name = stem.to_string();
        }
    }
    tracing::debug!(path = %path.display(), library = %lib, "compiled IDL");
    Ok(lib)
}

/// Load a type library from `.idl` source or a binary `.tlb`.
pub fn load(path: impl AsRef<Path>) -> Result<TypeLibrary> {
    let path = path.as_ref();
    let is_idl = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("idl"));
    if is_idl {
        compile_file(path)
    } else {
        tlb::read_file(path)
    }
}

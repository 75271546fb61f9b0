//! Type library errors

use std::fmt;
use thiserror::Error;

/// Source location, with 1-based line and column of the first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self { start, end, line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum TypeLibError {
    #[error("lexer error at {span}: {message}")]
    Lexer { span: Span, message: String },

    #[error("parse error at {span}: {message}")]
    Parse { span: Span, message: String },

    #[error("semantic error: {message}")]
    Semantic { message: String, span: Option<Span> },

    #[error("undefined type: {name}")]
    UndefinedType { name: String, span: Option<Span> },

    #[error("duplicate {kind}: {name}")]
    DuplicateDefinition { kind: &'static str, name: String },

    #[error("invalid UUID: {uuid}")]
    InvalidUuid { uuid: String },

    /// A `.tlb` that is not a type library or is damaged
    #[error("malformed type library: {0}")]
    Malformed(String),

    #[error("type library format version {found} is newer than supported version {supported}")]
    VersionIncompatible { found: u16, supported: u16 },

    #[error("code generation error: {0}")]
    Codegen(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TypeLibError>;

impl TypeLibError {
    pub fn lexer(span: Span, message: impl Into<String>) -> Self {
        Self::Lexer { span, message: message.into() }
    }

    pub fn parse(span: Span, message: impl Into<String>) -> Self {
        Self::Parse { span, message: message.into() }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic { message: message.into(), span: None }
    }

    pub fn semantic_at(message: impl Into<String>, span: Span) -> Self {
        Self::Semantic { message: message.into(), span: Some(span) }
    }

    pub fn undefined_type(name: impl Into<String>, span: Span) -> Self {
        Self::UndefinedType { name: name.into(), span: Some(span) }
    }

    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateDefinition { kind, name: name.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen(message.into())
    }
}

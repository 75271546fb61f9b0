//! IDL syntax tree
//!
//! The parser keeps what it reads close to the source: attributes stay on
//! the node they were written on and types stay unresolved until semantic
//! analysis.

use crate::error::Span;

#[derive(Debug, Clone, Default)]
pub struct File {
    pub items: Vec<Item>,
}

impl File {
    /// The `library` block, if the file has one
    pub fn library(&self) -> Option<&LibraryDecl> {
        self.items.iter().find_map(|item| match item {
            Item::Library(lib) => Some(lib),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Item {
    /// `import "a.idl", "b.idl";`
    Import(Vec<String>),
    /// `importlib("stdole2.tlb");`
    ImportLib(String),
    CppQuote(String),
    /// `interface IFoo;`
    Forward(String, Span),
    /// `typedef T Name;`
    Alias(AliasDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Interface(InterfaceDecl),
    Coclass(CoclassDecl),
    Library(LibraryDecl),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Void,
    Boolean,
    Byte,
    Char,
    UChar,
    WChar,
    Small,
    USmall,
    Short,
    UShort,
    Long,
    ULong,
    Hyper,
    UHyper,
    Float,
    Double,
}

impl BaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Char => "char",
            Self::UChar => "unsigned char",
            Self::WChar => "wchar_t",
            Self::Small => "small",
            Self::USmall => "unsigned small",
            Self::Short => "short",
            Self::UShort => "unsigned short",
            Self::Long => "long",
            Self::ULong => "unsigned long",
            Self::Hyper => "hyper",
            Self::UHyper => "unsigned hyper",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

/// A type as written, before name resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Base(BaseType),
    Named(String),
    Pointer(Box<Type>),
}

impl Type {
    /// Strip every pointer level, returning the pointee and the depth.
    pub fn peel(&self) -> (&Type, usize) {
        let mut ty = self;
        let mut depth = 0;
        while let Type::Pointer(inner) = ty {
            ty = inner;
            depth += 1;
        }
        (ty, depth)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Ref,
    Unique,
    Ptr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Uuid(String),
    Version(u16, u16),
    Object,
    Local,
    HelpString(String),
    PointerDefault(PointerKind),
    In,
    Out,
    Retval,
    String,
    Default,
    Source,
    OleAutomation,
    Dual,
    Threading(String),
    ProgId(String),
    /// Anything else, with its argument text if it had one
    Unknown(String, Option<String>),
}

/// Lookups over an attribute list
pub trait Attributes {
    fn has(&self, attr: &Attribute) -> bool;
    fn uuid(&self) -> Option<&str>;
    fn version(&self) -> Option<(u16, u16)>;
    fn progid(&self) -> Option<&str>;
    fn threading(&self) -> Option<&str>;
}

impl Attributes for [Attribute] {
    fn has(&self, attr: &Attribute) -> bool {
        self.iter().any(|a| a == attr)
    }

    fn uuid(&self) -> Option<&str> {
        self.iter().find_map(|a| match a {
            Attribute::Uuid(u) => Some(u.as_str()),
            _ => None,
        })
    }

    fn version(&self) -> Option<(u16, u16)> {
        self.iter().find_map(|a| match a {
            Attribute::Version(major, minor) => Some((*major, *minor)),
            _ => None,
        })
    }

    fn progid(&self) -> Option<&str> {
        self.iter().find_map(|a| match a {
            Attribute::ProgId(p) => Some(p.as_str()),
            _ => None,
        })
    }

    fn threading(&self) -> Option<&str> {
        self.iter().find_map(|a| match a {
            Attribute::Threading(t) => Some(t.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AliasDecl {
    pub attrs: Vec<Attribute>,
    pub ty: Type,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub attrs: Vec<Attribute>,
    /// `struct Tag { ... }`, when a typedef also gives the struct a name
    pub tag: Option<String>,
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub attrs: Vec<Attribute>,
    pub ty: Type,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub attrs: Vec<Attribute>,
    pub tag: Option<String>,
    pub name: String,
    pub variants: Vec<(String, Option<i64>)>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub attrs: Vec<Attribute>,
    pub name: String,
    pub base: Option<String>,
    pub methods: Vec<MethodDecl>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub attrs: Vec<Attribute>,
    pub return_type: Type,
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub attrs: Vec<Attribute>,
    pub ty: Type,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CoclassDecl {
    pub attrs: Vec<Attribute>,
    pub name: String,
    pub interfaces: Vec<CoclassMember>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CoclassMember {
    pub name: String,
    pub is_default: bool,
    pub is_source: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct LibraryDecl {
    pub attrs: Vec<Attribute>,
    pub name: String,
    pub items: Vec<Item>,
    pub span: Span,
}

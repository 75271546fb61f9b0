//! Resolved type library model
//!
//! This is what a compiled `.idl` or a loaded `.tlb` looks like to the rest
//! of the harness. Names are resolved, opnums are assigned and every type is
//! reduced to a [`TypeDesc`] the marshaller knows how to handle.

use std::fmt;
use uuid::Uuid;

/// Methods every interface inherits from IUnknown
pub const IUNKNOWN_METHOD_COUNT: u16 = 3;

pub const IUNKNOWN_IID: Uuid = Uuid::from_u128(0x00000000_0000_0000_c000_000000000046);

/// Whether `name` is an IDL identifier: `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeLibrary {
    pub name: String,
    pub uuid: Uuid,
    pub version: (u16, u16),
    pub interfaces: Vec<InterfaceDef>,
    pub structs: Vec<StructDef>,
    pub coclasses: Vec<CoclassDef>,
}

impl TypeLibrary {
    pub fn new(name: impl Into<String>, uuid: Uuid, version: (u16, u16)) -> Self {
        Self {
            name: name.into(),
            uuid,
            version,
            interfaces: Vec::new(),
            structs: Vec::new(),
            coclasses: Vec::new(),
        }
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceDef> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn interface_by_iid(&self, iid: &Uuid) -> Option<&InterfaceDef> {
        self.interfaces.iter().find(|i| i.iid == *iid)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn coclass(&self, name: &str) -> Option<&CoclassDef> {
        self.coclasses.iter().find(|c| c.name == name)
    }

    pub fn coclass_by_progid(&self, progid: &str) -> Option<&CoclassDef> {
        self.coclasses.iter().find(|c| c.progid.as_deref() == Some(progid))
    }

    /// Find a method by name on an interface or any interface it derives
    /// from. The most derived definition wins.
    pub fn method(&self, interface: &str, method: &str) -> Option<&MethodDef> {
        let mut current = self.interface(interface);
        while let Some(def) = current {
            if let Some(m) = def.method(method) {
                return Some(m);
            }
            current = def.base.as_deref().and_then(|base| self.interface(base));
        }
        None
    }

    /// Whether `interface` is `ancestor` or derives from it.
    pub fn derives_from(&self, interface: &str, ancestor: &str) -> bool {
        let mut current = Some(interface);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.interface(name).and_then(|def| def.base.as_deref());
        }
        false
    }
}

impl fmt::Display for TypeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{} ({})", self.name, self.version.0, self.version.1, self.uuid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDef {
    pub name: String,
    pub iid: Uuid,
    /// `None` for interfaces deriving straight from IUnknown
    pub base: Option<String>,
    pub methods: Vec<MethodDef>,
}

impl InterfaceDef {
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub opnum: u16,
    pub params: Vec<ParamDef>,
}

impl MethodDef {
    pub fn inputs(&self) -> impl Iterator<Item = &ParamDef> {
        self.params.iter().filter(|p| p.direction.is_in())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ParamDef> {
        self.params.iter().filter(|p| p.direction.is_out())
    }

    pub fn retval(&self) -> Option<&ParamDef> {
        self.params.iter().find(|p| p.retval)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeDesc,
    pub direction: ParamDirection,
    pub retval: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

impl ParamDirection {
    pub fn is_in(&self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    pub fn is_out(&self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoclassDef {
    pub name: String,
    pub clsid: Uuid,
    pub progid: Option<String>,
    pub threading: Option<String>,
    pub interfaces: Vec<CoclassInterface>,
}

impl CoclassDef {
    /// The `[default]` interface, or the first one listed
    pub fn default_interface(&self) -> Option<&str> {
        self.interfaces
            .iter()
            .find(|i| i.is_default)
            .or_else(|| self.interfaces.first())
            .map(|i| i.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoclassInterface {
    pub name: String,
    pub is_default: bool,
}

/// Marshallable types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Void,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bstr,
    WString,
    HResult,
    Struct(String),
    /// An interface pointer
    Interface(String),
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Bool => write!(f, "VARIANT_BOOL"),
            Self::I8 => write!(f, "i8"),
            Self::U8 => write!(f, "u8"),
            Self::I16 => write!(f, "i16"),
            Self::U16 => write!(f, "u16"),
            Self::I32 => write!(f, "i32"),
            Self::U32 => write!(f, "u32"),
            Self::I64 => write!(f, "i64"),
            Self::U64 => write!(f, "u64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::Bstr => write!(f, "BSTR"),
            Self::WString => write!(f, "LPWSTR"),
            Self::HResult => write!(f, "HRESULT"),
            Self::Struct(name) => write!(f, "struct {name}"),
            Self::Interface(name) => write!(f, "{name}*"),
        }
    }
}

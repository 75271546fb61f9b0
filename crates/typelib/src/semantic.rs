//! Semantic analysis
//!
//! Resolves names, validates the COM rules a type library has to follow and
//! lowers the syntax tree to a [`TypeLibrary`].

use crate::ast::*;
use crate::error::{Result, Span, TypeLibError};
use crate::library::*;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Interfaces every COM type library may name without declaring them,
/// with the number of methods they define.
const WELL_KNOWN_INTERFACES: &[(&str, u16)] = &[("IUnknown", IUNKNOWN_METHOD_COUNT), ("IDispatch", 7)];

pub fn analyze(file: &File) -> Result<TypeLibrary> {
    let mut analyzer = Analyzer::default();
    analyzer.collect(&file.items)?;
    analyzer.lower(file.library())
}

/// Map the automation typedefs we understand without their imports.
fn builtin_type(name: &str) -> Option<TypeDesc> {
    let desc = match name {
        "BSTR" => TypeDesc::Bstr,
        "HRESULT" | "SCODE" => TypeDesc::HResult,
        "VARIANT_BOOL" => TypeDesc::Bool,
        "LONG" | "INT" | "BOOL" => TypeDesc::I32,
        "ULONG" | "DWORD" | "UINT" => TypeDesc::U32,
        "SHORT" => TypeDesc::I16,
        "USHORT" | "WORD" => TypeDesc::U16,
        "BYTE" | "UCHAR" => TypeDesc::U8,
        "CHAR" => TypeDesc::I8,
        "LONGLONG" | "INT64" => TypeDesc::I64,
        "ULONGLONG" | "UINT64" => TypeDesc::U64,
        "FLOAT" => TypeDesc::F32,
        "DOUBLE" | "DATE" => TypeDesc::F64,
        "LPWSTR" | "LPOLESTR" | "LPCWSTR" | "LPCOLESTR" => TypeDesc::WString,
        _ => return None,
    };
    Some(desc)
}

fn base_type(base: BaseType) -> TypeDesc {
    match base {
        BaseType::Void => TypeDesc::Void,
        BaseType::Boolean => TypeDesc::Bool,
        BaseType::Byte | BaseType::UChar | BaseType::USmall => TypeDesc::U8,
        BaseType::Char | BaseType::Small => TypeDesc::I8,
        BaseType::WChar | BaseType::UShort => TypeDesc::U16,
        BaseType::Short => TypeDesc::I16,
        BaseType::Long => TypeDesc::I32,
        BaseType::ULong => TypeDesc::U32,
        BaseType::Hyper => TypeDesc::I64,
        BaseType::UHyper => TypeDesc::U64,
        BaseType::Float => TypeDesc::F32,
        BaseType::Double => TypeDesc::F64,
    }
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|_| TypeLibError::InvalidUuid { uuid: text.to_string() })
}

#[derive(Default)]
struct Analyzer<'a> {
    interfaces: Vec<&'a InterfaceDecl>,
    interface_names: HashMap<&'a str, &'a InterfaceDecl>,
    forwards: HashSet<&'a str>,
    structs: Vec<&'a StructDecl>,
    /// Struct names and tags to the struct's public name
    struct_names: HashMap<&'a str, &'a str>,
    enums: HashSet<&'a str>,
    aliases: HashMap<&'a str, &'a AliasDecl>,
    coclasses: Vec<&'a CoclassDecl>,
}

impl<'a> Analyzer<'a> {
    fn collect(&mut self, items: &'a [Item]) -> Result<()> {
        for item in items {
            match item {
                Item::Interface(decl) => {
                    if WELL_KNOWN_INTERFACES.iter().any(|(name, _)| *name == decl.name)
                        || self.interface_names.contains_key(decl.name.as_str())
                    {
                        return Err(TypeLibError::duplicate("interface", &decl.name));
                    }
                    self.check_type_name_free(&decl.name)?;
                    self.interface_names.insert(&decl.name, decl);
                    self.interfaces.push(decl);
                }
                Item::Forward(name, _) => {
                    self.forwards.insert(name);
                }
                Item::Struct(decl) => {
                    self.register_type_name(&decl.name)?;
                    self.struct_names.insert(&decl.name, &decl.name);
                    if let Some(tag) = decl.tag.as_deref().filter(|tag| *tag != decl.name) {
                        self.register_type_name(tag)?;
                        self.struct_names.insert(tag, &decl.name);
                    }
                    self.structs.push(decl);
                }
                Item::Enum(decl) => {
                    self.register_type_name(&decl.name)?;
                    self.enums.insert(&decl.name);
                    if let Some(tag) = decl.tag.as_deref().filter(|tag| *tag != decl.name) {
                        self.register_type_name(tag)?;
                        self.enums.insert(tag);
                    }
                }
                Item::Alias(decl) => {
                    self.register_type_name(&decl.name)?;
                    self.aliases.insert(&decl.name, decl);
                }
                Item::Coclass(decl) => {
                    if self.coclasses.iter().any(|c| c.name == decl.name) {
                        return Err(TypeLibError::duplicate("coclass", &decl.name));
                    }
                    self.coclasses.push(decl);
                }
                Item::Library(lib) => self.collect(&lib.items)?,
                Item::Import(_) | Item::ImportLib(_) | Item::CppQuote(_) => {}
            }
        }
        Ok(())
    }

    fn register_type_name(&self, name: &str) -> Result<()> {
        self.check_type_name_free(name)?;
        if self.interface_names.contains_key(name) {
            return Err(TypeLibError::duplicate("type", name));
        }
        Ok(())
    }

    fn check_type_name_free(&self, name: &str) -> Result<()> {
        if self.struct_names.contains_key(name) || self.enums.contains(name) || self.aliases.contains_key(name) {
            return Err(TypeLibError::duplicate("type", name));
        }
        Ok(())
    }

    fn is_interface(&self, name: &str) -> bool {
        self.interface_names.contains_key(name)
            || self.forwards.contains(name)
            || WELL_KNOWN_INTERFACES.iter().any(|(known, _)| *known == name)
    }

    fn lower(&self, library: Option<&LibraryDecl>) -> Result<TypeLibrary> {
        let mut lib = match library {
            Some(decl) => {
                let uuid = decl
                    .attrs
                    .uuid()
                    .ok_or_else(|| TypeLibError::semantic_at(format!("library {} has no uuid", decl.name), decl.span))?;
                TypeLibrary::new(&decl.name, parse_uuid(uuid)?, decl.attrs.version().unwrap_or((1, 0)))
            }
            None => TypeLibrary::new("TypeLibrary", Uuid::nil(), (1, 0)),
        };

        for decl in &self.structs {
            lib.structs.push(self.lower_struct(decl)?);
        }
        for decl in &self.interfaces {
            if decl.attrs.has(&Attribute::Local) {
                tracing::debug!(interface = %decl.name, "skipping [local] interface");
                continue;
            }
            lib.interfaces.push(self.lower_interface(decl)?);
        }
        for decl in &self.coclasses {
            lib.coclasses.push(self.lower_coclass(decl)?);
        }
        Ok(lib)
    }

    fn lower_struct(&self, decl: &StructDecl) -> Result<StructDef> {
        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let (ty, extra) = self.resolve(&field.ty, field.attrs.has(&Attribute::String), field.span)?;
            if extra != 0 || ty == TypeDesc::Void {
                return Err(TypeLibError::semantic_at(
                    format!("field {}.{} has an unsupported type", decl.name, field.name),
                    field.span,
                ));
            }
            if fields.iter().any(|f: &FieldDef| f.name == field.name) {
                return Err(TypeLibError::duplicate("field", format!("{}.{}", decl.name, field.name)));
            }
            fields.push(FieldDef { name: field.name.clone(), ty });
        }
        Ok(StructDef { name: decl.name.clone(), fields })
    }

    fn lower_interface(&self, decl: &InterfaceDecl) -> Result<InterfaceDef> {
        if !decl.attrs.has(&Attribute::Object) {
            return Err(TypeLibError::semantic_at(
                format!("interface {} is not an [object] interface", decl.name),
                decl.span,
            ));
        }
        let iid = decl
            .attrs
            .uuid()
            .ok_or_else(|| TypeLibError::semantic_at(format!("interface {} has no uuid", decl.name), decl.span))?;
        let iid = parse_uuid(iid)?;

        let base = decl.base.as_deref().unwrap_or("IUnknown");
        let first_opnum = self.method_count(base, &mut vec![decl.name.clone()], decl.span)?;

        let mut methods: Vec<MethodDef> = Vec::with_capacity(decl.methods.len());
        for (index, method) in decl.methods.iter().enumerate() {
            if methods.iter().any(|m| m.name == method.name) {
                return Err(TypeLibError::duplicate("method", format!("{}::{}", decl.name, method.name)));
            }
            let opnum = u16::try_from(index)
                .ok()
                .and_then(|i| first_opnum.checked_add(i))
                .ok_or_else(|| TypeLibError::semantic_at("too many methods", method.span))?;
            methods.push(self.lower_method(method, opnum)?);
        }

        Ok(InterfaceDef {
            name: decl.name.clone(),
            iid,
            base: Some(base).filter(|b| *b != "IUnknown").map(str::to_string),
            methods,
        })
    }

    /// Number of methods `name` defines including everything it inherits,
    /// which is the first opnum of an interface deriving from it.
    fn method_count(&self, name: &str, chain: &mut Vec<String>, span: Span) -> Result<u16> {
        if let Some((_, count)) = WELL_KNOWN_INTERFACES.iter().find(|(known, _)| *known == name) {
            return Ok(*count);
        }
        if chain.iter().any(|link| link == name) {
            return Err(TypeLibError::semantic_at(format!("interface inheritance cycle through {name}"), span));
        }
        let decl = self
            .interface_names
            .get(name)
            .ok_or_else(|| TypeLibError::undefined_type(name, span))?;
        chain.push(name.to_string());
        let base = self.method_count(decl.base.as_deref().unwrap_or("IUnknown"), chain, decl.span)?;
        chain.pop();
        let own = u16::try_from(decl.methods.len()).map_err(|_| TypeLibError::semantic_at("too many methods", decl.span))?;
        base.checked_add(own)
            .ok_or_else(|| TypeLibError::semantic_at("too many methods", decl.span))
    }

    fn lower_method(&self, method: &MethodDecl, opnum: u16) -> Result<MethodDef> {
        let (ret, extra) = self.resolve(&method.return_type, false, method.span)?;
        if extra != 0 || !matches!(ret, TypeDesc::HResult | TypeDesc::Void) {
            return Err(TypeLibError::semantic_at(
                format!("method {} must return HRESULT", method.name),
                method.span,
            ));
        }

        let mut params = Vec::with_capacity(method.params.len());
        for (index, param) in method.params.iter().enumerate() {
            let is_in = param.attrs.has(&Attribute::In);
            let is_out = param.attrs.has(&Attribute::Out);
            let direction = match (is_in, is_out) {
                (_, false) => ParamDirection::In,
                (false, true) => ParamDirection::Out,
                (true, true) => ParamDirection::InOut,
            };

            let retval = param.attrs.has(&Attribute::Retval);
            if retval && (direction != ParamDirection::Out || index + 1 != method.params.len()) {
                return Err(TypeLibError::semantic_at(
                    format!("[retval] parameter {} must be the last [out] parameter", param.name),
                    param.span,
                ));
            }

            let (ty, extra) = self.resolve(&param.ty, param.attrs.has(&Attribute::String), param.span)?;
            if ty == TypeDesc::Void {
                return Err(TypeLibError::semantic_at(format!("parameter {} has type void", param.name), param.span));
            }
            match direction {
                ParamDirection::In if extra > 1 => {
                    return Err(TypeLibError::semantic_at(
                        format!("[in] parameter {} has too many pointer levels", param.name),
                        param.span,
                    ));
                }
                ParamDirection::Out | ParamDirection::InOut if extra != 1 => {
                    return Err(TypeLibError::semantic_at(
                        format!("[out] parameter {} must be a pointer", param.name),
                        param.span,
                    ));
                }
                _ => {}
            }

            params.push(ParamDef { name: param.name.clone(), ty, direction, retval });
        }

        Ok(MethodDef { name: method.name.clone(), opnum, params })
    }

    fn lower_coclass(&self, decl: &CoclassDecl) -> Result<CoclassDef> {
        let clsid = decl
            .attrs
            .uuid()
            .ok_or_else(|| TypeLibError::semantic_at(format!("coclass {} has no uuid", decl.name), decl.span))?;
        let clsid = parse_uuid(clsid)?;

        let mut interfaces = Vec::with_capacity(decl.interfaces.len());
        for member in &decl.interfaces {
            if !self.interface_names.contains_key(member.name.as_str()) {
                return Err(TypeLibError::undefined_type(&member.name, member.span));
            }
            interfaces.push(CoclassInterface { name: member.name.clone(), is_default: member.is_default });
        }

        Ok(CoclassDef {
            name: decl.name.clone(),
            clsid,
            progid: decl.attrs.progid().map(str::to_string),
            threading: decl.attrs.threading().map(|t| t.to_ascii_lowercase()),
            interfaces,
        })
    }

    /// Resolve a written type to its marshalled form and the number of
    /// pointer levels left over. Interface types consume one level, since
    /// `IFoo*` is the interface pointer itself.
    fn resolve(&self, ty: &Type, string: bool, span: Span) -> Result<(TypeDesc, usize)> {
        let (inner, depth) = ty.peel();
        match inner {
            Type::Base(BaseType::WChar) if string && depth > 0 => Ok((TypeDesc::WString, depth - 1)),
            Type::Base(BaseType::Void) if depth > 0 => {
                Err(TypeLibError::semantic_at("void pointers cannot be marshalled", span))
            }
            Type::Base(base) => Ok((base_type(*base), depth)),
            Type::Named(name) => self.resolve_named(name, depth, span, &mut Vec::new()),
            Type::Pointer(_) => unreachable!("peel strips every pointer"),
        }
    }

    fn resolve_named(&self, name: &str, depth: usize, span: Span, seen: &mut Vec<String>) -> Result<(TypeDesc, usize)> {
        if self.is_interface(name) {
            if depth == 0 {
                return Err(TypeLibError::semantic_at(format!("interface {name} must be passed by pointer"), span));
            }
            return Ok((TypeDesc::Interface(name.to_string()), depth - 1));
        }
        if let Some(struct_name) = self.struct_names.get(name) {
            return Ok((TypeDesc::Struct(struct_name.to_string()), depth));
        }
        if self.enums.contains(name) {
            return Ok((TypeDesc::I32, depth));
        }
        if let Some(alias) = self.aliases.get(name) {
            if seen.iter().any(|s| s == name) {
                return Err(TypeLibError::semantic_at(format!("typedef {name} refers to itself"), alias.span));
            }
            seen.push(name.to_string());
            let (inner, alias_depth) = alias.ty.peel();
            let total = alias_depth + depth;
            return match inner {
                Type::Named(target) => self.resolve_named(target, total, span, seen),
                _ => self.resolve(&alias.ty, alias.attrs.has(&Attribute::String), alias.span)
                    .map(|(desc, extra)| (desc, extra + depth)),
            };
        }
        if let Some(desc) = builtin_type(name) {
            return Ok((desc, depth));
        }
        Err(TypeLibError::undefined_type(name, span))
    }
}

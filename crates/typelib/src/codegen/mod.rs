//! Proxy code generation
//!
//! Turns a [`TypeLibrary`] into Rust source with one value struct per IDL
//! struct and one typed proxy per interface. The proxies are thin: every
//! method forwards to `ComObjectHandle::invoke` and converts the dynamic
//! values on the way in and out.

mod proxy;
mod structs;

use crate::error::{Result, TypeLibError};
use crate::library::{is_identifier, TypeDesc, TypeLibrary};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Path the generated code uses to reach the harness crate
    pub crate_path: String,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self { crate_path: "::comharness".to_string() }
    }
}

impl ProxyOptions {
    pub fn with_crate_path(mut self, path: impl Into<String>) -> Self {
        self.crate_path = path.into();
        self
    }
}

/// Generate formatted proxy source for a type library
pub fn generate_proxies(lib: &TypeLibrary, options: &ProxyOptions) -> Result<String> {
    let krate: syn::Path = syn::parse_str(&options.crate_path)
        .map_err(|e| TypeLibError::codegen(format!("invalid crate path {:?}: {e}", options.crate_path)))?;
    check_names(lib)?;

    let mut tokens = quote! {
        #[allow(unused_imports)]
        use #krate::{ComObjectHandle, HarnessError, StructValue, Value};
    };

    tokens.extend(library_consts(lib));
    for def in &lib.structs {
        tokens.extend(structs::generate_struct(def, lib)?);
    }
    for def in &lib.interfaces {
        tokens.extend(proxy::generate_proxy(def, lib)?);
    }

    let file: syn::File = syn::parse2(tokens)
        .map_err(|e| TypeLibError::codegen(format!("failed to parse generated code: {e}")))?;

    Ok(format!(
        "// Generated from type library {} {}.{}. Do not edit.\n\n{}",
        lib.name,
        lib.version.0,
        lib.version.1,
        prettyplease::unparse(&file)
    ))
}

fn library_consts(lib: &TypeLibrary) -> TokenStream {
    let name = &lib.name;
    let uuid = lib.uuid.to_string();
    let (major, minor) = lib.version;

    let clsids = lib.coclasses.iter().map(|c| {
        let ident = format_ident!("{}", screaming_snake_case(&c.name));
        let clsid = format!("{{{}}}", c.clsid);
        quote! { pub const #ident: &str = #clsid; }
    });
    let progids = lib.coclasses.iter().filter_map(|c| {
        let ident = format_ident!("{}", screaming_snake_case(&c.name));
        c.progid.as_ref().map(|p| quote! { pub const #ident: &str = #p; })
    });

    quote! {
        pub const LIBRARY_NAME: &str = #name;
        pub const LIBRARY_UUID: &str = #uuid;
        pub const LIBRARY_VERSION: (u16, u16) = (#major, #minor);

        /// Class identifiers in registry form
        pub mod clsid {
            #(#clsids)*
        }

        pub mod progid {
            #(#progids)*
        }
    }
}

/// Every name that ends up as a Rust identifier in the generated source
fn check_names(lib: &TypeLibrary) -> Result<()> {
    fn with_type<'a>(names: &mut Vec<&'a str>, name: &'a str, ty: &'a TypeDesc) {
        names.push(name);
        if let TypeDesc::Struct(ty) | TypeDesc::Interface(ty) = ty {
            names.push(ty);
        }
    }

    let mut names = Vec::new();
    for def in &lib.structs {
        names.push(def.name.as_str());
        for field in &def.fields {
            with_type(&mut names, &field.name, &field.ty);
        }
    }
    for def in &lib.interfaces {
        names.push(def.name.as_str());
        for method in &def.methods {
            names.push(method.name.as_str());
            for param in &method.params {
                with_type(&mut names, &param.name, &param.ty);
            }
        }
    }
    names.extend(lib.coclasses.iter().map(|c| c.name.as_str()));

    match names.into_iter().find(|name| !is_identifier(name)) {
        Some(name) => Err(TypeLibError::codegen(format!("{name:?} is not a valid identifier"))),
        None => Ok(()),
    }
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "priv", "pub", "ref", "return",
    "self", "static", "struct", "super", "trait", "true", "try", "type", "unsafe", "use", "where", "while", "yield",
];

/// `GetAddress` -> `get_address`, `GetURLName` -> `get_url_name`
pub(crate) fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    if RUST_KEYWORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

pub(crate) fn screaming_snake_case(name: &str) -> String {
    snake_case(name).trim_end_matches('_').to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    const IDL: &str = r#"
        interface IDog;
        typedef struct Address { BSTR Street; BSTR PostalCode; BSTR City; } Address;

        [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a12)]
        interface IDog : IUnknown {
            HRESULT Sit();
        };

        [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a11)]
        interface IPetShop : IUnknown {
            HRESULT BuyDog([out, retval] IDog** dog);
            HRESULT GetAddress([out, retval] Address* address);
            HRESULT Count([in] long kind, [out] long* dogs, [out] long* cats);
        };

        [uuid(7c1e4a52-0d7b-4b5e-9a61-3f2d8c9e1b40), version(1.0)]
        library InterfacesLib {
            [uuid(5011c315-994d-49b4-b737-03a846f590a0), progid("ManagedServer.PetShop.1")]
            coclass PetShop { [default] interface IPetShop; };
        };
    "#;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("GetAddress"), "get_address");
        assert_eq!(snake_case("CluckAsync"), "cluck_async");
        assert_eq!(snake_case("GetURLName"), "get_url_name");
        assert_eq!(snake_case("PostalCode"), "postal_code");
        assert_eq!(snake_case("type"), "type_");
        assert_eq!(screaming_snake_case("PetShop"), "PET_SHOP");
    }

    #[test]
    fn test_generate_proxies() {
        let lib = compile(IDL).unwrap();
        let code = generate_proxies(&lib, &ProxyOptions::default()).unwrap();

        assert!(code.contains("use ::comharness::{"));
        assert!(code.contains("pub struct Address"));
        assert!(code.contains("pub postal_code: String"));
        assert!(code.contains("pub struct IPetShop"));
        assert!(code.contains("pub async fn get_address(&self) -> Result<Address, HarnessError>"));
        assert!(code.contains("pub async fn buy_dog(&self) -> Result<IDog, HarnessError>"));
        assert!(code.contains("pub async fn count(&self, kind: i32) -> Result<(i32, i32), HarnessError>"));
        assert!(code.contains("pub async fn sit(&self) -> Result<(), HarnessError>"));
        assert!(code.contains(r#"pub const PET_SHOP: &str = "{5011c315-994d-49b4-b737-03a846f590a0}";"#));
        assert!(code.contains(r#"pub const PET_SHOP: &str = "ManagedServer.PetShop.1";"#));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let lib = compile(IDL).unwrap();
        let options = ProxyOptions::default().with_crate_path("crate");
        let first = generate_proxies(&lib, &options).unwrap();
        assert_eq!(first, generate_proxies(&lib, &options).unwrap());
        assert!(first.contains("use crate::{"));
    }

    #[test]
    fn test_names_that_are_not_identifiers() {
        let mut lib = compile(IDL).unwrap();
        lib.interfaces[0].name = "I-Dog".into();
        let err = generate_proxies(&lib, &ProxyOptions::default()).unwrap_err();
        assert!(matches!(err, TypeLibError::Codegen(ref m) if m.contains("I-Dog")), "{err}");

        let mut lib = compile(IDL).unwrap();
        lib.structs[0].fields[1].name = "Postal Code".into();
        assert!(matches!(generate_proxies(&lib, &ProxyOptions::default()), Err(TypeLibError::Codegen(_))));
    }

    #[test]
    fn test_bad_crate_path() {
        let lib = compile(IDL).unwrap();
        let err = generate_proxies(&lib, &ProxyOptions::default().with_crate_path("not a path")).unwrap_err();
        assert!(matches!(err, TypeLibError::Codegen(_)));
    }
}

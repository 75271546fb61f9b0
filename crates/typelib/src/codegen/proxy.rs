//! Typed interface proxies

use super::snake_case;
use super::structs::{from_value, owned_type};
use crate::error::Result;
use crate::library::{InterfaceDef, MethodDef, ParamDef, TypeDesc, TypeLibrary};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

pub(super) fn generate_proxy(def: &InterfaceDef, lib: &TypeLibrary) -> Result<TokenStream> {
    let name = format_ident!("{}", def.name);
    let interface_name = &def.name;
    let iid = def.iid.to_string();
    let doc = format!(" Typed proxy for `{}`", def.name);

    let mut methods = Vec::new();
    for method in inherited_methods(def, lib) {
        methods.push(generate_method(method, lib)?);
    }

    Ok(quote! {
        #[doc = #doc]
        #[derive(Debug, Clone)]
        pub struct #name {
            handle: ComObjectHandle,
        }

        impl #name {
            pub const NAME: &'static str = #interface_name;
            pub const IID: &'static str = #iid;

            /// Wrap a handle, checking it is bound to this interface.
            pub fn from_handle(handle: ComObjectHandle) -> Result<Self, HarnessError> {
                handle.expect_interface(Self::NAME)?;
                Ok(Self { handle })
            }

            pub fn handle(&self) -> &ComObjectHandle {
                &self.handle
            }

            pub fn into_handle(self) -> ComObjectHandle {
                self.handle
            }

            #(#methods)*
        }

        impl From<#name> for Value {
            fn from(proxy: #name) -> Self {
                Value::from(proxy.handle)
            }
        }

        impl From<&#name> for Value {
            fn from(proxy: &#name) -> Self {
                Value::from(proxy.handle.clone())
            }
        }
    })
}

/// Methods callable through `def`: its own, then each base's, stopping at
/// interfaces this library does not define.
fn inherited_methods<'a>(def: &'a InterfaceDef, lib: &'a TypeLibrary) -> Vec<&'a MethodDef> {
    let mut chain = vec![def];
    let mut current = def.base.as_deref().and_then(|base| lib.interface(base));
    while let Some(base) = current {
        if chain.iter().any(|seen| seen.name == base.name) {
            break;
        }
        chain.push(base);
        current = base.base.as_deref().and_then(|b| lib.interface(b));
    }

    let mut methods: Vec<&MethodDef> = Vec::new();
    for iface in chain {
        for method in &iface.methods {
            if !methods.iter().any(|m| m.name == method.name) {
                methods.push(method);
            }
        }
    }
    methods
}

fn generate_method(method: &MethodDef, lib: &TypeLibrary) -> Result<TokenStream> {
    let ident = format_ident!("{}", snake_case(&method.name));
    let method_name = &method.name;
    let doc = format!(" `{}` (opnum {})", method.name, method.opnum);

    let mut params = Vec::new();
    let mut args = Vec::new();
    for param in method.inputs() {
        let param_ident = format_ident!("{}", snake_case(&param.name));
        params.push(in_param(param, &param_ident, lib)?);
        args.push(in_arg(&param.ty, &param_ident));
    }

    let outputs: Vec<&ParamDef> = method.outputs().collect();
    let mut out_types = Vec::with_capacity(outputs.len());
    let mut out_exprs = Vec::with_capacity(outputs.len());
    for param in &outputs {
        out_types.push(owned_type(&param.ty, lib)?);
        let take = if param.retval {
            quote! { result.take_retval()? }
        } else {
            let out_name = &param.name;
            quote! { result.take_out(#out_name)? }
        };
        out_exprs.push(from_value(&param.ty, lib, take));
    }

    let (ret, body) = match outputs.len() {
        0 => (
            quote! { () },
            quote! {
                self.handle.invoke(#method_name, vec![#(#args),*]).await?;
                Ok(())
            },
        ),
        1 => {
            let ty = &out_types[0];
            let expr = &out_exprs[0];
            (
                quote! { #ty },
                quote! {
                    let mut result = self.handle.invoke(#method_name, vec![#(#args),*]).await?;
                    Ok(#expr)
                },
            )
        }
        _ => {
            let vars: Vec<_> = (0..outputs.len()).map(|i| format_ident!("out_{}", i)).collect();
            (
                quote! { (#(#out_types),*) },
                quote! {
                    let mut result = self.handle.invoke(#method_name, vec![#(#args),*]).await?;
                    #(let #vars = #out_exprs;)*
                    Ok((#(#vars),*))
                },
            )
        }
    };

    Ok(quote! {
        #[doc = #doc]
        pub async fn #ident(&self #(, #params)*) -> Result<#ret, HarnessError> {
            #body
        }
    })
}

fn in_param(param: &ParamDef, ident: &proc_macro2::Ident, lib: &TypeLibrary) -> Result<TokenStream> {
    let tokens = match &param.ty {
        TypeDesc::Bstr | TypeDesc::WString => quote! { #ident: &str },
        TypeDesc::Struct(name) => {
            let ty = format_ident!("{}", name);
            quote! { #ident: &#ty }
        }
        TypeDesc::Interface(_) => quote! { #ident: impl Into<Value> },
        other => {
            let ty = owned_type(other, lib)?;
            quote! { #ident: #ty }
        }
    };
    Ok(tokens)
}

fn in_arg(ty: &TypeDesc, ident: &proc_macro2::Ident) -> TokenStream {
    match ty {
        TypeDesc::Struct(_) => quote! { #ident.clone().into_value() },
        TypeDesc::Interface(_) => quote! { #ident.into() },
        _ => quote! { Value::from(#ident) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    #[test]
    fn test_inherited_methods_most_derived_first() {
        let lib = compile(
            r#"
            [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a12)]
            interface IDog : IUnknown { HRESULT Sit(); };
            [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a16)]
            interface IGuardDog : IDog { HRESULT Guard(); };
            "#,
        )
        .unwrap();
        let guard = lib.interface("IGuardDog").unwrap();
        let names: Vec<_> = inherited_methods(guard, &lib).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Guard", "Sit"]);
    }

    #[test]
    fn test_interface_in_param_takes_into_value() {
        let lib = compile(
            r#"
            [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a13)]
            interface IPostman : IUnknown { HRESULT OnBitten(); };
            [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a12)]
            interface IDog : IUnknown { HRESULT Bite([in] IPostman* postman); HRESULT Name([in] BSTR prefix, [out, retval] BSTR* name); };
            "#,
        )
        .unwrap();
        let tokens = generate_proxy(lib.interface("IDog").unwrap(), &lib).unwrap().to_string();
        assert!(tokens.contains("postman : impl Into < Value >"), "{tokens}");
        assert!(tokens.contains("prefix : & str"), "{tokens}");
        assert!(tokens.contains("take_retval"), "{tokens}");
    }
}

//! Value structs for IDL structs

use super::snake_case;
use crate::error::{Result, TypeLibError};
use crate::library::{StructDef, TypeDesc, TypeLibrary};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

pub(super) fn generate_struct(def: &StructDef, lib: &TypeLibrary) -> Result<TokenStream> {
    let name = format_ident!("{}", def.name);
    let type_name = &def.name;

    let mut fields = Vec::with_capacity(def.fields.len());
    let mut takes = Vec::with_capacity(def.fields.len());
    let mut puts = Vec::with_capacity(def.fields.len());
    for field in &def.fields {
        if let TypeDesc::Interface(_) = field.ty {
            return Err(TypeLibError::codegen(format!(
                "interface field {}.{} cannot be generated",
                def.name, field.name
            )));
        }
        let ident = format_ident!("{}", snake_case(&field.name));
        let ty = owned_type(&field.ty, lib)?;
        let wire_name = &field.name;
        let convert = from_value(&field.ty, lib, quote! { value.take(#wire_name)? });

        fields.push(quote! { pub #ident: #ty });
        takes.push(quote! { #ident: #convert });
        puts.push(quote! { (#wire_name.to_string(), Value::from(self.#ident)) });
    }

    Ok(quote! {
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct #name {
            #(#fields,)*
        }

        impl #name {
            pub const NAME: &'static str = #type_name;

            pub fn from_value(value: Value) -> Result<Self, HarnessError> {
                let mut value = value.into_struct(Self::NAME)?;
                Ok(Self {
                    #(#takes,)*
                })
            }

            pub fn into_value(self) -> Value {
                Value::Struct(StructValue::new(Self::NAME, vec![#(#puts),*]))
            }
        }

        impl From<#name> for Value {
            fn from(value: #name) -> Self {
                value.into_value()
            }
        }
    })
}

/// The Rust type a value of `ty` is handed back as.
pub(super) fn owned_type(ty: &TypeDesc, lib: &TypeLibrary) -> Result<TokenStream> {
    let tokens = match ty {
        TypeDesc::Void => return Err(TypeLibError::codegen("void has no value type")),
        TypeDesc::Bool => quote! { bool },
        TypeDesc::I8 => quote! { i8 },
        TypeDesc::U8 => quote! { u8 },
        TypeDesc::I16 => quote! { i16 },
        TypeDesc::U16 => quote! { u16 },
        TypeDesc::I32 => quote! { i32 },
        TypeDesc::U32 | TypeDesc::HResult => quote! { u32 },
        TypeDesc::I64 => quote! { i64 },
        TypeDesc::U64 => quote! { u64 },
        TypeDesc::F32 => quote! { f32 },
        TypeDesc::F64 => quote! { f64 },
        TypeDesc::Bstr | TypeDesc::WString => quote! { String },
        TypeDesc::Struct(name) => {
            let ident = format_ident!("{}", name);
            quote! { #ident }
        }
        TypeDesc::Interface(name) if lib.interface(name).is_some() => {
            let ident = format_ident!("{}", name);
            quote! { #ident }
        }
        TypeDesc::Interface(_) => quote! { ComObjectHandle },
    };
    Ok(tokens)
}

/// Expression converting the `Value` produced by `expr` into the owned type.
pub(super) fn from_value(ty: &TypeDesc, lib: &TypeLibrary, expr: TokenStream) -> TokenStream {
    match ty {
        TypeDesc::Struct(name) => {
            let ident = format_ident!("{}", name);
            quote! { #ident::from_value(#expr)? }
        }
        TypeDesc::Interface(name) if lib.interface(name).is_some() => {
            let ident = format_ident!("{}", name);
            quote! { #ident::from_handle(#expr.into_object()?)? }
        }
        TypeDesc::Interface(_) => quote! { #expr.into_object()? },
        _ => quote! { #expr.try_into()? },
    }
}

//! Derive macro for error enums.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations, and a
//! `From` conversion for every field marked `#[from]`.
//!
//! # Usage
//!
//! ```ignore
//! use stackvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum LoadError {
//!     #[error("unknown opcode {opcode} in record {record}")]
//!     UnknownOpcode { opcode: u32, record: usize },
//!
//!     #[error("{0}")]
//!     Io(#[from] std::io::Error),
//!
//!     #[error("program is empty")]
//!     Empty,
//! }
//! ```
//!
//! Messages refer to fields by name (`{opcode}`) or by position (`{0}`, `{1:?}`).
//! A variant carrying `#[from]` must have exactly one field; its value is also
//! reported by `Error::source`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, Type, Variant, parse_macro_input};

/// Derives `Display`, `Error` and `From` for an enum.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

/// A variant wrapping another error through `#[from]`.
struct FromField<'a> {
    variant: &'a Ident,
    /// Field name for struct-like variants, `None` for tuple variants.
    field: Option<&'a Ident>,
    ty: &'a Type,
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Enum(data_enum) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Error derive only supports enums",
        ));
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut display_arms = Vec::with_capacity(data_enum.variants.len());
    let mut from_fields = Vec::new();
    for variant in &data_enum.variants {
        let message = extract_error_message(variant)?;
        display_arms.push(display_arm(variant, &message));
        if let Some(from) = extract_from_field(variant)? {
            from_fields.push(from);
        }
    }

    let source_arms = from_fields.iter().map(|from| {
        let variant = from.variant;
        match from.field {
            Some(field) => quote! {
                Self::#variant { #field } => ::std::option::Option::Some(#field as &(dyn ::std::error::Error + 'static)),
            },
            None => quote! {
                Self::#variant(source) => ::std::option::Option::Some(source as &(dyn ::std::error::Error + 'static)),
            },
        }
    });

    let from_impls = from_fields.iter().map(|from| {
        let variant = from.variant;
        let ty = from.ty;
        let construct = match from.field {
            Some(field) => quote! { Self::#variant { #field: source } },
            None => quote! { Self::#variant(source) },
        };
        quote! {
            impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                fn from(source: #ty) -> Self {
                    #construct
                }
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#display_arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                match self {
                    #(#source_arms)*
                    #[allow(unreachable_patterns)]
                    _ => ::std::option::Option::None,
                }
            }
        }

        #(#from_impls)*
    })
}

/// Builds the `Display` match arm for one variant.
///
/// Fields are bound by name and passed to `write!` as named arguments when
/// the message mentions them; positional placeholders are rewritten to the
/// `f0`, `f1`, ... bindings first.
fn display_arm(variant: &Variant, message: &LitStr) -> TokenStream2 {
    let variant_name = &variant.ident;
    match &variant.fields {
        Fields::Unit => quote! {
            Self::#variant_name => ::std::write!(f, #message),
        },
        Fields::Unnamed(fields) => {
            let bindings: Vec<Ident> = (0..fields.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let rewritten = positional_to_named(&message.value(), fields.unnamed.len());
            let used = referenced_fields(&rewritten, &bindings);
            let rewritten = LitStr::new(&rewritten, message.span());
            quote! {
                Self::#variant_name(#(#bindings),*) => ::std::write!(f, #rewritten #(, #used = #used)*),
            }
        }
        Fields::Named(fields) => {
            let names: Vec<Ident> = fields.named.iter().filter_map(|f| f.ident.clone()).collect();
            let used = referenced_fields(&message.value(), &names);
            quote! {
                Self::#variant_name { #(#names),* } => ::std::write!(f, #message #(, #used = #used)*),
            }
        }
    }
}

/// Fields whose name appears as a `{name}` or `{name:...}` placeholder.
fn referenced_fields<'a>(format_str: &str, names: &'a [Ident]) -> Vec<&'a Ident> {
    names
        .iter()
        .filter(|name| {
            let open = format!("{{{name}");
            format_str.contains(&format!("{open}}}")) || format_str.contains(&format!("{open}:"))
        })
        .collect()
}

/// Reads the `#[error("...")]` message of a variant.
fn extract_error_message(variant: &Variant) -> syn::Result<LitStr> {
    let attr = variant
        .attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &variant.ident,
                format!(
                    "missing #[error(\"...\")] attribute on variant `{}`",
                    variant.ident
                ),
            )
        })?;

    attr.parse_args::<LitStr>().map_err(|_| {
        syn::Error::new_spanned(
            &attr.meta,
            "expected a string literal, e.g. #[error(\"unknown opcode: {0}\")]",
        )
    })
}

fn has_from_attr(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident("from"))
}

/// Finds the `#[from]` field of a variant, if any.
fn extract_from_field(variant: &Variant) -> syn::Result<Option<FromField<'_>>> {
    let Some(field) = variant.fields.iter().find(|f| has_from_attr(&f.attrs)) else {
        return Ok(None);
    };

    if variant.fields.len() != 1 {
        return Err(syn::Error::new_spanned(
            &variant.ident,
            "#[from] requires the variant to have exactly one field",
        ));
    }

    Ok(Some(FromField {
        variant: &variant.ident,
        field: field.ident.as_ref(),
        ty: &field.ty,
    }))
}

/// Rewrites `{0}`, `{1:?}`, ... into `{f0}`, `{f1:?}`, ...
fn positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        for close in ['}', ':'] {
            result = result.replace(&format!("{{{i}{close}"), &format!("{{f{i}{close}"));
        }
    }
    result
}

//! Decode derive macro implementation.
//!
//! `#[derive(Decode)]` generates:
//!
//! 1. `impl Decode`: one field descriptor per annotated field. The annotation
//!    string is passed through untouched; it is validated when a chain needs
//!    the struct, so an unknown kind surfaces as a resolve error.
//! 2. A `linkme` registration in `DECODE_TARGETS`.
//!
//! The only part of the annotation read at compile time is the kind: a
//! `model` field is filled by serde from the body, every other field by
//! `FromStr` from text values.

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::parse::ParseStream;
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, Path, PathArguments,
    Type, spanned::Spanned,
};

// ============================================================================
// Attribute structures
// ============================================================================

/// Per-field `#[solder(...)]` marker.
enum FieldAttr {
    /// `#[solder("kind,...")]`
    Tag(LitStr),
    /// `#[solder(flatten)]`
    Flatten,
}

/// Syntactic shape of a field type.
enum Shape<'a> {
    Multi(&'a Type),
    Optional(&'a Type),
    Scalar,
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_decode(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "Decode cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    "Decode requires a struct with named fields",
                ));
            }
        },
        Data::Enum(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Decode cannot be derived for enums",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Decode cannot be derived for unions",
            ));
        }
    };

    let krate = parse_crate_path(&input.attrs)?;

    let mut pushes = Vec::new();
    for field in fields {
        let Some(attr) = parse_field_attr(&field.attrs)? else {
            continue;
        };
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        pushes.push(field_descriptor(&krate, ident, &field.ty, attr));
    }

    let static_name = Ident::new(
        &format!("__SOLDER_DECODE_{}", name.to_string().to_uppercase()),
        Span::call_site(),
    );

    Ok(quote! {
        impl #krate::Decode for #name {
            #[allow(unused_mut)]
            fn fields() -> ::std::vec::Vec<#krate::Field<Self>> {
                let mut fields: ::std::vec::Vec<#krate::Field<Self>> = ::std::vec::Vec::new();
                #(#pushes)*
                fields
            }
        }

        #[#krate::__private::linkme::distributed_slice(#krate::DECODE_TARGETS)]
        #[linkme(crate = #krate::__private::linkme)]
        #[allow(non_upper_case_globals)]
        static #static_name: #krate::DecodeEntry = #krate::DecodeEntry::of::<#name>();
    })
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_crate_path(attrs: &[Attribute]) -> syn::Result<Path> {
    for attr in attrs {
        if !attr.path().is_ident("solder") {
            continue;
        }
        let mut path: Option<Path> = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                let lit = meta.value()?.parse::<LitStr>()?;
                path = Some(lit.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported struct attribute, expected `crate = \"...\"`"))
            }
        })?;
        if let Some(path) = path {
            return Ok(path);
        }
    }
    Ok(syn::parse_quote!(::solder_http))
}

fn parse_field_attr(attrs: &[Attribute]) -> syn::Result<Option<FieldAttr>> {
    let mut found = None;
    for attr in attrs {
        if !attr.path().is_ident("solder") {
            continue;
        }
        if found.is_some() {
            return Err(syn::Error::new(
                attr.span(),
                "a field takes at most one #[solder(...)] attribute",
            ));
        }
        found = Some(attr.parse_args_with(|input: ParseStream| {
            if input.peek(LitStr) {
                Ok(FieldAttr::Tag(input.parse()?))
            } else {
                let ident: Ident = input.parse()?;
                if ident == "flatten" {
                    Ok(FieldAttr::Flatten)
                } else {
                    Err(syn::Error::new(
                        ident.span(),
                        "expected a tag string such as \"query,name=page\" or `flatten`",
                    ))
                }
            }
        })?);
    }
    Ok(found)
}

// ============================================================================
// Code generation
// ============================================================================

/// Returns the single type argument of `ty` if its last segment is `wrapper`.
fn unwrap_generic<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn shape_of(ty: &Type) -> Shape<'_> {
    if let Some(inner) = unwrap_generic(ty, "Vec") {
        Shape::Multi(inner)
    } else if let Some(inner) = unwrap_generic(ty, "Option") {
        Shape::Optional(inner)
    } else {
        Shape::Scalar
    }
}

fn is_model(tag: &LitStr) -> bool {
    tag.value().split(',').next().map(str::trim) == Some("model")
}

fn field_descriptor(krate: &Path, ident: &Ident, ty: &Type, attr: FieldAttr) -> TokenStream {
    let field_name = ident.to_string();
    let tag = match attr {
        FieldAttr::Flatten => {
            return quote! {
                fields.extend(#krate::Field::<Self>::flatten(|target: &mut Self| &mut target.#ident));
            };
        }
        FieldAttr::Tag(tag) => tag,
    };

    let descriptor = match (is_model(&tag), shape_of(ty)) {
        (true, Shape::Optional(inner)) => quote! {
            #krate::Field::<Self>::model(#field_name, #tag, |target: &mut Self, value: #inner| {
                target.#ident = ::std::option::Option::Some(value);
            })
        },
        (true, _) => quote! {
            #krate::Field::<Self>::model(#field_name, #tag, |target: &mut Self, value: #ty| {
                target.#ident = value;
            })
        },
        (false, Shape::Multi(inner)) => quote! {
            #krate::Field::<Self>::multi(
                #field_name,
                #tag,
                |target: &mut Self, values: ::std::vec::Vec<#inner>| {
                    target.#ident = values;
                },
            )
        },
        (false, Shape::Optional(inner)) => quote! {
            #krate::Field::<Self>::optional(#field_name, #tag, |target: &mut Self, value: #inner| {
                target.#ident = ::std::option::Option::Some(value);
            })
        },
        (false, Shape::Scalar) => quote! {
            #krate::Field::<Self>::scalar(#field_name, #tag, |target: &mut Self, value: #ty| {
                target.#ident = value;
            })
        },
    };

    quote! {
        fields.push(#descriptor);
    }
}

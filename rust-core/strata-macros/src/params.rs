//! `#[derive(FromParams)]` expansion.

use crate::attrs::{doc_comment, option_inner};
use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Field, Fields, LitStr};

#[derive(Clone, Copy)]
enum Location {
    Path,
    Query,
}

struct ParamAttr {
    location: Location,
    rename: Option<String>,
    description: Option<String>,
    default: bool,
}

impl ParamAttr {
    fn parse(field: &Field) -> syn::Result<Self> {
        let mut out = Self {
            location: Location::Query,
            rename: None,
            description: None,
            default: false,
        };
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("param")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("path") {
                    out.location = Location::Path;
                } else if meta.path.is_ident("query") {
                    out.location = Location::Query;
                } else if meta.path.is_ident("default") {
                    out.default = true;
                } else if meta.path.is_ident("rename") {
                    out.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("description") {
                    out.description = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(meta.error(
                        "expected one of: path, query, default, rename, description",
                    ));
                }
                Ok(())
            })?;
        }
        if out.description.is_none() {
            out.description = doc_comment(&field.attrs);
        }
        Ok(out)
    }
}

pub fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "FromParams can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "FromParams requires a struct with named fields",
        ));
    };

    let mut extracts = Vec::new();
    let mut descriptors = Vec::new();

    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        let attr = ParamAttr::parse(field)?;
        let name = attr
            .rename
            .clone()
            .unwrap_or_else(|| ident.unraw().to_string());
        let location = match attr.location {
            Location::Path => quote!(::strata_core::params::ParamLocation::Path),
            Location::Query => quote!(::strata_core::params::ParamLocation::Query),
        };
        let ty = &field.ty;

        let (extract, required, schema_ty) = if let Some(inner) = option_inner(ty) {
            (
                quote!(::strata_core::params::extract_optional::<#inner>(source, #location, #name)?),
                false,
                inner,
            )
        } else if attr.default {
            (
                quote!(::strata_core::params::extract_or_default::<#ty>(source, #location, #name)?),
                false,
                ty,
            )
        } else {
            (
                quote!(::strata_core::params::extract_required::<#ty>(source, #location, #name)?),
                true,
                ty,
            )
        };

        let description = match &attr.description {
            Some(text) => quote!(::core::option::Option::Some(::std::string::String::from(#text))),
            None => quote!(::core::option::Option::None),
        };

        extracts.push(quote!(#ident: #extract));
        descriptors.push(quote! {
            ::strata_core::params::ParamDescriptor {
                name: ::std::string::String::from(#name),
                location: #location,
                required: #required,
                schema: <#schema_ty as ::strata_core::schema::ApiSchema>::schema(),
                description: #description,
            }
        });
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::strata_core::params::FromParams for #name #ty_generics #where_clause {
            fn from_params(
                source: &::strata_core::params::ParamSource<'_>,
            ) -> ::core::result::Result<Self, ::strata_core::ApiError> {
                ::core::result::Result::Ok(Self {
                    #(#extracts,)*
                })
            }

            fn describe() -> ::std::vec::Vec<::strata_core::params::ParamDescriptor> {
                ::std::vec![#(#descriptors),*]
            }
        }
    })
}

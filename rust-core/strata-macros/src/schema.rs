//! `#[derive(ApiSchema)]` expansion.

use crate::attrs::{
    apply_rename_all, doc_comment, option_inner, schema_description, serde_field,
    serde_rename_all,
};
use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DataEnum, DeriveInput, Fields, FieldsNamed};

fn description_of(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    Ok(schema_description(attrs)?.or_else(|| doc_comment(attrs)))
}

fn rename(rule: Option<&str>, name: &str) -> String {
    rule.map_or_else(|| name.to_string(), |rule| apply_rename_all(rule, name))
}

fn struct_body(title: &str, rule: Option<&str>, fields: &FieldsNamed) -> syn::Result<TokenStream> {
    let mut properties = Vec::new();
    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        let serde = serde_field(&field.attrs)?;
        if serde.skip {
            continue;
        }
        let name = serde
            .rename
            .unwrap_or_else(|| rename(rule, &ident.unraw().to_string()));
        let ty = &field.ty;
        let required = option_inner(ty).is_none() && !serde.default;
        let description = description_of(&field.attrs)?.map(|text| quote!(.with_description(#text)));
        properties.push(quote! {
            .with_property(
                #name,
                <#ty as ::strata_core::schema::ApiSchema>::schema() #description,
                #required,
            )
        });
    }
    Ok(quote! {
        ::strata_core::schema::Schema::object()
            .with_title(#title)
            #(#properties)*
    })
}

fn enum_body(title: &str, rule: Option<&str>, data: &DataEnum) -> syn::Result<TokenStream> {
    let mut values = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                &variant.ident,
                "ApiSchema can only be derived for enums whose variants carry no data",
            ));
        }
        let serde = serde_field(&variant.attrs)?;
        if serde.skip {
            continue;
        }
        values.push(
            serde
                .rename
                .unwrap_or_else(|| rename(rule, &variant.ident.unraw().to_string())),
        );
    }
    Ok(quote! {
        ::strata_core::schema::Schema::string()
            .with_title(#title)
            .with_enum_values(::std::vec::Vec::<&str>::from([#(#values),*]))
    })
}

pub fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let title = input.ident.unraw().to_string();
    let rule = serde_rename_all(&input.attrs)?;
    let body = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => struct_body(&title, rule.as_deref(), fields)?,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "ApiSchema can only be derived for structs with named fields",
                ))
            }
        },
        Data::Enum(data) => enum_body(&title, rule.as_deref(), data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "ApiSchema cannot be derived for unions",
            ))
        }
    };
    let description = description_of(&input.attrs)?.map(|text| quote!(.with_description(#text)));

    let mut generics = input.generics.clone();
    for param in generics.type_params_mut() {
        param
            .bounds
            .push(syn::parse_quote!(::strata_core::schema::ApiSchema));
    }
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::strata_core::schema::ApiSchema for #name #ty_generics #where_clause {
            fn schema() -> ::strata_core::schema::Schema {
                #body #description
            }
        }
    })
}

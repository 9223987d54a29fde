//! Procedural macros for entgraph
//!
//! - `#[derive(FromRecord)]` - Decode a loaded record into a plain struct

use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input, spanned::Spanned};

/// Implement `entgraph::FromRecord` by reading each named field from the
/// column of the same name (snake_case).
///
/// # Usage
///
/// ```ignore
/// #[derive(FromRecord)]
/// struct Location {
///     id: i64,
///     name: String,
///     #[record(column = "parent_id")]
///     parent: Option<i64>,
///     #[record(skip)]
///     children: Vec<Location>,
/// }
/// ```
///
/// # Generated Code
///
/// ```ignore
/// impl entgraph::FromRecord for Location {
///     fn from_record(record: &entgraph::Record) -> entgraph::Result<Self> {
///         Ok(Self {
///             id: record.get("id")?,
///             name: record.get("name")?,
///             parent: record.get("parent_id")?,
///             children: Default::default(),
///         })
///     }
/// }
/// ```
#[proc_macro_derive(FromRecord, attributes(record))]
pub fn derive_from_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_from_record(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Parsed `#[record(...)]` options for one field.
#[derive(Default)]
struct FieldOptions {
    column: Option<String>,
    skip: bool,
}

fn field_options(field: &syn::Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("column") {
                let value: LitStr = meta.value()?.parse()?;
                options.column = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                options.skip = true;
                Ok(())
            } else {
                Err(meta.error("expected `column = \"...\"` or `skip`"))
            }
        })?;
    }
    Ok(options)
}

fn expand_from_record(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "FromRecord can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            data.fields.span(),
            "FromRecord requires named fields",
        ));
    };

    let mut assignments = Vec::with_capacity(fields.named.len());
    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        let options = field_options(field)?;
        if options.skip {
            assignments.push(quote! { #ident: ::core::default::Default::default() });
            continue;
        }
        let column = options.column.unwrap_or_else(|| {
            ident
                .to_string()
                .trim_start_matches("r#")
                .to_case(Case::Snake)
        });
        assignments.push(quote! { #ident: record.get(#column)? });
    }

    Ok(quote! {
        impl #impl_generics ::entgraph::FromRecord for #name #ty_generics #where_clause {
            fn from_record(record: &::entgraph::Record) -> ::entgraph::Result<Self> {
                Ok(Self {
                    #(#assignments),*
                })
            }
        }
    })
}

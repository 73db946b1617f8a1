//! Derive macro for `rgb-sparse` components.
//!
//! `#[derive(Component)]` implements `rgb_sparse::Component` and fills in
//! the storage configuration from `#[component(...)]` attributes.
//!
//! # Attributes
//!
//! - `#[component(in_place)]` - removal leaves a tombstone instead of moving
//!   the last element, so dense positions of other entities stay stable.
//! - `#[component(page_size = N)]` - payload page size. `0` makes an empty
//!   storage with no payload array; the type must then be zero-sized.
//! - `#[component(empty)]` - shorthand for `page_size = 0`.
//!
//! Without attributes the trait defaults apply: zero-sized types get an empty
//! storage, everything else the default page size.
//!
//! ```ignore
//! #[derive(Component)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component)]
//! #[component(in_place, page_size = 256)]
//! struct Slot { item: u32 }
//!
//! #[derive(Component)]
//! #[component(empty)]
//! struct Frozen;
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, DeriveInput, Expr, GenericParam, parse_quote};

/// Storage options collected from `#[component(...)]`.
#[derive(Default)]
struct Options {
    in_place: bool,
    empty: bool,
    page_size: Option<Expr>,
}

fn parse_options(attrs: &[Attribute]) -> syn::Result<Options> {
    let mut options = Options::default();
    for attr in attrs {
        if !attr.path().is_ident("component") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("in_place") {
                options.in_place = true;
                return Ok(());
            }
            if meta.path.is_ident("empty") {
                options.empty = true;
                return Ok(());
            }
            if meta.path.is_ident("page_size") {
                options.page_size = Some(meta.value()?.parse()?);
                return Ok(());
            }
            Err(meta.error(
                "unsupported component option, expected `in_place`, `empty` or `page_size = N`",
            ))
        })?;
    }

    if options.empty {
        if let Some(page_size) = &options.page_size {
            return Err(syn::Error::new_spanned(
                page_size,
                "`empty` and `page_size` cannot be combined",
            ));
        }
    }
    Ok(options)
}

/// Derive `rgb_sparse::Component`.
///
/// Type parameters get an implicit `'static` bound.
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(mut input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let options = parse_options(&input.attrs)?;

    let params: Vec<_> = input
        .generics
        .params
        .iter()
        .filter_map(|param| match param {
            GenericParam::Type(ty) => Some(ty.ident.clone()),
            _ => None,
        })
        .collect();
    let where_clause = input.generics.make_where_clause();
    for ident in params {
        where_clause.predicates.push(parse_quote!(#ident: 'static));
    }

    let page_size = if options.empty {
        Some(quote! { const PAGE_SIZE: usize = 0; })
    } else {
        options
            .page_size
            .map(|size| quote! { const PAGE_SIZE: usize = #size; })
    };
    let in_place = options
        .in_place
        .then(|| quote! { const IN_PLACE_DELETE: bool = true; });

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::rgb_sparse::Component for #name #ty_generics #where_clause {
            #page_size
            #in_place
        }
    })
}

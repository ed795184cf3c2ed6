//! Derive macro for the NativeClass trait.
//!
//! This crate provides `#[derive(NativeClass)]`, which turns a Rust type into
//! a script type descriptor for `openworkers-object-bridge`. Instances are
//! bound to wrappers as boxed private data; the generated descriptor's
//! finalizer reclaims the box.
//!
//! # Usage
//!
//! ```ignore
//! use openworkers_object_bridge::NativeClass;
//!
//! #[derive(NativeClass)]
//! #[class(name = "Sprite")]
//! struct Sprite {
//!     texture: Vec<u8>,
//! }
//! ```
//!
//! # Inside the crate
//!
//! When using inside `openworkers-object-bridge` itself, use `#[class(crate_path = "crate")]`:
//!
//! ```ignore
//! #[derive(NativeClass)]
//! #[class(crate_path = "crate")]
//! struct InternalNode {
//!     id: u32,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, parse_macro_input};

/// Derive macro for implementing `NativeClass`.
///
/// # Attributes
///
/// - `#[class(name = "Name")]` - Script-visible class name (default: the type name)
/// - `#[class(crate_path = "path")]` - Override the crate path
///   (default: `openworkers_object_bridge`)
#[proc_macro_derive(NativeClass, attributes(class))]
pub fn derive_native_class(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    if let Data::Union(_) = &input.data {
        return syn::Error::new_spanned(&input, "NativeClass cannot be derived for unions")
            .to_compile_error()
            .into();
    }

    if !generics.params.is_empty() {
        return syn::Error::new_spanned(
            generics,
            "NativeClass cannot be derived for generic types (the class name must be unique)",
        )
        .to_compile_error()
        .into();
    }

    let attrs = match ClassAttrs::parse(&input) {
        Ok(attrs) => attrs,
        Err(err) => return err.to_compile_error().into(),
    };

    let crate_path = attrs
        .crate_path
        .unwrap_or_else(|| quote! { openworkers_object_bridge });
    let class_name = attrs.name.unwrap_or_else(|| ident.to_string());

    let expanded = quote! {
        impl #impl_generics #crate_path::NativeClass for #ident #ty_generics #where_clause {
            const CLASS_NAME: &'static str = #class_name;
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct ClassAttrs {
    name: Option<String>,
    crate_path: Option<proc_macro2::TokenStream>,
}

impl ClassAttrs {
    fn parse(input: &DeriveInput) -> syn::Result<Self> {
        let mut attrs = Self::default();

        for attr in &input.attrs {
            if !attr.path().is_ident("class") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value: syn::LitStr = meta.value()?.parse()?;
                    if value.value().is_empty() {
                        return Err(meta.error("class name must not be empty"));
                    }
                    attrs.name = Some(value.value());
                    Ok(())
                } else if meta.path.is_ident("crate_path") {
                    let value: syn::LitStr = meta.value()?.parse()?;
                    let path: syn::Path = value.parse()?;
                    attrs.crate_path = Some(quote! { #path });
                    Ok(())
                } else {
                    Err(meta.error("expected `name` or `crate_path`"))
                }
            })?;
        }

        Ok(attrs)
    }
}

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derive `wayfare_core::RequestKey` for a struct
///
/// Fields are rendered with `Display` and joined with the separator
/// (default `-`), in declaration order.
///
/// - `#[request_key(prefix = "carousel-poi")]` names the endpoint family
/// - `#[request_key(separator = ":")]` changes the separator
/// - `#[request_key(skip)]` leaves a field out of the key
/// - `#[request_key(json)]` renders a field as compact JSON
#[proc_macro_derive(RequestKey, attributes(request_key))]
pub fn derive_request_key(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut prefix = None;
    let mut separator = "-".to_string();
    for attr in &input.attrs {
        if attr.path().is_ident("request_key") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("prefix") {
                    let s: LitStr = meta.value()?.parse()?;
                    prefix = Some(s.value());
                    Ok(())
                } else if meta.path.is_ident("separator") {
                    let s: LitStr = meta.value()?.parse()?;
                    separator = s.value();
                    Ok(())
                } else {
                    Err(meta.error("expected `prefix` or `separator`"))
                }
            })?;
        }
    }

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "RequestKey derive only supports structs",
            ));
        }
    };

    let mut key_parts = Vec::new();
    if !matches!(fields, Fields::Unit) {
        for (i, field) in fields.iter().enumerate() {
            let mut skip = false;
            let mut json = false;
            for attr in &field.attrs {
                if attr.path().is_ident("request_key") {
                    attr.parse_nested_meta(|meta| {
                        if meta.path.is_ident("skip") {
                            skip = true;
                            Ok(())
                        } else if meta.path.is_ident("json") {
                            json = true;
                            Ok(())
                        } else {
                            Err(meta.error("expected `skip` or `json`"))
                        }
                    })?;
                }
            }
            if skip {
                continue;
            }

            let access = match &field.ident {
                Some(ident) => quote! { self.#ident },
                None => {
                    let index = syn::Index::from(i);
                    quote! { self.#index }
                }
            };
            key_parts.push(if json {
                quote! { ::wayfare_core::json_part(&#access) }
            } else {
                quote! { #access.to_string() }
            });
        }
    }

    let key_gen = if key_parts.is_empty() {
        quote! { String::new() }
    } else {
        quote! {
            let parts: Vec<String> = vec![#(#key_parts),*];
            parts.join(#separator)
        }
    };

    let prefix_impl = match prefix {
        Some(prefix) => quote! {
            fn prefix(&self) -> Option<&str> {
                Some(#prefix)
            }
        },
        None => quote! {},
    };

    Ok(quote! {
        impl #impl_generics ::wayfare_core::RequestKey for #name #ty_generics #where_clause {
            fn request_key(&self) -> String {
                #key_gen
            }
            #prefix_impl
        }
    })
}

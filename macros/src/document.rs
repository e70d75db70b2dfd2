use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DataStruct, DeriveInput, Field, Fields, parse2};

pub fn derive_impl(input: TokenStream) -> TokenStream {
    let input = match parse2::<DeriveInput>(input) {
        Ok(v) => v,
        Err(e) => return e.to_compile_error(),
    };
    expand(&input).unwrap_or_else(|e| e.to_compile_error())
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(named),
            ..
        }) => &named.named,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Document can only be derived for structs with named fields",
            ));
        }
    };

    let pk_field = primary_key_field(input, fields)?;
    // named fields always carry an identifier
    let pk_ident = pk_field.ident.as_ref().expect("named field has an ident");

    let ident = &input.ident;
    let model = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics kane::Document for #ident #ty_generics #where_clause {
            fn model() -> &'static str {
                #model
            }

            fn primary_key(&self) -> kane::IndexValue {
                kane::IndexValue::from(self.#pk_ident.clone())
            }
        }
    })
}

/// Picks the primary-key field: the one marked `#[document(pk)]`, or the
/// field literally named `id`.
fn primary_key_field<'a>(
    input: &DeriveInput,
    fields: &'a syn::punctuated::Punctuated<Field, syn::Token![,]>,
) -> syn::Result<&'a Field> {
    let mut marked: Option<&Field> = None;

    for field in fields {
        for attr in &field.attrs {
            if !attr.path().is_ident("document") {
                continue;
            }
            let mut is_pk = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("pk") {
                    is_pk = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported document attribute; expected `pk`"))
                }
            })?;
            if is_pk {
                if marked.is_some() {
                    return Err(syn::Error::new_spanned(
                        field,
                        "only one field may be marked #[document(pk)]",
                    ));
                }
                marked = Some(field);
            }
        }
    }

    if let Some(field) = marked {
        return Ok(field);
    }

    fields
        .iter()
        .find(|f| f.ident.as_ref().map(|i| i == "id").unwrap_or(false))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &input.ident,
                "no primary-key field: mark one with #[document(pk)] or name it `id`",
            )
        })
}

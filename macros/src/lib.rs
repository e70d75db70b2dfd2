//! Procedural macros for kane

mod document;

use proc_macro::TokenStream;

/// Derives `kane::Document` for a struct with named fields.
///
/// The model name is the struct's identifier. The primary key is taken from
/// the field marked `#[document(pk)]`, or from the field named `id` when no
/// field is marked. The field's type must convert into `kane::IndexValue`
/// via `From`.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Document)]
/// struct Todo {
///     #[document(pk)]
///     key: String,
///     user_id: String,
///     order: u64,
/// }
/// ```
#[proc_macro_derive(Document, attributes(document))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    document::derive_impl(input.into()).into()
}

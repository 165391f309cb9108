//! # Bottle Flex Macros
//!
//! `#[derive(Entity)]` turns a struct into a `bottle_flex::Entity`, so
//! `Model::of::<T>()` can build its model.
//!
//! ```rust,ignore
//! use bottle_flex::Entity;
//!
//! #[derive(Entity, Serialize, Deserialize)]
//! #[flex(schema = "app", name = "users")]
//! struct User {
//!     #[flex(primary_key)]
//!     id: String,
//!     #[flex(index)]
//!     name: String,
//!     #[flex(source)]
//!     source: serde_json::Value,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod derive_entity;
mod types;

#[proc_macro_derive(Entity, attributes(flex))]
pub fn entity_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    derive_entity::expand(ast).unwrap_or_else(syn::Error::into_compile_error).into()
}

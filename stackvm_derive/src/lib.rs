//! Derive macros for the stackvm crate.
//!
//! Provides:
//! - `#[derive(Error)]` - `Display`, `std::error::Error` and `From` boilerplate

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` for an error enum, plus `From` for `#[from]` fields.
#[proc_macro_derive(Error, attributes(error, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}

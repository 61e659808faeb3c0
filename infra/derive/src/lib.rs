#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the sealstate crates.
//!
//! The only macro today is [`macro@encryption_error`], which turns a plain enum into
//! a `thiserror` error with context support. Every crate in the workspace declares its
//! error type through it so that `.context(..)` and `format_context` behave the same
//! everywhere.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Attribute macro for defining error enums.
///
/// # Features
///
/// * **Automatic Derives**: Injects `#[derive(Debug, thiserror::Error)]` unless already present.
/// * **Context Support**: Generates a companion `<Name>Ext` trait that adds `.context()`
///   to any `Result` that can be converted into this error type.
/// * **Conversions**: Implements `From<T>` for variants whose `source` field type is used by
///   exactly one variant. A source type shared by several variants is ambiguous, so no
///   conversion is generated and the variant has to be built explicitly.
/// * **Internal Fallback**: Provides `From<&'static str>` and `From<String>` if an
///   `Internal` variant is present.
///
/// # Requirements
///
/// 1. The macro must be applied to an **enum**.
/// 2. Variants that support context must include a `context: Option<Cow<'static, str>>` field.
/// 3. Variants wrapping another error must include a `source: T` field (or a field marked
///    with `#[source]`) **and** a context field.
/// 4. Tuple or unit variants are rejected.
///
/// # Generated Items
///
/// * `<Name>Ext` trait with `.context(...)` for `Result<T, Name>` and, for unique sources,
///   `Result<T, SourceError>`.
/// * `From<SourceError>` impls for unique sources.
/// * `From<&'static str>` and `From<String>` when an `Internal` variant is present.
/// * A private `format_context` helper for `#[error(..)]` strings.
///
/// # Example
///
/// ```rust,ignore
/// use sealstate_derive::encryption_error;
/// use std::borrow::Cow;
///
/// #[encryption_error]
/// pub enum StoreError {
///     #[error("IO error{}: {source}", format_context(.context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn read(path: &str) -> Result<Vec<u8>, StoreError> {
///     std::fs::read(path).context("Reading envelope")
/// }
/// ```
#[proc_macro_attribute]
pub fn encryption_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(input).into()
}

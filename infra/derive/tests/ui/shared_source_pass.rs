use sealstate_derive::encryption_error;
use std::borrow::Cow;

#[derive(Debug, thiserror::Error)]
#[error("cipher rejected input")]
pub struct Failure;

// Two variants embed the same source type, so no `From<Failure>` is generated.
#[encryption_error]
pub enum DemoError {
    #[error("Sealing failed{}: {source}", format_context(.context))]
    Seal { source: Failure, context: Option<Cow<'static, str>> },

    #[error("Opening failed{}: {source}", format_context(.context))]
    Open { source: Failure, context: Option<Cow<'static, str>> },
}

fn main() {
    let err: Result<(), DemoError> = Err(DemoError::Open { source: Failure, context: None });
    let err = err.context("state").unwrap_err();
    assert_eq!(err.to_string(), "Opening failed (state): cipher rejected input");
}

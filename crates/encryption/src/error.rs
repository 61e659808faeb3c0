//! # Encryption Errors
//!
//! Every component reports failures through [`EncryptionError`]. The variant is the
//! failure *kind*, and the engine's fallback logic depends on it:
//!
//! * [`EncryptionError::DecryptionFailed`] means "this ciphertext does not open under this
//!   key". It is the only kind that lets decryption move on to the next fallback pairing.
//! * [`EncryptionError::InvalidConfiguration`] means something is structurally broken.
//!   It always stops the current operation.
//! * [`EncryptionError::EncryptionFailed`] means new data could not be protected.
//!
//! Each kind embeds a [`CryptoFailure`] carrying a message and an optional cause.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// Boxed underlying cause of a [`CryptoFailure`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A generic cryptographic failure embedded into every [`EncryptionError`] kind.
#[derive(Debug)]
pub struct CryptoFailure {
    message: Cow<'static, str>,
    cause: Option<BoxError>,
}

impl CryptoFailure {
    #[must_use]
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self { message: message.into(), cause: None }
    }

    #[must_use]
    pub fn with_cause(message: impl Into<Cow<'static, str>>, cause: impl Into<BoxError>) -> Self {
        Self { message: message.into(), cause: Some(cause.into()) }
    }

    /// Human-readable description of the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying error, if one was recorded.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for CryptoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({cause})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for CryptoFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

/// The kind of an [`EncryptionError`], detached from its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EncryptionFailed,
    DecryptionFailed,
    InvalidConfiguration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EncryptionFailed => "encryption failed",
            Self::DecryptionFailed => "decryption failed",
            Self::InvalidConfiguration => "invalid configuration",
        })
    }
}

/// Failures reported by key providers, methods, the builder and the engine.
#[sealstate_derive::encryption_error]
pub enum EncryptionError {
    /// The forward transformation failed (cipher error, rejected key material).
    ///
    /// Not retryable without a configuration or key change.
    #[error("Encryption failed{}: {source}", format_context(.context))]
    EncryptionFailed { source: CryptoFailure, context: Option<Cow<'static, str>> },

    /// The inverse transformation failed (authentication tag mismatch, malformed
    /// ciphertext or key metadata). Decryption tries the next fallback pairing.
    #[error("Decryption failed{}: {source}", format_context(.context))]
    DecryptionFailed { source: CryptoFailure, context: Option<Cow<'static, str>> },

    /// A configuration failed to validate or build. Never triggers a fallback.
    #[error("Invalid configuration{}: {source}", format_context(.context))]
    InvalidConfiguration { source: CryptoFailure, context: Option<Cow<'static, str>> },
}

impl EncryptionError {
    pub fn encryption(message: impl Into<Cow<'static, str>>) -> Self {
        Self::EncryptionFailed { source: CryptoFailure::new(message), context: None }
    }

    pub fn encryption_caused(
        message: impl Into<Cow<'static, str>>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::EncryptionFailed { source: CryptoFailure::with_cause(message, cause), context: None }
    }

    pub fn decryption(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecryptionFailed { source: CryptoFailure::new(message), context: None }
    }

    pub fn decryption_caused(
        message: impl Into<Cow<'static, str>>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::DecryptionFailed { source: CryptoFailure::with_cause(message, cause), context: None }
    }

    pub fn invalid_configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfiguration { source: CryptoFailure::new(message), context: None }
    }

    pub fn invalid_configuration_caused(
        message: impl Into<Cow<'static, str>>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::InvalidConfiguration {
            source: CryptoFailure::with_cause(message, cause),
            context: None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EncryptionFailed { .. } => ErrorKind::EncryptionFailed,
            Self::DecryptionFailed { .. } => ErrorKind::DecryptionFailed,
            Self::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
        }
    }

    /// The embedded [`CryptoFailure`].
    #[must_use]
    pub const fn failure(&self) -> &CryptoFailure {
        match self {
            Self::EncryptionFailed { source, .. }
            | Self::DecryptionFailed { source, .. }
            | Self::InvalidConfiguration { source, .. } => source,
        }
    }

    /// Shortcut for `self.failure().cause()`.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.failure().cause()
    }

    /// Context attached with [`EncryptionErrorExt::context`], if any.
    #[must_use]
    pub fn context_note(&self) -> Option<&str> {
        match self {
            Self::EncryptionFailed { context, .. }
            | Self::DecryptionFailed { context, .. }
            | Self::InvalidConfiguration { context, .. } => context.as_deref(),
        }
    }

    /// `true` for the only kind that allows trying the next fallback pairing.
    #[must_use]
    pub const fn is_decryption_failure(&self) -> bool {
        matches!(self, Self::DecryptionFailed { .. })
    }
}

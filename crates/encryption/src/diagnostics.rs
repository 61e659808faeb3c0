//! Accumulated configuration and build problems.
//!
//! Configuration parsing and building never stop at the first problem: every independent
//! failure becomes a [`Diagnostic`], addressed by its configuration path
//! (e.g. `target.state.fallback[1]`).

use crate::error::EncryptionError;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug)]
pub struct Diagnostic {
    severity: Severity,
    summary: Cow<'static, str>,
    address: Option<String>,
    error: Option<EncryptionError>,
    detail: Option<String>,
}

impl Diagnostic {
    pub fn error(
        summary: impl Into<Cow<'static, str>>,
        address: Option<String>,
        error: EncryptionError,
    ) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            address,
            error: Some(error),
            detail: None,
        }
    }

    pub fn warning(
        summary: impl Into<Cow<'static, str>>,
        address: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            address,
            error: None,
            detail: Some(detail.into()),
        }
    }

    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Configuration path the diagnostic refers to.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// The underlying error for [`Severity::Error`] diagnostics.
    #[must_use]
    pub const fn error_ref(&self) -> Option<&EncryptionError> {
        self.error.as_ref()
    }

    /// Human-readable detail. For errors this is the error message with its context.
    #[must_use]
    pub fn detail(&self) -> Cow<'_, str> {
        match (&self.error, &self.detail) {
            (Some(err), _) => Cow::Owned(err.to_string()),
            (None, Some(detail)) => Cow::Borrowed(detail),
            (None, None) => Cow::Borrowed(""),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        write!(f, "{level}: {}", self.summary)?;
        if let Some(address) = &self.address {
            write!(f, "\n  on {address}")?;
        }
        let detail = self.detail();
        if !detail.is_empty() {
            write!(f, "\n  {detail}")?;
        }
        Ok(())
    }
}

/// An ordered collection of [`Diagnostic`]s.
#[derive(Debug, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

//! Redaction wrapper for key material.
//!
//! [`Redacted`] keeps the signing key out of `Debug`/`Display` output. Code
//! that needs the value calls [`Redacted::expose`] explicitly.

use std::fmt::{self, Debug, Display};

/// Holds a secret that formats as `"<redacted>"`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the wrapped secret.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

//! Envelope address type.

use crate::error::{Error, Result};

/// A bare mailbox address used in `MAIL FROM` / `RCPT TO`.
///
/// Validation is deliberately shallow: the relay is the authority on what
/// it accepts, this type only rejects strings that cannot possibly be a
/// mailbox (empty, no `@`, empty local or domain part, embedded CR/LF or
/// angle brackets that would break command framing).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates an envelope address after basic validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] when the string cannot be framed
    /// as a mailbox.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        if addr.is_empty() {
            return Err(Error::InvalidAddress("empty address".into()));
        }
        if addr.chars().any(|c| matches!(c, '\r' | '\n' | '<' | '>')) {
            return Err(Error::InvalidAddress(format!(
                "address contains framing characters: {addr}"
            )));
        }
        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress(format!("missing '@' in {addr}")));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(Error::InvalidAddress(format!(
                "malformed local or domain part in {addr}"
            )));
        }
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

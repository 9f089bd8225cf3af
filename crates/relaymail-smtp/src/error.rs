//! Error types for SMTP sessions.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while driving an SMTP session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS handshake or certificate validation failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The pinned trust-root PEM could not be used.
    #[error("trust root error: {0}")]
    TrustRoot(String),

    /// The server answered a command with an error reply.
    #[error("server replied {code}: {message}")]
    Rejected {
        /// SMTP reply code (e.g. 550).
        code: u16,
        /// Reply text, joined across continuation lines.
        message: String,
    },

    /// The server violated the reply grammar or closed unexpectedly.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A required extension is missing from the EHLO capability list.
    #[error("server does not support {0}")]
    NotSupported(String),

    /// An envelope address failed basic validation.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A network step exceeded its deadline.
    #[error("timed out while {0}")]
    Timeout(&'static str),
}

impl Error {
    /// Creates a rejection error from a reply code and message.
    #[must_use]
    pub fn rejected(code: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Returns the server reply code, if this error carries one.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

//! Session management: the transport stream and the submission client.

mod client;
mod stream;

pub use client::{Client, Timeouts};
pub use stream::{SmtpStream, connect};

use crate::types::Extension;

/// What the server told us about itself in its EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// First word of the EHLO greeting line, usually the server hostname.
    pub hostname: String,
    /// Advertised extensions.
    pub extensions: Vec<Extension>,
}

impl ServerInfo {
    /// Builds server info from the lines of a successful EHLO reply.
    #[must_use]
    pub fn from_ehlo_lines(lines: &[String]) -> Self {
        let hostname = lines
            .first()
            .and_then(|l| l.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        let extensions = lines.iter().skip(1).map(|l| Extension::parse(l)).collect();
        Self {
            hostname,
            extensions,
        }
    }

    /// True when the server advertised STARTTLS.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.extensions.contains(&Extension::StartTls)
    }

    /// SASL mechanism names from the AUTH capability, if any.
    #[must_use]
    pub fn auth_mechanisms(&self) -> &[String] {
        for ext in &self.extensions {
            if let Extension::Auth(mechanisms) = ext {
                return mechanisms;
            }
        }
        &[]
    }
}

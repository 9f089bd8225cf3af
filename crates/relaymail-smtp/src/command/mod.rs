//! SMTP command serialization.

use crate::types::Address;

/// The submission subset of SMTP commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - extended greeting and capability discovery.
    Ehlo {
        /// Name the client introduces itself with.
        hostname: String,
    },
    /// STARTTLS - request the TLS upgrade.
    StartTls,
    /// AUTH PLAIN with the base64 initial response (RFC 4616 SASL-IR).
    AuthPlain {
        /// Base64 of `\0username\0secret`.
        initial_response: String,
    },
    /// MAIL FROM - open the envelope.
    MailFrom {
        /// Envelope sender.
        from: Address,
    },
    /// RCPT TO - add one envelope recipient.
    RcptTo {
        /// Envelope recipient.
        to: Address,
    },
    /// DATA - request the message input channel.
    Data,
    /// QUIT - terminate the session.
    Quit,
}

impl Command {
    /// Serializes the command including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::AuthPlain { initial_response } => format!("AUTH PLAIN {initial_response}"),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Short name of the command for logs and error context.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::AuthPlain { .. } => "AUTH",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Quit => "QUIT",
        }
    }
}

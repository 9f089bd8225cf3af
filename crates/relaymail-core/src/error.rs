//! The delivery error taxonomy.
//!
//! Every variant names the pipeline step that failed, so the operator
//! diagnostic can point at configuration, input, credentials, or a
//! specific phase of the SMTP conversation without verbose tracing.

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the submission pipeline. All are fatal to the
/// single delivery attempt; there is no retry path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file is missing, unreadable, or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested account name is not in the registry.
    #[error("unknown account {0:?}")]
    UnknownAccount(String),

    /// The stdin message is not a parseable RFC 5322 message.
    #[error("cannot parse message: {0}")]
    MessageParse(String),

    /// The From header is missing or does not name exactly one mailbox.
    #[error("cannot determine sender: {0}")]
    FromAddress(String),

    /// A To, Cc, or Bcc header holds an unparseable address list.
    #[error("cannot parse recipients: {0}")]
    RecipientParse(String),

    /// The external credential command failed to produce a secret.
    #[error("credential retrieval failed: {0}")]
    Credential(String),

    /// The control connection to the relay could not be established.
    #[error("cannot connect to {address}: {source}")]
    Connect {
        /// The `host:port` the connection was aimed at.
        address: String,
        /// The underlying transport or greeting failure.
        source: relaymail_smtp::Error,
    },

    /// The relay did not advertise STARTTLS. Plaintext submission is
    /// never attempted.
    #[error("relay {host} does not offer STARTTLS; refusing plaintext submission")]
    NoStartTls {
        /// Hostname of the refusing relay.
        host: String,
    },

    /// The TLS upgrade or certificate validation failed.
    #[error("TLS negotiation with {host} failed: {source}")]
    Tls {
        /// Hostname the certificate was validated against.
        host: String,
        /// The handshake or trust failure.
        source: relaymail_smtp::Error,
    },

    /// The relay rejected the authentication exchange.
    #[error("authentication rejected for {username}: {source}")]
    Auth {
        /// The identity that was presented.
        username: String,
        /// The server's rejection.
        source: relaymail_smtp::Error,
    },

    /// The relay rejected an envelope address (MAIL FROM or RCPT TO).
    #[error("relay rejected envelope address {address}: {reply}")]
    EnvelopeRejected {
        /// The sender or recipient address the server refused.
        address: String,
        /// The server reply, code and text.
        reply: String,
    },

    /// The DATA transfer failed, in transport or by server rejection.
    #[error("message transfer failed: {source}")]
    DataTransfer {
        /// The underlying failure.
        source: relaymail_smtp::Error,
    },

    /// The session broke down outside a command rejection, for example
    /// a timeout or a dropped connection mid-conversation.
    #[error("session failure while {step}: {source}")]
    Session {
        /// What the session was doing when the transport failed.
        step: &'static str,
        /// The underlying failure.
        source: relaymail_smtp::Error,
    },

    /// The diagnostic certificate inspection could not complete.
    #[error("certificate inspection failed: {0}")]
    Inspect(String),

    /// Filesystem or stdin I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

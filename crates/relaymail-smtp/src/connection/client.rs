//! The SMTP submission client.

use std::time::Duration;

use base64::Engine;
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_final_line, parse_reply};
use crate::tls::{self, TrustRoots};
use crate::types::{Address, Reply, ReplyCode};

/// Deadlines applied to the blocking network steps.
///
/// The protocol itself has none; unbounded waits on a wedged relay are
/// worse than a failed delivery, so every reply read and the TLS
/// handshake carry a deadline.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Deadline for establishing the TCP connection.
    pub connect: Duration,
    /// Deadline for each server reply and for the TLS handshake.
    pub command: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            command: Duration::from_secs(60),
        }
    }
}

/// One SMTP session from greeting to QUIT.
///
/// Unlike a type-state client, this object survives server rejections:
/// a failed `RCPT TO` leaves the session intact so the caller can still
/// terminate it cleanly. The connection is released on [`Client::quit`]
/// or on drop, whichever comes first.
#[derive(Debug)]
pub struct Client<S> {
    stream: Option<SmtpStream<S>>,
    server: ServerInfo,
    ehlo_name: Option<String>,
    timeouts: Timeouts,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    /// Creates a client over `stream` and consumes the server greeting.
    ///
    /// # Errors
    ///
    /// Fails when the greeting cannot be read or is not a 2xx reply.
    pub async fn from_stream(stream: SmtpStream<S>) -> Result<Self> {
        Self::with_timeouts(stream, Timeouts::default()).await
    }

    /// Like [`Client::from_stream`] with explicit deadlines.
    ///
    /// # Errors
    ///
    /// Fails when the greeting cannot be read or is not a 2xx reply.
    pub async fn with_timeouts(stream: SmtpStream<S>, timeouts: Timeouts) -> Result<Self> {
        let mut client = Self {
            stream: Some(stream),
            server: ServerInfo::default(),
            ehlo_name: None,
            timeouts,
        };
        let greeting = client.read_reply().await?;
        expect_success(greeting)?;
        Ok(client)
    }

    /// Server capabilities from the most recent EHLO.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// The certificate chain presented by the server, leaf first.
    #[must_use]
    pub fn peer_certificates(&self) -> Option<Vec<CertificateDer<'static>>> {
        self.stream.as_ref().and_then(SmtpStream::peer_certificates)
    }

    /// Sends EHLO and records the advertised capabilities.
    ///
    /// # Errors
    ///
    /// Fails when the server rejects the greeting.
    pub async fn ehlo(&mut self, hostname: &str) -> Result<()> {
        let reply = self
            .command(&Command::Ehlo {
                hostname: hostname.to_string(),
            })
            .await?;
        let reply = expect_success(reply)?;
        self.server = ServerInfo::from_ehlo_lines(&reply.lines);
        self.ehlo_name = Some(hostname.to_string());
        Ok(())
    }

    /// Upgrades to TLS, validating the server chain against `roots` and
    /// the certificate subject against `host`.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] when STARTTLS was not advertised; TLS or
    /// rejection errors otherwise. The session never continues in
    /// plaintext after a failed upgrade.
    pub async fn starttls(&mut self, host: &str, roots: &TrustRoots) -> Result<()> {
        let connector = roots.connector()?;
        self.starttls_with(host, connector).await
    }

    /// TLS upgrade that skips certificate verification.
    ///
    /// For read-only certificate inspection only. Mail must never be
    /// submitted over a session upgraded this way.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Client::starttls`], minus validation.
    pub async fn starttls_unverified(&mut self, host: &str) -> Result<()> {
        self.starttls_with(host, tls::unverified_connector()).await
    }

    async fn starttls_with(&mut self, host: &str, connector: TlsConnector) -> Result<()> {
        if !self.server.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }
        let reply = self.command(&Command::StartTls).await?;
        expect_success(reply)?;

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| Error::Protocol(format!("invalid TLS server name: {host}")))?;
        let stream = self.take_stream()?;
        // The plaintext stream is gone after this point; a handshake
        // failure leaves the session unusable rather than downgraded.
        let upgraded = tokio::time::timeout(
            self.timeouts.command,
            stream.upgrade(server_name, connector),
        )
        .await
        .map_err(|_| Error::Timeout("performing the TLS handshake"))??;
        self.stream = Some(upgraded);
        debug!(host, "TLS established");

        // RFC 3207 §4.2: the pre-TLS capability list is void.
        let name = self.ehlo_name.clone().unwrap_or_else(|| "localhost".into());
        self.ehlo(&name).await
    }

    /// Authenticates with AUTH PLAIN inside the encrypted channel.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`] with the server reply on bad credentials.
    pub async fn auth_plain(&mut self, username: &str, secret: &str) -> Result<()> {
        let payload = format!("\0{username}\0{secret}");
        let initial_response =
            base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());
        let reply = self.command(&Command::AuthPlain { initial_response }).await?;
        expect_success(reply)?;
        debug!(username, "authenticated");
        Ok(())
    }

    /// Opens the envelope with `MAIL FROM`.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`] when the server refuses the sender.
    pub async fn mail_from(&mut self, from: &Address) -> Result<()> {
        let reply = self
            .command(&Command::MailFrom { from: from.clone() })
            .await?;
        expect_success(reply)?;
        Ok(())
    }

    /// Adds one envelope recipient with `RCPT TO`.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`] when the server refuses the recipient. The
    /// session stays usable so the caller can QUIT.
    pub async fn rcpt_to(&mut self, to: &Address) -> Result<()> {
        let reply = self.command(&Command::RcptTo { to: to.clone() }).await?;
        expect_success(reply)?;
        Ok(())
    }

    /// Transfers the message via DATA and waits for acceptance.
    ///
    /// Lines are normalized to CRLF on the wire and leading dots are
    /// stuffed per RFC 5321 §4.5.2; the message bytes themselves are
    /// taken verbatim.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`] when the server refuses the DATA command or
    /// the message content.
    pub async fn data(&mut self, message: &[u8]) -> Result<()> {
        let reply = self.command(&Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::rejected(reply.code.as_u16(), reply.text()));
        }

        let wire = dot_stuff(message);
        self.take_stream_ref()?.write_all(&wire).await?;
        let reply = self.read_reply().await?;
        expect_success(reply)?;
        Ok(())
    }

    /// Sends QUIT (best effort) and releases the connection.
    ///
    /// Runs on every exit path of a delivery, including after server
    /// rejections, so errors from the dying connection are ignored.
    pub async fn quit(&mut self) {
        if self.stream.is_some() {
            let _ = self.command(&Command::Quit).await;
        }
        self.stream = None;
    }

    async fn command(&mut self, cmd: &Command) -> Result<Reply> {
        debug!(command = cmd.name(), "C");
        let bytes = cmd.serialize();
        self.take_stream_ref()?.write_all(&bytes).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let deadline = self.timeouts.command;
        let stream = self.take_stream_ref()?;
        let mut lines = Vec::new();
        loop {
            let line = tokio::time::timeout(deadline, stream.read_line())
                .await
                .map_err(|_| Error::Timeout("waiting for a server reply"))??;
            let done = is_final_line(&line);
            lines.push(line);
            if done {
                break;
            }
        }
        let reply = parse_reply(&lines)?;
        debug!(code = reply.code.as_u16(), "S");
        Ok(reply)
    }

    fn take_stream(&mut self) -> Result<SmtpStream<S>> {
        self.stream
            .take()
            .ok_or_else(|| Error::Protocol("session is closed".into()))
    }

    fn take_stream_ref(&mut self) -> Result<&mut SmtpStream<S>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Protocol("session is closed".into()))
    }
}

fn expect_success(reply: Reply) -> Result<Reply> {
    if reply.is_success() {
        Ok(reply)
    } else {
        Err(Error::rejected(reply.code.as_u16(), reply.text()))
    }
}

/// CRLF-normalizes and dot-stuffs a message, appending the terminator.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(message.len() + 64);
    let mut lines = message.split(|&b| b == b'\n').peekable();
    while let Some(line) = lines.next() {
        // A trailing newline produces one empty trailing chunk; that is
        // the line terminator, not an extra blank line.
        if line.is_empty() && lines.peek().is_none() {
            break;
        }
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            wire.push(b'.');
        }
        wire.extend_from_slice(line);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b".\r\n");
    wire
}

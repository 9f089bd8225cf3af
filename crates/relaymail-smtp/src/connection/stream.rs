//! The plain/TLS transport beneath an SMTP session.

use std::time::Duration;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::{Error, Result};

/// An SMTP transport, before or after the STARTTLS upgrade.
///
/// Generic over the inner stream so sessions can run against scripted
/// in-memory streams in tests.
#[derive(Debug)]
pub enum SmtpStream<S> {
    /// Plaintext phase (greeting, EHLO, STARTTLS negotiation).
    Plain(BufReader<S>),
    /// Encrypted phase after a completed handshake.
    Tls(Box<BufReader<TlsStream<S>>>),
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpStream<S> {
    /// Wraps a raw stream in the plaintext phase.
    pub fn plain(stream: S) -> Self {
        Self::Plain(BufReader::new(stream))
    }

    /// Reads one CRLF-terminated line, with the terminator trimmed.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or when the server closes the
    /// connection mid-reply.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = match self {
            Self::Plain(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if n == 0 {
            return Err(Error::Protocol("connection closed by server".into()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes and flushes the given bytes.
    ///
    /// # Errors
    ///
    /// Fails on transport errors.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Performs the TLS handshake over the plaintext stream.
    ///
    /// # Errors
    ///
    /// Fails when already encrypted, or when the handshake or
    /// certificate validation fails.
    pub async fn upgrade(
        self,
        server_name: ServerName<'static>,
        connector: TlsConnector,
    ) -> Result<Self> {
        let inner = match self {
            Self::Plain(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("connection is already encrypted".into())),
        };
        let tls = connector.connect(server_name, inner).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls))))
    }

    /// The certificate chain the server presented, leaf first.
    ///
    /// `None` before the TLS upgrade or when the server sent no chain.
    #[must_use]
    pub fn peer_certificates(&self) -> Option<Vec<CertificateDer<'static>>> {
        match self {
            Self::Plain(_) => None,
            Self::Tls(reader) => {
                let (_, session) = reader.get_ref().get_ref();
                session
                    .peer_certificates()
                    .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
            }
        }
    }
}

/// Opens the plaintext control connection to `host:port`.
///
/// # Errors
///
/// Returns [`Error::Timeout`] when the connect deadline passes, or the
/// underlying I/O error.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<SmtpStream<TcpStream>> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| Error::Timeout("connecting to the relay"))??;
    Ok(SmtpStream::plain(stream))
}

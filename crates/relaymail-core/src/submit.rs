//! The submission session driver.
//!
//! Walks one delivery through the pipeline: connect, STARTTLS with the
//! account's trust policy, optional AUTH, envelope, DATA, QUIT. The
//! first failure aborts the attempt, and QUIT runs on every exit path
//! once a connection exists so the relay never sees a dangling session.

use tracing::{debug, info};

use relaymail_smtp::{Client, Timeouts, connect};

use crate::config::AccountConfig;
use crate::credential::SecretSource;
use crate::error::{Error, Result};
use crate::message::Envelope;

/// Name this client introduces itself with in EHLO.
pub(crate) const EHLO_NAME: &str = "localhost";

/// Delivers `envelope` through the relay described by `account`.
///
/// Exactly one attempt: on success the relay has accepted the message
/// for all envelope recipients, on failure it has accepted nothing.
///
/// # Errors
///
/// One variant per pipeline step; see [`Error`]. Envelope rejections
/// name the refused address and carry the server reply.
pub async fn submit<S: SecretSource>(
    account: &AccountConfig,
    envelope: &Envelope,
    secrets: &S,
    timeouts: Timeouts,
) -> Result<()> {
    let (host, port) = account.host_port()?;
    debug!(host, port, "connecting to relay");

    let stream = connect(host, port, timeouts.connect)
        .await
        .map_err(|source| Error::Connect {
            address: account.address.clone(),
            source,
        })?;
    let mut client = Client::with_timeouts(stream, timeouts)
        .await
        .map_err(|source| Error::Connect {
            address: account.address.clone(),
            source,
        })?;

    // From here on the connection exists; QUIT must run whatever happens.
    let outcome = deliver(&mut client, host, account, envelope, secrets).await;
    client.quit().await;
    outcome
}

async fn deliver<S, T>(
    client: &mut Client<T>,
    host: &str,
    account: &AccountConfig,
    envelope: &Envelope,
    secrets: &S,
) -> Result<()>
where
    S: SecretSource,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    client.ehlo(EHLO_NAME).await.map_err(|source| Error::Session {
        step: "greeting the relay",
        source,
    })?;

    if !client.server_info().supports_starttls() {
        return Err(Error::NoStartTls { host: host.into() });
    }
    client
        .starttls(host, &account.trust_roots())
        .await
        .map_err(|source| Error::Tls {
            host: host.into(),
            source,
        })?;

    if let Some(username) = account.username.as_deref() {
        let secret = secrets.secret(&account.passwordeval).await?;
        client
            .auth_plain(username, &secret)
            .await
            .map_err(|source| Error::Auth {
                username: username.into(),
                source,
            })?;
    }

    client
        .mail_from(&envelope.from)
        .await
        .map_err(|source| envelope_error(envelope.from.as_str(), source))?;
    for recipient in &envelope.recipients {
        client
            .rcpt_to(recipient)
            .await
            .map_err(|source| envelope_error(recipient.as_str(), source))?;
    }

    client
        .data(&envelope.body)
        .await
        .map_err(|source| Error::DataTransfer { source })?;

    info!(
        from = envelope.from.as_str(),
        recipients = envelope.recipients.len(),
        relay = host,
        "message accepted by relay"
    );
    Ok(())
}

/// Server rejections of MAIL FROM / RCPT TO name the refused address;
/// transport breakdowns at the same stage stay session failures.
fn envelope_error(address: &str, source: relaymail_smtp::Error) -> Error {
    match source {
        relaymail_smtp::Error::Rejected { code, message } => Error::EnvelopeRejected {
            address: address.to_string(),
            reply: format!("{code} {message}"),
        },
        other => Error::Session {
            step: "sending the envelope",
            source: other,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn recipient_rejection_becomes_envelope_error() {
        let source = relaymail_smtp::Error::rejected(550, "no such user");
        let err = envelope_error("c@x.com", source);
        match err {
            Error::EnvelopeRejected { address, reply } => {
                assert_eq!(address, "c@x.com");
                assert_eq!(reply, "550 no such user");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sender_rejection_names_the_sender() {
        let source = relaymail_smtp::Error::rejected(553, "sender not allowed");
        let err = envelope_error("a@x.com", source);
        match err {
            Error::EnvelopeRejected { address, reply } => {
                assert_eq!(address, "a@x.com");
                assert!(reply.contains("553"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn transport_failure_stays_a_session_error() {
        let source = relaymail_smtp::Error::Timeout("waiting for a server reply");
        let err = envelope_error("c@x.com", source);
        assert!(matches!(err, Error::Session { .. }));
    }
}

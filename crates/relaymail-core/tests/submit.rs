//! End-to-end submission tests against scripted in-process relays.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use relaymail_core::{
    AccountConfig, CommandSecretSource, Envelope, Error, SecretSource, submit,
};
use relaymail_smtp::Timeouts;

/// Secret source that hands out a fixed secret without spawning anything.
struct StubSecrets(&'static str);

impl SecretSource for StubSecrets {
    async fn secret(&self, _command: &[String]) -> relaymail_core::Result<String> {
        Ok(self.0.to_string())
    }
}

fn account(port: u16, root_pem: Option<String>, username: Option<&str>) -> AccountConfig {
    AccountConfig {
        address: format!("127.0.0.1:{port}"),
        from: None,
        username: username.map(str::to_string),
        passwordeval: vec!["unused".to_string()],
        root_pem,
    }
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, reply: &str) {
    stream.write_all(reply.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

/// Reads one command line, recording it in the transcript.
async fn recv<R: AsyncBufRead + Unpin>(reader: &mut R, transcript: &mut Vec<String>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    transcript.push(line.clone());
    line
}

fn tls_acceptor() -> (TlsAcceptor, String) {
    let cert = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).unwrap();
    let pem = cert.serialize_pem().unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        cert.serialize_private_key_der(),
    ));
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();
    (TlsAcceptor::from(Arc::new(config)), pem)
}

/// Plaintext phase shared by the TLS tests: greeting, EHLO, STARTTLS.
async fn plain_phase(
    stream: TcpStream,
    acceptor: &TlsAcceptor,
    transcript: &mut Vec<String>,
) -> BufReader<tokio_rustls::server::TlsStream<TcpStream>> {
    let mut reader = BufReader::new(stream);
    send(&mut reader, "220 test relay\r\n").await;
    assert_eq!(recv(&mut reader, transcript).await, "EHLO localhost");
    send(&mut reader, "250-test\r\n250 STARTTLS\r\n").await;
    assert_eq!(recv(&mut reader, transcript).await, "STARTTLS");
    send(&mut reader, "220 go ahead\r\n").await;

    let tls = acceptor.accept(reader.into_inner()).await.unwrap();
    let mut reader = BufReader::new(tls);
    assert_eq!(recv(&mut reader, transcript).await, "EHLO localhost");
    send(&mut reader, "250-test\r\n250 AUTH PLAIN\r\n").await;
    reader
}

#[tokio::test]
async fn relay_without_starttls_gets_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut transcript = Vec::new();
        send(&mut reader, "220 test relay\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "EHLO localhost");
        send(&mut reader, "250 test\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "QUIT");
        send(&mut reader, "221 bye\r\n").await;
        transcript
    });

    let envelope = Envelope::rewrite(b"From: a@x.com\nTo: b@x.com\n\nhi\n").unwrap();
    let err = submit(
        &account(port, None, None),
        &envelope,
        &CommandSecretSource,
        Timeouts::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::NoStartTls { .. }));

    let transcript = server.await.unwrap();
    assert!(!transcript.iter().any(|l| l == "DATA" || l == "STARTTLS"));
}

#[tokio::test]
async fn delivers_over_pinned_tls_with_auth() {
    let (acceptor, pem) = tls_acceptor();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transcript = Vec::new();
        let mut reader = plain_phase(stream, &acceptor, &mut transcript).await;

        let auth = recv(&mut reader, &mut transcript).await;
        assert!(auth.starts_with("AUTH PLAIN "));
        send(&mut reader, "235 ok\r\n").await;
        assert_eq!(
            recv(&mut reader, &mut transcript).await,
            "MAIL FROM:<a@x.com>"
        );
        send(&mut reader, "250 ok\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "RCPT TO:<b@x.com>");
        send(&mut reader, "250 ok\r\n").await;
        assert_eq!(
            recv(&mut reader, &mut transcript).await,
            "RCPT TO:<hidden@x.com>"
        );
        send(&mut reader, "250 ok\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "DATA");
        send(&mut reader, "354 go\r\n").await;
        loop {
            if recv(&mut reader, &mut transcript).await == "." {
                break;
            }
        }
        send(&mut reader, "250 accepted\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "QUIT");
        send(&mut reader, "221 bye\r\n").await;
        transcript
    });

    let envelope = Envelope::rewrite(
        b"From: a@x.com\nTo: b@x.com\nBcc: hidden@x.com\nSubject: ping\n\nhello\n",
    )
    .unwrap();
    submit(
        &account(port, Some(pem), Some("user")),
        &envelope,
        &StubSecrets("hunter2"),
        Timeouts::default(),
    )
    .await
    .unwrap();

    let transcript = server.await.unwrap();
    // base64 of "\0user\0hunter2"
    assert!(transcript.contains(&"AUTH PLAIN AHVzZXIAaHVudGVyMg==".to_string()));
    // The hidden recipient rides in the envelope but not in the headers.
    assert!(transcript.iter().any(|l| l == "RCPT TO:<hidden@x.com>"));
    assert!(!transcript.iter().any(|l| l.starts_with("Bcc:")));
    assert!(transcript.iter().any(|l| l == "Subject: ping"));
}

#[tokio::test]
async fn rejected_recipient_aborts_before_data() {
    let (acceptor, pem) = tls_acceptor();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transcript = Vec::new();
        let mut reader = plain_phase(stream, &acceptor, &mut transcript).await;

        let auth = recv(&mut reader, &mut transcript).await;
        assert!(auth.starts_with("AUTH PLAIN "));
        send(&mut reader, "235 ok\r\n").await;
        assert_eq!(
            recv(&mut reader, &mut transcript).await,
            "MAIL FROM:<a@x.com>"
        );
        send(&mut reader, "250 ok\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "RCPT TO:<b@x.com>");
        send(&mut reader, "250 ok\r\n").await;
        assert_eq!(
            recv(&mut reader, &mut transcript).await,
            "RCPT TO:<nobody@x.com>"
        );
        send(&mut reader, "550 no such user\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "QUIT");
        send(&mut reader, "221 bye\r\n").await;
        transcript
    });

    let envelope =
        Envelope::rewrite(b"From: a@x.com\nTo: b@x.com, nobody@x.com\n\nhi\n").unwrap();
    let err = submit(
        &account(port, Some(pem), Some("user")),
        &envelope,
        &StubSecrets("hunter2"),
        Timeouts::default(),
    )
    .await
    .unwrap_err();

    match err {
        Error::EnvelopeRejected { address, reply } => {
            assert_eq!(address, "nobody@x.com");
            assert!(reply.contains("550"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let transcript = server.await.unwrap();
    assert!(!transcript.iter().any(|l| l == "DATA"));
    assert_eq!(transcript.last().unwrap(), "QUIT");
}

#[tokio::test]
async fn rejected_sender_aborts_before_rcpt() {
    let (acceptor, pem) = tls_acceptor();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transcript = Vec::new();
        let mut reader = plain_phase(stream, &acceptor, &mut transcript).await;

        assert_eq!(
            recv(&mut reader, &mut transcript).await,
            "MAIL FROM:<a@x.com>"
        );
        send(&mut reader, "553 sender not allowed\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "QUIT");
        send(&mut reader, "221 bye\r\n").await;
        transcript
    });

    let envelope = Envelope::rewrite(b"From: a@x.com\nTo: b@x.com\n\nhi\n").unwrap();
    let err = submit(
        &account(port, Some(pem), None),
        &envelope,
        &CommandSecretSource,
        Timeouts::default(),
    )
    .await
    .unwrap_err();

    match err {
        Error::EnvelopeRejected { address, reply } => {
            assert_eq!(address, "a@x.com");
            assert!(reply.contains("553"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let transcript = server.await.unwrap();
    assert!(!transcript.iter().any(|l| l.starts_with("RCPT TO")));
    assert_eq!(transcript.last().unwrap(), "QUIT");
}

#[tokio::test]
async fn pinned_root_rejects_unknown_certificate() {
    // Server presents a certificate that does not chain to the pinned
    // root: the handshake must fail and nothing past STARTTLS is sent.
    let (acceptor, _server_pem) = tls_acceptor();
    let (_, other_pem) = tls_acceptor();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut transcript = Vec::new();
        send(&mut reader, "220 test relay\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "EHLO localhost");
        send(&mut reader, "250-test\r\n250 STARTTLS\r\n").await;
        assert_eq!(recv(&mut reader, &mut transcript).await, "STARTTLS");
        send(&mut reader, "220 go ahead\r\n").await;
        // The handshake fails; the client never speaks SMTP again.
        let _ = acceptor.accept(reader.into_inner()).await;
        transcript
    });

    let envelope = Envelope::rewrite(b"From: a@x.com\nTo: b@x.com\n\nhi\n").unwrap();
    let err = submit(
        &account(port, Some(other_pem), None),
        &envelope,
        &CommandSecretSource,
        Timeouts::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Tls { .. }));

    let transcript = server.await.unwrap();
    assert_eq!(transcript.last().unwrap(), "STARTTLS");
}

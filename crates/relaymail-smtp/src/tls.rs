//! TLS trust policy for the STARTTLS upgrade.
//!
//! The delivery path always verifies the server certificate, either
//! against the platform trust store or against a pinned PEM bundle from
//! the account configuration. The unverified connector is a separate code
//! path used only by the certificate inspection mode; it shares nothing
//! with the delivery configuration so a config mistake cannot weaken
//! delivery-path validation.

use std::io::Cursor;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::warn;

use crate::error::{Error, Result};

/// Which roots the server certificate chain must anchor to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustRoots {
    /// The bundled webpki platform roots.
    System,
    /// A pinned PEM bundle; only chains anchored here are accepted.
    Pinned(String),
}

impl TrustRoots {
    /// Builds a verifying TLS connector for this trust policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrustRoot`] when a pinned bundle contains no
    /// usable certificate.
    pub fn connector(&self) -> Result<TlsConnector> {
        let mut roots = RootCertStore::empty();
        match self {
            Self::System => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
            Self::Pinned(pem) => {
                for cert in rustls_pemfile::certs(&mut Cursor::new(pem.as_bytes())) {
                    let cert = cert.map_err(|e| {
                        Error::TrustRoot(format!("unreadable certificate in pinned PEM: {e}"))
                    })?;
                    roots
                        .add(cert)
                        .map_err(|e| Error::TrustRoot(format!("rejected pinned root: {e}")))?;
                }
                if roots.is_empty() {
                    return Err(Error::TrustRoot(
                        "pinned PEM contains no certificates".into(),
                    ));
                }
            }
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(TlsConnector::from(Arc::new(config)))
    }
}

/// Builds a connector that accepts any server certificate.
///
/// Inspection-only; the delivery path never calls this.
pub(crate) fn unverified_connector() -> TlsConnector {
    warn!("TLS certificate verification disabled for this session");
    let roots = RootCertStore::empty();
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config
        .dangerous()
        .set_certificate_verifier(Arc::new(AcceptAnyCert));
    TlsConnector::from(Arc::new(config))
}

#[derive(Debug)]
struct AcceptAnyCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}

//! Read-only relay certificate inspection.
//!
//! Connects to a configured relay, performs STARTTLS with certificate
//! verification disabled, and reports the peer chain: DNS names, CRL
//! distribution points, issuing-certificate URLs, the SHA-256
//! fingerprint, and the PEM encoding. No mail is sent and nothing from
//! this path feeds back into delivery trust decisions; its purpose is
//! exactly to let an operator capture a `root_pem` value for pinning.

use std::fmt;

use sha2::{Digest, Sha256};
use x509_parser::prelude::{
    DistributionPointName, FromDer, GeneralName, ParsedExtension, X509Certificate,
};

use relaymail_smtp::{Client, Timeouts, connect};

use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::submit::EHLO_NAME;

/// What one peer certificate says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateReport {
    /// Subject alternative DNS names.
    pub dns_names: Vec<String>,
    /// CRL distribution point URIs.
    pub crl_distribution_points: Vec<String>,
    /// CA-issuers URIs from the authority information access extension.
    pub issuing_certificate_urls: Vec<String>,
    /// Uppercase hex SHA-256 digest of the DER encoding.
    pub sha256_fingerprint: String,
    /// PEM encoding of the certificate.
    pub pem: String,
}

/// OID of the CA-issuers access method (id-ad-caIssuers).
const OID_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

impl CertificateReport {
    /// Builds a report from one DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inspect`] when the DER does not parse as an
    /// X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Inspect(format!("cannot parse certificate: {e}")))?;

        let mut dns_names = Vec::new();
        let mut crl_distribution_points = Vec::new();
        let mut issuing_certificate_urls = Vec::new();
        for ext in cert.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::SubjectAlternativeName(san) => {
                    for name in &san.general_names {
                        if let GeneralName::DNSName(dns) = name {
                            dns_names.push((*dns).to_string());
                        }
                    }
                }
                ParsedExtension::CRLDistributionPoints(points) => {
                    for point in &points.points {
                        if let Some(DistributionPointName::FullName(names)) =
                            &point.distribution_point
                        {
                            for name in names {
                                if let GeneralName::URI(uri) = name {
                                    crl_distribution_points.push((*uri).to_string());
                                }
                            }
                        }
                    }
                }
                ParsedExtension::AuthorityInfoAccess(access) => {
                    for desc in &access.accessdescs {
                        if desc.access_method.to_id_string() == OID_CA_ISSUERS {
                            if let GeneralName::URI(uri) = &desc.access_location {
                                issuing_certificate_urls.push((*uri).to_string());
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let digest = Sha256::digest(der);
        let sha256_fingerprint = digest.iter().map(|b| format!("{b:02X}")).collect();
        let pem = pem::encode(&pem::Pem::new("CERTIFICATE", der.to_vec()));

        Ok(Self {
            dns_names,
            crl_distribution_points,
            issuing_certificate_urls,
            sha256_fingerprint,
            pem,
        })
    }
}

impl fmt::Display for CertificateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.dns_names.iter().enumerate() {
            writeln!(f, "DNS name[{i}]: {name}")?;
        }
        for (i, uri) in self.crl_distribution_points.iter().enumerate() {
            writeln!(f, "CRL distribution point[{i}]: {uri}")?;
        }
        for (i, uri) in self.issuing_certificate_urls.iter().enumerate() {
            writeln!(f, "issuing certificate URL[{i}]: {uri}")?;
        }
        writeln!(f, "SHA-256 fingerprint: {}", self.sha256_fingerprint)?;
        write!(f, "{}", self.pem)
    }
}

/// Fetches the certificate chain a relay presents, leaf first.
///
/// # Errors
///
/// Connection, STARTTLS, and parse failures map to the same taxonomy as
/// delivery; [`Error::Inspect`] covers a missing or unparseable chain.
pub async fn inspect_account(
    account: &AccountConfig,
    timeouts: Timeouts,
) -> Result<Vec<CertificateReport>> {
    let (host, port) = account.host_port()?;
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

    let outcome = fetch_chain(&mut client, host).await;
    client.quit().await;
    outcome
}

async fn fetch_chain<T>(client: &mut Client<T>, host: &str) -> Result<Vec<CertificateReport>>
where
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
        .starttls_unverified(host)
        .await
        .map_err(|source| Error::Tls {
            host: host.into(),
            source,
        })?;

    let chain = client
        .peer_certificates()
        .ok_or_else(|| Error::Inspect("relay presented no certificate chain".into()))?;
    chain
        .iter()
        .map(|cert| CertificateReport::from_der(cert.as_ref()))
        .collect()
}

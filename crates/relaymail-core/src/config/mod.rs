//! Account registry and its TOML configuration format.
//!
//! The configuration file names one default account and any number of
//! relay accounts:
//!
//! ```toml
//! default = "personal"
//!
//! [accounts.personal]
//! address = "smtp.example.com:587"
//! from = "me@example.com"
//! username = "me@example.com"
//! passwordeval = ["pass", "show", "smtp/personal"]
//! ```
//!
//! An optional `root_pem` field pins the TLS trust for that relay to the
//! given PEM certificate bundle instead of the platform trust store.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use relaymail_smtp::TrustRoots;

use crate::error::{Error, Result};

/// One named outbound relay definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Relay endpoint as `host:port`.
    pub address: String,
    /// From address bound to this account, used for automatic selection.
    #[serde(default)]
    pub from: Option<String>,
    /// Authentication identity. Absent means the relay needs no AUTH.
    #[serde(default)]
    pub username: Option<String>,
    /// Command and arguments whose stdout yields the account secret.
    #[serde(default)]
    pub passwordeval: Vec<String>,
    /// PEM bundle pinning the relay's TLS trust. Empty or absent means
    /// the platform trust store.
    #[serde(default)]
    pub root_pem: Option<String>,
}

impl AccountConfig {
    /// Splits `address` into its host and port components. IPv6 hosts
    /// use the bracketed form, `[::1]:587`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing or unparseable port, an
    /// empty host, or an unbracketed IPv6 host. Raised before any
    /// network activity.
    pub fn host_port(&self) -> Result<(&str, u16)> {
        let Some((host, port)) = self.address.rsplit_once(':') else {
            return Err(Error::Config(format!(
                "address {:?} is missing a port",
                self.address
            )));
        };
        let host = if let Some(inner) = host.strip_prefix('[') {
            inner.strip_suffix(']').ok_or_else(|| {
                Error::Config(format!(
                    "address {:?} has an unclosed bracket in its host",
                    self.address
                ))
            })?
        } else if host.contains(':') {
            return Err(Error::Config(format!(
                "address {:?} needs brackets around its IPv6 host",
                self.address
            )));
        } else {
            host
        };
        if host.is_empty() {
            return Err(Error::Config(format!(
                "address {:?} has an empty host",
                self.address
            )));
        }
        let port = port.parse::<u16>().map_err(|_| {
            Error::Config(format!("address {:?} has an invalid port", self.address))
        })?;
        Ok((host, port))
    }

    /// Trust policy for this relay's TLS chain.
    #[must_use]
    pub fn trust_roots(&self) -> TrustRoots {
        match self.root_pem.as_deref() {
            Some(pem) if !pem.trim().is_empty() => TrustRoots::Pinned(pem.to_string()),
            _ => TrustRoots::System,
        }
    }
}

/// The immutable account table for one invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    /// Account used when neither an override nor a From match applies.
    #[serde(rename = "default")]
    default_account: String,
    /// Named relay accounts.
    accounts: BTreeMap<String, AccountConfig>,
}

impl Registry {
    /// Parses and validates a registry from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for syntax errors, unparseable relay
    /// addresses, or a username without a credential command.
    pub fn from_toml(text: &str) -> Result<Self> {
        let registry: Self =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    /// Loads the registry from a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read or fails
    /// [`Registry::from_toml`] validation.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<()> {
        let mut seen_from: BTreeMap<&str, &str> = BTreeMap::new();
        for (name, account) in &self.accounts {
            account.host_port()?;
            if account.username.is_some() && account.passwordeval.is_empty() {
                return Err(Error::Config(format!(
                    "account {name:?} sets username but no passwordeval command"
                )));
            }
            if let Some(from) = account.from.as_deref() {
                // Selection by From address is first-match with no defined
                // order; a duplicate makes it ambiguous.
                if let Some(other) = seen_from.insert(from, name) {
                    warn!(
                        from,
                        accounts = %format!("{other}, {name}"),
                        "multiple accounts declare the same from address; selection between them is undefined"
                    );
                }
            }
        }
        Ok(())
    }

    /// Name of the configured default account.
    #[must_use]
    pub fn default_account(&self) -> &str {
        &self.default_account
    }

    /// Looks up an account by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAccount`]; the default is never silently
    /// substituted for a bad name.
    pub fn get(&self, name: &str) -> Result<&AccountConfig> {
        self.accounts
            .get(name)
            .ok_or_else(|| Error::UnknownAccount(name.to_string()))
    }

    /// Iterates all accounts in name order.
    pub fn accounts(&self) -> impl Iterator<Item = (&str, &AccountConfig)> {
        self.accounts.iter().map(|(name, cfg)| (name.as_str(), cfg))
    }
}

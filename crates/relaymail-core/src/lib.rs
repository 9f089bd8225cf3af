//! # relaymail-core
//!
//! The domain logic behind the `relaymail` binary: the account registry
//! loaded from TOML, the account selector, the message rewriter that
//! strips blind-copy headers while keeping their recipients in the SMTP
//! envelope, the credential source, and the submission driver that walks
//! one STARTTLS-upgraded SMTP session from greeting to QUIT.
//!
//! The library performs exactly one delivery attempt per call. Queueing,
//! retries, and bounce handling belong to whatever invokes it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod credential;
mod error;
pub mod message;
pub mod select;
pub mod serverinfo;
pub mod submit;

pub use config::{AccountConfig, Registry};
pub use credential::{CommandSecretSource, SecretSource};
pub use error::{Error, Result};
pub use message::Envelope;
pub use select::select_account;
pub use serverinfo::CertificateReport;
pub use submit::submit;

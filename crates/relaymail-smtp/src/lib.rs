//! # relaymail-smtp
//!
//! SMTP submission client used by relaymail to hand a message to an
//! authenticated relay.
//!
//! The client covers exactly the submission subset of RFC 5321: greeting,
//! EHLO capability discovery, a mandatory STARTTLS upgrade (RFC 3207),
//! AUTH PLAIN inside the encrypted channel, the MAIL FROM / RCPT TO
//! envelope, DATA transfer with dot-stuffing, and QUIT.
//!
//! ## Design
//!
//! - [`Client`] is generic over the underlying byte stream so sessions can
//!   be exercised against scripted in-memory streams in tests.
//! - The client survives server rejections: a failed `RCPT TO` returns an
//!   error but leaves the session usable, so the caller can still QUIT and
//!   release the connection.
//! - Trust decisions are explicit. [`TrustRoots`] selects between the
//!   platform trust store and a pinned PEM bundle for the delivery path;
//!   [`Client::starttls_unverified`] exists solely for read-only
//!   certificate inspection and never overlaps with delivery.
//! - Every reply read and the initial connect are bounded by [`Timeouts`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaymail_smtp::{connect, Address, Client, Timeouts, TrustRoots};
//!
//! let stream = connect("smtp.example.com", 587, Timeouts::default().connect).await?;
//! let mut client = Client::from_stream(stream).await?;
//! client.ehlo("localhost").await?;
//! client.starttls("smtp.example.com", &TrustRoots::System).await?;
//! client.auth_plain("user@example.com", "secret").await?;
//! client.mail_from(&Address::new("user@example.com")?).await?;
//! client.rcpt_to(&Address::new("rcpt@example.com")?).await?;
//! client.data(b"Subject: hi\r\n\r\nhello\r\n").await?;
//! client.quit().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
mod tls;
pub mod types;

pub use connection::{Client, ServerInfo, SmtpStream, Timeouts, connect};
pub use error::{Error, Result};
pub use tls::TrustRoots;
pub use types::{Address, Extension, Reply, ReplyCode};

//! Core SMTP types: envelope addresses, server replies, extensions.

mod address;
mod extension;
mod reply;

pub use address::Address;
pub use extension::Extension;
pub use reply::{Reply, ReplyCode};

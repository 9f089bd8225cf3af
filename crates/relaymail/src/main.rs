//! `relaymail` - submit one mail message from stdin through a configured
//! STARTTLS relay account.
//!
//! Drop-in `sendmail` replacement for hosts that must route outgoing
//! mail through an authenticated relay instead of doing MX delivery.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    prelude::*,
};

use relaymail_core::{
    CommandSecretSource, Envelope, Registry, select_account, serverinfo, submit,
};
use relaymail_smtp::Timeouts;

#[derive(Parser)]
#[command(name = "relaymail")]
#[command(about = "Submit mail from stdin through an authenticated STARTTLS relay", long_about = None)]
#[clap(version)]
struct Cli {
    /// Configuration file (default: ~/.config/relaymail/config.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// From address used for account selection.
    #[arg(short = 'f', value_name = "ADDRESS")]
    from: Option<String>,

    /// Account to use, bypassing From-based selection.
    #[arg(short, long)]
    account: Option<String>,

    /// Print the certificate chain of every configured relay and exit.
    #[arg(long)]
    serverinfo: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Sendmail compatibility options (e.g. -oi); accepted and ignored.
    #[arg(short = 'o', hide = true, value_name = "OPTION")]
    sendmail_options: Vec<String>,

    /// Recipient arguments as passed by sendmail-compatible callers.
    /// Envelope recipients come from the message headers, not from here.
    #[arg(value_name = "RECIPIENT", hide = true)]
    recipients: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let registry = Registry::load(&config_path)?;

    if cli.serverinfo {
        return print_server_info(&registry).await;
    }

    if !cli.sendmail_options.is_empty() {
        debug!(options = ?cli.sendmail_options, "ignoring sendmail compatibility options");
    }
    if !cli.recipients.is_empty() {
        warn!(
            recipients = ?cli.recipients,
            "recipient arguments are ignored; the envelope is built from To/Cc/Bcc headers"
        );
    }

    let mut raw = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut raw)
        .await
        .context("cannot read message from stdin")?;
    let envelope = Envelope::rewrite(&raw)?;

    let hint = cli.from.as_deref().unwrap_or(envelope.from.as_str());
    let name = select_account(cli.account.as_deref(), Some(hint), &registry);
    let account = registry.get(&name)?;
    debug!(
        account = name,
        relay = account.address,
        from = envelope.from.as_str(),
        recipients = envelope.recipients.len(),
        "selected account"
    );

    submit(account, &envelope, &CommandSecretSource, Timeouts::default()).await?;
    Ok(())
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    let base = dirs::config_dir().context("cannot determine the user configuration directory")?;
    Ok(base.join("relaymail").join("config.toml"))
}

/// Prints the certificate chain of every configured relay. Failures on
/// one relay are reported and do not stop inspection of the others.
async fn print_server_info(registry: &Registry) -> anyhow::Result<()> {
    for (name, account) in registry.accounts() {
        println!("{name} ({}):", account.address);
        match serverinfo::inspect_account(account, Timeouts::default()).await {
            Ok(reports) => {
                for (i, report) in reports.iter().enumerate() {
                    println!("certificate[{i}]:");
                    println!("{report}");
                }
            }
            Err(e) => warn!(account = name, error = %e, "cannot inspect relay"),
        }
    }
    Ok(())
}

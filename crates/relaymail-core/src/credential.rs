//! Credential retrieval via an external command.
//!
//! Secrets never live in the configuration file; each account names a
//! command (a password manager invocation, typically) whose stdout is
//! the secret. The source is an injected capability so the submission
//! driver can be tested with a stub instead of spawning processes.

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Produces the authentication secret for an account.
pub trait SecretSource {
    /// Resolves `command` (program plus arguments) to a secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] when no secret can be produced.
    fn secret(
        &self,
        command: &[String],
    ) -> impl Future<Output = Result<String>> + Send;
}

/// The production source: runs the configured command and captures its
/// standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandSecretSource;

impl SecretSource for CommandSecretSource {
    async fn secret(&self, command: &[String]) -> Result<String> {
        let [program, args @ ..] = command else {
            return Err(Error::Credential(
                "account sets a username but passwordeval is empty".into(),
            ));
        };
        debug!(program, "running credential command");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Credential(format!("cannot run {program:?}: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Credential(format!(
                "{program:?} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let secret = String::from_utf8(output.stdout).map_err(|_| {
            Error::Credential(format!("{program:?} produced non-UTF-8 output"))
        })?;
        // Password managers print the secret followed by a newline.
        let secret = secret.trim_end_matches(['\r', '\n']).to_string();
        if secret.is_empty() {
            return Err(Error::Credential(format!("{program:?} produced no output")));
        }
        Ok(secret)
    }
}

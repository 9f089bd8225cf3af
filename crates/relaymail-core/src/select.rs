//! Account selection.

use crate::config::Registry;

/// Picks the account name to deliver through.
///
/// Precedence: an explicit override always wins (existence is checked
/// later at registry lookup), then the first account whose `from`
/// address equals the hint, then the configured default. Which account
/// wins when several share a `from` address is undefined; the registry
/// warns about such configurations at load time.
#[must_use]
pub fn select_account(
    override_name: Option<&str>,
    from_hint: Option<&str>,
    registry: &Registry,
) -> String {
    if let Some(name) = override_name {
        return name.to_string();
    }
    if let Some(hint) = from_hint {
        for (name, account) in registry.accounts() {
            if account.from.as_deref() == Some(hint) {
                return name.to_string();
            }
        }
    }
    registry.default_account().to_string()
}

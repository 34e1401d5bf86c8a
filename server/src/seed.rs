//! Startup bootstrap of default accounts.

use std::collections::BTreeSet;

use tracing::info;

use crate::accounts::{Account, AccountError, AccountRole, AccountStore};
use crate::config::Config;

/// Creates the configured admin and user accounts if they do not exist yet.
///
/// The admin gets `{ADMIN, USER}`, the user gets `{USER}`. Accounts are
/// matched by email, so running this more than once never duplicates them.
///
/// # Errors
///
/// Returns [`AccountError::Unavailable`] if the account store is unusable.
pub fn run(accounts: &AccountStore, config: &Config) -> Result<Vec<Account>, AccountError> {
    let mut seeded = Vec::new();

    if let Some(admin) = &config.admin {
        seeded.push(accounts.upsert_account(
            &admin.username,
            &admin.password,
            BTreeSet::from([AccountRole::Admin, AccountRole::User]),
        )?);
    }

    if let Some(user) = &config.user {
        seeded.push(accounts.upsert_account(
            &user.username,
            &user.password,
            BTreeSet::from([AccountRole::User]),
        )?);
    }

    info!(seeded = seeded.len(), total = accounts.len(), "Default accounts ready");
    Ok(seeded)
}

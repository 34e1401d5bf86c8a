//! Accounts and the in-memory account store.
//!
//! Emails are unique. They are normalized (trimmed, lower-cased) before
//! every lookup, so `Admin@Email.com` and `admin@email.com` name the same
//! account. Stored passwords are always encoded with
//! [`crate::password::hash_password`].

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::password::{hash_password, verify_password};

/// Identifier of a stored account.
pub type AccountId = i32;

/// Authorization role held by an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountRole {
    Admin,
    User,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    /// Encoded password; never the raw value.
    pub password: String,
    pub roles: BTreeSet<AccountRole>,
}

impl Account {
    pub fn has_role(&self, role: AccountRole) -> bool {
        self.roles.contains(&role)
    }
}

/// Errors from account store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// Another account already uses this email.
    #[error("account already exists: {0}")]
    DuplicateEmail(String),

    /// Unknown email or wrong password. Deliberately does not say which.
    #[error("bad credentials")]
    BadCredentials,

    /// The store lock was poisoned by a panicking writer.
    #[error("account store unavailable")]
    Unavailable,
}

#[derive(Debug, Default)]
struct Accounts {
    by_id: HashMap<AccountId, Account>,
    by_email: HashMap<String, AccountId>,
    next_id: AccountId,
}

/// Thread-safe in-memory account store.
#[derive(Debug, Default)]
pub struct AccountStore {
    inner: RwLock<Accounts>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new account, encoding `raw_password`.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::DuplicateEmail`] if the email is taken.
    pub fn save_account(
        &self,
        email: &str,
        raw_password: &str,
        roles: BTreeSet<AccountRole>,
    ) -> Result<Account, AccountError> {
        let email = normalize_email(email);
        let password = hash_password(raw_password);

        let mut accounts = self.inner.write().map_err(|_| AccountError::Unavailable)?;
        if accounts.by_email.contains_key(&email) {
            return Err(AccountError::DuplicateEmail(email));
        }

        let account = accounts.insert(email, password, roles);
        debug!(account_id = account.id, "Account saved");
        Ok(account)
    }

    /// Returns the account for `email`, creating it if absent.
    ///
    /// An existing account is returned unchanged, so calling this repeatedly
    /// with the same email never creates duplicates.
    pub fn upsert_account(
        &self,
        email: &str,
        raw_password: &str,
        roles: BTreeSet<AccountRole>,
    ) -> Result<Account, AccountError> {
        let email = normalize_email(email);

        let mut accounts = self.inner.write().map_err(|_| AccountError::Unavailable)?;
        if let Some(existing) = accounts
            .by_email
            .get(&email)
            .and_then(|id| accounts.by_id.get(id))
        {
            debug!(account_id = existing.id, "Account already present");
            return Ok(existing.clone());
        }

        let account = accounts.insert(email, hash_password(raw_password), roles);
        info!(account_id = account.id, "Account created");
        Ok(account)
    }

    pub fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, AccountError> {
        let accounts = self.inner.read().map_err(|_| AccountError::Unavailable)?;
        Ok(accounts.by_id.get(&id).cloned())
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<Account>, AccountError> {
        let email = normalize_email(email);
        let accounts = self.inner.read().map_err(|_| AccountError::Unavailable)?;
        Ok(accounts
            .by_email
            .get(&email)
            .and_then(|id| accounts.by_id.get(id))
            .cloned())
    }

    /// Checks `email` and `raw_password` against the stored account.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::BadCredentials`] for an unknown email or a
    /// wrong password.
    pub fn authenticate(&self, email: &str, raw_password: &str) -> Result<Account, AccountError> {
        let account = self
            .find_by_email(email)?
            .ok_or(AccountError::BadCredentials)?;

        if !verify_password(raw_password, &account.password) {
            return Err(AccountError::BadCredentials);
        }
        Ok(account)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|a| a.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Accounts {
    fn insert(&mut self, email: String, password: String, roles: BTreeSet<AccountRole>) -> Account {
        self.next_id += 1;
        let account = Account {
            id: self.next_id,
            email: email.clone(),
            password,
            roles,
        };
        self.by_email.insert(email, account.id);
        self.by_id.insert(account.id, account.clone());
        account
    }
}

/// Canonical form of an email used as the uniqueness key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

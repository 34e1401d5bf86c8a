//! Bearer token store for authenticated accounts.
//!
//! Tokens are issued by `POST /api/auth/token` after a successful password
//! check and presented as `Authorization: Bearer <token>` afterwards. Each
//! token maps to an account id and expires after a fixed TTL.
//!
//! # Token Format
//!
//! 32 bytes of random data, base64-url encoded without padding, giving a
//! 43-character token.
//!
//! # Example
//!
//! ```rust
//! use evently_server::session::{SessionStore, SessionStoreConfig};
//!
//! let store = SessionStore::new(SessionStoreConfig::default());
//! let token = store.create_session(1).expect("store has capacity");
//!
//! let session = store.validate_session(&token).expect("token is fresh");
//! assert_eq!(session.account_id, 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::accounts::AccountId;

/// Default token lifetime (1 hour).
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Longest token lifetime the store will issue (one year).
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Maximum number of live tokens.
const DEFAULT_MAX_CAPACITY: usize = 10_000;

/// Size of the random token in bytes.
const TOKEN_BYTES: usize = 32;

/// Length of a base64-url encoded token.
const TOKEN_LENGTH: usize = 43;

/// Errors that can occur during session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The store has reached maximum capacity.
    #[error("session store at maximum capacity ({max_capacity} sessions)")]
    AtCapacity {
        /// The maximum number of sessions allowed.
        max_capacity: usize,
    },

    /// The token's expiry cannot be represented on this platform's clock.
    #[error("session expiry overflows the clock")]
    ExpiryOverflow,
}

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Maximum number of concurrent sessions.
    pub max_capacity: usize,

    /// Lifetime of newly issued tokens.
    pub ttl: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl SessionStoreConfig {
    pub fn new(max_capacity: usize, ttl: Duration) -> Self {
        Self { max_capacity, ttl }
    }
}

/// An issued token's owner and expiry.
#[derive(Debug, Clone)]
pub struct Session {
    pub account_id: AccountId,
    pub expires_at: Instant,
}

impl Session {
    fn new(account_id: AccountId, ttl: Duration) -> Result<Self, SessionError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(SessionError::ExpiryOverflow)?;
        Ok(Self {
            account_id,
            expires_at,
        })
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Returns the remaining time until expiration, or zero if expired.
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Thread-safe in-memory session store.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    config: SessionStoreConfig,
}

impl SessionStore {
    /// Creates an empty store. A TTL above [`MAX_TTL`] is lowered to it.
    pub fn new(mut config: SessionStoreConfig) -> Self {
        if config.ttl > MAX_TTL {
            warn!(
                requested_secs = config.ttl.as_secs(),
                max_secs = MAX_TTL.as_secs(),
                "Session TTL above maximum, clamping"
            );
            config.ttl = MAX_TTL;
        }
        debug!(
            max_capacity = config.max_capacity,
            ttl_secs = config.ttl.as_secs(),
            "Creating new session store"
        );
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Issues a token for `account_id`.
    ///
    /// Expired sessions are swept first when the store is full.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AtCapacity`] if the store is full of live
    /// sessions.
    pub fn create_session(&self, account_id: AccountId) -> Result<String, SessionError> {
        let session = Session::new(account_id, self.config.ttl)?;
        let token = generate_session_token();

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if sessions.len() >= self.config.max_capacity {
            sessions.retain(|_, session| !session.is_expired());
        }
        if sessions.len() >= self.config.max_capacity {
            warn!(
                max_capacity = self.config.max_capacity,
                "Session store at capacity, rejecting new session"
            );
            return Err(SessionError::AtCapacity {
                max_capacity: self.config.max_capacity,
            });
        }

        trace!(
            account_id = account_id,
            ttl_secs = self.config.ttl.as_secs(),
            "Creating new session"
        );
        sessions.insert(token.clone(), session);

        Ok(token)
    }

    /// Returns the session for `token` if it exists and has not expired.
    ///
    /// An expired session is removed on access.
    pub fn validate_session(&self, token: &str) -> Option<Session> {
        if token.len() != TOKEN_LENGTH {
            trace!(token_len = token.len(), "Invalid token length");
            return None;
        }

        {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            match sessions.get(token) {
                Some(session) if !session.is_expired() => {
                    trace!(
                        account_id = session.account_id,
                        remaining_secs = session.remaining_ttl().as_secs(),
                        "Session validated"
                    );
                    return Some(session.clone());
                }
                Some(_) => {}
                None => {
                    trace!("Session token not found");
                    return None;
                }
            }
        }

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
        trace!("Removed expired session during validation");
        None
    }

    /// Revokes `token`, returning the session it named.
    pub fn remove_session(&self, token: &str) -> Option<Session> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
        if let Some(ref session) = removed {
            trace!(account_id = session.account_id, "Session removed");
        }
        removed
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lifetime given to new tokens.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Removes all expired sessions and returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let initial_len = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        let removed = initial_len - sessions.len();

        if removed > 0 {
            debug!(
                removed_count = removed,
                remaining_count = sessions.len(),
                "Cleaned up expired sessions"
            );
        }
        removed
    }

    /// Spawns a task that sweeps expired sessions every `interval`.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.cleanup_expired();
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session_count", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Generates a cryptographically secure session token.
fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

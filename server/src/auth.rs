//! Request authentication and capability checks.
//!
//! Clients obtain a bearer token from `POST /api/auth/token` and send it as
//! `Authorization: Bearer <token>`. Every handler that cares about the
//! caller takes an [`AuthContext`], which resolves the header into an
//! optional [`Principal`]:
//!
//! - no `Authorization` header: anonymous request, no principal
//! - a well-formed header naming a live token: the token's account
//! - anything else: the request is rejected with 401
//!
//! Handlers never inspect roles or managers directly; they ask the context
//! through [`AuthContext::can_create_events`] and [`AuthContext::can_manage`].
//! With `EVENTLY_UNSAFE_NO_AUTH` set, both predicates always succeed.

use std::collections::BTreeSet;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::accounts::{AccountId, AccountRole, AccountStore};
use crate::error::ApiError;
use crate::routes::AppState;
use crate::session::SessionStore;
use crate::types::Event;

/// Authentication scheme accepted in the `Authorization` header.
const BEARER: &str = "Bearer";

/// Errors that can occur while authenticating a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Username or password did not match a stored account.
    #[error("bad credentials")]
    InvalidCredentials,

    /// The bearer token is unknown or has expired.
    #[error("invalid or expired token")]
    InvalidToken,

    /// The `Authorization` header is not `Bearer <token>`.
    #[error("malformed Authorization header")]
    MalformedHeader,

    /// The operation needs an authenticated caller.
    #[error("authentication required")]
    AuthenticationRequired,
}

impl AuthError {
    /// Machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "bad_credentials",
            Self::InvalidToken => "invalid_token",
            Self::MalformedHeader => "malformed_header",
            Self::AuthenticationRequired => "authentication_required",
        }
    }
}

/// The authenticated account behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account_id: AccountId,
    pub email: String,
    pub roles: BTreeSet<AccountRole>,
}

impl Principal {
    pub fn has_role(&self, role: AccountRole) -> bool {
        self.roles.contains(&role)
    }
}

/// Per-request authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    principal: Option<Principal>,
    unsafe_no_auth: bool,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            unsafe_no_auth: false,
        }
    }

    /// Marks this context as running with authentication disabled.
    pub fn with_unsafe_no_auth(mut self, unsafe_no_auth: bool) -> Self {
        self.unsafe_no_auth = unsafe_no_auth;
        self
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.principal.as_ref().map(|p| p.account_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// Returns `true` if the caller may create events.
    pub fn can_create_events(&self) -> bool {
        self.unsafe_no_auth
            || self.principal.as_ref().is_some_and(|p| {
                p.has_role(AccountRole::User) || p.has_role(AccountRole::Admin)
            })
    }

    /// Returns `true` if the caller may modify `event`.
    ///
    /// Only the event's manager may; anonymous callers never may.
    pub fn can_manage(&self, event: &Event) -> bool {
        self.unsafe_no_auth
            || self
                .account_id()
                .is_some_and(|account_id| event.is_managed_by(account_id))
    }

    /// Resolves the `Authorization` header against the token and account
    /// stores.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedHeader`] for a header that is not
    /// `Bearer <token>`, and [`AuthError::InvalidToken`] for an unknown or
    /// expired token or a token whose account no longer exists.
    pub fn resolve(
        headers: &HeaderMap,
        sessions: &SessionStore,
        accounts: &AccountStore,
    ) -> Result<Self, AuthError> {
        let Some(token) = bearer_token(headers)? else {
            trace!("No Authorization header, anonymous request");
            return Ok(Self::anonymous());
        };

        let session = sessions.validate_session(token).ok_or_else(|| {
            debug!("Rejected unknown or expired bearer token");
            AuthError::InvalidToken
        })?;

        let account = accounts
            .find_by_id(session.account_id)
            .map_err(|_| AuthError::InvalidToken)?
            .ok_or_else(|| {
                debug!(account_id = session.account_id, "Token names a missing account");
                AuthError::InvalidToken
            })?;

        trace!(account_id = account.id, "Request authenticated");
        Ok(Self::authenticated(Principal {
            account_id: account.id,
            email: account.email,
            roles: account.roles,
        }))
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
///
/// Returns `Ok(None)` when the header is absent. The scheme is matched
/// case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case(BEARER) || token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(Some(token))
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let context = Self::resolve(&parts.headers, &state.sessions, &state.accounts)?;
        Ok(context.with_unsafe_no_auth(state.config.unsafe_no_auth))
    }
}

//! Server configuration module.
//!
//! Parses configuration from environment variables for the Evently server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `EVENTLY_ADMIN_USERNAME` | Yes* | - | Email of the seeded admin account |
//! | `EVENTLY_ADMIN_PASSWORD` | Yes* | - | Password of the seeded admin account |
//! | `EVENTLY_USER_USERNAME` | No | - | Email of the seeded user account |
//! | `EVENTLY_USER_PASSWORD` | No | - | Password of the seeded user account |
//! | `EVENTLY_BASE_URL` | No | "" | Prefix for hypermedia link hrefs |
//! | `EVENTLY_SESSION_TTL_SECS` | No | 3600 | Bearer token lifetime, at most one year |
//! | `EVENTLY_STRICT_INPUT` | No | false | Reject unknown event fields |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `EVENTLY_UNSAFE_NO_AUTH` | No | false | Disable all authentication (dev only) |
//!
//! *Not required if `EVENTLY_UNSAFE_NO_AUTH=true`

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::session::{DEFAULT_TTL_SECS, MAX_TTL};

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Login credentials for an account created at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedAccount {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SeedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAccount")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// When true, disables all authentication (development only).
    pub unsafe_no_auth: bool,

    /// Account seeded with the ADMIN and USER roles.
    pub admin: Option<SeedAccount>,

    /// Account seeded with the USER role.
    pub user: Option<SeedAccount>,

    /// Prefix prepended to every link href, without a trailing slash.
    pub base_url: String,

    /// Lifetime of issued bearer tokens.
    pub session_ttl: Duration,

    /// When true, event input containing unknown or server-managed fields
    /// is rejected instead of ignored.
    pub strict_input: bool,
}

impl Default for Config {
    /// Development defaults: no seeded accounts and authentication enforced.
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            unsafe_no_auth: false,
            admin: None,
            user: None,
            base_url: String::new(),
            session_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            strict_input: false,
        }
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The admin credentials are missing (when `EVENTLY_UNSAFE_NO_AUTH` is not true)
    /// - Only one half of a username/password pair is set
    /// - Environment variables have invalid format
    /// - Port number is not a valid u16
    ///
    /// # Example
    ///
    /// ```no_run
    /// use evently_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let unsafe_no_auth = parse_bool_env("EVENTLY_UNSAFE_NO_AUTH");
        let port = parse_port()?;
        let admin = parse_seed_account("EVENTLY_ADMIN_USERNAME", "EVENTLY_ADMIN_PASSWORD")?;
        let user = parse_seed_account("EVENTLY_USER_USERNAME", "EVENTLY_USER_PASSWORD")?;
        let base_url = parse_base_url()?;
        let session_ttl = parse_session_ttl()?;
        let strict_input = parse_bool_env("EVENTLY_STRICT_INPUT");

        let config = Self {
            port,
            unsafe_no_auth,
            admin,
            user,
            base_url,
            session_ttl,
            strict_input,
        };

        config.validate()?;

        if config.unsafe_no_auth {
            warn!(
                "EVENTLY_UNSAFE_NO_AUTH is enabled - authentication and ownership checks \
                 are disabled. Do not use in production!"
            );
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Ensures that either `unsafe_no_auth` is true, or the admin account is
    /// configured so that someone can log in and manage events.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl.is_zero() {
            return Err(ConfigError::ValidationError(
                "EVENTLY_SESSION_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.session_ttl > MAX_TTL {
            return Err(ConfigError::ValidationError(format!(
                "EVENTLY_SESSION_TTL_SECS must be at most {}",
                MAX_TTL.as_secs()
            )));
        }

        if self.unsafe_no_auth {
            return Ok(());
        }

        if self.admin.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "EVENTLY_ADMIN_USERNAME".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a boolean environment variable.
///
/// Returns `true` if the variable is set to "true" (case-insensitive),
/// `false` otherwise.
fn parse_bool_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Read an optional, non-empty environment variable.
fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse a username/password pair.
///
/// Both unset means no account; exactly one set is an error.
fn parse_seed_account(
    username_var: &str,
    password_var: &str,
) -> Result<Option<SeedAccount>, ConfigError> {
    match (non_empty_env(username_var), non_empty_env(password_var)) {
        (Some(username), Some(password)) => {
            if !username.contains('@') {
                return Err(ConfigError::InvalidFormat {
                    var: username_var.to_string(),
                    message: format!("expected an email address, got '{username}'"),
                });
            }
            Ok(Some(SeedAccount { username, password }))
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::MissingEnvVar(password_var.to_string())),
        (None, Some(_)) => Err(ConfigError::MissingEnvVar(username_var.to_string())),
    }
}

/// Parse the EVENTLY_BASE_URL environment variable.
///
/// Trailing slashes are stripped so hrefs can be joined with `/api/...`.
fn parse_base_url() -> Result<String, ConfigError> {
    let Some(raw) = non_empty_env("EVENTLY_BASE_URL") else {
        return Ok(String::new());
    };

    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidFormat {
            var: "EVENTLY_BASE_URL".to_string(),
            message: format!("expected an http(s) URL, got '{raw}'"),
        });
    }
    Ok(trimmed.to_string())
}

/// Parse the EVENTLY_SESSION_TTL_SECS environment variable.
fn parse_session_ttl() -> Result<Duration, ConfigError> {
    let Some(raw) = non_empty_env("EVENTLY_SESSION_TTL_SECS") else {
        return Ok(Duration::from_secs(DEFAULT_TTL_SECS));
    };

    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidFormat {
            var: "EVENTLY_SESSION_TTL_SECS".to_string(),
            message: e.to_string(),
        })
}

//! Evently Server - Main entry point.
//!
//! This binary starts the Evently API server with:
//! - Structured JSON logging for production
//! - Seeding of the configured default accounts
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - Background cleanup of expired bearer tokens
//!
//! # Configuration
//!
//! See [`evently_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Development mode (no auth)
//! EVENTLY_UNSAFE_NO_AUTH=true cargo run --bin evently-server
//!
//! # Production mode
//! EVENTLY_ADMIN_USERNAME="admin@example.com" \
//! EVENTLY_ADMIN_PASSWORD="change-me" \
//! PORT=8080 \
//! cargo run --release --bin evently-server
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use evently_server::config::Config;
use evently_server::routes::{create_router, AppState};
use evently_server::seed;

/// Sweep interval for expired bearer tokens (60 seconds).
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    init_logging();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables (when auth enabled):");
            eprintln!("  EVENTLY_ADMIN_USERNAME   - Email of the seeded admin account");
            eprintln!("  EVENTLY_ADMIN_PASSWORD   - Password of the seeded admin account");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  EVENTLY_USER_USERNAME    - Email of the seeded user account");
            eprintln!("  EVENTLY_USER_PASSWORD    - Password of the seeded user account");
            eprintln!("  EVENTLY_BASE_URL         - Prefix for link hrefs (default: none)");
            eprintln!("  EVENTLY_SESSION_TTL_SECS - Bearer token lifetime (default: 3600)");
            eprintln!("  EVENTLY_STRICT_INPUT     - Reject unknown event fields ('true')");
            eprintln!("  PORT                     - HTTP server port (default: 8080)");
            eprintln!("  RUST_LOG                 - Log level filter (default: info)");
            eprintln!("  EVENTLY_UNSAFE_NO_AUTH   - Disable auth (dev only, set to 'true')");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "Server error");
            ExitCode::from(1)
        }
    }
}

/// Seeds accounts, binds the listener and serves until a shutdown signal.
async fn run(config: Config) -> anyhow::Result<()> {
    let auth_mode = if config.unsafe_no_auth {
        "disabled (UNSAFE)"
    } else {
        "enabled"
    };
    info!(
        port = config.port,
        auth_mode = auth_mode,
        strict_input = config.strict_input,
        session_ttl_secs = config.session_ttl.as_secs(),
        "Evently server starting"
    );

    // Create application state and seed default accounts
    let state = AppState::new(config.clone());
    seed::run(&state.accounts, &config).context("failed to seed default accounts")?;

    // Spawn expired token cleanup task
    let cleanup_handle = state.sessions.spawn_cleanup_task(SESSION_CLEANUP_INTERVAL);
    info!(
        interval_secs = SESSION_CLEANUP_INTERVAL.as_secs(),
        "Session cleanup task started"
    );

    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    info!(port = config.port, address = %bind_addr, "Server listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    info!("Server shutting down gracefully");
    cleanup_handle.abort();
    info!("Session cleanup task stopped");

    result
}

/// Initialize structured logging with tracing.
///
/// Configures JSON-formatted output with:
/// - Environment-based log level filtering via RUST_LOG
/// - Default log level of `info`
/// - Target and level information
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for:
/// - SIGTERM (container orchestrator shutdown)
/// - SIGINT (Ctrl+C)
///
/// If a handler cannot be installed, that signal source is ignored and the
/// other one still triggers shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

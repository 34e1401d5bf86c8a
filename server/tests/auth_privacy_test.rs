//! Privacy tests for credentials in logs.
//!
//! No bearer token and no raw password may appear in log output, even at
//! TRACE level.
//!
//! # Test Approach
//!
//! 1. Use a custom tracing subscriber Layer to capture all log messages
//! 2. Exercise the session store, account store and HTTP auth paths
//! 3. Verify that sensitive data does NOT appear in captured logs

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use evently_server::accounts::{AccountRole, AccountStore};
use evently_server::config::{Config, SeedAccount};
use evently_server::routes::{create_router, AppState};
use evently_server::seed;
use evently_server::session::{SessionStore, SessionStoreConfig};

// ============================================================================
// Log Capture Infrastructure
// ============================================================================

/// A buffer for capturing log output during tests.
#[derive(Clone, Default)]
struct LogCapture {
    logs: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    fn get_logs(&self) -> String {
        self.logs.lock().unwrap().join("\n")
    }
}

/// A tracing Layer that captures log events for inspection.
struct CaptureLayer {
    capture: LogCapture,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = StringVisitor::default();
        event.record(&mut visitor);

        let message = format!(
            "[{}] {}: {}",
            event.metadata().level(),
            event.metadata().target(),
            visitor.parts.join(" ")
        );

        self.capture.logs.lock().unwrap().push(message);
    }
}

/// A visitor that collects all event fields into a string.
#[derive(Default)]
struct StringVisitor {
    parts: Vec<String>,
}

impl tracing::field::Visit for StringVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.parts.push(format!("{}={:?}", field.name(), value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.parts.push(format!("{}={}", field.name(), value));
    }
}

/// Runs a test closure with log capture at TRACE level.
fn with_log_capture<F>(test_fn: F) -> String
where
    F: FnOnce(),
{
    let capture = LogCapture::default();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::TRACE));

    tracing::subscriber::with_default(subscriber, test_fn);

    capture.get_logs()
}

/// Async version of with_log_capture for async tests.
async fn with_log_capture_async<F, Fut>(test_fn: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let capture = LogCapture::default();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::TRACE));

    let _guard = tracing::subscriber::set_default(subscriber);
    test_fn().await;

    capture.get_logs()
}

fn assert_not_in_logs(logs: &str, value: &str, value_name: &str, context: &str) {
    assert!(
        !logs.contains(value),
        "{value_name} found in logs during {context}!\nValue: {value}\nLogs:\n{logs}"
    );
}

// ============================================================================
// Test Cases
// ============================================================================

#[test]
fn session_lifecycle_does_not_log_token() {
    let mut token = String::new();
    let logs = with_log_capture(|| {
        let store = SessionStore::new(SessionStoreConfig::default());
        token = store.create_session(1).unwrap();
        store.validate_session(&token);
        store.remove_session(&token);
        store.validate_session(&token);
    });

    assert!(!logs.is_empty(), "expected some trace output");
    assert_not_in_logs(&logs, &token, "Session token", "session lifecycle");
}

#[test]
fn account_operations_do_not_log_password() {
    let password = "correct-horse-battery-staple";
    let logs = with_log_capture(|| {
        let store = AccountStore::new();
        store
            .save_account("keesun@email.com", password, BTreeSet::from([AccountRole::User]))
            .unwrap();
        store.authenticate("keesun@email.com", password).unwrap();
        let _ = store.authenticate("keesun@email.com", "wrong-password");
    });

    assert_not_in_logs(&logs, password, "Password", "account operations");
    assert_not_in_logs(&logs, "wrong-password", "Password", "failed login");
}

#[test]
fn seeding_does_not_log_password() {
    let logs = with_log_capture(|| {
        let config = Config {
            admin: Some(SeedAccount {
                username: "admin@email.com".to_string(),
                password: "seeded-admin-secret".to_string(),
            }),
            ..Config::default()
        };
        seed::run(&AccountStore::new(), &config).unwrap();
        tracing::debug!(config = ?config, "Loaded configuration");
    });

    assert!(logs.contains("admin@email.com"));
    assert_not_in_logs(&logs, "seeded-admin-secret", "Password", "seeding");
}

#[tokio::test]
async fn token_endpoint_does_not_log_credentials_or_token() {
    let password = "http-login-secret";
    let mut token = String::new();

    let logs = with_log_capture_async(|| async {
        let state = AppState::new(Config::default());
        state
            .accounts
            .save_account("keesun@email.com", password, BTreeSet::from([AccountRole::User]))
            .unwrap();
        let app = create_router(state);

        let body = format!(r#"{{"username":"keesun@email.com","password":"{password}"}}"#);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/token")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        token = json["accessToken"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/events")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    })
    .await;

    assert_not_in_logs(&logs, password, "Password", "token issuance");
    assert_not_in_logs(&logs, &token, "Bearer token", "authenticated request");
}

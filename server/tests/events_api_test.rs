//! Integration tests for the event API with authentication enabled.
//!
//! Requests are driven through the router with `tower::ServiceExt::oneshot`.
//! Callers authenticate the same way real clients do: register or seed an
//! account, exchange credentials at `/api/auth/token`, then send the token
//! as `Authorization: Bearer <token>`.

use std::collections::BTreeSet;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use evently_server::accounts::AccountRole;
use evently_server::config::Config;
use evently_server::routes::{create_router, AppState};

// ============================================================================
// Test Helpers
// ============================================================================

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        let state = AppState::new(config);
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    /// Registers an account and returns a bearer token for it.
    async fn login_as(&self, email: &str) -> String {
        self.state
            .accounts
            .save_account(email, "pass", BTreeSet::from([AccountRole::User]))
            .unwrap();

        let (status, json) = self
            .send(
                Method::POST,
                "/api/auth/token",
                None,
                Some(json!({ "username": email, "password": "pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        json["accessToken"].as_str().unwrap().to_string()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, json) = self.send_raw(method, uri, token, body).await;
        (status, json)
    }

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    /// Creates an event as `token`'s account and returns its id.
    async fn create(&self, token: &str, body: Value) -> i64 {
        let (status, json) = self
            .send(Method::POST, "/api/events", Some(token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["id"].as_i64().unwrap()
    }
}

/// The well-formed event used throughout.
fn sample_event() -> Value {
    json!({
        "name": "Spring",
        "description": "REST API Development with Spring",
        "beginEnrollmentDateTime": "2020-11-10T14:21:00",
        "closeEnrollmentDateTime": "2021-11-11T11:11:00",
        "beginEventDateTime": "2020-11-11T11:11:00",
        "endEventDateTime": "2020-12-11T11:11:00",
        "basePrice": 100,
        "maxPrice": 200,
        "limitOfEnrollment": 100,
        "location": "D2 Startup Factory"
    })
}

fn sample_event_named(name: &str) -> Value {
    let mut event = sample_event();
    event["name"] = json!(name);
    event
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn create_event_returns_created_draft() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let (status, headers, json) = app
        .send_raw(Method::POST, "/api/events", Some(&token), Some(sample_event()))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers[header::CONTENT_TYPE], "application/hal+json");
    let id = json["id"].as_i64().unwrap();
    assert_eq!(headers[header::LOCATION], format!("/api/events/{id}").as_str());

    assert_eq!(json["eventStatus"], "DRAFT");
    assert_eq!(json["free"], false);
    assert_eq!(json["offline"], true);
    assert_eq!(json["manager"]["id"], 1);
    assert!(json["manager"].get("email").is_none());

    let links = &json["_links"];
    assert_eq!(links["self"]["href"], format!("/api/events/{id}"));
    assert_eq!(links["query-events"]["href"], "/api/events");
    assert_eq!(links["update-event"]["href"], format!("/api/events/{id}"));
    assert_eq!(
        links["profile"]["href"],
        "/docs/index.html#resources-events-create"
    );
}

#[tokio::test]
async fn create_event_accepts_minute_precision_date_times() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let event = json!({
        "name": "Spring",
        "description": "REST API Development with Spring",
        "beginEnrollmentDateTime": "2020-11-10T14:21",
        "closeEnrollmentDateTime": "2021-11-11T11:11",
        "beginEventDateTime": "2020-11-11T11:11",
        "endEventDateTime": "2020-12-11T11:11",
        "basePrice": 100,
        "maxPrice": 200,
        "limitOfEnrollment": 100,
        "location": "D2"
    });
    let (status, json) = app
        .send(Method::POST, "/api/events", Some(&token), Some(event))
        .await;

    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["beginEnrollmentDateTime"], "2020-11-10T14:21:00");
    assert_eq!(json["free"], false);
    assert_eq!(json["offline"], true);
    assert_eq!(json["eventStatus"], "DRAFT");
}

#[tokio::test]
async fn create_event_ignores_server_managed_fields() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let mut body = sample_event();
    body["id"] = json!(100);
    body["free"] = json!(true);
    body["offline"] = json!(false);
    body["eventStatus"] = json!("PUBLISHED");

    let (status, json) = app
        .send(Method::POST, "/api/events", Some(&token), Some(body))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(json["id"], 100);
    assert_eq!(json["free"], false);
    assert_eq!(json["offline"], true);
    assert_eq!(json["eventStatus"], "DRAFT");
}

#[tokio::test]
async fn create_event_rejects_server_managed_fields_in_strict_mode() {
    let app = TestApp::with_config(Config {
        strict_input: true,
        ..Config::default()
    });
    let token = app.login_as("keesun@email.com").await;

    let mut body = sample_event();
    body["id"] = json!(100);

    let (status, json) = app
        .send(Method::POST, "/api/events", Some(&token), Some(body))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["content"][0]["field"], "id");
    assert_eq!(json["content"][0]["code"], "unknownField");
    assert_eq!(json["content"][0]["rejectedValue"], 100);
}

#[tokio::test]
async fn create_event_requires_authentication() {
    let app = TestApp::new();

    let (status, json) = app
        .send(Method::POST, "/api/events", None, Some(sample_event()))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "authentication_required");
}

#[tokio::test]
async fn create_event_rejects_unknown_token() {
    let app = TestApp::new();

    let (status, json) = app
        .send(
            Method::POST,
            "/api/events",
            Some(&"x".repeat(43)),
            Some(sample_event()),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "invalid_token");
}

#[tokio::test]
async fn create_event_rejects_empty_input() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let (status, json) = app
        .send(Method::POST, "/api/events", Some(&token), Some(json!({})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let content = json["content"].as_array().unwrap();
    assert_eq!(content.len(), 6);
    assert!(content.iter().all(|e| e["objectName"] == "eventDto"));
    assert_eq!(json["_links"]["index"]["href"], "/api");
    assert_eq!(app.state.events.count().unwrap(), 0);
}

#[tokio::test]
async fn create_event_rejects_wrong_prices() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let mut body = sample_event();
    body["basePrice"] = json!(10_000);
    body["maxPrice"] = json!(200);

    let (status, json) = app
        .send(Method::POST, "/api/events", Some(&token), Some(body))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = &json["content"][0];
    assert_eq!(error["code"], "wrongPrices");
    assert_eq!(error["objectName"], "eventDto");
    assert_eq!(error["defaultMessage"], "Values for prices are wrong");
    assert!(error.get("field").is_none());
}

#[tokio::test]
async fn create_event_rejects_wrong_dates() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let mut body = sample_event();
    body["closeEnrollmentDateTime"] = json!("2020-11-09T00:00:00");

    let (status, json) = app
        .send(Method::POST, "/api/events", Some(&token), Some(body))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = &json["content"][0];
    assert_eq!(error["field"], "closeEnrollmentDateTime");
    assert_eq!(error["code"], "wrongDateTime");
    assert_eq!(error["rejectedValue"], "2020-11-09T00:00:00");
}

#[tokio::test]
async fn create_event_rejects_malformed_json() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/events")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["content"][0]["code"], "invalidFormat");
}

#[tokio::test]
async fn free_and_offline_flags_follow_input() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let mut body = sample_event();
    body["basePrice"] = json!(0);
    body["maxPrice"] = json!(0);
    body["location"] = json!("   ");

    let (status, json) = app
        .send(Method::POST, "/api/events", Some(&token), Some(body))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["free"], true);
    assert_eq!(json["offline"], false);
}

// ============================================================================
// List
// ============================================================================

#[tokio::test]
async fn list_events_pages_and_links() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;
    for i in 0..30 {
        app.create(&token, sample_event_named(&format!("event {i}")))
            .await;
    }

    let (status, json) = app
        .send(Method::GET, "/api/events?page=1&size=10&sort=name,DESC", None, None)
        .await;

    assert_eq!(status, StatusCode::OK);
    let items = json["_embedded"]["eventList"].as_array().unwrap();
    assert_eq!(items.len(), 10);
    assert!(items[0]["_links"]["self"]["href"]
        .as_str()
        .unwrap()
        .starts_with("/api/events/"));

    assert_eq!(
        json["page"],
        json!({ "size": 10, "totalElements": 30, "totalPages": 3, "number": 1 })
    );
    let links = &json["_links"];
    for rel in ["first", "prev", "self", "next", "last", "profile"] {
        assert!(links.get(rel).is_some(), "missing {rel}");
    }
    assert_eq!(
        links["next"]["href"],
        "/api/events?page=2&size=10&sort=name,desc"
    );
    assert!(links.get("create-event").is_none());
}

#[tokio::test]
async fn list_events_offers_create_link_to_authenticated_callers() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let (status, json) = app
        .send(Method::GET, "/api/events", Some(&token), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["_links"]["create-event"]["href"], "/api/events");
    assert!(json.get("_embedded").is_none());
    assert_eq!(json["page"]["totalElements"], 0);
}

#[tokio::test]
async fn list_events_rejects_unknown_sort_property() {
    let app = TestApp::new();

    let (status, json) = app
        .send(Method::GET, "/api/events?sort=password", None, None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["content"][0]["field"], "sort");
    assert_eq!(json["content"][0]["rejectedValue"], "password");
}

#[tokio::test]
async fn list_events_rejects_non_numeric_paging_as_hal_errors() {
    let app = TestApp::new();

    for (uri, field, value) in [
        ("/api/events?page=abc", "page", "abc"),
        ("/api/events?size=x", "size", "x"),
    ] {
        let (status, headers, json) = app.send_raw(Method::GET, uri, None, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(headers[header::CONTENT_TYPE], "application/hal+json");
        assert_eq!(json["content"][0]["objectName"], "pageable");
        assert_eq!(json["content"][0]["field"], field);
        assert_eq!(json["content"][0]["code"], "typeMismatch");
        assert_eq!(json["content"][0]["rejectedValue"], value);
        assert_eq!(json["_links"]["index"]["href"], "/api");
    }
}

// ============================================================================
// Get
// ============================================================================

#[tokio::test]
async fn get_event_returns_event_with_links() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;
    let id = app.create(&token, sample_event()).await;

    let (status, json) = app
        .send(Method::GET, &format!("/api/events/{id}"), None, None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Spring");
    assert_eq!(json["_links"]["self"]["href"], format!("/api/events/{id}"));
    assert_eq!(
        json["_links"]["profile"]["href"],
        "/docs/index.html#resources-events-get"
    );
    assert!(json["_links"].get("update-event").is_none());
}

#[tokio::test]
async fn get_event_offers_update_link_only_to_manager() {
    let app = TestApp::new();
    let manager = app.login_as("manager@email.com").await;
    let stranger = app.login_as("stranger@email.com").await;
    let id = app.create(&manager, sample_event()).await;
    let uri = format!("/api/events/{id}");

    let (_, json) = app.send(Method::GET, &uri, Some(&manager), None).await;
    assert_eq!(json["_links"]["update-event"]["href"], uri);

    let (_, json) = app.send(Method::GET, &uri, Some(&stranger), None).await;
    assert!(json["_links"].get("update-event").is_none());
}

#[tokio::test]
async fn get_unknown_event_is_404_with_empty_body() {
    let app = TestApp::new();

    let (status, json) = app.send(Method::GET, "/api/events/11883", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json.is_null());
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn update_event_by_manager() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;
    let id = app.create(&token, sample_event()).await;

    let mut body = sample_event_named("Updated Event");
    body["basePrice"] = json!(0);
    body["maxPrice"] = json!(0);
    body["eventStatus"] = json!("PUBLISHED");

    let (status, json) = app
        .send(Method::PUT, &format!("/api/events/{id}"), Some(&token), Some(body))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id);
    assert_eq!(json["name"], "Updated Event");
    assert_eq!(json["free"], true);
    assert_eq!(json["eventStatus"], "DRAFT");
    assert_eq!(json["manager"]["id"], 1);
    assert_eq!(
        json["_links"]["profile"]["href"],
        "/docs/index.html#resources-events-update"
    );
    assert!(json["_links"].get("update-event").is_some());

    let (_, stored) = app
        .send(Method::GET, &format!("/api/events/{id}"), None, None)
        .await;
    assert_eq!(stored["name"], "Updated Event");
}

#[tokio::test]
async fn update_event_by_non_manager_is_401_and_leaves_event_unchanged() {
    let app = TestApp::new();
    let manager = app.login_as("manager@email.com").await;
    let stranger = app.login_as("stranger@email.com").await;
    let id = app.create(&manager, sample_event()).await;
    let uri = format!("/api/events/{id}");

    let (status, json) = app
        .send(
            Method::PUT,
            &uri,
            Some(&stranger),
            Some(sample_event_named("Hijacked")),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json.is_null());

    let (status, _) = app
        .send(Method::PUT, &uri, None, Some(sample_event_named("Hijacked")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, stored) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(stored["name"], "Spring");
}

#[tokio::test]
async fn update_unknown_event_is_404_before_validation() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let (status, json) = app
        .send(Method::PUT, "/api/events/123183", Some(&token), Some(json!({})))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json.is_null());
}

#[tokio::test]
async fn update_event_validates_before_checking_ownership() {
    let app = TestApp::new();
    let manager = app.login_as("manager@email.com").await;
    let stranger = app.login_as("stranger@email.com").await;
    let id = app.create(&manager, sample_event()).await;

    let mut body = sample_event();
    body["basePrice"] = json!(20_000);
    body["maxPrice"] = json!(1_000);

    let (status, json) = app
        .send(Method::PUT, &format!("/api/events/{id}"), Some(&stranger), Some(body))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["content"][0]["code"], "wrongPrices");
}

#[tokio::test]
async fn update_event_rejects_empty_input() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;
    let id = app.create(&token, sample_event()).await;

    let (status, _) = app
        .send(Method::PUT, &format!("/api/events/{id}"), Some(&token), Some(json!({})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Accounts and tokens
// ============================================================================

#[tokio::test]
async fn registered_account_can_log_in_and_create_events() {
    let app = TestApp::new();

    let (status, _) = app
        .send(
            Method::POST,
            "/api/accounts",
            None,
            Some(json!({ "email": "new@email.com", "password": "secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = app
        .send(
            Method::POST,
            "/api/auth/token",
            None,
            Some(json!({ "username": "new@email.com", "password": "secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = json["accessToken"].as_str().unwrap();

    let (status, json) = app
        .send(Method::POST, "/api/events", Some(token), Some(sample_event()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["manager"]["id"], 1);
}

#[tokio::test]
async fn malformed_authorization_header_is_rejected() {
    let app = TestApp::new();

    let request = Request::builder()
        .uri("/api/events")
        .header(header::AUTHORIZATION, "Basic a2Vlc3VuOnBhc3M=")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoked_token_no_longer_authenticates() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;

    let (status, _) = app
        .send(Method::DELETE, "/api/auth/token", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = app
        .send(Method::POST, "/api/events", Some(&token), Some(sample_event()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "invalid_token");

    let (status, json) = app
        .send(Method::DELETE, "/api/auth/token", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "invalid_token");
}

#[tokio::test]
async fn revoking_without_token_is_rejected() {
    let app = TestApp::new();

    let (status, json) = app.send(Method::DELETE, "/api/auth/token", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "authentication_required");
}

#[tokio::test]
async fn health_counts_stored_state() {
    let app = TestApp::new();
    let token = app.login_as("keesun@email.com").await;
    app.create(&token, sample_event()).await;

    let (status, json) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["events"], 1);
    assert_eq!(json["accounts"], 1);
    assert_eq!(json["sessions"], 1);
}

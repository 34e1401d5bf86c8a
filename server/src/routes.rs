//! HTTP route handlers for the Evently server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /api` - API root with a link to the event collection
//! - `POST /api/events` - Create an event
//! - `GET /api/events` - Page through events
//! - `GET /api/events/{id}` - Fetch one event
//! - `PUT /api/events/{id}` - Update an event (manager only)
//! - `POST /api/accounts` - Register an account
//! - `GET /api/accounts/{id}` - Fetch an account (self or admin only)
//! - `POST /api/auth/token` - Exchange credentials for a bearer token
//! - `DELETE /api/auth/token` - Revoke the presented bearer token
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration (including auth settings)
//! - Account, event and token stores
//! - A link builder for hypermedia hrefs
//! - Server start time for uptime reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use evently_server::routes::{create_router, AppState};
//! use evently_server::config::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config);
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use validator::Validate;

use crate::accounts::{Account, AccountId, AccountRole, AccountStore};
use crate::auth::{bearer_token, AuthContext, AuthError};
use crate::config::Config;
use crate::error::ApiError;
use crate::hal::{rel, ErrorsResource, Hal, LinkBuilder, Links, PagedResources, Resource};
use crate::paging::{PageParams, PageRequest};
use crate::repository::{EventRepository, InMemoryEventRepository};
use crate::session::{SessionStore, SessionStoreConfig};
use crate::types::{Event, EventDto, EventId};
use crate::validation::{validate_event, Errors, EVENT_OBJECT_NAME};

// ============================================================================
// Constants
// ============================================================================

/// Maximum request body size (1 MB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Code for bodies that are not the expected JSON shape.
const INVALID_FORMAT: &str = "invalidFormat";

/// Code for fields rejected by strict input handling.
const UNKNOWN_FIELD: &str = "unknownField";

/// Object name reported for account registration errors.
const ACCOUNT_OBJECT_NAME: &str = "accountDto";

/// Object name reported for token request errors.
const TOKEN_OBJECT_NAME: &str = "tokenRequest";

/// Object name reported for paging parameter errors.
const PAGEABLE_OBJECT_NAME: &str = "pageable";

/// Profile anchors, one per event operation.
const PROFILE_CREATE: &str = "create";
const PROFILE_LIST: &str = "list";
const PROFILE_GET: &str = "get";
const PROFILE_UPDATE: &str = "update";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Cloned for each request; every store sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Registered accounts.
    pub accounts: Arc<AccountStore>,

    /// Event storage.
    pub events: Arc<dyn EventRepository>,

    /// Issued bearer tokens.
    pub sessions: Arc<SessionStore>,

    /// Builds hrefs for hypermedia links.
    pub links: LinkBuilder,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state with empty in-memory stores.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use evently_server::routes::AppState;
    /// use evently_server::config::Config;
    ///
    /// let config = Config::from_env().expect("failed to load config");
    /// let state = AppState::new(config);
    /// ```
    #[must_use]
    pub fn new(config: Config) -> Self {
        let sessions = SessionStore::new(SessionStoreConfig {
            ttl: config.session_ttl,
            ..SessionStoreConfig::default()
        });
        Self::with_components(
            config,
            AccountStore::new(),
            Arc::new(InMemoryEventRepository::new()),
            sessions,
        )
    }

    /// Creates application state around existing stores.
    ///
    /// Useful for testing or when a different event repository is needed.
    #[must_use]
    pub fn with_components(
        config: Config,
        accounts: AccountStore,
        events: Arc<dyn EventRepository>,
        sessions: SessionStore,
    ) -> Self {
        let links = LinkBuilder::new(config.base_url.clone());
        Self {
            config: Arc::new(config),
            accounts: Arc::new(accounts),
            events,
            sessions: Arc::new(sessions),
            links,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("accounts", &self.accounts.len())
            .field("sessions", &self.sessions)
            .field("links", &self.links)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// # Example
///
/// ```rust,no_run
/// use evently_server::routes::{create_router, AppState};
/// use evently_server::config::Config;
///
/// let config = Config::from_env().expect("failed to load config");
/// let state = AppState::new(config);
/// let router = create_router(state);
/// ```
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([LOCATION]);

    Router::new()
        .route("/api", get(get_index))
        .route("/api/events", get(list_events).post(create_event))
        .route("/api/events/{id}", get(get_event).put(update_event))
        .route("/api/accounts", post(register_account))
        .route("/api/accounts/{id}", get(get_account))
        .route("/api/auth/token", post(issue_token).delete(revoke_token))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Request Body Parsing
// ============================================================================

/// Parses `body` as a JSON object, reporting failures against `object_name`.
fn parse_object(
    body: &[u8],
    object_name: &str,
    links: &LinkBuilder,
) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(invalid_format(object_name, "expected a JSON object", links)),
        Err(err) => {
            debug!(error = %err, "Failed to parse request body");
            Err(invalid_format(object_name, format!("invalid JSON: {err}"), links))
        }
    }
}

/// Deserializes `body` into `T`, reporting failures against `object_name`.
fn parse_body<T: DeserializeOwned>(
    body: &[u8],
    object_name: &str,
    links: &LinkBuilder,
) -> Result<T, ApiError> {
    let map = parse_object(body, object_name, links)?;
    from_map(map, object_name, links)
}

fn from_map<T: DeserializeOwned>(
    map: Map<String, Value>,
    object_name: &str,
    links: &LinkBuilder,
) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(map)).map_err(|err| {
        debug!(error = %err, "Request body has the wrong shape");
        invalid_format(object_name, err.to_string(), links)
    })
}

fn invalid_format(object_name: &str, message: impl Into<String>, links: &LinkBuilder) -> ApiError {
    let mut errors = Errors::new(object_name);
    errors.reject(INVALID_FORMAT, message);
    ApiError::Validation(ErrorsResource::new(errors, links))
}

/// Parses event input.
///
/// Unknown and server-managed members are dropped, or rejected one by one
/// when strict input is enabled.
fn parse_event_dto(state: &AppState, body: &[u8]) -> Result<EventDto, ApiError> {
    let map = parse_object(body, EVENT_OBJECT_NAME, &state.links)?;

    if state.config.strict_input {
        let mut errors = Errors::new(EVENT_OBJECT_NAME);
        for (key, value) in &map {
            if !EventDto::FIELDS.contains(&key.as_str()) {
                errors.reject_value(
                    key.clone(),
                    UNKNOWN_FIELD,
                    format!("{key} is not an accepted field"),
                    Some(value.clone()),
                );
            }
        }
        if errors.has_errors() {
            return Err(ApiError::Validation(ErrorsResource::new(errors, &state.links)));
        }
    }

    from_map(map, EVENT_OBJECT_NAME, &state.links)
}

// ============================================================================
// GET /api - Index
// ============================================================================

/// API root.
#[derive(Debug, Serialize)]
pub struct IndexResource {
    #[serde(rename = "_links")]
    pub links: Links,
}

async fn get_index(State(state): State<AppState>) -> Hal<IndexResource> {
    Hal::ok(IndexResource {
        links: Links::new().with(rel::EVENTS, state.links.events()),
    })
}

// ============================================================================
// Events
// ============================================================================

fn event_resource(event: Event, links: Links) -> Resource<Event> {
    Resource::new(event, links)
}

/// POST /api/events - Create an event.
///
/// # Responses
///
/// - `201 Created` - Event stored; `Location` names the new resource
/// - `400 Bad Request` - Validation failed
/// - `401 Unauthorized` - No authenticated caller
async fn create_event(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Bytes,
) -> Result<Hal<Resource<Event>>, ApiError> {
    if !auth.can_create_events() {
        debug!("Anonymous caller tried to create an event");
        return Err(AuthError::AuthenticationRequired.into());
    }

    let dto = parse_event_dto(&state, &body)?;
    let draft = validate_event(dto).map_err(|errors| {
        debug!(error_count = errors.len(), "Event input rejected");
        ApiError::Validation(ErrorsResource::new(errors, &state.links))
    })?;

    let event = state.events.insert(Event::new(draft, auth.account_id()))?;
    info!(
        event_id = event.id,
        manager = ?event.manager,
        "Event created"
    );

    let self_href = state.links.event(event.id);
    let links = Links::new()
        .with(rel::SELF, self_href.clone())
        .with(rel::QUERY_EVENTS, state.links.events())
        .with(rel::UPDATE_EVENT, self_href.clone())
        .with(rel::PROFILE, state.links.profile(PROFILE_CREATE));

    Ok(Hal::created(self_href, event_resource(event, links)))
}

/// GET /api/events - Page through events.
///
/// # Query Parameters
///
/// - `page` - Zero-based page number (default 0)
/// - `size` - Page size (default 20, max 2000)
/// - `sort` - `property[,asc|desc]`
async fn list_events(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
) -> Result<Hal<PagedResources<Resource<Event>>>, ApiError> {
    let request = PageRequest::from_params(&params).map_err(|err| {
        let mut errors = Errors::new(PAGEABLE_OBJECT_NAME);
        errors.reject_value(
            err.param(),
            err.code(),
            err.to_string(),
            params.raw(err.param()).map(|raw| Value::String(raw.to_string())),
        );
        ApiError::Validation(ErrorsResource::new(errors, &state.links))
    })?;

    let page = state.events.find_all(&request)?;
    debug!(
        page = request.page,
        size = request.size,
        total = page.total_elements,
        "Listing events"
    );

    let links = &state.links;
    let page = page.map(|event| {
        let item_links = Links::new().with(rel::SELF, links.event(event.id));
        event_resource(event, item_links)
    });

    let mut resources = PagedResources::from_page(page, links);
    resources.add_link(rel::PROFILE, links.profile(PROFILE_LIST));
    if auth.is_authenticated() {
        resources.add_link(rel::CREATE_EVENT, links.events());
    }

    Ok(Hal::ok(resources))
}

/// GET /api/events/{id} - Fetch one event.
///
/// The `update-event` link is only offered to callers who may manage it.
async fn get_event(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<EventId>,
) -> Result<Hal<Resource<Event>>, ApiError> {
    let event = state.events.find_by_id(id)?.ok_or(ApiError::NotFound)?;

    let self_href = state.links.event(event.id);
    let mut links = Links::new()
        .with(rel::SELF, self_href.clone())
        .with(rel::PROFILE, state.links.profile(PROFILE_GET));
    if auth.can_manage(&event) {
        links.add(rel::UPDATE_EVENT, self_href);
    }

    Ok(Hal::ok(event_resource(event, links)))
}

/// PUT /api/events/{id} - Update an event.
///
/// Checks run in order: existence (404), input (400), ownership (401).
async fn update_event(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<EventId>,
    body: Bytes,
) -> Result<Hal<Resource<Event>>, ApiError> {
    let mut event = state.events.find_by_id(id)?.ok_or(ApiError::NotFound)?;

    let dto = parse_event_dto(&state, &body)?;
    let draft = validate_event(dto).map_err(|errors| {
        debug!(event_id = id, error_count = errors.len(), "Event update rejected");
        ApiError::Validation(ErrorsResource::new(errors, &state.links))
    })?;

    if !auth.can_manage(&event) {
        info!(
            event_id = id,
            account_id = ?auth.account_id(),
            "Update denied to non-manager"
        );
        return Err(ApiError::Unauthorized);
    }

    event.apply(draft);
    let event = state.events.replace(event)?;
    info!(event_id = event.id, "Event updated");

    let self_href = state.links.event(event.id);
    let links = Links::new()
        .with(rel::SELF, self_href.clone())
        .with(rel::UPDATE_EVENT, self_href)
        .with(rel::PROFILE, state.links.profile(PROFILE_UPDATE));

    Ok(Hal::ok(event_resource(event, links)))
}

// ============================================================================
// Accounts
// ============================================================================

/// Registration input.
#[derive(Debug, Deserialize, Validate)]
pub struct AccountDto {
    #[serde(default)]
    #[validate(email(code = "Email", message = "must be a well-formed email address"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 4, code = "Size", message = "size must be at least 4"))]
    pub password: String,
}

/// Public view of an account. Never includes the password.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub email: String,
    pub roles: BTreeSet<AccountRole>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            roles: account.roles,
        }
    }
}

/// POST /api/accounts - Register a USER account.
///
/// # Responses
///
/// - `201 Created` - Account stored
/// - `400 Bad Request` - Malformed email or short password
/// - `409 Conflict` - Email already registered
async fn register_account(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Hal<Resource<AccountResponse>>, ApiError> {
    let dto: AccountDto = parse_body(&body, ACCOUNT_OBJECT_NAME, &state.links)?;
    if let Err(structural) = dto.validate() {
        let mut errors = Errors::new(ACCOUNT_OBJECT_NAME);
        errors.extend_from(&structural);
        // Never echo the raw password back.
        let entries = errors
            .into_entries()
            .into_iter()
            .map(|mut entry| {
                if entry.field.as_deref() == Some("password") {
                    entry.rejected_value = Some(Value::Null);
                }
                entry
            })
            .collect();
        return Err(ApiError::Validation(ErrorsResource {
            content: entries,
            links: Links::new().with(rel::INDEX, state.links.index()),
        }));
    }

    let account =
        state
            .accounts
            .save_account(&dto.email, &dto.password, BTreeSet::from([AccountRole::User]))?;
    info!(account_id = account.id, "Account registered");

    let self_href = state.links.account(account.id);
    let links = Links::new().with(rel::SELF, self_href.clone());
    Ok(Hal::created(
        self_href,
        Resource::new(AccountResponse::from(account), links),
    ))
}

/// GET /api/accounts/{id} - Fetch an account.
///
/// Only the account itself or an ADMIN may read it.
async fn get_account(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<AccountId>,
) -> Result<Hal<Resource<AccountResponse>>, ApiError> {
    let allowed = auth
        .principal()
        .is_some_and(|p| p.account_id == id || p.has_role(AccountRole::Admin));
    if !allowed {
        return Err(ApiError::Unauthorized);
    }

    let account = state.accounts.find_by_id(id)?.ok_or(ApiError::NotFound)?;
    let links = Links::new().with(rel::SELF, state.links.account(account.id));
    Ok(Hal::ok(Resource::new(AccountResponse::from(account), links)))
}

// ============================================================================
// POST /api/auth/token - Token Issuance
// ============================================================================

/// Credentials exchanged for a bearer token.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

/// Issued bearer token.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

/// POST /api/auth/token - Exchange credentials for a bearer token.
///
/// # Responses
///
/// - `200 OK` - `{accessToken, tokenType, expiresIn}`
/// - `400 Bad Request` - Body is not `{username, password}`
/// - `401 Unauthorized` - Bad credentials
async fn issue_token(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TokenResponse>, ApiError> {
    let request: TokenRequest = parse_body(&body, TOKEN_OBJECT_NAME, &state.links)?;

    let account = state
        .accounts
        .authenticate(&request.username, &request.password)
        .inspect_err(|_| debug!("Token request with bad credentials"))?;
    let access_token = state.sessions.create_session(account.id)?;
    info!(account_id = account.id, "Bearer token issued");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.sessions.ttl().as_secs(),
    }))
}

/// DELETE /api/auth/token - Revoke the presented bearer token.
///
/// # Responses
///
/// - `204 No Content` - Token revoked
/// - `401 Unauthorized` - No token, or the token is unknown or expired
async fn revoke_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?.ok_or(AuthError::AuthenticationRequired)?;
    let session = state
        .sessions
        .remove_session(token)
        .ok_or(AuthError::InvalidToken)?;
    info!(account_id = session.account_id, "Bearer token revoked");

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of stored events.
    pub events: usize,

    /// Number of registered accounts.
    pub accounts: usize,

    /// Number of live bearer tokens.
    pub sessions: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// No authentication required.
async fn get_health(State(state): State<AppState>) -> Response {
    let events = match state.events.count() {
        Ok(count) => count,
        Err(err) => return ApiError::from(err).into_response(),
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        events,
        accounts: state.accounts.len(),
        sessions: state.sessions.len(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
    .into_response()
}

// ============================================================================
// Tests
// ============================================================================

//! HAL hypermedia representations.
//!
//! Responses carry a `_links` object mapping relation names to `{"href"}`
//! objects, and collections put their items under `_embedded`. Relations are
//! serialized in the order they were added.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::accounts::AccountId;
use crate::error::ApiError;
use crate::paging::{Page, PageMetadata};
use crate::types::EventId;
use crate::validation::{ErrorEntry, Errors};

/// Media type of every hypermedia response.
pub const HAL_JSON: &str = "application/hal+json";

/// Relation names used across the API.
pub mod rel {
    pub const SELF: &str = "self";
    pub const PROFILE: &str = "profile";
    pub const INDEX: &str = "index";
    pub const EVENTS: &str = "events";
    pub const QUERY_EVENTS: &str = "query-events";
    pub const CREATE_EVENT: &str = "create-event";
    pub const UPDATE_EVENT: &str = "update-event";
    pub const FIRST: &str = "first";
    pub const PREV: &str = "prev";
    pub const NEXT: &str = "next";
    pub const LAST: &str = "last";
}

/// A single hypermedia link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
}

/// Relation name to link map that keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links(Vec<(&'static str, Link)>);

impl Links {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a relation, replacing an existing one with the same name.
    pub fn add(&mut self, rel: &'static str, href: impl Into<String>) -> &mut Self {
        let link = Link { href: href.into() };
        match self.0.iter_mut().find(|(name, _)| *name == rel) {
            Some(existing) => existing.1 = link,
            None => self.0.push((rel, link)),
        }
        self
    }

    pub fn with(mut self, rel: &'static str, href: impl Into<String>) -> Self {
        self.add(rel, href);
        self
    }

    pub fn get(&self, rel: &str) -> Option<&Link> {
        self.0.iter().find(|(name, _)| *name == rel).map(|(_, l)| l)
    }

    pub fn contains(&self, rel: &str) -> bool {
        self.get(rel).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Links {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (rel, link) in &self.0 {
            map.serialize_entry(rel, link)?;
        }
        map.end()
    }
}

/// Builds hrefs for API resources, prefixed with the configured base URL.
#[derive(Debug, Clone, Default)]
pub struct LinkBuilder {
    base_url: String,
}

impl LinkBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn href(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn index(&self) -> String {
        self.href("/api")
    }

    pub fn events(&self) -> String {
        self.href("/api/events")
    }

    pub fn event(&self, id: EventId) -> String {
        self.href(&format!("/api/events/{id}"))
    }

    pub fn account(&self, id: AccountId) -> String {
        self.href(&format!("/api/accounts/{id}"))
    }

    /// Collection href with a query string, e.g. `/api/events?page=1&size=20`.
    pub fn events_query(&self, query: &str) -> String {
        format!("{}?{query}", self.events())
    }

    /// Documentation anchor for an event operation (`create`, `list`, ...).
    pub fn profile(&self, operation: &str) -> String {
        self.href(&format!("/docs/index.html#resources-events-{operation}"))
    }
}

/// A resource with its fields inlined next to `_links`.
#[derive(Debug, Clone, Serialize)]
pub struct Resource<T> {
    #[serde(flatten)]
    pub content: T,
    #[serde(rename = "_links")]
    pub links: Links,
}

impl<T> Resource<T> {
    pub fn new(content: T, links: Links) -> Self {
        Self { content, links }
    }
}

/// Embedded items of a paged collection.
#[derive(Debug, Clone, Serialize)]
pub struct Embedded<T> {
    #[serde(rename = "eventList")]
    pub event_list: Vec<T>,
}

/// A page of resources plus navigation links and page metadata.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResources<T> {
    #[serde(rename = "_embedded", skip_serializing_if = "Option::is_none")]
    pub embedded: Option<Embedded<T>>,
    #[serde(rename = "_links")]
    pub links: Links,
    pub page: PageMetadata,
}

impl<T> PagedResources<T> {
    /// Wraps `page`, adding `first`/`prev`/`self`/`next`/`last` links.
    ///
    /// `first` and `last` appear only when the collection spans more than
    /// one page; `prev` and `next` only when such a page exists.
    pub fn from_page(page: Page<T>, links: &LinkBuilder) -> Self {
        let metadata = page.metadata();
        let request = page.request;
        let total_pages = page.total_pages();

        let mut nav = Links::new();
        if total_pages > 1 {
            nav.add(rel::FIRST, links.events_query(&request.with_page(0).query_string()));
        }
        if page.has_previous() {
            nav.add(
                rel::PREV,
                links.events_query(&request.with_page(request.page - 1).query_string()),
            );
        }
        nav.add(rel::SELF, links.events_query(&request.query_string()));
        if page.has_next() {
            nav.add(
                rel::NEXT,
                links.events_query(&request.with_page(request.page + 1).query_string()),
            );
        }
        if total_pages > 1 {
            nav.add(
                rel::LAST,
                links.events_query(&request.with_page(total_pages - 1).query_string()),
            );
        }

        let embedded = (!page.content.is_empty()).then(|| Embedded {
            event_list: page.content,
        });

        Self {
            embedded,
            links: nav,
            page: metadata,
        }
    }

    pub fn add_link(&mut self, rel: &'static str, href: impl Into<String>) -> &mut Self {
        self.links.add(rel, href);
        self
    }
}

/// Validation failures plus a link back to the API root.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorsResource {
    pub content: Vec<ErrorEntry>,
    #[serde(rename = "_links")]
    pub links: Links,
}

impl ErrorsResource {
    pub fn new(errors: Errors, links: &LinkBuilder) -> Self {
        Self {
            content: errors.into_entries(),
            links: Links::new().with(rel::INDEX, links.index()),
        }
    }
}

/// Response with a HAL body and `Content-Type: application/hal+json`.
#[derive(Debug)]
pub struct Hal<T> {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: T,
}

impl<T> Hal<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            location: None,
            body,
        }
    }

    pub fn created(location: impl Into<String>, body: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            location: Some(location.into()),
            body,
        }
    }

    pub fn with_status(status: StatusCode, body: T) -> Self {
        Self {
            status,
            location: None,
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for Hal<T> {
    fn into_response(self) -> Response {
        let body = match serde_json::to_vec(&self.body) {
            Ok(body) => body,
            Err(e) => {
                return ApiError::internal(format!("failed to serialize response body: {e}"))
                    .into_response();
            }
        };

        let mut response = (self.status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HAL_JSON));
        if let Some(location) = self.location {
            match HeaderValue::try_from(location) {
                Ok(value) => {
                    headers.insert(header::LOCATION, value);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping invalid Location header"),
            }
        }
        response
    }
}

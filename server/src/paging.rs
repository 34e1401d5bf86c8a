//! Page requests and pages for collection endpoints.
//!
//! Query parameters follow the common `page`/`size`/`sort` convention:
//! `page` is zero-based, `size` falls back to [`DEFAULT_PAGE_SIZE`] when
//! absent or below one and is capped at [`MAX_PAGE_SIZE`], and `sort` is
//! `property[,asc|desc]`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Event;

/// Page size used when the client does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page size a client may request.
pub const MAX_PAGE_SIZE: usize = 2000;

/// Errors from parsing paging query parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PagingError {
    #[error("unknown sort property: {0}")]
    UnknownProperty(String),

    #[error("unknown sort direction: {0}")]
    UnknownDirection(String),

    #[error("{param} must be an integer, got '{value}'")]
    NotANumber { param: &'static str, value: String },
}

impl PagingError {
    /// Query parameter the error is about.
    pub fn param(&self) -> &'static str {
        match self {
            Self::UnknownProperty(_) | Self::UnknownDirection(_) => "sort",
            Self::NotANumber { param, .. } => *param,
        }
    }

    /// Error code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProperty(_) | Self::UnknownDirection(_) => "invalidSort",
            Self::NotANumber { .. } => "typeMismatch",
        }
    }
}

/// Raw paging query parameters.
///
/// Values stay strings so that malformed numbers are reported by
/// [`PageRequest::from_params`] rather than by the query extractor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub size: Option<String>,
    pub sort: Option<String>,
}

impl PageParams {
    /// Raw value of the query parameter named `param`.
    pub fn raw(&self, param: &str) -> Option<&str> {
        match param {
            "page" => self.page.as_deref(),
            "size" => self.size.as_deref(),
            "sort" => self.sort.as_deref(),
            _ => None,
        }
    }
}

/// Parses an optional integer parameter; blank counts as absent.
fn parse_number(param: &'static str, raw: Option<&str>) -> Result<Option<i64>, PagingError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| PagingError::NotANumber {
            param,
            value: raw.to_string(),
        })
}

/// Event properties a collection can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortProperty {
    Id,
    Name,
    BeginEnrollmentDateTime,
    CloseEnrollmentDateTime,
    BeginEventDateTime,
    EndEventDateTime,
    BasePrice,
    MaxPrice,
    LimitOfEnrollment,
}

impl SortProperty {
    fn parse(name: &str) -> Result<Self, PagingError> {
        Ok(match name {
            "id" => Self::Id,
            "name" => Self::Name,
            "beginEnrollmentDateTime" => Self::BeginEnrollmentDateTime,
            "closeEnrollmentDateTime" => Self::CloseEnrollmentDateTime,
            "beginEventDateTime" => Self::BeginEventDateTime,
            "endEventDateTime" => Self::EndEventDateTime,
            "basePrice" => Self::BasePrice,
            "maxPrice" => Self::MaxPrice,
            "limitOfEnrollment" => Self::LimitOfEnrollment,
            other => return Err(PagingError::UnknownProperty(other.to_string())),
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::BeginEnrollmentDateTime => "beginEnrollmentDateTime",
            Self::CloseEnrollmentDateTime => "closeEnrollmentDateTime",
            Self::BeginEventDateTime => "beginEventDateTime",
            Self::EndEventDateTime => "endEventDateTime",
            Self::BasePrice => "basePrice",
            Self::MaxPrice => "maxPrice",
            Self::LimitOfEnrollment => "limitOfEnrollment",
        }
    }

    fn compare(self, a: &Event, b: &Event) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::Name => a.name.cmp(&b.name),
            Self::BeginEnrollmentDateTime => a
                .begin_enrollment_date_time
                .cmp(&b.begin_enrollment_date_time),
            Self::CloseEnrollmentDateTime => a
                .close_enrollment_date_time
                .cmp(&b.close_enrollment_date_time),
            Self::BeginEventDateTime => a.begin_event_date_time.cmp(&b.begin_event_date_time),
            Self::EndEventDateTime => a.end_event_date_time.cmp(&b.end_event_date_time),
            Self::BasePrice => a.base_price.cmp(&b.base_price),
            Self::MaxPrice => a.max_price.cmp(&b.max_price),
            Self::LimitOfEnrollment => a.limit_of_enrollment.cmp(&b.limit_of_enrollment),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// A single-property sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub property: SortProperty,
    pub direction: Direction,
}

impl Sort {
    /// Parses `property[,asc|desc]` (direction is case-insensitive).
    pub fn parse(raw: &str) -> Result<Self, PagingError> {
        let mut parts = raw.splitn(2, ',');
        let property = SortProperty::parse(parts.next().unwrap_or_default().trim())?;
        let direction = match parts.next().map(str::trim) {
            None | Some("") => Direction::Asc,
            Some(d) if d.eq_ignore_ascii_case("asc") => Direction::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => Direction::Desc,
            Some(other) => return Err(PagingError::UnknownDirection(other.to_string())),
        };
        Ok(Self {
            property,
            direction,
        })
    }

    /// Orders two events; ties fall back to ascending id.
    pub fn compare(&self, a: &Event, b: &Event) -> Ordering {
        let ordering = self.property.compare(a, b);
        let ordering = match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        write!(f, "{},{direction}", self.property.as_str())
    }
}

/// A validated request for one page of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
    pub sort: Option<Sort>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: None,
        }
    }
}

impl PageRequest {
    /// Normalizes raw query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PagingError`] for a non-integer `page` or `size`, or an
    /// unparseable `sort` value. Out-of-range page and size values are
    /// clamped instead.
    pub fn from_params(params: &PageParams) -> Result<Self, PagingError> {
        let page = parse_number("page", params.page.as_deref())?
            .and_then(|p| usize::try_from(p).ok())
            .unwrap_or(0);
        let size = match parse_number("size", params.size.as_deref())?
            .and_then(|s| usize::try_from(s).ok())
        {
            Some(0) | None => DEFAULT_PAGE_SIZE,
            Some(s) => s.min(MAX_PAGE_SIZE),
        };
        let sort = params
            .sort
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Sort::parse)
            .transpose()?;

        Ok(Self { page, size, sort })
    }

    /// Index of the first element on this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// Same size and sort, different page number.
    pub fn with_page(&self, page: usize) -> Self {
        Self { page, ..*self }
    }

    /// Query string for this request, e.g. `page=1&size=20&sort=name,desc`.
    pub fn query_string(&self) -> String {
        let mut query = format!("page={}&size={}", self.page, self.size);
        if let Some(sort) = self.sort {
            query.push_str(&format!("&sort={sort}"));
        }
        query
    }
}

/// One page of a collection plus the totals needed for navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub request: PageRequest,
    pub total_elements: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total_elements.div_ceil(self.request.size)
    }

    pub fn has_previous(&self) -> bool {
        self.request.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.request.page + 1 < self.total_pages()
    }

    pub fn metadata(&self) -> PageMetadata {
        PageMetadata {
            size: self.request.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages(),
            number: self.request.page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            request: self.request,
            total_elements: self.total_elements,
        }
    }
}

/// The `page` member of a paged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
    pub number: usize,
}

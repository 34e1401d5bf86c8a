//! Event persistence.
//!
//! [`EventRepository`] is the seam between handlers and storage. The
//! bundled [`InMemoryEventRepository`] keeps rows in a map behind a single
//! `RwLock`; every write takes the write lock once, so a stored event is
//! either fully visible to later reads or not stored at all.

use std::collections::BTreeMap;
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

use crate::paging::{Page, PageRequest};
use crate::types::{Event, EventId};

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors from event storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The event to replace does not exist.
    #[error("event {0} not found")]
    NotFound(EventId),

    /// Storage cannot serve requests.
    #[error("event storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage for events.
pub trait EventRepository: Send + Sync {
    /// Stores a new event and returns it with its assigned id.
    ///
    /// Any id already on `event` is ignored.
    fn insert(&self, event: Event) -> RepositoryResult<Event>;

    /// Overwrites the stored event with the same id.
    fn replace(&self, event: Event) -> RepositoryResult<Event>;

    fn find_by_id(&self, id: EventId) -> RepositoryResult<Option<Event>>;

    /// Returns one page of events, ordered by the request's sort or by id.
    fn find_all(&self, request: &PageRequest) -> RepositoryResult<Page<Event>>;

    fn count(&self) -> RepositoryResult<usize>;
}

#[derive(Debug, Default)]
struct Rows {
    events: BTreeMap<EventId, Event>,
    last_id: EventId,
}

/// Event storage kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    rows: RwLock<Rows>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".to_string())
}

impl EventRepository for InMemoryEventRepository {
    fn insert(&self, mut event: Event) -> RepositoryResult<Event> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.last_id += 1;
        event.id = rows.last_id;
        rows.events.insert(event.id, event.clone());
        debug!(event_id = event.id, "Event inserted");
        Ok(event)
    }

    fn replace(&self, event: Event) -> RepositoryResult<Event> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        match rows.events.get_mut(&event.id) {
            Some(stored) => {
                *stored = event.clone();
                debug!(event_id = event.id, "Event replaced");
                Ok(event)
            }
            None => Err(RepositoryError::NotFound(event.id)),
        }
    }

    fn find_by_id(&self, id: EventId) -> RepositoryResult<Option<Event>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.events.get(&id).cloned())
    }

    fn find_all(&self, request: &PageRequest) -> RepositoryResult<Page<Event>> {
        let rows = self.rows.read().map_err(poisoned)?;
        let total_elements = rows.events.len();

        let content = match request.sort {
            // BTreeMap iteration is already in id order.
            None => rows
                .events
                .values()
                .skip(request.offset())
                .take(request.size)
                .cloned()
                .collect(),
            Some(sort) => {
                let mut all: Vec<&Event> = rows.events.values().collect();
                all.sort_by(|a, b| sort.compare(a, b));
                all.into_iter()
                    .skip(request.offset())
                    .take(request.size)
                    .cloned()
                    .collect()
            }
        };

        Ok(Page {
            content,
            request: *request,
            total_elements,
        })
    }

    fn count(&self) -> RepositoryResult<usize> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.events.len())
    }
}

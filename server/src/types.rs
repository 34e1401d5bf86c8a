//! Event domain types for the Evently server.
//!
//! [`EventDto`] is the shape clients send; [`EventDraft`] is what remains
//! once both validation stages pass; [`Event`] is the stored record. The
//! derived `free` and `offline` flags only ever come from
//! [`Event::update`], never from client input.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};
use validator::Validate;

use crate::accounts::AccountId;

/// Identifier of a stored event.
pub type EventId = i32;

/// Publication state of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    BeganEnrollment,
}

/// A stored event listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub description: String,
    pub begin_enrollment_date_time: NaiveDateTime,
    pub close_enrollment_date_time: NaiveDateTime,
    pub begin_event_date_time: NaiveDateTime,
    pub end_event_date_time: NaiveDateTime,
    pub location: Option<String>,
    pub base_price: i32,
    pub max_price: i32,
    pub limit_of_enrollment: i32,
    pub offline: bool,
    pub free: bool,
    pub event_status: EventStatus,
    /// Serialized as `{"id": ..}` so account details never leak.
    #[serde(serialize_with = "serialize_manager")]
    pub manager: Option<AccountId>,
}

impl Event {
    /// Builds a new DRAFT event from validated input.
    ///
    /// The id is a placeholder until the repository assigns one on insert.
    pub fn new(draft: EventDraft, manager: Option<AccountId>) -> Self {
        let mut event = Self {
            id: 0,
            name: draft.name,
            description: draft.description,
            begin_enrollment_date_time: draft.begin_enrollment_date_time,
            close_enrollment_date_time: draft.close_enrollment_date_time,
            begin_event_date_time: draft.begin_event_date_time,
            end_event_date_time: draft.end_event_date_time,
            location: draft.location,
            base_price: draft.base_price,
            max_price: draft.max_price,
            limit_of_enrollment: draft.limit_of_enrollment,
            offline: false,
            free: false,
            event_status: EventStatus::Draft,
            manager,
        };
        event.update();
        event
    }

    /// Copies client-editable fields from `draft`, keeping id, status and
    /// manager, then recomputes the derived flags.
    pub fn apply(&mut self, draft: EventDraft) {
        self.name = draft.name;
        self.description = draft.description;
        self.begin_enrollment_date_time = draft.begin_enrollment_date_time;
        self.close_enrollment_date_time = draft.close_enrollment_date_time;
        self.begin_event_date_time = draft.begin_event_date_time;
        self.end_event_date_time = draft.end_event_date_time;
        self.location = draft.location;
        self.base_price = draft.base_price;
        self.max_price = draft.max_price;
        self.limit_of_enrollment = draft.limit_of_enrollment;
        self.update();
    }

    /// Recomputes `free` and `offline` from prices and location.
    pub fn update(&mut self) {
        self.free = self.base_price == 0 && self.max_price == 0;
        self.offline = self
            .location
            .as_deref()
            .is_some_and(|location| !location.trim().is_empty());
    }

    /// Returns `true` if `account` is this event's manager.
    pub fn is_managed_by(&self, account: AccountId) -> bool {
        self.manager == Some(account)
    }
}

#[derive(Serialize)]
struct ManagerRef {
    id: AccountId,
}

fn serialize_manager<S>(manager: &Option<AccountId>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    manager.map(|id| ManagerRef { id }).serialize(serializer)
}

/// Incoming event representation for create and update.
///
/// Every field is optional at the serde level so that an empty payload
/// deserializes and is then rejected field by field by the structural
/// constraints. Fields the server owns (`id`, `eventStatus`, `free`,
/// `offline`, `manager`) are not part of this type and are dropped on
/// deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    #[validate(
        required(code = "NotEmpty", message = "must not be empty"),
        length(min = 1, code = "NotEmpty", message = "must not be empty")
    )]
    pub name: Option<String>,

    #[validate(
        required(code = "NotEmpty", message = "must not be empty"),
        length(min = 1, code = "NotEmpty", message = "must not be empty")
    )]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "local_date_time::deserialize")]
    #[validate(required(code = "NotNull", message = "must not be null"))]
    pub begin_enrollment_date_time: Option<NaiveDateTime>,

    #[serde(default, deserialize_with = "local_date_time::deserialize")]
    #[validate(required(code = "NotNull", message = "must not be null"))]
    pub close_enrollment_date_time: Option<NaiveDateTime>,

    #[serde(default, deserialize_with = "local_date_time::deserialize")]
    #[validate(required(code = "NotNull", message = "must not be null"))]
    pub begin_event_date_time: Option<NaiveDateTime>,

    #[serde(default, deserialize_with = "local_date_time::deserialize")]
    #[validate(required(code = "NotNull", message = "must not be null"))]
    pub end_event_date_time: Option<NaiveDateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0, code = "Min", message = "must be greater than or equal to 0"))]
    pub base_price: i32,

    #[serde(default)]
    #[validate(range(min = 0, code = "Min", message = "must be greater than or equal to 0"))]
    pub max_price: i32,

    #[serde(default)]
    #[validate(range(min = 0, code = "Min", message = "must be greater than or equal to 0"))]
    pub limit_of_enrollment: i32,
}

impl EventDto {
    /// JSON member names this type accepts.
    pub const FIELDS: &'static [&'static str] = &[
        "name",
        "description",
        "beginEnrollmentDateTime",
        "closeEnrollmentDateTime",
        "beginEventDateTime",
        "endEventDateTime",
        "location",
        "basePrice",
        "maxPrice",
        "limitOfEnrollment",
    ];
}

/// Event input that passed structural validation: all required fields are
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub name: String,
    pub description: String,
    pub begin_enrollment_date_time: NaiveDateTime,
    pub close_enrollment_date_time: NaiveDateTime,
    pub begin_event_date_time: NaiveDateTime,
    pub end_event_date_time: NaiveDateTime,
    pub location: Option<String>,
    pub base_price: i32,
    pub max_price: i32,
    pub limit_of_enrollment: i32,
}

impl EventDraft {
    /// Unpacks a DTO whose required fields are all set.
    ///
    /// Returns `None` if any required field is missing; callers run the
    /// structural constraints first so this only fails on a logic error.
    pub fn from_dto(dto: EventDto) -> Option<Self> {
        let EventDto {
            name: Some(name),
            description: Some(description),
            begin_enrollment_date_time: Some(begin_enrollment_date_time),
            close_enrollment_date_time: Some(close_enrollment_date_time),
            begin_event_date_time: Some(begin_event_date_time),
            end_event_date_time: Some(end_event_date_time),
            location,
            base_price,
            max_price,
            limit_of_enrollment,
        } = dto
        else {
            return None;
        };

        Some(Self {
            name,
            description,
            begin_enrollment_date_time,
            close_enrollment_date_time,
            begin_event_date_time,
            end_event_date_time,
            location,
            base_price,
            max_price,
            limit_of_enrollment,
        })
    }
}

/// ISO-8601 local date-times, with or without seconds.
mod local_date_time {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer};

    const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        parse(&raw).map(Some).ok_or_else(|| {
            de::Error::custom(format!(
                "invalid date-time '{raw}', expected yyyy-MM-ddTHH:mm[:ss]"
            ))
        })
    }
}

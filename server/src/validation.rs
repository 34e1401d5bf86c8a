//! Request validation for event input.
//!
//! Validation runs in two stages. The structural stage evaluates the
//! declarative field constraints on [`EventDto`]; the business stage
//! ([`EventValidator`]) checks price and date ordering across fields and
//! only runs once the structural stage is clean. Both stages append to an
//! [`Errors`] collector rather than failing on the first problem.
//!
//! # Example
//!
//! ```rust
//! use evently_server::types::EventDto;
//! use evently_server::validation::validate_event;
//!
//! let errors = validate_event(EventDto::default()).unwrap_err();
//! assert!(errors.has_field_errors("name"));
//! ```

use serde::Serialize;
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use crate::types::{EventDraft, EventDto};

/// Object name reported for event input errors.
pub const EVENT_OBJECT_NAME: &str = "eventDto";

/// Code for the global price-ordering error.
pub const WRONG_PRICES: &str = "wrongPrices";

/// Code for field-level date-ordering errors.
pub const WRONG_DATE_TIME: &str = "wrongDateTime";

/// A single validation failure, either global or bound to a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub object_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub code: String,
    pub default_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_value: Option<Value>,
}

/// Ordered collector of validation failures for one input object.
#[derive(Debug, Clone, PartialEq)]
pub struct Errors {
    object_name: String,
    entries: Vec<ErrorEntry>,
}

impl Errors {
    /// Creates an empty collector for the named input object.
    pub fn new(object_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            entries: Vec::new(),
        }
    }

    /// Registers an error that concerns the object as a whole.
    pub fn reject(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.entries.push(ErrorEntry {
            object_name: self.object_name.clone(),
            field: None,
            code: code.into(),
            default_message: message.into(),
            rejected_value: None,
        });
    }

    /// Registers an error bound to `field`.
    ///
    /// A field keeps only its first error.
    pub fn reject_value(
        &mut self,
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        rejected_value: Option<Value>,
    ) {
        let field = field.into();
        if self.has_field_errors(&field) {
            return;
        }
        self.entries.push(ErrorEntry {
            object_name: self.object_name.clone(),
            field: Some(field),
            code: code.into(),
            default_message: message.into(),
            rejected_value: Some(rejected_value.unwrap_or(Value::Null)),
        });
    }

    /// Folds the output of the declarative constraints into this collector.
    ///
    /// Fields are reported in name order so responses are deterministic.
    pub fn extend_from(&mut self, errors: &ValidationErrors) {
        let mut fields: Vec<_> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| (to_camel_case(&field.to_string()), errs))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        for (field, errs) in fields {
            if let Some(err) = errs.first() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("invalid value for {field}"));
                let rejected = err.params.get("value").cloned();
                self.reject_value(field, err.code.to_string(), message, rejected);
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn has_field_errors(&self, field: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.field.as_deref() == Some(field))
    }

    /// Returns `true` if any error carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.entries.iter().any(|entry| entry.code == code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ErrorEntry> {
        self.entries
    }
}

/// Cross-field business rules for event input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventValidator;

impl EventValidator {
    /// Appends price and date-ordering violations for `draft` to `errors`.
    pub fn validate(&self, draft: &EventDraft, errors: &mut Errors) {
        if draft.base_price != 0 && draft.max_price != 0 && draft.max_price < draft.base_price {
            errors.reject(WRONG_PRICES, "Values for prices are wrong");
        }

        let close = draft.close_enrollment_date_time;
        if close < draft.begin_enrollment_date_time
            || close < draft.begin_event_date_time
            || close < draft.end_event_date_time
        {
            errors.reject_value(
                "closeEnrollmentDateTime",
                WRONG_DATE_TIME,
                "closeEnrollmentDateTime is wrong",
                serde_json::to_value(close).ok(),
            );
        }

        let end = draft.end_event_date_time;
        if end < draft.begin_event_date_time {
            errors.reject_value(
                "endEventDateTime",
                WRONG_DATE_TIME,
                "endEventDateTime is wrong",
                serde_json::to_value(end).ok(),
            );
        }
    }
}

/// Runs both validation stages and returns the checked draft.
///
/// # Errors
///
/// Returns the collected [`Errors`] if either stage rejects the input. The
/// business stage is skipped when the structural stage fails.
pub fn validate_event(dto: EventDto) -> Result<EventDraft, Errors> {
    let mut errors = Errors::new(EVENT_OBJECT_NAME);

    if let Err(structural) = dto.validate() {
        errors.extend_from(&structural);
        return Err(errors);
    }

    let Some(draft) = EventDraft::from_dto(dto) else {
        errors.reject("NotNull", "required fields are missing");
        return Err(errors);
    };

    EventValidator.validate(&draft, &mut errors);
    if errors.has_errors() {
        return Err(errors);
    }

    Ok(draft)
}

/// Converts a Rust field identifier to its JSON member name.
fn to_camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

//! The event record and the properties that populate it.

use bitmask_enum::bitmask;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::timestamp::{self, Timestamp};

/// An event extracted from a `VEVENT` block.
///
/// Text values are kept exactly as they appear after the property's `:` (trimmed), so
/// escape sequences such as `\n` or `\,` are still present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(alias = "title", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Timestamp>,
    /// The `RRULE` value, never expanded.
    #[serde(rename = "rrule", skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
}

/// The properties that are copied into an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Uid,
    Summary,
    Description,
    Location,
    DtStart,
    DtEnd,
    RRule,
}

impl Property {
    /// Look up a recognized property name. Names are case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "UID" => Some(Property::Uid),
            "SUMMARY" => Some(Property::Summary),
            "DESCRIPTION" => Some(Property::Description),
            "LOCATION" => Some(Property::Location),
            "DTSTART" => Some(Property::DtStart),
            "DTEND" => Some(Property::DtEnd),
            "RRULE" => Some(Property::RRule),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Property::Uid => "UID",
            Property::Summary => "SUMMARY",
            Property::Description => "DESCRIPTION",
            Property::Location => "LOCATION",
            Property::DtStart => "DTSTART",
            Property::DtEnd => "DTEND",
            Property::RRule => "RRULE",
        }
    }
}

#[bitmask]
pub enum EventField {
    Uid,
    Summary,
    Description,
    Location,
    Start,
    End,
    RecurrenceRule,
}

impl Event {
    /// Write a property value into the matching field.
    ///
    /// Date values that cannot be normalized clear the field.
    pub fn apply(&mut self, property: Property, value: &str) {
        match property {
            Property::Uid => self.uid = Some(value.to_string()),
            Property::Summary => self.summary = Some(value.to_string()),
            Property::Description => self.description = Some(value.to_string()),
            Property::Location => self.location = Some(value.to_string()),
            Property::DtStart => self.start = normalize_date(property, value),
            Property::DtEnd => self.end = normalize_date(property, value),
            Property::RRule => self.recurrence_rule = Some(value.to_string()),
        }
    }

    /// The fields that hold a value.
    pub fn fields(&self) -> EventField {
        [
            (self.uid.is_some(), EventField::Uid),
            (self.summary.is_some(), EventField::Summary),
            (self.description.is_some(), EventField::Description),
            (self.location.is_some(), EventField::Location),
            (self.start.is_some(), EventField::Start),
            (self.end.is_some(), EventField::End),
            (self.recurrence_rule.is_some(), EventField::RecurrenceRule),
        ]
        .into_iter()
        .filter(|(present, _)| *present)
        .fold(EventField::none(), |fields, (_, field)| fields | field)
    }

    /// Whether every field in `required` holds a value.
    pub fn has(&self, required: EventField) -> bool {
        self.fields().contains(required)
    }
}

fn normalize_date(property: Property, value: &str) -> Option<Timestamp> {
    let normalized = timestamp::normalize(value);
    if normalized.is_none() {
        debug!(property = property.name(), value, "unparseable date, leaving it unset");
    }
    normalized
}

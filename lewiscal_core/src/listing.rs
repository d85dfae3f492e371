//! Display helpers for turning extracted events into a readable listing.

use std::{collections::HashSet, sync::OnceLock};

use chrono::TimeZone;
use regex::Regex;

use crate::{
    event::{Event, EventField},
    timestamp::Timestamp,
};

static UNTITLED: &str = "Untitled Event";
static NO_DATE: &str = "N/A";
static DATE_FORMAT: &str = "%B %-d, %Y";

fn boilerplate_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        [
            // video conference invitations
            r"(?i)Join with Google Meet:.*",
            r"(?i)https://meet\.google\.com/\S+",
            r"(?i)More phone numbers:.*",
            r"(?i)Learn more about Meet.*",
            r"(?i)Dial:.*",
            // phone numbers
            r"\+?1?\s*\(?\d{3}\)?[-\s]*\d{3}[-\s]*\d{4}",
            r"(?i)https?://\S+",
            // footers of published calendars
            r"(?i)Information provided by.*",
            r"(?i)Provided under license.*",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("boilerplate regex is valid"))
        .collect()
    })
}

fn escaped_newline_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\\n").expect("escaped newline regex is valid"))
}

fn whitespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex is valid"))
}

/// Strip conference boilerplate, phone numbers, links and footers from a description and
/// flatten it to a single line.
pub fn clean_description(text: &str) -> String {
    let mut cleaned = String::from(text);
    for regex in boilerplate_regexes() {
        cleaned = regex.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = escaped_newline_regex().replace_all(&cleaned, " ");
    let cleaned = whitespace_regex().replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// Resolve the escapes of a text value: `\n` and `\N` become line breaks, any other escaped
/// character stands for itself.
pub fn unescape_text(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => unescaped.push('\n'),
            Some(escaped) => unescaped.push(escaped),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// The summary of an event, or a placeholder if it has none.
pub fn title(event: &Event) -> &str {
    event
        .summary
        .as_deref()
        .filter(|summary| !summary.is_empty())
        .unwrap_or(UNTITLED)
}

/// Format the date of `timestamp` like "January 10, 2025".
pub fn format_date<Tz: TimeZone>(timestamp: Option<&Timestamp>, context: &Tz) -> String {
    match timestamp {
        Some(timestamp) => timestamp.date_in(context).format(DATE_FORMAT).to_string(),
        None => String::from(NO_DATE),
    }
}

/// Build the listing: events without a start are dropped, events sharing a uid are
/// reduced to the first one and the rest is sorted by start.
///
/// Floating start times are read as wall-clock time in `context`.
pub fn prepare<Tz: TimeZone>(events: Vec<Event>, context: &Tz) -> Vec<Event> {
    let mut seen_uids = HashSet::new();
    let mut listing: Vec<_> = events
        .into_iter()
        .filter_map(|event| Some((event.start?.to_utc_in(context), event)))
        .filter(|(_, event)| match &event.uid {
            Some(uid) => seen_uids.insert(uid.clone()),
            None => true,
        })
        .collect();
    listing.sort_by_key(|(start, _)| *start);
    listing.into_iter().map(|(_, event)| event).collect()
}

/// Keep only events that have every field in `required`.
pub fn retain_complete(events: Vec<Event>, required: EventField) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| event.has(required))
        .collect()
}

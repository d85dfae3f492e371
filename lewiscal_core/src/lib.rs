//! This crate parses iCalendar feeds into a flat list of events.
//!
//! Parsing is split in two steps: [`unfold`](unfold::unfold) merges folded lines and
//! [`extract`](extract::extract) walks the resulting lines to build [`Event`]s. Both are
//! pure and never fail; broken input simply yields fewer events.
//!
//! Around the parser, [`feed`] fetches calendars and detects changes, and [`listing`]
//! prepares events for display.

pub use reqwest;

pub mod event;
pub mod extract;
pub mod feed;
pub mod listing;
pub mod timestamp;
pub mod unfold;

pub use event::{Event, EventField};
pub use extract::{ExtractOptions, ReopenPolicy};
pub use timestamp::Timestamp;

/// Parse an iCalendar document into events, in document order.
pub fn parse(text: &str) -> Vec<Event> {
    extract::extract(unfold::unfold(text))
}

/// Parse an iCalendar document with non-default extraction options.
pub fn parse_with(text: &str, options: ExtractOptions) -> Vec<Event> {
    extract::Extractor::new(options).extract(unfold::unfold(text))
}

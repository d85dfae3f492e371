//! Event extraction from unfolded lines.
//!
//! A small state machine walks the logical lines. `BEGIN:VEVENT` opens an event,
//! `END:VEVENT` closes it and every line in between is read as a property line. Nothing
//! in here fails: lines that cannot be used are skipped.

use tracing::debug;

use crate::event::{Event, Property};

static BEGIN_EVENT: &str = "BEGIN:VEVENT";
static END_EVENT: &str = "END:VEVENT";
static BEGIN_PREFIX: &str = "BEGIN:";
static END_PREFIX: &str = "END:";

/// What happens to an open event when another `BEGIN:VEVENT` arrives before its end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReopenPolicy {
    /// Drop the open event.
    #[default]
    Discard,
    /// Emit the open event as if it had been closed.
    Finalize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub reopen: ReopenPolicy,
    /// Ignore properties of components nested in an event, e.g. a `VALARM` description.
    pub skip_subcomponents: bool,
}

/// A logical line split into name, parameters and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyLine<'a> {
    pub name: &'a str,
    /// Raw parameter text without the leading `;`. Empty if there are no parameters.
    pub params: &'a str,
    /// Everything after the value delimiter, trimmed.
    pub value: &'a str,
}

impl<'a> PropertyLine<'a> {
    /// Split a logical line, or return `None` if it has no `:`.
    ///
    /// The name ends at the first `;` or `:`. The value starts after the first `:` that is
    /// not inside a quoted parameter value.
    pub fn parse(line: &'a str) -> Option<Self> {
        let name_end = line.find(|c: char| c == ';' || c == ':')?;
        let (name, rest) = line.split_at(name_end);
        let delimiter = value_delimiter(rest).or_else(|| rest.find(':'))?;
        Some(PropertyLine {
            name,
            params: rest[..delimiter].strip_prefix(';').unwrap_or(""),
            value: rest[delimiter + 1..].trim(),
        })
    }
}

fn value_delimiter(rest: &str) -> Option<usize> {
    let mut quoted = false;
    for (index, c) in rest.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ':' if !quoted => return Some(index),
            _ => {}
        }
    }
    None
}

/// Where the extractor is between two lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParseState {
    #[default]
    Outside,
    Building {
        event: Event,
        /// Components opened inside the event and not yet closed.
        depth: usize,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Extractor { options }
    }

    /// Extract all closed events, in document order.
    pub fn extract<I>(&self, lines: I) -> Vec<Event>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut events = vec![];
        let mut state = ParseState::Outside;
        for line in lines {
            state = self.step(state, line.as_ref(), &mut events);
        }
        if let ParseState::Building { event, .. } = state {
            debug!(uid = ?event.uid, "document ended inside an event, dropping it");
        }
        events
    }

    /// Advance by one logical line. Closed events are pushed onto `events`.
    pub fn step(&self, state: ParseState, line: &str, events: &mut Vec<Event>) -> ParseState {
        if line.is_empty() {
            return state;
        }
        if line == BEGIN_EVENT {
            if let ParseState::Building { event, .. } = state {
                self.reopen(event, events);
            }
            return ParseState::Building {
                event: Event::default(),
                depth: 0,
            };
        }
        if line == END_EVENT {
            match state {
                ParseState::Building { event, .. } => events.push(event),
                ParseState::Outside => debug!("end of event without a matching begin"),
            }
            return ParseState::Outside;
        }
        match state {
            ParseState::Outside => ParseState::Outside,
            ParseState::Building {
                mut event,
                mut depth,
            } => {
                if line.starts_with(BEGIN_PREFIX) {
                    depth += 1;
                } else if line.starts_with(END_PREFIX) {
                    depth = depth.saturating_sub(1);
                } else if depth == 0 || !self.options.skip_subcomponents {
                    apply_line(&mut event, line);
                }
                ParseState::Building { event, depth }
            }
        }
    }

    fn reopen(&self, event: Event, events: &mut Vec<Event>) {
        match self.options.reopen {
            ReopenPolicy::Discard => {
                debug!(uid = ?event.uid, "event reopened before its end, discarding it")
            }
            ReopenPolicy::Finalize => events.push(event),
        }
    }
}

fn apply_line(event: &mut Event, line: &str) {
    let Some(property_line) = PropertyLine::parse(line) else {
        debug!(line = %line, "skipping line without a value delimiter");
        return;
    };
    if let Some(property) = Property::from_name(property_line.name) {
        event.apply(property, property_line.value);
    }
}

/// Extract events with the default options.
pub fn extract<I>(lines: I) -> Vec<Event>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Extractor::default().extract(lines)
}

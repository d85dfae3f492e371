//! Date and time values as they appear in `DTSTART` and `DTEND`.
//!
//! Values are either absolute instants or floating wall-clock times. Floating values stay
//! floating: they are only resolved against a time zone when a consumer asks for it.

use std::{fmt, str::FromStr, sync::OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, ParseError, TimeZone, Utc};
use regex::{Captures, Regex};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Fractional seconds are written only when present.
static ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

static OFFSET_FORMATS: [&str; 2] = ["%Y%m%dT%H%M%S%z", "%Y-%m-%dT%H:%M:%S%z"];

static FLOATING_FORMATS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M",
];

/// A normalized `DTSTART`/`DTEND` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timestamp {
    /// An absolute instant.
    Utc(DateTime<Utc>),
    /// A wall-clock time without a time zone.
    Floating(NaiveDateTime),
}

impl Timestamp {
    /// Resolve this value to an instant, reading floating values as wall-clock time in
    /// `context`.
    ///
    /// A floating value that does not exist in `context` (a daylight saving gap) is read
    /// as UTC.
    pub fn to_utc_in<Tz: TimeZone>(&self, context: &Tz) -> DateTime<Utc> {
        match self {
            Timestamp::Utc(instant) => *instant,
            Timestamp::Floating(wall_clock) => context
                .from_local_datetime(wall_clock)
                .earliest()
                .map(|date_time| date_time.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(wall_clock)),
        }
    }

    /// The calendar date of this value as seen from `context`.
    pub fn date_in<Tz: TimeZone>(&self, context: &Tz) -> NaiveDate {
        match self {
            Timestamp::Utc(instant) => instant.with_timezone(context).date_naive(),
            Timestamp::Floating(wall_clock) => wall_clock.date(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Utc(instant) => write!(f, "{}Z", instant.format(ISO_FORMAT)),
            Timestamp::Floating(wall_clock) => write!(f, "{}", wall_clock.format(ISO_FORMAT)),
        }
    }
}

impl FromStr for Timestamp {
    type Err = ParseError;

    /// Parse the representation written by [`Timestamp`]'s `Display` implementation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_suffix('Z') {
            Some(wall_clock) => NaiveDateTime::parse_from_str(wall_clock, ISO_FORMAT)
                .map(|wall_clock| Timestamp::Utc(Utc.from_utc_datetime(&wall_clock))),
            None => NaiveDateTime::parse_from_str(s, ISO_FORMAT).map(Timestamp::Floating),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}

fn basic_format_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"(?x)
                ^
                (?P<year>[0-9]{4})
                (?P<month>[0-9]{2})
                (?P<day>[0-9]{2})
                (?:
                    T
                    (?P<hour>[0-9]{2})
                    (?P<minute>[0-9]{2})
                    (?P<second>[0-9]{2})
                    (?P<utc>Z)? # absent for floating date-times
                )?
                $
            ",
        )
        .expect("basic format regex is valid")
    })
}

/// Normalize a raw `DTSTART`/`DTEND` value.
///
/// `YYYYMMDD` is a floating date at midnight, `YYYYMMDDTHHMMSSZ` is an instant in UTC and
/// `YYYYMMDDTHHMMSS` is a floating date-time. Other values go through
/// a more general parser. Returns `None` when nothing matches.
///
/// The host's time zone is never consulted.
pub fn normalize(raw_value: &str) -> Option<Timestamp> {
    let value = raw_value.trim();
    match basic_format_regex().captures(value) {
        Some(captures) => from_basic_format(&captures),
        None => parse_fallback(value),
    }
}

fn from_basic_format(captures: &Captures) -> Option<Timestamp> {
    let number = |name: &str| -> Option<u32> {
        captures.name(name).and_then(|found| found.as_str().parse().ok())
    };
    let year: i32 = captures["year"].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, number("month")?, number("day")?)?;
    if captures.name("hour").is_none() {
        return Some(Timestamp::Floating(date.and_time(NaiveTime::from_hms_opt(0, 0, 0)?)));
    }
    let time = NaiveTime::from_hms_opt(number("hour")?, number("minute")?, number("second")?)?;
    let wall_clock = date.and_time(time);
    if captures.name("utc").is_some() {
        Some(Timestamp::Utc(Utc.from_utc_datetime(&wall_clock)))
    } else {
        Some(Timestamp::Floating(wall_clock))
    }
}

fn parse_fallback(value: &str) -> Option<Timestamp> {
    let absolute = DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
        .or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(value, format).ok())
        });
    if let Some(date_time) = absolute {
        return Some(Timestamp::Utc(date_time.with_timezone(&Utc)));
    }
    if let Some(wall_clock) = FLOATING_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Some(Timestamp::Floating(wall_clock));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(Timestamp::Floating)
}

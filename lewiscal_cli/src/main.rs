use std::{fs::write, path::PathBuf, time::Duration};

use anyhow::Result;
use chrono::{Local, TimeZone};
use clap::Parser;
use lewiscal_core::{
    feed::{self, FeedCache, FeedSource},
    listing, Event, ExtractOptions, ReopenPolicy,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
pub struct Arguments {
    /// the calendar, a URL or a file path
    pub source: FeedSource,
    /// write the extracted events as JSON instead of a listing
    #[arg(long)]
    pub json: bool,
    /// write to this file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// check the calendar for changes every this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub watch: Option<u64>,
    /// seconds after which a remote calendar request is abandoned
    #[arg(long, default_value_t = 30)]
    pub fetch_timeout: u64,
    /// emit an unclosed event when the next one begins instead of dropping it
    #[arg(long)]
    pub keep_unclosed: bool,
    /// ignore properties of components nested in events
    #[arg(long)]
    pub skip_subcomponents: bool,
}

impl From<&Arguments> for ExtractOptions {
    fn from(value: &Arguments) -> Self {
        ExtractOptions {
            reopen: if value.keep_unclosed {
                ReopenPolicy::Finalize
            } else {
                ReopenPolicy::Discard
            },
            skip_subcomponents: value.skip_subcomponents,
        }
    }
}

/// Render the listing of `events`, one block per event.
pub fn render_listing<Tz: TimeZone>(events: Vec<Event>, context: &Tz) -> String {
    let mut lines = vec![];
    for event in listing::prepare(events, context) {
        lines.push(listing::title(&event).to_string());
        lines.push(format!(
            "  {}",
            listing::format_date(event.start.as_ref(), context)
        ));
        if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
            lines.push(format!("  {}", listing::unescape_text(location)));
        }
        let description = event
            .description
            .as_deref()
            .map(listing::clean_description)
            .unwrap_or_default();
        if !description.is_empty() {
            lines.push(format!("  {description}"));
        }
        lines.push(String::new());
    }
    lines.into_iter().map(|line| line + "\n").collect()
}

fn render(args: &Arguments, events: &[Event]) -> Result<String> {
    if args.json {
        let mut json = serde_json::to_string_pretty(events)?;
        json.push('\n');
        Ok(json)
    } else {
        Ok(render_listing(events.to_vec(), &Local))
    }
}

fn emit(args: &Arguments, rendered: &str) -> Result<()> {
    match &args.output {
        Some(path) => write(path, rendered)?,
        None => print!("{rendered}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Arguments::parse();
    let client = feed::client(Duration::from_secs(args.fetch_timeout))?;
    let mut cache = FeedCache::new(ExtractOptions::from(&args));
    cache.refresh(&client, &args.source).await?;
    emit(&args, &render(&args, &cache.last_events)?)?;

    let Some(seconds) = args.watch else {
        return Ok(());
    };
    let mut interval = tokio::time::interval(Duration::from_secs(seconds));
    // the first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        match cache.refresh(&client, &args.source).await {
            Ok(true) => {
                info!(source = %args.source, "calendar changed");
                emit(&args, &render(&args, &cache.last_events)?)?;
            }
            Ok(false) => {}
            Err(err) => warn!(source = %args.source, error = ?err, "unable to refresh calendar"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use clap::Parser;
    use lewiscal_core::{parse, ExtractOptions, ReopenPolicy};

    use crate::{render_listing, Arguments};

    static TEAM_CALENDAR: &str = "BEGIN:VCALENDAR\r
BEGIN:VEVENT\r
UID:retro\r
SUMMARY:Retrospective\r
DTSTART:20250314T150000Z\r
LOCATION:Lake House\\, Muskoka\r
DESCRIPTION:What went well?\\nJoin with Google Meet: https://meet.google.com/abc-defg-hij\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:kickoff\r
DTSTART;VALUE=DATE:20250110\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:retro\r
SUMMARY:Retrospective (copy)\r
DTSTART:20250314T150000Z\r
END:VEVENT\r
BEGIN:VEVENT\r
SUMMARY:Someday\r
END:VEVENT\r
END:VCALENDAR\r
";

    #[test]
    fn test_render_listing() {
        assert_eq!(
            render_listing(parse(TEAM_CALENDAR), &Utc),
            "Untitled Event\n  January 10, 2025\n\nRetrospective\n  March 14, 2025\n  Lake House, Muskoka\n  What went well?\n\n"
        );
        assert_eq!(render_listing(Vec::new(), &Utc), "");
    }

    #[test]
    fn test_arguments() {
        let args = Arguments::try_parse_from([
            "lewiscal",
            "https://calendar.lewiscal.test/team.ics",
            "--json",
            "--watch",
            "60",
            "--skip-subcomponents",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.watch, Some(60));
        assert_eq!(args.fetch_timeout, 30);
        assert_eq!(
            ExtractOptions::from(&args),
            ExtractOptions {
                reopen: ReopenPolicy::Discard,
                skip_subcomponents: true,
            }
        );
        assert!(Arguments::try_parse_from(["lewiscal", "team.ics", "--watch", "0"]).is_err());
        assert!(Arguments::try_parse_from(["lewiscal"]).is_err());
    }
}

//! `freebusy` CLI -- busy time from iCalendar files, CalDAV URL joins and
//! REPORT request bodies.
//!
//! ## Usage
//!
//! ```sh
//! # Busy intervals of a calendar file within a window
//! freebusy compute -i work.ics --start 2018-07-30T10:00:00Z --end 2018-07-31T22:00:00Z
//!
//! # Floating bounds resolved in a zone, JSON output
//! freebusy compute -i work.ics --start 2018-07-30T10:00:00 --timezone Europe/Paris --format json
//!
//! # Resolve a URL against a calendar home
//! freebusy join http://localhost:5232/alice/ work/
//!
//! # calendar-query body for events in a window
//! freebusy query --start 2007-07-13T17:00:00Z --end 2007-07-15T17:00:00Z
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use std::io::{self, Read};

use anyhow::{Context, Result};
use caldav_core::filter::{format_utc, with_declaration};
use caldav_core::{CalendarQuery, FreeBusyQueryRequest, ResourceUrl, TimeRange};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use freebusy_engine::{
    compute_free_busy_with, parse_calendar, EngineConfig, FreeBusyQuery, FreeBusyResult, When,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "freebusy",
    version,
    about = "Free-busy computation and CalDAV helpers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute busy intervals from iCalendar data
    Compute {
        /// Input .ics file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Window start: RFC 3339 instant or floating YYYY-MM-DDTHH:MM:SS
        #[arg(long)]
        start: String,
        /// Window end (open-ended if omitted)
        #[arg(long)]
        end: Option<String>,
        /// Zone for floating times (overrides the config file)
        #[arg(long)]
        timezone: Option<String>,
        /// JSON engine configuration file
        #[arg(long)]
        config: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Also list the free slots
        #[arg(long)]
        free: bool,
    },
    /// Resolve a URL against a base URL
    Join {
        base: String,
        other: String,
        /// Print the canonical form
        #[arg(long)]
        canonical: bool,
    },
    /// Print a calendar-query or free-busy-query REPORT body, with XML declaration
    Query {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Component to search
        #[arg(long, default_value = "VEVENT")]
        component: String,
        /// Search by UID instead of by date
        #[arg(long, conflicts_with_all = ["start", "end", "free_busy"])]
        uid: Option<String>,
        /// Ask the server to expand recurrences
        #[arg(long)]
        expand: bool,
        /// Build a free-busy-query instead of a calendar-query
        #[arg(long)]
        free_busy: bool,
        /// Zone for floating bounds
        #[arg(long)]
        timezone: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compute {
            input,
            start,
            end,
            timezone,
            config,
            format,
            free,
        } => {
            let config = load_config(config.as_deref(), timezone.as_deref())?;
            let ics = read_input(input.as_deref())?;
            let components = parse_calendar(&ics).context("Failed to parse iCalendar input")?;
            debug!(components = components.len(), "read calendar");

            let mut query = FreeBusyQuery::new(parse_when(&start)?);
            if let Some(end) = end.as_deref() {
                query = query.until(parse_when(end)?);
            }
            let result = compute_free_busy_with(&query, &components, &config)
                .context("Failed to compute free-busy")?;

            match format {
                Format::Text => print!("{}", render_text(&result, free)),
                Format::Json => {
                    let mut value = serde_json::to_value(&result)?;
                    if free {
                        value["free"] = serde_json::to_value(result.free_slots())?;
                    }
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
        }
        Commands::Join {
            base,
            other,
            canonical,
        } => {
            let base = ResourceUrl::parse(&base).context("Invalid base URL")?;
            let joined = base.join(other.as_str()).context("Failed to join URLs")?;
            if canonical {
                println!("{}", joined.canonical());
            } else {
                println!("{joined}");
            }
        }
        Commands::Query {
            start,
            end,
            component,
            uid,
            expand,
            free_busy,
            timezone,
        } => {
            let config = load_config(None, timezone.as_deref())?;
            let body = if let Some(uid) = uid {
                CalendarQuery::uid_search(&component, &uid).build()?
            } else {
                let start = start.as_deref().map(|s| resolve(s, &config)).transpose()?;
                let end = end.as_deref().map(|s| resolve(s, &config)).transpose()?;
                if free_busy {
                    let range = TimeRange { start, end };
                    FreeBusyQueryRequest::new(range).build()?
                } else {
                    let start = start.context("--start is required for a date search")?;
                    let mut query = CalendarQuery::date_search(&component, start, end);
                    if expand {
                        query = query.expand(TimeRange::new(start, end));
                    }
                    query.build()?
                }
            };
            println!("{}", with_declaration(&body)?);
        }
    }

    Ok(())
}

/// One RFC 5545 `FREEBUSY` line per busy interval.
fn render_text(result: &FreeBusyResult, free: bool) -> String {
    let mut out = String::new();
    for busy in &result.busy {
        out.push_str(&format!(
            "FREEBUSY:{}/{}\n",
            format_utc(busy.start),
            format_utc(busy.end)
        ));
    }
    if free {
        for slot in result.free_slots() {
            out.push_str(&format!(
                "FREEBUSY;FBTYPE=FREE:{}/{}\n",
                format_utc(slot.start),
                format_utc(slot.end)
            ));
        }
    }
    out
}

/// RFC 3339 instants are absolute; `YYYY-MM-DDTHH:MM:SS` is floating.
fn parse_when(input: &str) -> Result<When> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(input) {
        return Ok(When::from(instant));
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
        .map(When::Floating)
        .with_context(|| format!("Invalid time '{input}': expected RFC 3339 or YYYY-MM-DDTHH:MM:SS"))
}

fn resolve(input: &str, config: &EngineConfig) -> Result<DateTime<Utc>> {
    Ok(parse_when(input)?.resolve(config)?)
}

fn load_config(path: Option<&str>, timezone: Option<&str>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            EngineConfig::from_json(&json).with_context(|| format!("Invalid config file: {path}"))?
        }
        None => EngineConfig::default(),
    };
    if let Some(name) = timezone {
        let tz: Tz = name
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown timezone: '{name}'"))?;
        config = config.with_floating_timezone(tz);
    }
    Ok(config)
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

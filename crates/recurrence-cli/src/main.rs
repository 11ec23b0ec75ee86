use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use recurrence_engine::{
    parse_iso_duration, parse_rule, BaseEvent, DstPolicy, EventRecord, ExpandOptions, Expander,
    IanaZones, Occurrence, OffsetLabel, RecurrenceRule, WeekdaySelector, Window,
};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "recur", version)]
#[command(about = "Parse recurrence rules and expand recurring events")]
struct Cli {
    /// Log expansion details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a rule and print its canonical form and fields as JSON
    Parse {
        /// e.g. "FREQ=WEEKLY;BYDAY=MO,WE;COUNT=4"
        rule: String,
    },
    /// Expand one event record (JSON) over a window
    Expand {
        /// Event record file; "-" or absent reads stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Window start (RFC 3339, or YYYY-MM-DD at midnight in --tz)
        #[arg(long)]
        from: String,

        /// Window end, exclusive (same formats as --from)
        #[arg(long)]
        to: Option<String>,

        /// Stop after this many occurrences
        #[arg(long, conflicts_with = "lookahead")]
        max: Option<usize>,

        /// Treat the window as ending this long after --from (ISO 8601, e.g. P30D)
        #[arg(long)]
        lookahead: Option<String>,

        /// Zone to render times in
        #[arg(long, default_value = "UTC")]
        tz: String,

        /// Drop occurrences whose wall-clock time falls in a DST gap
        #[arg(long)]
        skip_gaps: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Parse { rule } => {
            let rule = parse_rule(&rule).with_context(|| format!("parsing rule '{rule}'"))?;
            println!("{}", serde_json::to_string_pretty(&describe_rule(&rule))?);
        }
        Command::Expand {
            input,
            from,
            to,
            max,
            lookahead,
            tz,
            skip_gaps,
            pretty,
        } => {
            let tz: Tz = tz
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown timezone '{tz}'"))?;
            let record: EventRecord = serde_json::from_str(&read_input(input.as_ref())?)
                .context("reading event record")?;
            let base = record
                .into_base_event(&IanaZones)
                .context("invalid event record")?;

            let from = parse_bound(&from, tz).context("--from")?;
            let to = to
                .map(|t| parse_bound(&t, tz).context("--to"))
                .transpose()?;
            let mut window = Window::new(from, to)?;
            if let Some(max) = max {
                window = window.with_max_occurrences(max);
            }
            if let Some(lookahead) = lookahead {
                window = window.with_lookahead(parse_lookahead(&lookahead)?);
            }

            let options = ExpandOptions {
                dst_policy: if skip_gaps {
                    DstPolicy::Skip
                } else {
                    DstPolicy::ShiftForward
                },
                ..ExpandOptions::default()
            };
            let expansion = Expander::new(options).expand(&base, &window)?;

            let output = json!({
                "occurrences": expansion
                    .occurrences
                    .iter()
                    .map(|o| render_occurrence(o, &base, tz))
                    .collect::<Vec<_>>(),
                "orphanedOverrides": expansion
                    .orphaned_overrides
                    .iter()
                    .map(|id| id.with_timezone(&tz).to_rfc3339())
                    .collect::<Vec<_>>(),
                "truncated": expansion.truncated,
            });
            let text = if pretty {
                serde_json::to_string_pretty(&output)?
            } else {
                serde_json::to_string(&output)?
            };
            println!("{text}");
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn parse_bound(text: &str, tz: Tz) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("expected RFC 3339 or YYYY-MM-DD, got '{text}'"))?;
    let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
        bail!("no midnight on {date}");
    };
    match midnight.and_local_timezone(tz).earliest() {
        Some(local) => Ok(local.with_timezone(&Utc)),
        None => bail!("midnight {date} does not exist in {tz}"),
    }
}

fn parse_lookahead(text: &str) -> Result<Duration> {
    let duration = parse_iso_duration(text).context("--lookahead")?;
    let seconds = duration
        .day_count()
        .checked_mul(86_400)
        .and_then(|s| s.checked_add(duration.second_count()));
    match seconds.and_then(Duration::try_seconds) {
        Some(duration) => Ok(duration),
        None => bail!("--lookahead '{text}' is too large"),
    }
}

/// Times are rendered in `tz`; `zoneOffset` is the event's own zone offset at
/// the occurrence start.
fn render_occurrence(occurrence: &Occurrence, base: &BaseEvent, tz: Tz) -> Value {
    json!({
        "start": occurrence.start_in(&tz).to_rfc3339(),
        "end": occurrence.end_in(&tz).to_rfc3339(),
        "zoneOffset": OffsetLabel::at(base.zone(), occurrence.start).to_string(),
        "recurrenceId": occurrence.recurrence_id.with_timezone(&tz).to_rfc3339(),
        "sequence": occurrence.sequence,
        "status": occurrence.status,
        "isCancelled": occurrence.is_cancelled,
        "isModified": occurrence.is_modified,
    })
}

fn describe_rule(rule: &RecurrenceRule) -> Value {
    json!({
        "rule": rule.to_string(),
        "frequency": rule.frequency(),
        "interval": rule.interval(),
        "count": rule.count(),
        "until": rule.until().map(|u| u.to_string()),
        "byDay": rule.by_day().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "byMonthDay": rule.by_month_day(),
        "byMonth": rule.by_month(),
        "bySetPos": rule.by_set_pos(),
        "weekStart": WeekdaySelector::every(rule.week_start()).to_string(),
        "bounded": rule.is_bounded(),
    })
}

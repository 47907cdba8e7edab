use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, FixedOffset};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use touchnode::{
    config::TouchnodeConfig,
    storage::{AggregationRecord, BoundedLog, CredentialStore, Credentials, FsLineStore, LineStore},
};
use tracing::warn;

/// Inspect and maintain a touchnode data directory offline.
#[derive(Parser, Debug)]
#[command(name = "touchctl")]
#[command(about = "Inspect and maintain touchnode data and credentials")]
struct Args {
    /// Path to touchnode configuration file (for storage settings)
    #[arg(short = 'c', long, default_value = "touchnode.toml")]
    config: PathBuf,

    /// Data directory, overriding storage.data_dir from the configuration
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the aggregation log
    Log {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Wall-clock time the node booted (RFC 3339); adds a wall-clock column
        #[arg(long)]
        boot_time: Option<String>,

        /// Time zone for the wall-clock column
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },
    /// Drop the oldest records beyond a capacity
    Trim {
        /// Defaults to aggregation.max_entries from the configuration
        #[arg(short, long)]
        max_entries: Option<usize>,
    },
    /// Remove the aggregation log
    Clear,
    /// Manage stored network credentials
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },
}

#[derive(Subcommand, Debug)]
enum CredentialsAction {
    Show,
    Set { ssid: String, password: String },
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct LogRow {
    timestamp: u64,
    touch_count: u64,
    touch_rate: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    wall_clock: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = TouchnodeConfig::load_from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| config.storage.data_path());
    let store: Arc<dyn LineStore> = Arc::new(FsLineStore::new(data_dir));

    match args.command {
        Command::Log {
            format,
            boot_time,
            timezone,
        } => {
            let log = BoundedLog::new(
                Arc::clone(&store),
                config.storage.log_resource.clone(),
                config.aggregation.max_entries,
            );
            let boot_time = boot_time.as_deref().map(parse_boot_time).transpose()?;
            let timezone = resolve_timezone(&timezone);

            let records = log.records().await?;
            let rows: Vec<LogRow> = records
                .iter()
                .map(|record| to_row(record, boot_time.as_ref(), &timezone))
                .collect();

            print!("{}", render_rows(&rows, format)?);
        }
        Command::Trim { max_entries } => {
            let max_entries = max_entries.unwrap_or(config.aggregation.max_entries);
            if max_entries == 0 {
                return Err(anyhow!("max entries must be greater than 0"));
            }
            let log = BoundedLog::new(
                Arc::clone(&store),
                config.storage.log_resource.clone(),
                max_entries,
            );
            let retained = log.trim().await?;
            println!("{} records retained", retained);
        }
        Command::Clear => {
            let log = BoundedLog::new(
                Arc::clone(&store),
                config.storage.log_resource.clone(),
                config.aggregation.max_entries,
            );
            log.clear().await?;
            println!("Aggregation log removed");
        }
        Command::Credentials { action } => {
            let credentials = CredentialStore::new(
                Arc::clone(&store),
                config.storage.ssid_resource.clone(),
                config.storage.password_resource.clone(),
            );

            match action {
                CredentialsAction::Show => match credentials.load().await? {
                    Some(stored) => println!("SSID: {}", stored.ssid),
                    None => println!("No credentials stored; the node starts in portal mode"),
                },
                CredentialsAction::Set { ssid, password } => {
                    if ssid.trim().is_empty() {
                        return Err(anyhow!("SSID must not be empty"));
                    }
                    credentials
                        .save(&Credentials::new(ssid, password))
                        .await?;
                    println!("Credentials stored");
                }
                CredentialsAction::Clear => {
                    credentials.clear().await?;
                    println!("Credentials removed");
                }
            }
        }
    }

    Ok(())
}

fn parse_boot_time(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("boot time '{}' is not RFC 3339", value))
}

fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

fn to_row(
    record: &AggregationRecord,
    boot_time: Option<&DateTime<FixedOffset>>,
    timezone: &Tz,
) -> LogRow {
    let wall_clock = boot_time.and_then(|boot| {
        let offset = i64::try_from(record.timestamp_ms).ok()?;
        boot.checked_add_signed(Duration::milliseconds(offset))
            .map(|at| at.with_timezone(timezone).to_rfc3339())
    });

    LogRow {
        timestamp: record.timestamp_ms,
        touch_count: record.lifetime_count,
        touch_rate: record.interval_events,
        wall_clock,
    }
}

fn render_rows(rows: &[LogRow], format: OutputFormat) -> Result<String> {
    let with_wall_clock = rows.iter().any(|row| row.wall_clock.is_some());
    let mut out = String::new();

    match format {
        OutputFormat::Json => {
            out.push_str(&serde_json::to_string_pretty(rows)?);
            out.push('\n');
        }
        OutputFormat::Csv => {
            for row in rows {
                out.push_str(&format!(
                    "{},{},{}",
                    row.timestamp, row.touch_count, row.touch_rate
                ));
                if let Some(wall_clock) = &row.wall_clock {
                    out.push(',');
                    out.push_str(wall_clock);
                }
                out.push('\n');
            }
        }
        OutputFormat::Table => {
            out.push_str(&format!(
                "{:>14} {:>10} {:>10}",
                "timestamp_ms", "total", "interval"
            ));
            if with_wall_clock {
                out.push_str("  wall_clock");
            }
            out.push('\n');

            for row in rows {
                out.push_str(&format!(
                    "{:>14} {:>10} {:>10}",
                    row.timestamp, row.touch_count, row.touch_rate
                ));
                if let Some(wall_clock) = &row.wall_clock {
                    out.push_str("  ");
                    out.push_str(wall_clock);
                }
                out.push('\n');
            }
            out.push_str(&format!("{} records\n", rows.len()));
        }
    }

    Ok(out)
}

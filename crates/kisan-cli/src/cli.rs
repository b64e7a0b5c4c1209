//! CLI argument definitions for kisan.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nearby` | Mandis within a radius of a location |
//! | `prices` | Current crop prices at one mandi |
//! | `report` | Submit an observed price, queued when offline |
//! | `queue` | Inspect and replay the offline queue |
//! | `distance` | Great-circle distance between two points |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Fail with exit code 5 on degraded data |
//! | `--offline` | `false` | Never contact the remote service |
//! | `--ephemeral` | `false` | Keep all state in memory |
//! | `--timeout-ms` | config | Budget for the remote tier |
//!
//! # Examples
//!
//! ```bash
//! kisan nearby --lat 28.6139 --lon 77.2090 --radius-km 50
//! kisan prices delhi/north-west-delhi/azadpur --crop onion --format table
//! kisan report delhi/north-west-delhi/azadpur --crop Onion --price 2100
//! kisan queue sync
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Nearby mandis, crop prices and offline-safe price reports.
#[derive(Debug, Parser)]
#[command(
    name = "kisan",
    author,
    version,
    about = "Location-aware mandi prices that keep working offline",
    long_about = "kisan finds wholesale agricultural markets near you and shows their \
current crop prices. Data comes from the market service when reachable, otherwise \
from a local cache or a bundled snapshot; degraded answers are flagged in the output.\n\
\n\
Price reports submitted while offline are queued on disk and replayed with \
'kisan queue sync'."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat degraded or empty results as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Do not contact the remote service; reads use local tiers and
    /// reports are queued.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Keep the store in memory instead of on disk.
    #[arg(long, global = true, default_value_t = false)]
    pub ephemeral: bool,

    /// Market service base URL (overrides KISAN_API_BASE_URL).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Budget for the remote tier in milliseconds, retries included.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Data directory (overrides KISAN_HOME).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text for terminal display.
    Table,
    /// Single JSON object.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find mandis within a radius, nearest first.
    ///
    /// # Examples
    ///
    ///   kisan nearby --lat 28.6139 --lon 77.2090
    ///   kisan nearby --lat 19.07 --lon 72.87 --radius-km 200 --limit 3
    Nearby(NearbyArgs),

    /// Show current crop prices at a mandi.
    ///
    /// # Examples
    ///
    ///   kisan prices delhi/north-west-delhi/azadpur
    ///   kisan prices punjab/ludhiana/ludhiana --crop wheat
    Prices(PricesArgs),

    /// Report a price you observed at a mandi.
    ///
    /// The report is delivered immediately when online and queued for
    /// replay otherwise. Re-running with the same --key never creates a
    /// second report.
    Report(ReportArgs),

    /// Inspect or replay the offline queue.
    Queue(QueueArgs),

    /// Great-circle distance between two coordinates in kilometres.
    Distance(DistanceArgs),
}

#[derive(Debug, Args)]
pub struct NearbyArgs {
    /// Latitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Search radius in kilometres.
    #[arg(long, default_value_t = 50.0)]
    pub radius_km: f64,

    /// Maximum number of mandis returned.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct PricesArgs {
    /// Mandi identifier (`state/district/name`).
    pub market: String,

    /// Only show this crop.
    #[arg(long)]
    pub crop: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Mandi identifier (`state/district/name`).
    pub market: String,

    #[arg(long)]
    pub crop: String,

    /// Observed price per unit.
    #[arg(long)]
    pub price: f64,

    #[arg(long, default_value = "quintal")]
    pub unit: String,

    /// Idempotency key; a random one is generated when omitted.
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Debug, Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommand,
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List queued tasks in replay order.
    List,

    /// Replay queued tasks now.
    Sync,

    /// Drop a failed task so the tasks behind it can replay.
    Ack {
        /// Task id as shown by `queue list`.
        id: u64,
    },

    /// Put a failed task back into the queue.
    Retry {
        /// Task id as shown by `queue list`.
        id: u64,
    },
}

#[derive(Debug, Args)]
pub struct DistanceArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub from_lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub from_lon: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub to_lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub to_lon: f64,
}

//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::reconciler::DEFAULT_EXPORT_FILE;

/// Default output of the `map` command.
pub const DEFAULT_MAP_FILE: &str = "urbanflow_map.geojson";

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Only show records at this level ("all" shows everything)
    #[arg(short, long, default_value = "all")]
    pub level: String,

    /// Case-insensitive text to look for in titles and levels
    #[arg(short, long)]
    pub search: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Add command arguments.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// Title of the incident
    #[arg(short, long)]
    pub title: Option<String>,

    /// Latitude
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude
    #[arg(long, allow_negative_numbers = true)]
    pub lng: Option<f64>,

    /// Congestion level
    #[arg(short, long, value_enum)]
    pub level: Option<LevelArg>,

    /// Severity, 1 or more
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub severity: Option<u32>,

    /// Free-text description
    #[arg(short, long)]
    pub description: Option<String>,
}

/// Remove command arguments.
#[derive(Debug, Args)]
pub struct RemoveCommand {
    /// Id of the locally added record
    pub id: String,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// File to write
    #[arg(short, long, default_value = DEFAULT_EXPORT_FILE)]
    pub output: PathBuf,

    /// Write to standard output instead of a file
    #[arg(long, conflicts_with = "output")]
    pub stdout: bool,
}

/// Focus command arguments.
#[derive(Debug, Args)]
pub struct FocusCommand {
    /// Latitude to centre on
    #[arg(allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude to centre on
    #[arg(allow_negative_numbers = true)]
    pub lng: f64,

    /// Popup title
    #[arg(short, long, default_value = "")]
    pub title: String,
}

/// Map command arguments.
#[derive(Debug, Args)]
pub struct MapCommand {
    /// GeoJSON file to write
    #[arg(short, long, default_value = DEFAULT_MAP_FILE)]
    pub output: PathBuf,

    /// Only draw records at this level
    #[arg(short, long, default_value = "all")]
    pub level: String,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// GeoJSON file rewritten after every change
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Poll interval in milliseconds (overrides configuration)
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

/// Alerts command arguments.
#[derive(Debug, Args)]
pub struct AlertsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Route statistics commands.
#[derive(Debug, Subcommand)]
pub enum StatsCommand {
    /// Show statistics over saved route searches
    Show {
        /// Number of recent searches to include
        #[arg(short, long, default_value = "100")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Save a route search
    Record(RecordRouteCommand),
}

/// Arguments for saving a route search.
#[derive(Debug, Args)]
pub struct RecordRouteCommand {
    /// Start point as "lat,lng"
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true, required_unless_present = "geometry")]
    pub start: Option<[f64; 2]>,

    /// End point as "lat,lng"
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true, required_unless_present = "geometry")]
    pub end: Option<[f64; 2]>,

    /// Encoded route polyline; start and end default to its endpoints
    #[arg(short, long)]
    pub geometry: Option<String>,

    /// Polyline precision in decimal digits
    #[arg(long, default_value_t = crate::stats::DEFAULT_POLYLINE_PRECISION)]
    pub precision: u8,

    /// Distance in kilometres
    #[arg(short, long)]
    pub distance: f64,

    /// Travel time in minutes
    #[arg(short, long)]
    pub time: f64,

    /// Routing preference
    #[arg(short, long, value_enum, default_value = "fastest")]
    pub priority: PriorityArg,
}

/// Forecast command arguments.
#[derive(Debug, Args)]
pub struct ForecastCommand {
    /// Planned travel time in minutes
    #[arg(short, long)]
    pub time: f64,

    /// Hour of departure (defaults to the current local hour)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
    pub hour: Option<u32>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Level argument for new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelArg {
    /// Light traffic
    Low,
    /// Moderate traffic
    Medium,
    /// Jam
    High,
}

impl From<LevelArg> for crate::record::Level {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Low => Self::Low,
            LevelArg::Medium => Self::Medium,
            LevelArg::High => Self::High,
        }
    }
}

/// Routing preference argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    /// Shortest travel time
    Fastest,
    /// Shortest distance
    Shortest,
    /// Service recommendation
    Recommended,
}

impl From<PriorityArg> for crate::stats::RoutePriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Fastest => Self::Fastest,
            PriorityArg::Shortest => Self::Shortest,
            PriorityArg::Recommended => Self::Recommended,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

/// Parse `"lat,lng"`.
fn parse_point(value: &str) -> Result<[f64; 2], String> {
    let (lat, lng) = value
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got \"{value}\""))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("\"{part}\" is not a coordinate"))
    };
    Ok([parse(lat)?, parse(lng)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;
    use crate::stats::RoutePriority;

    #[test]
    fn test_level_arg_conversion() {
        assert_eq!(Level::from(LevelArg::Low), Level::Low);
        assert_eq!(Level::from(LevelArg::Medium), Level::Medium);
        assert_eq!(Level::from(LevelArg::High), Level::High);
    }

    #[test]
    fn test_priority_arg_conversion() {
        assert_eq!(
            RoutePriority::from(PriorityArg::Shortest),
            RoutePriority::Shortest
        );
        assert_eq!(
            RoutePriority::from(PriorityArg::Recommended),
            RoutePriority::Recommended
        );
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("40.4,49.8"), Ok([40.4, 49.8]));
        assert_eq!(parse_point(" -33.9 , 151.2 "), Ok([-33.9, 151.2]));
        assert!(parse_point("40.4").is_err());
        assert!(parse_point("abc,1").is_err());
        assert!(parse_point("NaN,1").is_err());
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}

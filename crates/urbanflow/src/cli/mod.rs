//! Command-line interface for urbanflow.
//!
//! This module provides the CLI structure for the `urbanflow` binary. Each
//! invocation acts as one dashboard tab over the shared local store.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddCommand, AlertsCommand, ClearCommand, ConfigCommand, ExportCommand, FocusCommand,
    ForecastCommand, LevelArg, ListCommand, MapCommand, OutputFormat, PriorityArg,
    RecordRouteCommand, RemoveCommand, StatsCommand, WatchCommand, DEFAULT_MAP_FILE,
};

/// urbanflow - City traffic at a glance
///
/// Merges the published traffic dataset with locally added incidents, keeps
/// open dashboards in sync and renders the result as a map.
#[derive(Debug, Parser)]
#[command(name = "urbanflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List traffic records in the merged view
    List(ListCommand),

    /// Add a local traffic record
    Add(AddCommand),

    /// Remove a locally added record
    Remove(RemoveCommand),

    /// Remove every locally added record
    Clear(ClearCommand),

    /// Export the merged view as JSON
    Export(ExportCommand),

    /// Ask open dashboards to centre on a point
    Focus(FocusCommand),

    /// Ask open dashboards to recompute their view
    Refresh,

    /// Render the merged view to a GeoJSON file
    Map(MapCommand),

    /// Keep a dashboard open and follow changes from other tabs
    Watch(WatchCommand),

    /// Show records above low level
    Alerts(AlertsCommand),

    /// Route search history and statistics
    #[command(subcommand)]
    Stats(StatsCommand),

    /// Forecast congestion for a trip
    Forecast(ForecastCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

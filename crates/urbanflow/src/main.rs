//! `urbanflow` - CLI for the UrbanFlow traffic pipeline
//!
//! Every invocation behaves like one dashboard tab: it opens the shared local
//! store, reads or changes the merged traffic view and signals the other
//! open tabs. `urbanflow watch` is the long-lived tab.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Timelike;
use clap::Parser;
use tracing::info;

use urbanflow::cli::{
    AddCommand, Cli, Command, ConfigCommand, ExportCommand, ListCommand, MapCommand,
    OutputFormat, RecordRouteCommand, StatsCommand, WatchCommand,
};
use urbanflow::notify::StorageBus;
use urbanflow::reconciler::{alerts, filter_by_level, search};
use urbanflow::stats::{decode_polyline, save_route_search, user_stats, RouteSearch};
use urbanflow::{
    forecast, init_logging, open_document_store, BaselineLoader, Config, ConfigIdentity,
    Dashboard, Error, GeoJsonSurface, LevelFilter, LocalStore, MapRenderer, NewRecord, Notifier,
    OverrideLayer, Reconciler, TrafficRecord,
};

/// Shared handles of one tab.
#[derive(Debug)]
struct Session {
    store: LocalStore,
    bus: StorageBus,
    notifier: Notifier,
    reconciler: Reconciler,
}

impl Session {
    fn open(config: &Config) -> anyhow::Result<Self> {
        let path = config.database_path();
        let store = LocalStore::open(&path)
            .with_context(|| format!("opening local store {}", path.display()))?;
        let bus = StorageBus::new(store.clone());
        let notifier = Notifier::new(Arc::new(bus.clone()));
        let reconciler = Reconciler::new(
            BaselineLoader::from_config(config),
            OverrideLayer::new(store.clone(), notifier.clone()),
        );
        Ok(Self {
            store,
            bus,
            notifier,
            reconciler,
        })
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => match err.downcast_ref::<Error>() {
            Some(notice) if notice.is_user_notice() => {
                eprintln!("{notice}");
                Ok(ExitCode::FAILURE)
            }
            _ => Err(err),
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Configuration commands must work even when the configuration is broken.
    let command = match cli.command {
        Command::Config(config_cmd) => return handle_config(cli.config, config_cmd),
        command => command,
    };

    let config = Config::load_from(cli.config.clone())?;
    let session = Session::open(&config)?;

    match command {
        Command::List(cmd) => handle_list(&session, &cmd),
        Command::Add(cmd) => handle_add(&session, cmd),
        Command::Remove(cmd) => {
            session.reconciler.remove(&cmd.id)?;
            println!("Removed {}", cmd.id);
            Ok(())
        }
        Command::Clear(cmd) => {
            if cmd.yes {
                session.reconciler.clear()?;
                println!("Removed all locally added records.");
            } else {
                println!("This will remove every locally added record.");
                println!("Use --yes to confirm.");
            }
            Ok(())
        }
        Command::Export(cmd) => handle_export(&session, &cmd),
        Command::Focus(cmd) => {
            let request = session
                .notifier
                .broadcast_focus(cmd.lat, cmd.lng, &cmd.title)?;
            println!("Focus sent: {:.5}, {:.5}", request.lat, request.lng);
            Ok(())
        }
        Command::Refresh => {
            let signal = session.notifier.broadcast_refresh()?;
            println!("Refresh sent ({})", signal.token);
            Ok(())
        }
        Command::Map(cmd) => handle_map(&config, &session, &cmd),
        Command::Watch(cmd) => handle_watch(&config, session, cmd),
        Command::Alerts(cmd) => handle_alerts(&session, cmd.json),
        Command::Stats(cmd) => handle_stats(&config, &session, cmd),
        Command::Forecast(cmd) => {
            let hour = cmd.hour.unwrap_or_else(|| chrono::Local::now().hour());
            let prediction = forecast::predict(cmd.time, hour);
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                println!("Traffic:  {} (departure {hour:02}:00)", prediction.level);
                println!("Delay:    {:.0} min", prediction.delay);
                println!("{}", prediction.recommended);
            }
            Ok(())
        }
        Command::Config(config_cmd) => handle_config(cli.config, config_cmd),
    }
}

fn handle_list(session: &Session, cmd: &ListCommand) -> anyhow::Result<()> {
    let mut view = filter_by_level(
        &session.reconciler.merged_view(),
        &LevelFilter::parse(&cmd.level),
    );
    if let Some(text) = &cmd.search {
        view = search(&view, text);
    }

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Plain => {
            for record in &view {
                println!("{}\t{}\t{}", record.id, record.level_str().unwrap_or("-"), record.title);
            }
        }
        OutputFormat::Table => print_table(&view),
    }
    Ok(())
}

fn print_table(view: &[TrafficRecord]) {
    println!(
        "{:<18} {:<8} {:>3} {:>10} {:>10}  TITLE",
        "ID", "LEVEL", "SEV", "LAT", "LNG"
    );
    for record in view {
        println!(
            "{:<18} {:<8} {:>3} {:>10.5} {:>10.5}  {}",
            record.id,
            record.level_str().unwrap_or("-"),
            record.severity,
            record.lat,
            record.lng,
            record.title
        );
    }
    println!("{} record(s)", view.len());
}

fn handle_add(session: &Session, cmd: AddCommand) -> anyhow::Result<()> {
    let new = NewRecord {
        title: cmd.title,
        description: cmd.description,
        severity: cmd.severity,
        level: cmd.level.map(Into::into),
        lat: cmd.lat,
        lng: cmd.lng,
    };
    let record = session.reconciler.add(new)?;
    println!("Added {} ({})", record.id, record.title);
    Ok(())
}

fn handle_export(session: &Session, cmd: &ExportCommand) -> anyhow::Result<()> {
    if cmd.stdout {
        session.reconciler.export(io::stdout().lock())?;
    } else {
        let count = session.reconciler.export_to(&cmd.output)?;
        println!("Exported {count} record(s) to {}", cmd.output.display());
    }
    Ok(())
}

fn handle_map(config: &Config, session: &Session, cmd: &MapCommand) -> anyhow::Result<()> {
    let view = filter_by_level(
        &session.reconciler.merged_view(),
        &LevelFilter::parse(&cmd.level),
    );
    let mut renderer = MapRenderer::create(GeoJsonSurface::new(), &config.map)?;
    let summary = renderer.render(&view)?;
    renderer.surface().write_to(&cmd.output)?;

    println!(
        "Drew {} marker(s), skipped {} without coordinates -> {}",
        summary.drawn,
        summary.skipped,
        cmd.output.display()
    );
    println!(
        "Active jams: {}  Alerts: {}  Avg speed: {} km/h",
        summary.view.active_jams, summary.view.alerts, summary.view.avg_speed
    );
    Ok(())
}

fn handle_alerts(session: &Session, json: bool) -> anyhow::Result<()> {
    let alerts = alerts(&session.reconciler.merged_view());
    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }
    if alerts.is_empty() {
        println!("No alerts.");
    }
    for alert in alerts {
        let marker = if alert.urgent { "!" } else { " " };
        println!("{marker} {}", alert.message);
    }
    Ok(())
}

fn handle_stats(config: &Config, session: &Session, cmd: StatsCommand) -> anyhow::Result<()> {
    let docs = open_document_store(&session.store);
    let identity = ConfigIdentity::new(&config.identity);

    match cmd {
        StatsCommand::Show { limit, json } => {
            let stats = user_stats(docs.as_ref(), &identity, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Searches:          {}", stats.count);
                println!("Total distance:    {:.1} km", stats.total_distance);
                println!("Total time:        {:.0} min", stats.total_time);
                println!("Average distance:  {:.1} km", stats.avg_distance);
                println!("Average time:      {:.0} min", stats.avg_time);
            }
        }
        StatsCommand::Record(record) => {
            let search = route_from_args(&record)?;
            let id = save_route_search(docs.as_ref(), &identity, &search)?;
            println!("Saved route search {id}");
        }
    }
    Ok(())
}

fn route_from_args(cmd: &RecordRouteCommand) -> anyhow::Result<RouteSearch> {
    let path = cmd
        .geometry
        .as_deref()
        .map(|encoded| decode_polyline(encoded, cmd.precision))
        .unwrap_or_default();
    let Some(start) = cmd.start.or_else(|| path.first().copied()) else {
        bail!("route geometry has no points; pass --start and --end");
    };
    let Some(end) = cmd.end.or_else(|| path.last().copied()) else {
        bail!("route geometry has no points; pass --start and --end");
    };
    Ok(RouteSearch {
        start,
        end,
        distance: cmd.distance,
        time: cmd.time,
        priority: cmd.priority.into(),
    })
}

fn handle_watch(config: &Config, session: Session, cmd: WatchCommand) -> anyhow::Result<()> {
    let interval = cmd
        .interval_ms
        .filter(|ms| *ms > 0)
        .map_or_else(|| config.poll_interval(), Duration::from_millis);

    let map = MapRenderer::create(GeoJsonSurface::new(), &config.map)?;
    let dashboard = Dashboard::new(session.reconciler, Some(map), Box::new(session.bus.listen()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(watch(dashboard, cmd.output, interval))
}

async fn watch(
    mut dashboard: Dashboard<GeoJsonSurface>,
    output: Option<PathBuf>,
    interval: Duration,
) -> anyhow::Result<()> {
    tokio::task::block_in_place(|| {
        dashboard.refresh();
    });
    report(&dashboard, output.as_deref())?;
    info!(interval_ms = interval.as_millis(), "Watching for changes");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Baseline reads and store access block.
                let received = tokio::task::block_in_place(|| dashboard.poll());
                if received > 0 {
                    report(&dashboard, output.as_deref())?;
                }
            }
            result = &mut shutdown => {
                result.context("waiting for Ctrl-C")?;
                info!("Stopping watch");
                break;
            }
        }
    }

    let _ = dashboard.close();
    Ok(())
}

fn report(dashboard: &Dashboard<GeoJsonSurface>, output: Option<&Path>) -> anyhow::Result<()> {
    let summary = dashboard.summary();
    println!(
        "{} record(s)  Active jams: {}  Alerts: {}  Avg speed: {} km/h{}",
        dashboard.view().len(),
        summary.active_jams,
        summary.alerts,
        summary.avg_speed,
        if dashboard.map().is_some() { "" } else { "  [map unavailable]" }
    );
    if let (Some(path), Some(map)) = (output, dashboard.map()) {
        map.surface().write_to(path)?;
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Baseline]");
                println!("  Source:             {}", config.baseline.source);
                println!("  Timeout (secs):     {}", config.baseline.timeout_secs);
                println!();
                println!("[Notify]");
                println!("  Poll interval (ms): {}", config.notify.poll_interval_ms);
                println!();
                println!("[Map]");
                println!(
                    "  Centre:             {}, {}",
                    config.map.center_lat, config.map.center_lng
                );
                println!("  Zoom:               {}", config.map.zoom);
                println!("  Focus zoom:         {}", config.map.focus_zoom);
                println!();
                println!("[Identity]");
                println!(
                    "  User:               {}",
                    config.identity.uid.as_deref().unwrap_or("(anonymous)")
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

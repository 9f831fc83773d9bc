//! Traffic reconciler.
//!
//! The merged view is the baseline followed by the overrides, rebuilt from
//! both sources on every call. Nothing is cached, so there is nothing to
//! invalidate. The baseline is never written: a baseline record cannot be
//! removed, and ids that collide across the two sources are kept as-is.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::baseline::BaselineLoader;
use crate::error::{Error, Result};
use crate::overrides::OverrideLayer;
use crate::record::{Level, NewRecord, TrafficRecord};

/// File name the export uses when none is given.
pub const DEFAULT_EXPORT_FILE: &str = "urbanflow_traffic_export.json";

/// Level filter applied to a view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LevelFilter {
    /// Keep everything.
    #[default]
    All,
    /// Keep records whose level is exactly this one.
    Only(Level),
}

impl LevelFilter {
    /// Parse `all` or a level string.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value == "all" {
            Self::All
        } else {
            Self::Only(Level::from(value))
        }
    }

    /// Whether `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &TrafficRecord) -> bool {
        match self {
            Self::All => true,
            Self::Only(level) => record.level.as_ref() == Some(level),
        }
    }
}

/// A record worth alerting on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Id of the record.
    pub id: String,
    /// `"<title> - <description>"`.
    pub message: String,
    /// Set for `high` records, which also warrant a notification.
    pub urgent: bool,
}

/// Joins the baseline and the override layer.
#[derive(Debug, Clone)]
pub struct Reconciler {
    baseline: BaselineLoader,
    overrides: OverrideLayer,
}

impl Reconciler {
    /// Create a reconciler over the two sources.
    #[must_use]
    pub fn new(baseline: BaselineLoader, overrides: OverrideLayer) -> Self {
        Self {
            baseline,
            overrides,
        }
    }

    /// The override layer, for mutations.
    #[must_use]
    pub fn overrides(&self) -> &OverrideLayer {
        &self.overrides
    }

    /// Baseline records in file order, then overrides in insertion order.
    #[must_use]
    pub fn merged_view(&self) -> Vec<TrafficRecord> {
        let mut view = self.baseline.load();
        let base_len = view.len();
        view.extend(self.overrides.read());
        debug!(
            baseline = base_len,
            overrides = view.len() - base_len,
            "Computed merged view"
        );
        view
    }

    /// Add an override record. See [`OverrideLayer::add`].
    ///
    /// # Errors
    ///
    /// Propagates the override layer's errors.
    pub fn add(&self, new: NewRecord) -> Result<TrafficRecord> {
        self.overrides.add(new)
    }

    /// Remove a record by id.
    ///
    /// Only override records can be removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BaselineItemRemoval`] when the id only exists in
    /// the baseline, [`Error::RecordNotFound`] when it exists nowhere, or a
    /// storage error.
    pub fn remove(&self, id: &str) -> Result<()> {
        if self.overrides.remove(id)? {
            return Ok(());
        }
        if self.baseline.load().iter().any(|r| r.id == id) {
            return Err(Error::BaselineItemRemoval { id: id.to_string() });
        }
        Err(Error::RecordNotFound { id: id.to_string() })
    }

    /// Remove every override. See [`OverrideLayer::clear`].
    ///
    /// # Errors
    ///
    /// Propagates the override layer's errors.
    pub fn clear(&self) -> Result<()> {
        self.overrides.clear()
    }

    /// Write the merged view as pretty-printed JSON.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn export<W: Write>(&self, writer: W) -> Result<usize> {
        let view = self.merged_view();
        let mut writer = writer;
        serde_json::to_writer_pretty(&mut writer, &view)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(view.len())
    }

    /// Export the merged view to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn export_to(&self, path: &Path) -> Result<usize> {
        let file = File::create(path)?;
        let count = self.export(BufWriter::new(file))?;
        info!(count, path = %path.display(), "Exported merged view");
        Ok(count)
    }
}

/// Keep records passing `filter`. Does not touch any store.
#[must_use]
pub fn filter_by_level(view: &[TrafficRecord], filter: &LevelFilter) -> Vec<TrafficRecord> {
    view.iter().filter(|r| filter.matches(r)).cloned().collect()
}

/// Case-insensitive substring match on title or level.
///
/// An empty query matches everything.
#[must_use]
pub fn search(view: &[TrafficRecord], text: &str) -> Vec<TrafficRecord> {
    let needle = text.to_lowercase();
    view.iter()
        .filter(|r| {
            r.title.to_lowercase().contains(&needle)
                || r
                    .level_str()
                    .is_some_and(|level| level.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

/// Records above `low`, in view order.
#[must_use]
pub fn alerts(view: &[TrafficRecord]) -> Vec<Alert> {
    view.iter()
        .filter(|r| r.is_above_low())
        .map(|r| Alert {
            id: r.id.clone(),
            message: format!("{} - {}", r.title, r.description.as_deref().unwrap_or("")),
            urgent: r.is_high(),
        })
        .collect()
}

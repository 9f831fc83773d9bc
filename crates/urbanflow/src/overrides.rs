//! Override layer.
//!
//! User-authored traffic records, kept as one JSON array under a single key
//! of the local store. The array is rewritten whole on every change, so two
//! tabs writing at the same time race and the last writer wins.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::record::{Level, NewRecord, TrafficRecord, DEFAULT_SEVERITY};
use crate::storage::LocalStore;

/// Key holding the override array.
pub const OVERRIDE_KEY: &str = "urbanflow_traffic_override";

/// Prefix of ids minted for override records.
pub const OVERRIDE_ID_PREFIX: &str = "ov_";

/// Title used when none is given.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Local additions layered on top of the baseline.
#[derive(Debug, Clone)]
pub struct OverrideLayer {
    store: LocalStore,
    notifier: Notifier,
}

impl OverrideLayer {
    /// Create a layer over a store; changes are announced through `notifier`.
    #[must_use]
    pub fn new(store: LocalStore, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Read the stored overrides in insertion order.
    ///
    /// An absent key, unreadable store or malformed JSON all read as empty.
    #[must_use]
    pub fn read(&self) -> Vec<TrafficRecord> {
        let raw = match self.store.get(OVERRIDE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!("Failed to read overrides: {err}");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("Ignoring malformed override array: {err}");
            Vec::new()
        })
    }

    /// Append a new record built from `new` with defaults for unset fields.
    ///
    /// Raises a refresh signal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for a zero severity or non-finite
    /// coordinates, or an error if the store could not be written.
    pub fn add(&self, new: NewRecord) -> Result<TrafficRecord> {
        validate(&new)?;

        let mut records = self.read();
        let record = TrafficRecord {
            id: fresh_id(&records),
            title: new.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            description: Some(new.description.unwrap_or_default()),
            severity: new.severity.unwrap_or(DEFAULT_SEVERITY),
            level: Some(new.level.unwrap_or(Level::Low)),
            lat: new.lat.unwrap_or(0.0),
            lng: new.lng.unwrap_or(0.0),
        };
        records.push(record.clone());
        self.write(&records)?;

        info!(id = %record.id, title = %record.title, "Added override record");
        self.notifier.broadcast_refresh()?;
        Ok(record)
    }

    /// Remove the first override whose id is `id`.
    ///
    /// Returns `false` without touching the store when no override has that
    /// id, including when the id belongs to a baseline record. A successful
    /// removal raises a refresh signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not be written.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.read();
        let Some(position) = records.iter().position(|r| r.id == id) else {
            debug!(id, "No override with this id");
            return Ok(false);
        };
        records.remove(position);
        self.write(&records)?;

        info!(id, "Removed override record");
        self.notifier.broadcast_refresh()?;
        Ok(true)
    }

    /// Remove every override. Raises a refresh signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not be written.
    pub fn clear(&self) -> Result<()> {
        self.write(&[])?;
        info!("Cleared override records");
        self.notifier.broadcast_refresh()?;
        Ok(())
    }

    fn write(&self, records: &[TrafficRecord]) -> Result<()> {
        self.store
            .set(OVERRIDE_KEY, &serde_json::to_string(records)?)
    }
}

fn validate(new: &NewRecord) -> Result<()> {
    if new.severity == Some(0) {
        return Err(Error::invalid_record("severity must be at least 1"));
    }
    if new.lat.is_some_and(|v| !v.is_finite()) || new.lng.is_some_and(|v| !v.is_finite()) {
        return Err(Error::invalid_record("coordinates must be finite numbers"));
    }
    Ok(())
}

/// `ov_<unix millis>`, moved forward past any id already in `existing`.
fn fresh_id(existing: &[TrafficRecord]) -> String {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let id = format!("{OVERRIDE_ID_PREFIX}{millis}");
        if !existing.iter().any(|r| r.id == id) {
            return id;
        }
        millis += 1;
    }
}

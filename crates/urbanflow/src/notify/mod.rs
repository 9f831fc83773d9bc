//! Cross-tab notification.
//!
//! Every open tab recomputes its own view; the only thing tabs exchange is
//! a nudge on one of two channels:
//!
//! - `data-changed`: something in the override layer changed, recompute.
//! - `focus-requested`: centre the map on a point and show its title.
//!
//! Delivery is fire-and-forget. A listener observes a given signal at most
//! once, there is no acknowledgment, no ordering beyond what the transport
//! gives, and tabs that are not running when a signal is sent never see it.

mod local;
mod storage;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub use local::{LocalBus, LocalListener};
pub use storage::{StorageBus, StorageListener, FOCUS_KEY, REFRESH_KEY};

/// Distinguishes refresh tokens minted within the same millisecond.
static REFRESH_SEQ: AtomicU64 = AtomicU64::new(0);

/// A named notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Recompute the merged view.
    DataChanged,
    /// Centre the map on a point.
    FocusRequested,
}

impl Channel {
    /// The channel's wire name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DataChanged => "data-changed",
            Self::FocusRequested => "focus-requested",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// "Something changed, recompute your view."
///
/// The token only has to differ from the previous one, including one written
/// by another process in the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSignal {
    /// Opaque token: `<millis>-<pid>-<seq>`.
    pub token: String,
}

impl RefreshSignal {
    /// Mint a fresh signal.
    #[must_use]
    pub fn now() -> Self {
        let seq = REFRESH_SEQ.fetch_add(1, Ordering::Relaxed);
        Self::minted(Utc::now().timestamp_millis(), std::process::id(), seq)
    }

    pub(crate) fn minted(millis: i64, pid: u32, seq: u64) -> Self {
        Self {
            token: format!("{millis}-{pid}-{seq}"),
        }
    }
}

/// "Centre the map here."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusRequest {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Title shown in the popup.
    #[serde(default)]
    pub title: String,
    /// Unix milliseconds when the request was made.
    #[serde(default)]
    pub ts: i64,
}

impl FocusRequest {
    /// Build a request stamped with the current time.
    #[must_use]
    pub fn new(lat: f64, lng: f64, title: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            title: title.into(),
            ts: Utc::now().timestamp_millis(),
        }
    }

    /// Whether the coordinates can be placed on a map.
    #[must_use]
    pub fn is_well_placed(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// A message on one of the two channels.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Sent on [`Channel::DataChanged`].
    Refresh(RefreshSignal),
    /// Sent on [`Channel::FocusRequested`].
    Focus(FocusRequest),
}

impl Signal {
    /// The channel this signal travels on.
    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            Self::Refresh(_) => Channel::DataChanged,
            Self::Focus(_) => Channel::FocusRequested,
        }
    }
}

/// Transport that carries signals to other tabs.
pub trait SignalBus: Send + Sync + fmt::Debug {
    /// Send a signal. Returning `Ok` says nothing about who received it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport itself could not be written.
    fn publish(&self, signal: &Signal) -> Result<()>;
}

/// Receiving end of a bus, owned by one tab.
pub trait SignalListener: Send + fmt::Debug {
    /// Drain the signals that arrived since the last poll.
    ///
    /// Never fails: a transport problem means "nothing arrived".
    fn poll(&mut self) -> Vec<Signal>;
}

/// Publishing front end used by the override layer and the CLI.
#[derive(Debug, Clone)]
pub struct Notifier {
    bus: Arc<dyn SignalBus>,
}

impl Notifier {
    /// Wrap a bus.
    #[must_use]
    pub fn new(bus: Arc<dyn SignalBus>) -> Self {
        Self { bus }
    }

    /// Tell every other tab to recompute its view.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus could not be written.
    pub fn broadcast_refresh(&self) -> Result<RefreshSignal> {
        let signal = RefreshSignal::now();
        self.bus.publish(&Signal::Refresh(signal.clone()))?;
        debug!(channel = %Channel::DataChanged, token = %signal.token, "Broadcast refresh");
        Ok(signal)
    }

    /// Ask every other tab to centre its map on a point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for non-finite coordinates, or an
    /// error if the bus could not be written.
    pub fn broadcast_focus(&self, lat: f64, lng: f64, title: &str) -> Result<FocusRequest> {
        let request = FocusRequest::new(lat, lng, title);
        if !request.is_well_placed() {
            return Err(Error::invalid_record(
                "focus coordinates must be finite numbers",
            ));
        }
        self.bus.publish(&Signal::Focus(request.clone()))?;
        debug!(channel = %Channel::FocusRequested, lat, lng, "Broadcast focus");
        Ok(request)
    }
}

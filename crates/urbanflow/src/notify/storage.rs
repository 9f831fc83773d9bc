//! Bus carried over the shared local store.
//!
//! Publishing writes a value under a well-known key. Listeners in any
//! process that opened the same store poll those keys and treat a changed
//! value as a delivered signal. A value that is overwritten twice between
//! polls is only observed once.

use tracing::{debug, trace, warn};

use super::{FocusRequest, RefreshSignal, Signal, SignalBus, SignalListener};
use crate::error::Result;
use crate::storage::LocalStore;

/// Key whose value changes whenever a tab should recompute.
pub const REFRESH_KEY: &str = "urbanflow_refresh";

/// Key holding the latest focus request as JSON.
pub const FOCUS_KEY: &str = "urbanflow_focus";

/// Bus that signals through [`REFRESH_KEY`] and [`FOCUS_KEY`].
#[derive(Debug, Clone)]
pub struct StorageBus {
    store: LocalStore,
}

impl StorageBus {
    /// Create a bus over a store.
    #[must_use]
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Attach a listener. Values already in the store are treated as seen.
    #[must_use]
    pub fn listen(&self) -> StorageListener {
        StorageListener {
            last_refresh: read_quietly(&self.store, REFRESH_KEY),
            last_focus: read_quietly(&self.store, FOCUS_KEY),
            store: self.store.clone(),
        }
    }
}

impl SignalBus for StorageBus {
    fn publish(&self, signal: &Signal) -> Result<()> {
        match signal {
            Signal::Refresh(refresh) => self.store.set(REFRESH_KEY, &refresh.token),
            Signal::Focus(focus) => self.store.set(FOCUS_KEY, &serde_json::to_string(focus)?),
        }
    }
}

/// Polling listener for a [`StorageBus`].
#[derive(Debug)]
pub struct StorageListener {
    store: LocalStore,
    last_refresh: Option<String>,
    last_focus: Option<String>,
}

impl StorageListener {
    fn changed(&self, key: &str, last: Option<&String>) -> Option<String> {
        let current = read_quietly(&self.store, key)?;
        if last == Some(&current) {
            None
        } else {
            Some(current)
        }
    }
}

impl SignalListener for StorageListener {
    fn poll(&mut self) -> Vec<Signal> {
        let mut signals = Vec::new();

        if let Some(token) = self.changed(REFRESH_KEY, self.last_refresh.as_ref()) {
            trace!(%token, "Refresh key changed");
            self.last_refresh = Some(token.clone());
            signals.push(Signal::Refresh(RefreshSignal { token }));
        }

        if let Some(raw) = self.changed(FOCUS_KEY, self.last_focus.as_ref()) {
            match serde_json::from_str::<FocusRequest>(&raw) {
                Ok(request) if request.is_well_placed() => {
                    signals.push(Signal::Focus(request));
                }
                Ok(_) => debug!("Ignoring focus request with unusable coordinates"),
                Err(err) => debug!("Ignoring malformed focus request: {err}"),
            }
            self.last_focus = Some(raw);
        }

        signals
    }
}

fn read_quietly(store: &LocalStore, key: &str) -> Option<String> {
    store.get(key).unwrap_or_else(|err| {
        warn!(key, "Failed to read signal key: {err}");
        None
    })
}

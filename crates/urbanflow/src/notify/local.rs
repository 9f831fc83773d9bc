//! In-process bus for tabs that live in the same process.

use tokio::sync::broadcast;
use tracing::debug;

use super::{Signal, SignalBus, SignalListener};
use crate::error::Result;

/// Signals buffered per receiver before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 64;

/// Broadcast bus backed by `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<Signal>,
}

impl LocalBus {
    /// Create a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Attach a new listener. It only sees signals sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> LocalListener {
        LocalListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus for LocalBus {
    fn publish(&self, signal: &Signal) -> Result<()> {
        // No receivers is not an error: nobody else is open.
        if self.tx.send(signal.clone()).is_err() {
            debug!(channel = %signal.channel(), "No listeners for signal");
        }
        Ok(())
    }
}

/// Receiving end of a [`LocalBus`].
#[derive(Debug)]
pub struct LocalListener {
    rx: broadcast::Receiver<Signal>,
}

impl SignalListener for LocalListener {
    fn poll(&mut self) -> Vec<Signal> {
        let mut signals = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(signal) => signals.push(signal),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    debug!(missed, "Listener lagged; dropped signals");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => break,
            }
        }
        signals
    }
}

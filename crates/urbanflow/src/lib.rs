//! `urbanflow` - Traffic incident pipeline for the UrbanFlow dashboard
//!
//! This library merges a read-only baseline of traffic incidents with
//! locally added records, keeps every open tab in sync through a shared
//! local store and draws the result on a map surface.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod baseline;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod docstore;
pub mod error;
pub mod forecast;
pub mod identity;
pub mod logging;
pub mod notify;
pub mod overrides;
pub mod reconciler;
pub mod record;
pub mod render;
pub mod stats;
pub mod storage;

pub use baseline::{BaselineLoader, BaselineSource};
pub use config::Config;
pub use dashboard::Dashboard;
pub use docstore::{open_document_store, DocumentQuery, DocumentStore, LocalDocumentStore};
pub use error::{Error, Result};
pub use identity::{ConfigIdentity, Identity, IdentityProvider};
pub use logging::init_logging;
pub use notify::{FocusRequest, Notifier, RefreshSignal, Signal, SignalBus, SignalListener};
pub use overrides::OverrideLayer;
pub use reconciler::{Alert, LevelFilter, Reconciler};
pub use record::{Level, NewRecord, TrafficRecord};
pub use render::{GeoJsonSurface, MapRenderer, MapSurface, RenderSummary};
pub use storage::LocalStore;

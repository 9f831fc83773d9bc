//! Baseline dataset loader.
//!
//! The baseline is the server-provided, read-only list of traffic records.
//! Every failure to get it (missing file, network error, non-success
//! status, bad JSON) resolves to an empty list: "no baseline" is a normal
//! state for this system, not a fault.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::TrafficRecord;

/// Prefix of ids synthesized for baseline records that have none.
pub const BASELINE_ID_PREFIX: &str = "base_";

/// Where the baseline JSON comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineSource {
    /// A JSON file on disk.
    File(PathBuf),
    /// An `http://` or `https://` URL fetched with GET.
    Http(String),
    /// JSON text held in memory.
    Inline(String),
}

impl BaselineSource {
    /// Interpret a configured source string: URLs become [`BaselineSource::Http`],
    /// anything else is a file path.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Http(trimmed.to_string())
        } else {
            Self::File(PathBuf::from(trimmed))
        }
    }

    /// Human-readable name for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Http(url) => url.clone(),
            Self::Inline(_) => "<inline>".to_string(),
        }
    }
}

/// Loads the baseline dataset on demand. Nothing is cached.
#[derive(Debug, Clone)]
pub struct BaselineLoader {
    source: BaselineSource,
    timeout: Duration,
}

impl BaselineLoader {
    /// Create a loader for the given source.
    #[must_use]
    pub fn new(source: BaselineSource) -> Self {
        Self {
            source,
            timeout: Duration::from_secs(10),
        }
    }

    /// Create a loader from the `[baseline]` section of the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(BaselineSource::parse(&config.baseline.source))
            .with_timeout(config.baseline_timeout())
    }

    /// Create a loader over in-memory JSON text.
    #[must_use]
    pub fn inline(json: impl Into<String>) -> Self {
        Self::new(BaselineSource::Inline(json.into()))
    }

    /// Set the request timeout used for URL sources.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured source.
    #[must_use]
    pub fn source(&self) -> &BaselineSource {
        &self.source
    }

    /// Read the baseline once.
    ///
    /// Returns an empty list on any failure. Records without an id get
    /// `base_<index>`, where index is the position in the source array.
    #[must_use]
    pub fn load(&self) -> Vec<TrafficRecord> {
        match self.try_load() {
            Ok(records) => {
                debug!(
                    source = %self.source.describe(),
                    count = records.len(),
                    "Loaded baseline"
                );
                records
            }
            Err(err) => {
                warn!("{err}; continuing without baseline");
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<TrafficRecord>> {
        let text = self.read_text()?;
        let mut records: Vec<TrafficRecord> = serde_json::from_str(&text)
            .map_err(|e| Error::baseline_fetch(self.source.describe(), e.to_string()))?;
        assign_baseline_ids(&mut records);
        Ok(records)
    }

    fn read_text(&self) -> Result<String> {
        match &self.source {
            BaselineSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| Error::baseline_fetch(path.display().to_string(), e.to_string())),
            BaselineSource::Http(url) => self.fetch(url),
            BaselineSource::Inline(text) => Ok(text.clone()),
        }
    }

    fn fetch(&self, url: &str) -> Result<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::baseline_fetch(url, format!("client error: {e}")))?;
        let response = client
            .get(url)
            .send()
            .map_err(|e| Error::baseline_fetch(url, format!("request error: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::baseline_fetch(
                url,
                format!("server responded with {}", response.status()),
            ));
        }
        response
            .text()
            .map_err(|e| Error::baseline_fetch(url, format!("failed to read response: {e}")))
    }
}

/// Give every record with an empty id the id `base_<index>`.
pub fn assign_baseline_ids(records: &mut [TrafficRecord]) {
    for (index, record) in records.iter_mut().enumerate() {
        if record.id.is_empty() {
            record.id = format!("{BASELINE_ID_PREFIX}{index}");
        }
    }
}

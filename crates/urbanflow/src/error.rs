//! Error types for urbanflow.
//!
//! Read paths in this crate degrade silently to "no data" and never surface
//! these errors. They are returned by mutations, configuration loading and
//! the few user-facing policy checks.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for urbanflow operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the local store.
    #[error("failed to open local store at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Baseline Errors ===
    /// The baseline dataset could not be fetched or parsed.
    ///
    /// Only produced internally; [`crate::BaselineLoader::load`] turns it
    /// into an empty dataset.
    #[error("failed to load baseline from {source_name}: {message}")]
    BaselineFetch {
        /// Where the baseline was read from.
        source_name: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Traffic Record Errors ===
    /// Attempt to remove a record that belongs to the server baseline.
    #[error("cannot remove baseline item '{id}': only locally added records can be removed")]
    BaselineItemRemoval {
        /// Id of the baseline record.
        id: String,
    },

    /// No record with the given id exists in the merged view.
    #[error("no traffic record with id '{id}'")]
    RecordNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// User input for a new record was rejected.
    #[error("invalid traffic record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },

    // === Map Errors ===
    /// The map surface failed; the map is disabled for the session.
    #[error("map unavailable: {0}")]
    MapUnavailable(String),

    // === Document Store Errors ===
    /// A document could not be stored in a collection.
    #[error("invalid document for collection '{collection}': {message}")]
    InvalidDocument {
        /// Target collection.
        collection: String,
        /// Description of the problem.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for urbanflow operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new map error.
    #[must_use]
    pub fn map_unavailable(message: impl Into<String>) -> Self {
        Self::MapUnavailable(message.into())
    }

    /// Create an invalid record error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Create a baseline fetch error.
    #[must_use]
    pub fn baseline_fetch(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BaselineFetch {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Check if this error should be shown to the user as a blocking notice
    /// rather than treated as a failure of the tool itself.
    #[must_use]
    pub fn is_user_notice(&self) -> bool {
        matches!(
            self,
            Self::BaselineItemRemoval { .. }
                | Self::RecordNotFound { .. }
                | Self::InvalidRecord { .. }
                | Self::InvalidDocument { .. }
        )
    }

    /// Check if this error came from the map surface.
    #[must_use]
    pub fn is_map_error(&self) -> bool {
        matches!(self, Self::MapUnavailable(_))
    }
}

//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why the board's settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON, or a key has the wrong type.
    #[error("{} is not valid board settings: {source}", path.display())]
    Parse {
        /// File the bad JSON came from.
        path: PathBuf,
        /// Decoder message.
        #[source]
        source: serde_json::Error,
    },
    /// A value the server cannot run with, such as a zero queue capacity.
    #[error("{field} {requirement}")]
    Invalid {
        /// camelCase path of the offending key, e.g. `server.queueCapacity`.
        field: &'static str,
        /// What the value has to satisfy.
        requirement: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, requirement: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            requirement: requirement.into(),
        }
    }
}

/// Result alias for settings loading.
pub type Result<T> = std::result::Result<T, SettingsError>;

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by the reconciliation engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single reconciliation. None of these are retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// A field required by the requested target is missing or malformed.
    #[error("{0}")]
    Validation(String),
    /// The resource is in a state that makes the request impossible.
    #[error("{0}")]
    Precondition(String),
    /// The application exists but its compose manifest cannot be read.
    #[error(transparent)]
    ManifestRead(#[from] ManifestError),
    /// Failure reported by the remote backend, passed through untouched.
    #[error(transparent)]
    Backend(anyhow::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

/// Why an application's compose manifest could not be obtained.
///
/// Distinct from "application absent": the application record exists, its
/// configuration just cannot be read.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The record does not carry the name/version needed to locate the manifest.
    #[error("application record for '{name}' has no {field}; cannot locate its manifest")]
    Unaddressable {
        /// Application name the lookup was for.
        name: String,
        /// Missing record field.
        field: &'static str,
    },
    /// The manifest file could not be read.
    #[error("Unable to read {}", path.display())]
    Read {
        /// Manifest location.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The manifest file is not valid YAML.
    #[error("Invalid YAML in {}", path.display())]
    Parse {
        /// Manifest location.
        path: PathBuf,
        /// Underlying parser failure.
        #[source]
        source: serde_yaml::Error,
    },
}

//! Collaborators the reconciler talks to: the remote management API (one
//! capability trait per resource kind) and the store of compose manifests.

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::cfg::{BackendKind, Config};
use crate::error::ManifestError;
use crate::job::JobState;
use crate::record::Record;

#[cfg(test)]
pub mod fake;
mod manifest;
#[cfg(feature = "rest-api")]
mod rest;
mod stub;

pub use manifest::FsManifestStore;
#[cfg(feature = "rest-api")]
pub use rest::RestBackend;
pub use stub::StubBackend;

/// Remote operations on cron jobs. Failures are reported verbatim.
pub trait JobBackend {
    /// The job whose description is `description`, if exactly one exists.
    fn find_job(&self, description: &str) -> Result<Option<Record>>;
    /// Create a job; returns the record the backend stored.
    fn create_job(&self, payload: &JobState) -> Result<Record>;
    /// Replace job `id`; returns the record the backend stored.
    fn update_job(&self, id: i64, payload: &JobState) -> Result<Record>;
    /// Delete job `id`.
    fn delete_job(&self, id: i64) -> Result<()>;
}

/// Remote operations on custom applications. Failures are reported verbatim.
///
/// Records returned here do not carry the compose configuration; see
/// [`ManifestStore`].
pub trait AppBackend {
    /// The application called `name`, if exactly one exists.
    fn find_app(&self, name: &str) -> Result<Option<Record>>;
    /// Create a custom application running `compose`.
    fn create_app(&self, name: &str, compose: &Value) -> Result<Record>;
    /// Replace the compose configuration of `name`.
    fn update_app(&self, name: &str, compose: &Value) -> Result<Record>;
    /// Delete `name`.
    fn delete_app(&self, name: &str) -> Result<()>;
    /// Stop `name`.
    fn stop_app(&self, name: &str) -> Result<Record>;
    /// Start `name`.
    fn start_app(&self, name: &str) -> Result<Record>;
}

/// Source of the compose configuration an application is deployed with.
pub trait ManifestStore {
    /// Read the manifest of `name` at `version`.
    fn read_compose(&self, name: &str, version: &str) -> std::result::Result<Value, ManifestError>;
}

/// A backend serving both resource kinds.
pub trait Backend: JobBackend + AppBackend {}

impl<T: JobBackend + AppBackend> Backend for T {}

/// Open the backend selected by `cfg`.
pub fn connect(cfg: &Config) -> Result<Box<dyn Backend>> {
    match cfg.backend {
        BackendKind::Stub => Ok(Box::new(StubBackend::open(&cfg.stub_state, &cfg.app_config_root)?)),
        #[cfg(feature = "rest-api")]
        BackendKind::Api => Ok(Box::new(RestBackend::new(cfg)?)),
        #[cfg(not(feature = "rest-api"))]
        BackendKind::Api => {
            anyhow::bail!("backend 'api' needs a build with the `rest-api` feature; set TRUENAS_CLIENT_BACKEND=stub for local runs")
        }
    }
}

/// Keep `records` whose `key` field equals `value`; a match counts only if it
/// is unique.
pub(crate) fn single_match(records: Vec<Record>, key: &str, value: &str) -> Option<Record> {
    let mut found = records
        .into_iter()
        .filter(|r| r.get(key).and_then(Value::as_str) == Some(value));
    match (found.next(), found.next()) {
        (Some(only), None) => Some(only),
        (Some(_), Some(_)) => {
            debug!(key, value, "multiple records match; treating as absent");
            None
        }
        _ => None,
    }
}

use serde::Deserialize;
use serde_json::Value;

use crate::backend::ManifestStore;
use crate::diff::Diff;
use crate::error::{Error, ManifestError, Result};
use crate::reconcile::Target;
use crate::record::Record;

/// Raw custom application parameters as supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppParams {
    /// Application instance name.
    pub name: String,
    /// Desired compose configuration. Required when `state` is `present`.
    #[serde(default)]
    pub compose_config: Option<Value>,
    /// Requested lifecycle target.
    #[serde(default)]
    pub state: Target,
}

impl AppParams {
    /// Check the parameters against the requested target.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation("missing required argument: name"));
        }
        match (&self.state, &self.compose_config) {
            (Target::Present, None) => Err(Error::validation(
                "state is present but all of the following are missing: compose_config",
            )),
            (_, Some(config)) if !config.is_object() => {
                Err(Error::validation("compose_config must be a mapping"))
            }
            _ => Ok(()),
        }
    }
}

/// Desired state of a custom application.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSpec {
    compose_config: Value,
}

impl AppSpec {
    /// Build the desired spec; the compose configuration is taken as-is.
    pub fn from_params(params: &AppParams) -> Result<Self> {
        let compose_config = params
            .compose_config
            .clone()
            .ok_or_else(|| Error::validation("compose_config is required to build an application"))?;
        Ok(Self { compose_config })
    }

    /// Desired compose configuration; also its canonical form.
    pub fn compose_config(&self) -> &Value {
        &self.compose_config
    }

    /// Before/after view against the observed compose configuration.
    pub fn diff(&self, observed: Option<Value>) -> Diff<Value> {
        Diff::new(observed, self.compose_config.clone())
    }
}

/// Fetch the compose configuration an existing application is running with.
///
/// It lives in a manifest addressed by the record's name and version, not in
/// the record. Failing to read it is an error, never "no configuration".
pub fn observed_compose<M: ManifestStore + ?Sized>(manifests: &M, app: &Record) -> Result<Value> {
    let name = app.text("name").ok_or_else(|| ManifestError::Unaddressable {
        name: String::new(),
        field: "name",
    })?;
    let version = app.text("version").ok_or_else(|| ManifestError::Unaddressable {
        name: name.clone(),
        field: "version",
    })?;
    Ok(manifests.read_compose(&name, &version)?)
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::ManifestStore;
use crate::error::ManifestError;
use crate::store::write_atomic;

/// File name of the compose manifest inside a version directory.
const USER_CONFIG: &str = "user_config.yaml";

/// Compose manifests laid out as `<root>/<name>/versions/<version>/user_config.yaml`.
#[derive(Debug, Clone)]
pub struct FsManifestStore {
    root: PathBuf,
}

impl FsManifestStore {
    /// Store rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Where the manifest of `name` at `version` lives.
    pub fn path_for(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(name).join("versions").join(version).join(USER_CONFIG)
    }

    /// Write the manifest of `name` at `version`, creating directories.
    pub fn write_compose(&self, name: &str, version: &str, compose: &Value) -> Result<()> {
        let path = self.path_for(name, version);
        let doc = match compose {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        let text = serde_yaml::to_string(&doc).context("serialize compose manifest")?;
        write_atomic(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))
    }
}

impl ManifestStore for FsManifestStore {
    fn read_compose(&self, name: &str, version: &str) -> std::result::Result<Value, ManifestError> {
        let path = self.path_for(name, version);
        let text = fs::read_to_string(&path)
            .map_err(|source| ManifestError::Read { path: path.clone(), source })?;
        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        let doc: Value = serde_yaml::from_str(&text)
            .map_err(|source| ManifestError::Parse { path, source })?;
        // An empty document means an empty configuration.
        Ok(match doc {
            Value::Null => Value::Object(Map::new()),
            other => other,
        })
    }
}

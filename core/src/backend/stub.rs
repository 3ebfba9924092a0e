use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{single_match, AppBackend, FsManifestStore, JobBackend};
use crate::job::JobState;
use crate::record::Record;
use crate::store::JsonFile;

const DEFAULT_VERSION: &str = "1";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StubState {
    #[serde(default)]
    apps: Vec<Record>,
    #[serde(default)]
    cronjobs: Vec<Record>,
}

/// File-backed stand-in for the management API, for local runs and
/// integration tests.
///
/// Every call reloads the state file so separate processes see each other's
/// changes. Compose manifests are written where [`FsManifestStore`] reads
/// them.
#[derive(Debug, Clone)]
pub struct StubBackend {
    state: JsonFile,
    manifests: FsManifestStore,
}

impl StubBackend {
    /// Open the stub with state at `state_path` and manifests under `app_root`.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(state_path: P, app_root: Q) -> Result<Self> {
        let state = JsonFile::open(state_path)?;
        std::fs::create_dir_all(app_root.as_ref())
            .with_context(|| format!("create app config root {}", app_root.as_ref().display()))?;
        Ok(Self { state, manifests: FsManifestStore::new(app_root) })
    }

    /// Manifest store the stub writes to.
    pub fn manifests(&self) -> &FsManifestStore {
        &self.manifests
    }

    fn load(&self) -> Result<StubState> {
        self.state.load()
    }

    fn save(&self, state: &StubState) -> Result<()> {
        self.state.save(state)
    }

    fn set_app_state(&self, name: &str, value: &str) -> Result<Record> {
        let mut state = self.load()?;
        let Some(app) = find_named(&mut state.apps, name) else {
            bail!("Application '{name}' not found");
        };
        app.insert("state", json!(value));
        let app = app.clone();
        self.save(&state)?;
        Ok(app)
    }
}

fn find_named<'a>(apps: &'a mut [Record], name: &str) -> Option<&'a mut Record> {
    apps.iter_mut().find(|app| app.text("name").as_deref() == Some(name))
}

fn job_record(id: i64, payload: &JobState) -> Result<Record> {
    let mut value = serde_json::to_value(payload).context("serialize cron job payload")?;
    value["id"] = json!(id);
    Record::from_value(value).context("cron job payload is not a mapping")
}

impl JobBackend for StubBackend {
    fn find_job(&self, description: &str) -> Result<Option<Record>> {
        Ok(single_match(self.load()?.cronjobs, "description", description))
    }

    fn create_job(&self, payload: &JobState) -> Result<Record> {
        let mut state = self.load()?;
        let id = state.cronjobs.iter().filter_map(Record::id).max().unwrap_or(0) + 1;
        let job = job_record(id, payload)?;
        state.cronjobs.push(job.clone());
        self.save(&state)?;
        debug!(id, "stub created cron job");
        Ok(job)
    }

    fn update_job(&self, id: i64, payload: &JobState) -> Result<Record> {
        let mut state = self.load()?;
        let Some(slot) = state.cronjobs.iter_mut().find(|j| j.id() == Some(id)) else {
            bail!("Cron job with id {id} not found");
        };
        *slot = job_record(id, payload)?;
        let job = slot.clone();
        self.save(&state)?;
        Ok(job)
    }

    fn delete_job(&self, id: i64) -> Result<()> {
        let mut state = self.load()?;
        state.cronjobs.retain(|j| j.id() != Some(id));
        self.save(&state)
    }
}

impl AppBackend for StubBackend {
    fn find_app(&self, name: &str) -> Result<Option<Record>> {
        Ok(single_match(self.load()?.apps, "name", name))
    }

    fn create_app(&self, name: &str, compose: &Value) -> Result<Record> {
        let mut state = self.load()?;
        if find_named(&mut state.apps, name).is_some() {
            bail!("Application '{name}' already exists");
        }
        let app = Record::from_value(json!({
            "name": name,
            "custom_app": true,
            "version": DEFAULT_VERSION,
            "state": "DEPLOYING",
        }))
        .context("application record")?;
        state.apps.push(app.clone());
        self.save(&state)?;
        self.manifests.write_compose(name, DEFAULT_VERSION, compose)?;
        debug!(name, "stub created application");
        Ok(app)
    }

    fn update_app(&self, name: &str, compose: &Value) -> Result<Record> {
        let mut state = self.load()?;
        let Some(app) = find_named(&mut state.apps, name) else {
            bail!("Application '{name}' not found");
        };
        app.insert("state", json!("UPDATING"));
        let app = app.clone();
        let version = app.text("version").unwrap_or_else(|| DEFAULT_VERSION.to_owned());
        self.save(&state)?;
        self.manifests.write_compose(name, &version, compose)?;
        Ok(app)
    }

    fn delete_app(&self, name: &str) -> Result<()> {
        let mut state = self.load()?;
        state.apps.retain(|app| app.text("name").as_deref() != Some(name));
        self.save(&state)
    }

    fn stop_app(&self, name: &str) -> Result<Record> {
        self.set_app_state(name, "STOPPED")
    }

    fn start_app(&self, name: &str) -> Result<Record> {
        self.set_app_state(name, "DEPLOYING")
    }
}

//! In-memory backend and manifest store that record every mutation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};

use super::{single_match, AppBackend, JobBackend, ManifestStore};
use crate::error::ManifestError;
use crate::job::JobState;
use crate::record::Record;

/// A recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `create_job` for a description.
    CreateJob(String),
    /// `update_job` for an id.
    UpdateJob(i64),
    /// `delete_job` for an id.
    DeleteJob(i64),
    /// `create_app` for a name.
    CreateApp(String),
    /// `update_app` for a name.
    UpdateApp(String),
    /// `delete_app` for a name.
    DeleteApp(String),
    /// `stop_app` for a name.
    StopApp(String),
    /// `start_app` for a name.
    StartApp(String),
}

/// Fake management API plus manifest store.
#[derive(Debug, Default)]
pub struct FakeBackend {
    jobs: RefCell<Vec<Record>>,
    apps: RefCell<Vec<Record>>,
    manifests: RefCell<HashMap<(String, String), Value>>,
    calls: RefCell<Vec<Call>>,
    lookups: Cell<usize>,
    failure: RefCell<Option<String>>,
}

impl FakeBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cron job, assigning the next id; returns that id.
    pub fn add_job(&self, job: Value) -> i64 {
        let id = self.next_job_id();
        let mut record = to_record(job);
        record.insert("id", json!(id));
        self.jobs.borrow_mut().push(record);
        id
    }

    /// Seed a cron job exactly as given.
    pub fn add_job_raw(&self, job: Value) {
        self.jobs.borrow_mut().push(to_record(job));
    }

    /// Seed an application record.
    pub fn add_app(&self, app: Value) {
        self.apps.borrow_mut().push(to_record(app));
    }

    /// Seed the manifest of `name` at `version`.
    pub fn put_manifest(&self, name: &str, version: &str, compose: Value) {
        self.manifests
            .borrow_mut()
            .insert((name.to_owned(), version.to_owned()), compose);
    }

    /// Make every subsequent mutation fail with `msg`.
    pub fn fail_mutations(&self, msg: &str) {
        *self.failure.borrow_mut() = Some(msg.to_owned());
    }

    /// Mutations performed so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Number of `find_*` calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }

    fn next_job_id(&self) -> i64 {
        self.jobs.borrow().iter().filter_map(Record::id).max().unwrap_or(0) + 1
    }

    fn record(&self, call: Call) -> Result<()> {
        if let Some(msg) = self.failure.borrow().as_ref() {
            return Err(anyhow!(msg.clone()));
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }

    fn with_app<T>(&self, name: &str, f: impl FnOnce(&mut Record) -> T) -> Result<T> {
        let mut apps = self.apps.borrow_mut();
        let Some(app) = apps.iter_mut().find(|a| a.text("name").as_deref() == Some(name)) else {
            bail!("Application '{name}' not found");
        };
        Ok(f(app))
    }
}

fn to_record(value: Value) -> Record {
    Record::from_value(value).unwrap_or_default()
}

fn job_record(id: i64, payload: &JobState) -> Result<Record> {
    let mut value = serde_json::to_value(payload)?;
    value["id"] = json!(id);
    Ok(to_record(value))
}

impl JobBackend for FakeBackend {
    fn find_job(&self, description: &str) -> Result<Option<Record>> {
        self.lookups.set(self.lookups.get() + 1);
        Ok(single_match(self.jobs.borrow().clone(), "description", description))
    }

    fn create_job(&self, payload: &JobState) -> Result<Record> {
        self.record(Call::CreateJob(payload.description.clone().unwrap_or_default()))?;
        let job = job_record(self.next_job_id(), payload)?;
        self.jobs.borrow_mut().push(job.clone());
        Ok(job)
    }

    fn update_job(&self, id: i64, payload: &JobState) -> Result<Record> {
        self.record(Call::UpdateJob(id))?;
        let mut jobs = self.jobs.borrow_mut();
        let Some(slot) = jobs.iter_mut().find(|j| j.id() == Some(id)) else {
            bail!("Cron job with id {id} not found");
        };
        *slot = job_record(id, payload)?;
        Ok(slot.clone())
    }

    fn delete_job(&self, id: i64) -> Result<()> {
        self.record(Call::DeleteJob(id))?;
        self.jobs.borrow_mut().retain(|j| j.id() != Some(id));
        Ok(())
    }
}

impl AppBackend for FakeBackend {
    fn find_app(&self, name: &str) -> Result<Option<Record>> {
        self.lookups.set(self.lookups.get() + 1);
        Ok(single_match(self.apps.borrow().clone(), "name", name))
    }

    fn create_app(&self, name: &str, compose: &Value) -> Result<Record> {
        self.record(Call::CreateApp(name.to_owned()))?;
        let app = to_record(json!({
            "name": name, "version": "1", "custom_app": true, "state": "DEPLOYING"
        }));
        self.apps.borrow_mut().push(app.clone());
        self.put_manifest(name, "1", compose.clone());
        Ok(app)
    }

    fn update_app(&self, name: &str, compose: &Value) -> Result<Record> {
        self.record(Call::UpdateApp(name.to_owned()))?;
        let app = self.with_app(name, |app| {
            app.insert("state", json!("UPDATING"));
            app.clone()
        })?;
        let version = app.text("version").unwrap_or_default();
        self.put_manifest(name, &version, compose.clone());
        Ok(app)
    }

    fn delete_app(&self, name: &str) -> Result<()> {
        self.record(Call::DeleteApp(name.to_owned()))?;
        self.apps
            .borrow_mut()
            .retain(|a| a.text("name").as_deref() != Some(name));
        Ok(())
    }

    fn stop_app(&self, name: &str) -> Result<Record> {
        self.record(Call::StopApp(name.to_owned()))?;
        self.with_app(name, |app| {
            app.insert("state", json!("STOPPED"));
            app.clone()
        })
    }

    fn start_app(&self, name: &str) -> Result<Record> {
        self.record(Call::StartApp(name.to_owned()))?;
        self.with_app(name, |app| {
            app.insert("state", json!("RUNNING"));
            app.clone()
        })
    }
}

impl ManifestStore for FakeBackend {
    fn read_compose(&self, name: &str, version: &str) -> std::result::Result<Value, ManifestError> {
        self.manifests
            .borrow()
            .get(&(name.to_owned(), version.to_owned()))
            .cloned()
            .ok_or_else(|| ManifestError::Read {
                path: format!("{name}/versions/{version}/user_config.yaml").into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such manifest"),
            })
    }
}

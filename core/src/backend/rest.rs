use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::debug;

use super::{single_match, AppBackend, JobBackend};
use crate::cfg::Config;
use crate::job::JobState;
use crate::record::Record;

/// Backend speaking to the management REST API (`/api/v2.0`).
///
/// Application mutations run as remote jobs; each call blocks, polling the
/// job until it finishes, fails or times out.
pub struct RestBackend {
    client: Client,
    base: String,
    api_key: Option<String>,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl RestBackend {
    /// Build a client for `cfg.api_url`.
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base: format!("{}/api/v2.0", cfg.api_url.trim_end_matches('/')),
            api_key: cfg.api_key.clone(),
            poll_interval: Duration::from_millis(cfg.job_poll_interval_ms),
            job_timeout: Duration::from_secs(cfg.job_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    fn send(&self, req: RequestBuilder, method: &str) -> Result<Value> {
        let req = match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        };
        let response = req
            .send()
            .with_context(|| format!("{method}: request to management API failed"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("{method} failed with status {status}: {body}");
        }
        response
            .json::<Value>()
            .with_context(|| format!("{method}: failed to parse response"))
    }

    // The API answers job-based calls with the job id.
    fn wait(&self, job: Value, method: &str) -> Result<Value> {
        let id = job
            .as_i64()
            .with_context(|| format!("{method}: expected a job id, got {job}"))?;
        let deadline = Instant::now() + self.job_timeout;
        loop {
            let jobs = self.send(
                self.client.get(self.url(&format!("core/get_jobs?id={id}"))),
                "core.get_jobs",
            )?;
            let entry = jobs
                .as_array()
                .and_then(|all| all.first())
                .with_context(|| format!("{method}: job {id} not found"))?;
            match entry.get("state").and_then(Value::as_str) {
                Some("SUCCESS") => return Ok(entry.get("result").cloned().unwrap_or(Value::Null)),
                Some(state @ ("FAILED" | "ABORTED")) => {
                    let error = entry.get("error").and_then(Value::as_str).unwrap_or("no error reported");
                    bail!("{method} job {id} {state}: {error}");
                }
                state => debug!(id, ?state, "waiting for job"),
            }
            if Instant::now() >= deadline {
                bail!("{method} job {id} did not finish within {:?}", self.job_timeout);
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn list(&self, path: &str, method: &str) -> Result<Vec<Record>> {
        let value = self.send(self.client.get(self.url(path)), method)?;
        let Value::Array(items) = value else {
            bail!("{method}: expected a list, got {value}");
        };
        Ok(items.into_iter().filter_map(Record::from_value).collect())
    }

    // Use the job result when it is a record, otherwise re-read the app.
    fn app_after_job(&self, name: &str, result: Value, method: &str) -> Result<Record> {
        if let Some(record) = Record::from_value(result) {
            return Ok(record);
        }
        self.find_app(name)?
            .with_context(|| format!("{method}: application '{name}' not found after job"))
    }
}

fn to_record(value: Value, method: &str) -> Result<Record> {
    Record::from_value(value).with_context(|| format!("{method}: response is not a record"))
}

impl JobBackend for RestBackend {
    fn find_job(&self, description: &str) -> Result<Option<Record>> {
        Ok(single_match(self.list("cronjob", "cronjob.query")?, "description", description))
    }

    fn create_job(&self, payload: &JobState) -> Result<Record> {
        let value = self.send(self.client.post(self.url("cronjob")).json(payload), "cronjob.create")?;
        to_record(value, "cronjob.create")
    }

    fn update_job(&self, id: i64, payload: &JobState) -> Result<Record> {
        let value = self.send(
            self.client.put(self.url(&format!("cronjob/id/{id}"))).json(payload),
            "cronjob.update",
        )?;
        to_record(value, "cronjob.update")
    }

    fn delete_job(&self, id: i64) -> Result<()> {
        self.send(self.client.delete(self.url(&format!("cronjob/id/{id}"))), "cronjob.delete")?;
        Ok(())
    }
}

impl AppBackend for RestBackend {
    fn find_app(&self, name: &str) -> Result<Option<Record>> {
        Ok(single_match(self.list("app", "app.query")?, "name", name))
    }

    fn create_app(&self, name: &str, compose: &Value) -> Result<Record> {
        let body = json!({
            "app_name": name,
            "custom_app": true,
            "custom_compose_config": compose,
        });
        let job = self.send(self.client.post(self.url("app")).json(&body), "app.create")?;
        let result = self.wait(job, "app.create")?;
        self.app_after_job(name, result, "app.create")
    }

    fn update_app(&self, name: &str, compose: &Value) -> Result<Record> {
        let body = json!({ "custom_compose_config": compose });
        let job = self.send(
            self.client.put(self.url(&format!("app/id/{name}"))).json(&body),
            "app.update",
        )?;
        let result = self.wait(job, "app.update")?;
        self.app_after_job(name, result, "app.update")
    }

    fn delete_app(&self, name: &str) -> Result<()> {
        let job = self.send(self.client.delete(self.url(&format!("app/id/{name}"))), "app.delete")?;
        self.wait(job, "app.delete")?;
        Ok(())
    }

    fn stop_app(&self, name: &str) -> Result<Record> {
        let job = self.send(self.client.post(self.url("app/stop")).json(&name), "app.stop")?;
        let result = self.wait(job, "app.stop")?;
        self.app_after_job(name, result, "app.stop")
    }

    fn start_app(&self, name: &str) -> Result<Record> {
        let job = self.send(self.client.post(self.url("app/start")).json(&name), "app.start")?;
        let result = self.wait(job, "app.start")?;
        self.app_after_job(name, result, "app.start")
    }
}

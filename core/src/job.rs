use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::diff::Diff;
use crate::error::{Error, Result};
use crate::reconcile::Target;
use crate::record::{truthy, Record};
use crate::schedule::Schedule;

/// Account a cron job runs as when none is given.
pub const DEFAULT_USER: &str = "root";

/// Raw cron job parameters as supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobParams {
    /// Job description; unique on the node and used as the lookup key.
    pub name: String,
    /// Shell command. Required when `state` is `present`.
    #[serde(default)]
    pub command: Option<String>,
    /// Account running the job; falls back to `root`.
    #[serde(default)]
    pub user: Option<String>,
    /// Whether the job is enabled; defaults to `true`.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Sparse schedule; missing fields become `*`.
    #[serde(default)]
    pub schedule: Option<Map<String, Value>>,
    /// Requested lifecycle target.
    #[serde(default)]
    pub state: Target,
}

impl JobParams {
    /// Check the parameters against the requested target.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation("missing required argument: name"));
        }
        match self.state {
            Target::Present if self.command.is_none() => Err(Error::validation(
                "state is present but all of the following are missing: command",
            )),
            Target::Restarted => Err(Error::validation(
                "cron jobs support state present or absent, got restarted",
            )),
            _ => Ok(()),
        }
    }
}

/// Desired state of a cron job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    name: String,
    command: String,
    user: String,
    enabled: bool,
    schedule: Schedule,
}

impl JobSpec {
    /// Build the desired spec, applying the `user`/`enabled`/`schedule` defaults.
    pub fn from_params(params: &JobParams) -> Result<Self> {
        let command = params
            .command
            .clone()
            .ok_or_else(|| Error::validation("command is required to build a cron job"))?;
        let user = params
            .user
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_USER.to_owned());
        let schedule = match &params.schedule {
            Some(fields) => Schedule::from_mapping(fields),
            None => Schedule::default(),
        };
        Ok(Self {
            name: params.name.clone(),
            command,
            user,
            enabled: params.enabled.unwrap_or(true),
            schedule,
        })
    }

    /// Canonical projection; also the create/update payload.
    pub fn canonical(&self) -> JobState {
        JobState {
            description: Some(self.name.clone()),
            command: Some(self.command.clone()),
            user: Some(self.user.clone()),
            enabled: self.enabled,
            schedule: self.schedule.clone(),
        }
    }

    /// Whether an observed job already has exactly this configuration.
    pub fn matches(&self, observed: Option<&Record>) -> bool {
        extract_job_state(observed).is_some_and(|state| state == self.canonical())
    }

    /// Before/after view against an observed job.
    pub fn diff(&self, observed: Option<&Record>) -> Diff<JobState> {
        Diff::new(extract_job_state(observed), self.canonical())
    }
}

/// The comparable subset of a cron job.
///
/// Text fields are optional because an observed record may lack them; the
/// desired side always fills them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobState {
    /// Description (identity key).
    pub description: Option<String>,
    /// Shell command.
    pub command: Option<String>,
    /// Account running the job.
    pub user: Option<String>,
    /// Whether the job is enabled.
    pub enabled: bool,
    /// Normalized schedule.
    pub schedule: Schedule,
}

/// Project an observed cron job record down to its comparable fields.
pub fn extract_job_state(record: Option<&Record>) -> Option<JobState> {
    let record = record?;
    let text = |key: &str| record.get(key).and_then(Value::as_str).map(str::to_owned);
    Some(JobState {
        description: text("description"),
        command: text("command"),
        user: text("user"),
        enabled: record.get("enabled").map_or(true, truthy),
        schedule: Schedule::normalize(record.get("schedule")),
    })
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::app::{observed_compose, AppParams, AppSpec};
use crate::backend::{AppBackend, JobBackend, ManifestStore};
use crate::diff::Diff;
use crate::error::{Error, Result};
use crate::job::{JobParams, JobSpec, JobState};
use crate::record::Record;

/// Requested lifecycle target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Resource exists with the desired configuration.
    #[default]
    Present,
    /// Resource does not exist.
    Absent,
    /// Resource is stopped and started again, whatever its configuration.
    Restarted,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Present => "present",
            Target::Absent => "absent",
            Target::Restarted => "restarted",
        })
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "present" => Ok(Target::Present),
            "absent" => Ok(Target::Absent),
            "restarted" => Ok(Target::Restarted),
            other => Err(format!("unknown state '{other}' (expected present, absent or restarted)")),
        }
    }
}

/// Decision taken for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Nothing to do.
    None,
    /// Create the resource.
    Create,
    /// Update the resource in place.
    Update,
    /// Delete the resource.
    Delete,
    /// Stop then start the resource.
    Restart,
}

impl Action {
    /// Whether the action modifies the remote system.
    pub fn changed(self) -> bool {
        self != Action::None
    }
}

/// Kind of resource being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Scheduled job.
    CronJob,
    /// Containerized custom application.
    Application,
}

impl Kind {
    fn label(self) -> &'static str {
        match self {
            Kind::CronJob => "Cron job",
            Kind::Application => "Application",
        }
    }
}

/// Decide the action for `target` given whether the resource exists.
///
/// `matches` is only evaluated for `present` on an existing resource, so
/// expensive lookups (manifest reads) are skipped for every other case.
pub fn plan(
    kind: Kind,
    name: &str,
    target: Target,
    exists: bool,
    matches: impl FnOnce() -> Result<bool>,
) -> Result<Action> {
    let action = match (target, exists) {
        (Target::Absent, false) => Action::None,
        (Target::Absent, true) => Action::Delete,
        (Target::Present, false) => Action::Create,
        (Target::Present, true) => {
            if matches()? {
                Action::None
            } else {
                Action::Update
            }
        }
        (Target::Restarted, false) => {
            return Err(Error::precondition(format!(
                "{} '{name}' is absent; cannot restart",
                kind.label()
            )))
        }
        (Target::Restarted, true) => Action::Restart,
    };
    Ok(action)
}

/// Human-readable summary of a decision.
pub fn message(kind: Kind, name: &str, target: Target, action: Action, check_mode: bool) -> String {
    let label = kind.label();
    let verb = |done: &str| {
        if check_mode {
            format!("would be {done}")
        } else {
            format!("was {done}")
        }
    };
    let what = match action {
        Action::None if target == Target::Absent => "is already absent".to_owned(),
        Action::None => "is up to date".to_owned(),
        Action::Create => verb("created"),
        Action::Update => verb("updated"),
        Action::Delete => verb("removed"),
        Action::Restart => verb("restarted"),
    };
    format!("{label} '{name}' {what}")
}

/// What a reconciliation decided and did.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    /// Decision taken.
    pub action: Action,
    /// Whether the remote system was (or in check mode would be) modified.
    pub changed: bool,
    /// Target that was ensured.
    pub state: Target,
    /// Human-readable summary.
    pub message: String,
    /// Before/after view; only for `present`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff<T>>,
    /// Resource record after the action, if any.
    pub record: Option<Record>,
}

/// Drives one resource towards its desired state.
///
/// Stateless apart from the check-mode flag; every call fetches fresh
/// observed state. Two reconciliations of the same resource name must not run
/// concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    check_mode: bool,
}

impl Reconciler {
    /// A reconciler that applies its decisions.
    pub fn new() -> Self {
        Self::default()
    }

    /// A reconciler that only computes decisions and diffs.
    pub fn check_mode() -> Self {
        Self { check_mode: true }
    }

    /// Reconcile one cron job.
    pub fn reconcile_job<B>(&self, backend: &B, params: &JobParams) -> Result<Outcome<JobState>>
    where
        B: JobBackend + ?Sized,
    {
        params.validate()?;
        let name = params.name.as_str();
        let observed = backend.find_job(name).map_err(Error::Backend)?;
        debug!(name, exists = observed.is_some(), "cron job lookup");

        if params.state == Target::Absent {
            let action = plan(Kind::CronJob, name, Target::Absent, observed.is_some(), || Ok(false))?;
            if let Some(job) = &observed {
                self.mutate(Kind::CronJob, name, action, || backend.delete_job(job_id(name, job)?))?;
            }
            return Ok(self.outcome(Kind::CronJob, name, Target::Absent, action, None, observed));
        }

        let spec = JobSpec::from_params(params)?;
        let diff = spec.diff(observed.as_ref());
        let action = plan(Kind::CronJob, name, Target::Present, observed.is_some(), || {
            Ok(diff.converged())
        })?;

        let record = match (action, observed) {
            (Action::Create, _) => self.mutate(Kind::CronJob, name, action, || {
                backend.create_job(&spec.canonical())
            })?,
            (Action::Update, Some(job)) => self
                .mutate(Kind::CronJob, name, action, || {
                    backend.update_job(job_id(name, &job)?, &spec.canonical())
                })?
                .or(Some(job)),
            (_, observed) => observed,
        };
        Ok(self.outcome(Kind::CronJob, name, Target::Present, action, Some(diff), record))
    }

    /// Reconcile one custom application.
    pub fn reconcile_app<B, M>(
        &self,
        backend: &B,
        manifests: &M,
        params: &AppParams,
    ) -> Result<Outcome<Value>>
    where
        B: AppBackend + ?Sized,
        M: ManifestStore + ?Sized,
    {
        params.validate()?;
        let name = params.name.as_str();
        let observed = backend.find_app(name).map_err(Error::Backend)?;
        debug!(name, exists = observed.is_some(), "application lookup");

        if let Some(app) = &observed {
            if !app.is_custom_app() {
                return Err(Error::precondition(format!(
                    "Application with name '{name}' is not custom_app"
                )));
            }
        }
        // Mutations address the application by the name the backend reported.
        let remote_name = observed
            .as_ref()
            .and_then(|app| app.text("name"))
            .unwrap_or_else(|| name.to_owned());

        match params.state {
            Target::Absent => {
                let action = plan(Kind::Application, name, Target::Absent, observed.is_some(), || {
                    Ok(false)
                })?;
                if observed.is_some() {
                    self.mutate(Kind::Application, name, action, || backend.delete_app(&remote_name))?;
                }
                Ok(self.outcome(Kind::Application, name, Target::Absent, action, None, observed))
            }
            Target::Restarted => {
                let action = plan(Kind::Application, name, Target::Restarted, observed.is_some(), || {
                    Ok(false)
                })?;
                let restarted = self.mutate(Kind::Application, name, action, || {
                    backend.stop_app(&remote_name)?;
                    backend.start_app(&remote_name)
                })?;
                let record = restarted.or(observed);
                Ok(self.outcome(Kind::Application, name, Target::Restarted, action, None, record))
            }
            Target::Present => {
                let spec = AppSpec::from_params(params)?;
                let current = observed
                    .as_ref()
                    .map(|app| observed_compose(manifests, app))
                    .transpose()?;
                let diff = spec.diff(current);
                let action = plan(Kind::Application, name, Target::Present, observed.is_some(), || {
                    Ok(diff.converged())
                })?;
                let record = match action {
                    Action::Create => self.mutate(Kind::Application, name, action, || {
                        backend.create_app(name, spec.compose_config())
                    })?,
                    Action::Update => self
                        .mutate(Kind::Application, name, action, || {
                            backend.update_app(&remote_name, spec.compose_config())
                        })?
                        .or(observed),
                    _ => observed,
                };
                Ok(self.outcome(Kind::Application, name, Target::Present, action, Some(diff), record))
            }
        }
    }

    // Runs `call` unless in check mode; `None` when skipped.
    fn mutate<T>(
        &self,
        kind: Kind,
        name: &str,
        action: Action,
        call: impl FnOnce() -> anyhow::Result<T>,
    ) -> Result<Option<T>> {
        if self.check_mode {
            info!(kind = kind.label(), name, ?action, "check mode, skipping backend call");
            return Ok(None);
        }
        info!(kind = kind.label(), name, ?action, "applying");
        call().map(Some).map_err(Error::Backend)
    }

    fn outcome<T>(
        &self,
        kind: Kind,
        name: &str,
        target: Target,
        action: Action,
        diff: Option<Diff<T>>,
        record: Option<Record>,
    ) -> Outcome<T> {
        Outcome {
            action,
            changed: action.changed(),
            state: target,
            message: message(kind, name, target, action, self.check_mode),
            diff,
            record,
        }
    }
}

// Cron jobs are mutated by id; only read it when a call is about to be made.
fn job_id(name: &str, job: &Record) -> anyhow::Result<i64> {
    job.id()
        .ok_or_else(|| anyhow::anyhow!("cron job record for '{name}' has no numeric id"))
}

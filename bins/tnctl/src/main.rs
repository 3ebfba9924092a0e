use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tn_core::app::AppParams;
use tn_core::backend::{self, FsManifestStore};
use tn_core::cfg::{self, AppId, Config};
use tn_core::job::JobParams;
use tn_core::{logx, Outcome, Reconciler, Target};
use tracing::debug;

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: env!("CARGO_PKG_NAME"),
};

#[derive(Parser)]
#[command(name=env!("CARGO_PKG_NAME"), version, about="Reconcile TrueNAS SCALE cron jobs and custom apps")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Config file to use instead of the per-user config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Report what would change without calling any mutating API
    #[arg(long, global = true)]
    check: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ensure a cron job is present or absent
    Cronjob(CronjobArgs),
    /// Ensure a custom application is present, absent or restarted
    App(AppArgs),
}

#[derive(Args)]
struct CronjobArgs {
    /// YAML or JSON file with the job parameters
    #[arg(
        short,
        long,
        conflicts_with_all = ["name", "command", "user", "enabled", "minute", "hour", "dom", "month", "dow", "state"]
    )]
    file: Option<PathBuf>,
    /// Job description, unique on the node
    #[arg(long, required_unless_present = "file")]
    name: Option<String>,
    #[arg(long)]
    command: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    enabled: Option<bool>,
    #[arg(long)]
    minute: Option<String>,
    #[arg(long)]
    hour: Option<String>,
    #[arg(long)]
    dom: Option<String>,
    #[arg(long)]
    month: Option<String>,
    #[arg(long)]
    dow: Option<String>,
    /// Desired state [default: present]
    #[arg(long)]
    state: Option<Target>,
}

#[derive(Args)]
struct AppArgs {
    /// YAML or JSON file with the application parameters
    #[arg(short, long, conflicts_with_all = ["name", "compose", "state"])]
    file: Option<PathBuf>,
    /// Application instance name
    #[arg(long, required_unless_present = "file")]
    name: Option<String>,
    /// Compose configuration file (YAML or JSON)
    #[arg(long)]
    compose: Option<PathBuf>,
    /// Desired state [default: present]
    #[arg(long)]
    state: Option<Target>,
}

impl CronjobArgs {
    fn into_params(self) -> Result<JobParams> {
        if let Some(path) = &self.file {
            return read_doc(path);
        }
        let schedule: Map<String, Value> = [
            ("minute", self.minute),
            ("hour", self.hour),
            ("dom", self.dom),
            ("month", self.month),
            ("dow", self.dow),
        ]
        .into_iter()
        .filter_map(|(key, value)| Some((key.to_owned(), Value::String(value?))))
        .collect();
        Ok(JobParams {
            name: self.name.context("--name is required")?,
            command: self.command,
            user: self.user,
            enabled: self.enabled,
            schedule: (!schedule.is_empty()).then_some(schedule),
            state: self.state.unwrap_or_default(),
        })
    }
}

impl AppArgs {
    fn into_params(self) -> Result<AppParams> {
        if let Some(path) = &self.file {
            return read_doc(path);
        }
        let compose_config = self.compose.as_deref().map(read_doc::<Value>).transpose()?;
        Ok(AppParams {
            name: self.name.context("--name is required")?,
            compose_config,
            state: self.state.unwrap_or_default(),
        })
    }
}

// YAML is a superset of JSON, so one parser covers both.
fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let txt = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_yaml::from_str(&txt).with_context(|| format!("parse {}", path.display()))
}

/// Result document; the record is published under a kind-specific key.
fn document<T: Serialize>(outcome: &Outcome<T>, record_key: &str) -> Result<Value> {
    let mut doc = serde_json::to_value(outcome).context("serialize result")?;
    if let Value::Object(fields) = &mut doc {
        let record = fields.remove("record").unwrap_or(Value::Null);
        fields.insert(record_key.to_owned(), record);
    }
    Ok(doc)
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut cfg = match path {
        Some(path) => cfg::load_from(path)?,
        None => cfg::load_or_init(&APP)?,
    };
    cfg::apply_env(&mut cfg)?;
    Ok(cfg)
}

fn run(cli: Cli) -> Result<Value> {
    let cfg = load_config(cli.config.as_deref())?;
    let level = match cli.verbose { 0 => cfg.log_level.as_str(), 1 => "debug", _ => "trace" };
    logx::init(level);
    debug!(backend = ?cfg.backend, check = cli.check, "{} start", APP.application);

    let reconciler = if cli.check { Reconciler::check_mode() } else { Reconciler::new() };
    let backend = backend::connect(&cfg)?;

    match cli.cmd {
        Command::Cronjob(args) => {
            let params = args.into_params()?;
            let outcome = reconciler.reconcile_job(backend.as_ref(), &params)?;
            document(&outcome, "cronjob")
        }
        Command::App(args) => {
            let params = args.into_params()?;
            let manifests = FsManifestStore::new(&cfg.app_config_root);
            let outcome = reconciler.reconcile_app(backend.as_ref(), &manifests, &params)?;
            document(&outcome, "application")
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(doc) => {
            println!("{doc:#}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{:#}", json!({ "failed": true, "msg": format!("{err:#}") }));
            ExitCode::FAILURE
        }
    }
}

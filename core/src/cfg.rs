use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Identifier used to compute per-app configuration directories.
#[derive(Clone, Copy)]
pub struct AppId {
    /// Reverse-DNS style qualifier, e.g. `"com"`.
    pub qualifier: &'static str,
    /// Organization or vendor name, e.g. `"local"`.
    pub organization: &'static str,
    /// Application name, e.g. `"tnctl"`.
    pub application: &'static str,
}

/// Which implementation of the management API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The real management API over HTTP.
    #[default]
    Api,
    /// File-backed local stub.
    Stub,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "api" => Ok(BackendKind::Api),
            "stub" => Ok(BackendKind::Stub),
            other => anyhow::bail!("unknown backend '{other}' (expected api or stub)"),
        }
    }
}

/// Application configuration persisted to `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tracing level to use if `RUST_LOG` is not set (e.g. `"info"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend implementation.
    #[serde(default)]
    pub backend: BackendKind,
    /// Root of the per-application compose manifests.
    #[serde(default = "default_app_config_root")]
    pub app_config_root: PathBuf,
    /// State file of the stub backend.
    #[serde(default = "default_stub_state")]
    pub stub_state: PathBuf,
    /// Base URL of the management API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// API key sent as a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Delay between polls of a running remote job (ms).
    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,
    /// Give up on a remote job after this long (s).
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_log_level() -> String { "info".to_string() }
fn default_app_config_root() -> PathBuf { PathBuf::from("/mnt/.ix-apps/app_configs") }
fn default_stub_state() -> PathBuf { PathBuf::from("/tmp/truenas_stub_state.json") }
fn default_api_url() -> String { "http://localhost".to_string() }
fn default_job_poll_interval_ms() -> u64 { 1_000 }
fn default_job_timeout_secs() -> u64 { 600 }

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend: BackendKind::default(),
            app_config_root: default_app_config_root(),
            stub_state: default_stub_state(),
            api_url: default_api_url(),
            api_key: None,
            job_poll_interval_ms: default_job_poll_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

/// Return the configuration directory for this app, creating it if needed.
pub fn config_dir(app: &AppId) -> Result<PathBuf> {
    let pd = ProjectDirs::from(app.qualifier, app.organization, app.application)
        .ok_or_else(|| anyhow::anyhow!("failed to resolve ProjectDirs"))?;
    let dir = pd.config_dir().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("create config dir {}", dir.display()))?;
    Ok(dir)
}

/// Load `config.toml` from the app config dir or create a default one.
pub fn load_or_init(app: &AppId) -> Result<Config> {
    let dir = config_dir(app)?;
    let path = dir.join("config.toml");
    if path.exists() {
        load_from(&path)
    } else {
        let cfg = Config::default();
        save_config(&path, &cfg)?;
        Ok(cfg)
    }
}

/// Load an explicit config file; missing keys take their defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    let txt = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&txt).with_context(|| format!("parse {}", path.display()))
}

fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Apply the `TRUENAS_*` environment overrides.
pub fn apply_env(cfg: &mut Config) -> Result<()> {
    apply_overrides(cfg, |key| std::env::var(key).ok())
}

/// Apply overrides from `lookup` (an environment-like key/value source).
///
/// `TRUENAS_STUB_WORKSPACE` wins over `TRUENAS_STUB_STATE`.
pub fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(backend) = lookup("TRUENAS_CLIENT_BACKEND") {
        cfg.backend = backend.parse::<BackendKind>().context("TRUENAS_CLIENT_BACKEND")?;
    }
    if let Some(root) = lookup("TRUENAS_APP_CONFIG_ROOT") {
        cfg.app_config_root = PathBuf::from(root);
    }
    if let Some(workspace) = lookup("TRUENAS_STUB_WORKSPACE") {
        cfg.stub_state = PathBuf::from(workspace).join("state.json");
    } else if let Some(state) = lookup("TRUENAS_STUB_STATE") {
        cfg.stub_state = PathBuf::from(state);
    }
    if let Some(url) = lookup("TRUENAS_API_URL") {
        cfg.api_url = url;
    }
    if let Some(key) = lookup("TRUENAS_API_KEY") {
        cfg.api_key = Some(key);
    }
    Ok(())
}

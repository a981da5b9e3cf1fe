//! Locker configuration.
//!
//! Loaded from a JSON file (default `<config dir>/amp-lock/config.json`);
//! a missing default file means "use defaults". A few fields can be overridden
//! from the environment for CI use.
use crate::classify::{ClassifyPolicy, Classifier};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

pub const INVENTORY_URL_ENV: &str = "AMP_LOCK_INVENTORY_URL";
pub const KNIFE_COMMAND_ENV: &str = "AMP_LOCK_KNIFE_COMMAND";

const DEFAULT_INVENTORY_URL: &str = "http://localhost:5001";
const DEFAULT_FIRST_PARTY: &[&str] = &[
    "uc",
    "ult",
    "ultimate",
    "spade",
    "hardening",
    "logging",
    "monitoring",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    pub schema_version: u32,
    pub inventory_url: String,
    pub knife_command: String,
    #[serde(default)]
    pub knife_config: Option<PathBuf>,
    #[serde(default)]
    pub chef_repo: Option<PathBuf>,
    pub environments_dir: PathBuf,
    #[serde(default)]
    pub latest_allowlist: Option<PathBuf>,
    #[serde(default)]
    pub first_party_cookbooks: Vec<String>,
    #[serde(default)]
    pub classify_policy: ClassifyPolicy,
    pub automation_marker: String,
    pub throttle_ms: u64,
    pub timeout_ms: u64,
    #[serde(default)]
    pub publish: bool,
}

impl LockConfig {
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.classify_policy, self.first_party_cookbooks.iter().cloned())
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Build the config used when no file is present.
pub fn default_config() -> LockConfig {
    LockConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        inventory_url: DEFAULT_INVENTORY_URL.to_string(),
        knife_command: "knife".to_string(),
        knife_config: None,
        chef_repo: None,
        environments_dir: PathBuf::from("environments"),
        latest_allowlist: None,
        first_party_cookbooks: DEFAULT_FIRST_PARTY.iter().map(|s| s.to_string()).collect(),
        classify_policy: ClassifyPolicy::Exact,
        automation_marker: "chef".to_string(),
        throttle_ms: 100,
        timeout_ms: 30_000,
        publish: false,
    }
}

/// Render a pretty JSON config stub.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("amp-lock").join("config.json"))
}

/// Load, apply environment overrides and validate.
///
/// An explicit path must exist; the default path may be absent.
pub fn load_config(explicit: Option<&Path>) -> Result<LockConfig> {
    let mut config = match explicit {
        Some(path) => read_config(path)?,
        None => match default_config_path().filter(|path| path.is_file()) {
            Some(path) => read_config(&path)?,
            None => default_config(),
        },
    };
    apply_env_overrides(&mut config, |key| env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<LockConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: LockConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

fn apply_env_overrides(config: &mut LockConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(INVENTORY_URL_ENV).filter(|v| !v.trim().is_empty()) {
        config.inventory_url = url;
    }
    if let Some(command) = lookup(KNIFE_COMMAND_ENV).filter(|v| !v.trim().is_empty()) {
        config.knife_command = command;
    }
}

pub fn validate_config(config: &LockConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    let url = &config.inventory_url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(anyhow!("inventory_url must be an http(s) URL (got {url:?})"));
    }
    if config.knife_command.trim().is_empty() {
        return Err(anyhow!("knife_command must be non-empty"));
    }
    if config.environments_dir.as_os_str().is_empty() {
        return Err(anyhow!("environments_dir must be non-empty"));
    }
    if config.timeout_ms == 0 {
        return Err(anyhow!("timeout_ms must be positive"));
    }
    if config
        .first_party_cookbooks
        .iter()
        .any(|name| name.trim().is_empty())
    {
        return Err(anyhow!("first_party_cookbooks must not contain empty names"));
    }
    Ok(())
}

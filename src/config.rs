use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::EntityKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub refetch: RefetchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8083/api".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
        }
    }
}

fn default_session_path() -> PathBuf {
    PathBuf::from(".crm/session.json")
}
fn default_inactivity_timeout_secs() -> u64 {
    30 * 60
}

/// Which kinds discard the mutation response and reload the whole
/// collection instead. Kinds are named as in `EntityKind::as_str`.
#[derive(Debug, Deserialize, Clone)]
pub struct RefetchConfig {
    #[serde(default = "default_after_update")]
    pub after_update: Vec<String>,
    #[serde(default = "default_after_delete")]
    pub after_delete: Vec<String>,
}

impl Default for RefetchConfig {
    fn default() -> Self {
        Self {
            after_update: default_after_update(),
            after_delete: default_after_delete(),
        }
    }
}

fn default_after_update() -> Vec<String> {
    vec!["tasks".to_string()]
}
fn default_after_delete() -> Vec<String> {
    vec!["customers".to_string()]
}

impl RefetchConfig {
    pub fn refetch_after_update(&self, kind: EntityKind) -> bool {
        contains_kind(&self.after_update, kind)
    }

    pub fn refetch_after_delete(&self, kind: EntityKind) -> bool {
        contains_kind(&self.after_delete, kind)
    }
}

fn contains_kind(list: &[String], kind: EntityKind) -> bool {
    list.iter()
        .any(|s| s.parse::<EntityKind>().map(|k| k == kind).unwrap_or(false))
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    /// Built-in defaults, for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Upper bound for every duration setting: one year.
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

fn validate(config: &Config) -> Result<()> {
    let base = &config.api.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!("api.base_url must start with http:// or https:// (got '{}')", base);
    }
    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be > 0");
    }

    if config.cache.default_ttl_secs == 0 {
        anyhow::bail!("cache.default_ttl_secs must be > 0");
    }
    if config.cache.sweep_interval_secs == 0 {
        anyhow::bail!("cache.sweep_interval_secs must be > 0");
    }

    for (key, secs) in [
        ("api.timeout_secs", config.api.timeout_secs),
        ("cache.default_ttl_secs", config.cache.default_ttl_secs),
        ("cache.sweep_interval_secs", config.cache.sweep_interval_secs),
    ] {
        if secs > MAX_DURATION_SECS {
            anyhow::bail!("{} must be at most {} (one year), got {}", key, MAX_DURATION_SECS, secs);
        }
    }

    for (section, list) in [
        ("refetch.after_update", &config.refetch.after_update),
        ("refetch.after_delete", &config.refetch.after_delete),
    ] {
        for name in list {
            name.parse::<EntityKind>()
                .with_context(|| format!("Invalid entry in {}", section))?;
        }
    }

    Ok(())
}

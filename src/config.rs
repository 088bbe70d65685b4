use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "CHAN_CLIENT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    /// Scheme, host and port the client is served from. Links to any other
    /// origin are never intercepted.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_uploads_root")]
    pub uploads_root: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            uploads_root: default_uploads_root(),
        }
    }
}

fn default_origin() -> String {
    "http://localhost:8000".into()
}

fn default_uploads_root() -> String {
    "/uploads".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub relative_time: bool,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            relative_time: false,
        }
    }
}

fn default_lang() -> String {
    "en".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigationConfig {
    #[serde(default = "default_load_timeout", with = "humantime_serde")]
    pub load_timeout: Duration,
    /// Restore the previous page descriptor when loading or synchronizing
    /// the new page fails.
    #[serde(default = "default_rollback_on_failure")]
    pub rollback_on_failure: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            load_timeout: default_load_timeout(),
            rollback_on_failure: default_rollback_on_failure(),
        }
    }
}

fn default_load_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_rollback_on_failure() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.site.origin.is_empty() {
        base.site.origin = other.site.origin;
    }
    if !other.site.uploads_root.is_empty() {
        base.site.uploads_root = other.site.uploads_root;
    }

    if !other.ui.lang.is_empty() {
        base.ui.lang = other.ui.lang;
    }
    base.ui.relative_time = other.ui.relative_time;

    if !other.navigation.load_timeout.is_zero() {
        base.navigation.load_timeout = other.navigation.load_timeout;
    }
    base.navigation.rollback_on_failure = other.navigation.rollback_on_failure;

    if !other.log.filter.is_empty() {
        base.log.filter = other.log.filter;
    }

    base
}

// Environment values are applied on top of the merged file config, so only
// variables that are actually set override anything.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "site.origin" => cfg.site.origin = value,
        "site.uploads_root" => cfg.site.uploads_root = value,
        "ui.lang" => cfg.ui.lang = value,
        "ui.relative_time" => cfg.ui.relative_time = parse_flag(&value),
        "navigation.load_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.navigation.load_timeout = duration;
            }
        }
        "navigation.rollback_on_failure" => {
            cfg.navigation.rollback_on_failure = parse_flag(&value);
        }
        "log.filter" => cfg.log.filter = value,
        _ => {}
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True")
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chan-client").join("config.yaml"))
}

//! Shared configuration for patchbay tools.
//!
//! A TOML file at the platform config directory, overlaid with
//! `PATCHBAY_` environment variables, translated to
//! [`patchbay_core::MonitorConfig`]. The CLI layers its own flags on top.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use patchbay_core::MonitorConfig;
use patchbay_engine::SubscriptionFlags;

/// Prefix of environment overrides. Nested keys use `__`, e.g.
/// `PATCHBAY_MONITOR__POLL_INTERVAL=250ms`.
pub const ENV_PREFIX: &str = "PATCHBAY_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Config {
    /// Presentation defaults for the CLI.
    #[serde(default)]
    pub defaults: Defaults,

    /// Monitor tuning.
    #[serde(default)]
    pub monitor: MonitorSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// `[monitor]` table. Durations are human-readable (`"250ms"`, `"2s"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitorSection {
    /// Default scope for newly discovered devices.
    #[serde(default)]
    pub autosubscribe: FlagSetting,

    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_timeout: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    #[serde(default = "default_drain_budget")]
    pub drain_budget: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            autosubscribe: FlagSetting::default(),
            subscribe_timeout: default_subscribe_timeout(),
            poll_interval: default_poll_interval(),
            drain_budget: default_drain_budget(),
        }
    }
}

fn default_subscribe_timeout() -> String {
    humantime::format_duration(MonitorConfig::default().subscribe_timeout).to_string()
}
fn default_poll_interval() -> String {
    humantime::format_duration(MonitorConfig::default().poll_interval).to_string()
}
fn default_drain_budget() -> usize {
    MonitorConfig::default().drain_budget
}

/// A subscription mask written either as names (`"device|inputs"`,
/// `"all"`) or as a raw integer (`6`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FlagSetting {
    Mask(u32),
    Names(String),
}

impl Default for FlagSetting {
    fn default() -> Self {
        Self::Names("none".into())
    }
}

impl FlagSetting {
    pub fn resolve(&self) -> Result<SubscriptionFlags, ConfigError> {
        match self {
            Self::Mask(mask) => Ok(SubscriptionFlags::from_raw(*mask)),
            Self::Names(names) => names
                .parse()
                .map_err(|e| ConfigError::validation("monitor.autosubscribe", format!("{e}"))),
        }
    }
}

impl fmt::Display for FlagSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mask(mask) => write!(f, "{mask}"),
            Self::Names(names) => write!(f, "{names}"),
        }
    }
}

// ── Translation ─────────────────────────────────────────────────────

impl MonitorSection {
    /// Validate the section and build the runtime monitor settings.
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        if self.drain_budget == 0 {
            return Err(ConfigError::validation(
                "monitor.drain_budget",
                "must be at least 1",
            ));
        }
        Ok(MonitorConfig {
            autosubscribe: self.autosubscribe.resolve()?,
            subscribe_timeout: parse_duration("monitor.subscribe_timeout", &self.subscribe_timeout)?,
            poll_interval: parse_duration("monitor.poll_interval", &self.poll_interval)?,
            drain_budget: self.drain_budget,
        })
    }
}

impl Config {
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        self.monitor.to_monitor_config()
    }
}

fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| ConfigError::validation(field, format!("'{raw}': {e}")))
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "patchbay", "patchbay").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("patchbay");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, still honoring environment overrides.
/// A missing file contributes nothing.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is
/// unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_runtime_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.to_monitor_config().unwrap(), MonitorConfig::default());
        assert_eq!(cfg.monitor.poll_interval, "100ms");
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.defaults.output = "json".into();
        cfg.monitor.autosubscribe = FlagSetting::Names("device|inputs".into());
        cfg.monitor.poll_interval = "250ms".into();
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, cfg);

        let monitor = loaded.to_monitor_config().unwrap();
        assert_eq!(
            monitor.autosubscribe,
            SubscriptionFlags::DEVICE | SubscriptionFlags::DEVICE_INPUTS
        );
        assert_eq!(monitor.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn integer_masks_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[monitor]\nautosubscribe = 6\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.monitor.autosubscribe, FlagSetting::Mask(6));
        assert_eq!(
            loaded.to_monitor_config().unwrap().autosubscribe,
            SubscriptionFlags::DEVICE_SIGNALS
        );
    }

    #[test]
    fn environment_overrides_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[monitor]\ndrain_budget = 64\nsubscribe_timeout = \"5s\"\n",
            )?;
            jail.set_env("PATCHBAY_MONITOR__DRAIN_BUDGET", "8");
            jail.set_env("PATCHBAY_MONITOR__AUTOSUBSCRIBE", "all");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            let monitor = cfg.to_monitor_config().map_err(|e| e.to_string())?;
            assert_eq!(monitor.drain_budget, 8);
            assert_eq!(monitor.subscribe_timeout, Duration::from_secs(5));
            assert_eq!(monitor.autosubscribe, SubscriptionFlags::ALL);
            Ok(())
        });
    }

    #[test]
    fn bad_values_name_their_field() {
        let mut section = MonitorSection {
            poll_interval: "soon".into(),
            ..MonitorSection::default()
        };
        let err = section.to_monitor_config().unwrap_err();
        assert!(
            matches!(&err, ConfigError::Validation { field, .. } if field == "monitor.poll_interval"),
            "{err}"
        );

        section.poll_interval = "1s".into();
        section.autosubscribe = FlagSetting::Names("device,bogus".into());
        let err = section.to_monitor_config().unwrap_err();
        assert!(err.to_string().contains("bogus"), "{err}");

        section.autosubscribe = FlagSetting::default();
        section.drain_budget = 0;
        assert!(section.to_monitor_config().is_err());
    }
}

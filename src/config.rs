use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::maps::MapPaths;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_url")]
    pub db_url: String,

    #[serde(default = "default_check_interval")]
    pub check_interval_secs: f64,

    #[serde(default = "default_postfix_dir")]
    pub postfix_dir: PathBuf,

    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_postmap_bin")]
    pub postmap: PathBuf,
    #[serde(default = "default_postfix_bin")]
    pub postfix: PathBuf,
    #[serde(default = "default_postconf_bin")]
    pub postconf: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enable")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
}

/// Anything shorter turns the poll loop into a busy loop against the store.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

// Defaults
fn default_db_url() -> String {
    "sqlite:///var/lib/postfix-blocker/blocker.db".to_string()
}
fn default_check_interval() -> f64 {
    5.0
}
fn default_postfix_dir() -> PathBuf {
    PathBuf::from("/etc/postfix")
}
fn default_pid_file() -> PathBuf {
    PathBuf::from("/var/run/postfix-blocker/blocker.pid")
}
fn default_postmap_bin() -> PathBuf {
    PathBuf::from("/usr/sbin/postmap")
}
fn default_postfix_bin() -> PathBuf {
    PathBuf::from("/usr/sbin/postfix")
}
fn default_postconf_bin() -> PathBuf {
    PathBuf::from("/usr/sbin/postconf")
}
fn default_backoff_initial_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_stats_enable() -> bool {
    true
}
fn default_log_interval() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            check_interval_secs: default_check_interval(),
            postfix_dir: default_postfix_dir(),
            pid_file: default_pid_file(),
            commands: CommandConfig::default(),
            backoff: BackoffConfig::default(),
            logging: LoggingConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            postmap: default_postmap_bin(),
            postfix: default_postfix_bin(),
            postconf: default_postconf_bin(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

impl BackoffConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: default_stats_enable(),
            log_interval_seconds: default_log_interval(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }

    /// Defaults, then the TOML file named by `BLOCKER_CONFIG` (if any), then
    /// process environment variables.
    pub async fn from_env() -> Result<Self> {
        let mut config = match std::env::var("BLOCKER_CONFIG") {
            Ok(path) if Path::new(&path).exists() => Config::load(&path).await?,
            _ => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from environment-style key/value pairs.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BLOCKER_DB_URL") {
            self.db_url = v;
        }
        if let Some(v) = lookup("BLOCKER_INTERVAL") {
            self.check_interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("BLOCKER_INTERVAL is not a number: {v:?}"))?;
        }
        if let Some(v) = lookup("POSTFIX_DIR") {
            self.postfix_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BLOCKER_PID_FILE") {
            self.pid_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("BLOCKER_POSTMAP_BIN") {
            self.commands.postmap = PathBuf::from(v);
        }
        if let Some(v) = lookup("BLOCKER_POSTFIX_BIN") {
            self.commands.postfix = PathBuf::from(v);
        }
        if let Some(v) = lookup("BLOCKER_POSTCONF_BIN") {
            self.commands.postconf = PathBuf::from(v);
        }
        if let Some(v) = lookup("BLOCKER_LOG_LEVEL") {
            self.logging.level = v.to_lowercase();
        }
        if let Some(v) = lookup("BLOCKER_BACKOFF_INITIAL_MS") {
            self.backoff.initial_ms = parse_u64("BLOCKER_BACKOFF_INITIAL_MS", &v)?;
        }
        if let Some(v) = lookup("BLOCKER_BACKOFF_MAX_MS") {
            self.backoff.max_ms = parse_u64("BLOCKER_BACKOFF_MAX_MS", &v)?;
        }
        if let Some(v) = lookup("BLOCKER_STATS_INTERVAL") {
            self.stats.log_interval_seconds = parse_u64("BLOCKER_STATS_INTERVAL", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        match Duration::try_from_secs_f64(self.check_interval_secs) {
            Ok(d) if d >= MIN_CHECK_INTERVAL => {}
            Ok(_) => bail!(
                "check interval must be at least {}ms, got {}s",
                MIN_CHECK_INTERVAL.as_millis(),
                self.check_interval_secs
            ),
            Err(e) => bail!(
                "check interval is not a usable number of seconds ({}): {}",
                self.check_interval_secs,
                e
            ),
        }
        if self.backoff.initial_ms == 0 {
            bail!("initial backoff must be at least 1ms");
        }
        if self.backoff.initial_ms > self.backoff.max_ms {
            bail!(
                "initial backoff ({}ms) exceeds backoff ceiling ({}ms)",
                self.backoff.initial_ms,
                self.backoff.max_ms
            );
        }
        Ok(())
    }

    /// Poll interval, clamped into range for configs that skipped `validate`.
    pub fn check_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.check_interval_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_check_interval()))
            .max(MIN_CHECK_INTERVAL)
    }

    pub fn map_paths(&self) -> MapPaths {
        MapPaths::in_dir(&self.postfix_dir)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} is not a non-negative integer: {value:?}"))
}

//! Shared configuration for indisync tools.
//!
//! TOML settings merged with `INDISYNC_` environment variables, translated
//! into the runtime `SessionConfig` and `BridgeConfig`, plus the device
//! definition file format (see [`devices`]).

pub mod devices;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use indisync_bridge::{BridgeConfig, EventQueuePolicy};
use indisync_core::{BlobPolicy, CoreError, SessionConfig};

pub use devices::{DeviceDef, DeviceFile, MemberDef, VectorDef, load_devices, parse_devices};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("invalid device definition: {0}")]
    Device(#[from] CoreError),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

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
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub bridge: BridgeSection,

    /// Device definition file used when none is given on the command line.
    pub devices: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionSection {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,

    #[serde(default = "default_update_capacity")]
    pub update_capacity: usize,

    /// Seconds before a snoop without its own timeout fires `TimeOut`.
    pub snoop_timeout_secs: Option<f64>,

    #[serde(default)]
    pub peer_blob_policy: BlobPolicy,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            message_capacity: default_message_capacity(),
            update_capacity: default_update_capacity(),
            snoop_timeout_secs: None,
            peer_blob_policy: BlobPolicy::Never,
        }
    }
}

fn default_name() -> String {
    "indisync".into()
}
fn default_message_capacity() -> usize {
    SessionConfig::default().message_capacity
}
fn default_update_capacity() -> usize {
    SessionConfig::default().update_capacity
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BridgeSection {
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// `"bounded"` or `"latest"`.
    #[serde(default = "default_event_queue")]
    pub event_queue: String,

    /// Capacity of a bounded event queue; ignored for `"latest"`.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub blob_policy: BlobPolicy,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            command_capacity: default_command_capacity(),
            event_queue: default_event_queue(),
            event_capacity: default_event_capacity(),
            backoff_ms: default_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            blob_policy: BlobPolicy::Never,
        }
    }
}

fn default_command_capacity() -> usize {
    16
}
fn default_event_queue() -> String {
    "bounded".into()
}
fn default_event_capacity() -> usize {
    4
}
fn default_backoff_ms() -> u64 {
    20
}
fn default_poll_interval_ms() -> u64 {
    50
}

// ── Translation to runtime config ───────────────────────────────────

impl Config {
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let s = &self.session;
        if s.name.trim().is_empty() {
            return Err(ConfigError::validation("session.name", "must not be empty"));
        }
        if s.message_capacity == 0 {
            return Err(ConfigError::validation(
                "session.message_capacity",
                "must be at least 1",
            ));
        }
        if s.update_capacity == 0 {
            return Err(ConfigError::validation(
                "session.update_capacity",
                "must be at least 1",
            ));
        }
        let default_snoop_timeout = match s.snoop_timeout_secs {
            None => None,
            Some(secs) if secs > 0.0 => Some(Duration::try_from_secs_f64(secs).map_err(|_| {
                ConfigError::validation(
                    "session.snoop_timeout_secs",
                    format!("{secs} seconds is out of range"),
                )
            })?),
            Some(secs) => {
                return Err(ConfigError::validation(
                    "session.snoop_timeout_secs",
                    format!("expected a positive number of seconds, got {secs}"),
                ));
            }
        };

        Ok(SessionConfig {
            name: s.name.clone(),
            message_capacity: s.message_capacity,
            update_capacity: s.update_capacity,
            default_snoop_timeout,
            peer_blob_policy: s.peer_blob_policy,
        })
    }

    pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let b = &self.bridge;
        let event_queue = match b.event_queue.as_str() {
            "bounded" if b.event_capacity == 0 => {
                return Err(ConfigError::validation(
                    "bridge.event_capacity",
                    "a bounded queue needs a capacity of at least 1",
                ));
            }
            "bounded" => EventQueuePolicy::Bounded(b.event_capacity),
            "latest" => EventQueuePolicy::Latest,
            other => {
                return Err(ConfigError::validation(
                    "bridge.event_queue",
                    format!("expected 'bounded' or 'latest', got '{other}'"),
                ));
            }
        };
        if b.command_capacity == 0 {
            return Err(ConfigError::validation(
                "bridge.command_capacity",
                "must be at least 1",
            ));
        }
        if b.backoff_ms == 0 {
            return Err(ConfigError::validation("bridge.backoff_ms", "must be non-zero"));
        }
        if b.poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "bridge.poll_interval_ms",
                "must be non-zero",
            ));
        }

        Ok(BridgeConfig {
            command_capacity: b.command_capacity,
            event_queue,
            backoff: Duration::from_millis(b.backoff_ms),
            poll_interval: Duration::from_millis(b.poll_interval_ms),
            default_blob_policy: b.blob_policy,
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "indisync", "indisync").map_or_else(
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
    p.push("indisync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
///
/// `path` overrides the platform config path. A missing file is not an
/// error; defaults and environment still apply. Nested keys use a double
/// underscore: `INDISYNC_BRIDGE__EVENT_QUEUE=latest`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    tracing::debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("INDISYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Render a config as pretty TOML.
pub fn to_toml(cfg: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_toml(cfg)?)?;
    Ok(())
}

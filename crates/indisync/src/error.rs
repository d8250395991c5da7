//! CLI error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use indisync_bridge::BridgeError;
use indisync_config::ConfigError;
use indisync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const INVALID_DEFINITION: i32 = 3;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(indisync::validation))]
    Validation { field: String, reason: String },

    #[error("No device definition file given")]
    #[diagnostic(
        code(indisync::no_devices),
        help(
            "Pass a file path, or set `devices = \"...\"` in the config file.\n\
             Expected config at: {config_path}"
        )
    )]
    NoDevices { config_path: String },

    #[error("Invalid device definitions")]
    #[diagnostic(
        code(indisync::definition),
        help("Device, vector and member names must be unique; switch vectors must satisfy their rule.")
    )]
    Definition(#[source] CoreError),

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(indisync::config))]
    Config(ConfigError),

    // ── Session ──────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(indisync::bridge))]
    Bridge(#[from] BridgeError),

    #[error("Timed out after {millis}ms waiting for {what}")]
    #[diagnostic(code(indisync::timeout))]
    Timeout { what: String, millis: u64 },

    #[error("Driver thread failed: {reason}")]
    #[diagnostic(code(indisync::driver))]
    Driver { reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON rendering failed: {0}")]
    #[diagnostic(code(indisync::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::NoDevices { .. } => exit_code::USAGE,
            Self::Definition(_) => exit_code::INVALID_DEFINITION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Error mapping ────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Device(core) => Self::Definition(core),
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DuplicateIdentity { .. } | CoreError::RuleViolation { .. } => {
                Self::Definition(err)
            }
            other => Self::Bridge(BridgeError::Core(other)),
        }
    }
}

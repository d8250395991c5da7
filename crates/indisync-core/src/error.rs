// ── Core error types ──
//
// Only `DuplicateIdentity` is fatal, and only while a session is being
// assembled. Every other variant is absorbed by the session engine with a
// log line; callers of the store API still receive them so drivers and
// tests can tell an accepted write from a dropped one.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Identity errors ──────────────────────────────────────────────
    #[error("Duplicate identity: {what} '{name}' is already registered")]
    DuplicateIdentity { what: &'static str, name: String },

    #[error("Device not found: {device}")]
    UnknownDevice { device: String },

    #[error("Vector not found: {device}/{vector}")]
    UnknownVector { device: String, vector: String },

    #[error("Member not found: {vector}/{member}")]
    UnknownMember { vector: String, member: String },

    // ── Write validation errors ──────────────────────────────────────
    #[error("Permission violation: {device}/{vector} is read-only")]
    PermissionViolation { device: String, vector: String },

    #[error("Rule violation on {device}/{vector}: {reason}")]
    RuleViolation {
        device: String,
        vector: String,
        reason: String,
    },

    #[error("Invalid value for member {member}: {reason}")]
    InvalidValue { member: String, reason: String },

    #[error("Type mismatch for member {member}: expected {expected}, got {got}")]
    TypeMismatch {
        member: String,
        expected: String,
        got: String,
    },

    // ── Session errors ───────────────────────────────────────────────
    #[error("Transport lost: {reason}")]
    TransportLost { reason: String },

    #[error("Session closed")]
    SessionClosed,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Whether this error must abort session start-up.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicateIdentity { .. })
    }

    pub(crate) fn duplicate_device(name: &str) -> Self {
        Self::DuplicateIdentity {
            what: "device",
            name: name.to_owned(),
        }
    }

    pub(crate) fn unknown_vector(device: &str, vector: &str) -> Self {
        Self::UnknownVector {
            device: device.to_owned(),
            vector: vector.to_owned(),
        }
    }
}

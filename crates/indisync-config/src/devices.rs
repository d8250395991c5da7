//! Device definition files.
//!
//! A file lists devices, each with its vectors and members:
//!
//! ```toml
//! [[device]]
//! name = "board"
//!
//! [[device.vector]]
//! name = "switches"
//! kind = "switch"
//! rule = "AnyOfMany"
//!
//! [[device.vector.member]]
//! name = "member0"
//! value = "Off"
//! ```
//!
//! Loading enforces the same identity and switch-rule invariants the
//! property store checks at session assembly.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use indisync_core::{
    CoreError, Device, Member, MemberKind, Permission, PropertyState, SwitchRule, SwitchState,
    Vector, VectorKind, model::parse_number,
};

use crate::ConfigError;

// ── File format ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceFile {
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceDef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceDef {
    pub name: String,

    #[serde(default = "enabled")]
    pub enable: bool,

    #[serde(default, rename = "vector")]
    pub vectors: Vec<VectorDef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VectorDef {
    pub name: String,
    pub kind: MemberKind,
    pub label: Option<String>,
    pub group: Option<String>,
    /// Required for switch vectors, rejected for the rest.
    pub rule: Option<SwitchRule>,
    /// `ro`, `wo` or `rw`.
    pub perm: Option<Permission>,
    pub state: Option<PropertyState>,
    pub timeout: Option<f64>,

    #[serde(default = "enabled")]
    pub enable: bool,

    #[serde(default, rename = "member")]
    pub members: Vec<MemberDef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemberDef {
    pub name: String,
    pub label: Option<String>,
    /// Initial value; its meaning depends on the vector kind.
    pub value: Option<toml::Value>,
    /// printf-style format for number members.
    pub format: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

fn enabled() -> bool {
    true
}

// ── Loading ─────────────────────────────────────────────────────────

/// Read and convert a device definition file.
pub fn load_devices(path: &Path) -> Result<Vec<Device>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let devices = parse_devices(&text)?;
    tracing::debug!(path = %path.display(), devices = devices.len(), "device definitions loaded");
    Ok(devices)
}

/// Parse device definitions from TOML text.
pub fn parse_devices(text: &str) -> Result<Vec<Device>, ConfigError> {
    let file: DeviceFile = toml::from_str(text)?;
    file.into_devices()
}

impl DeviceFile {
    /// Convert to model devices, rejecting duplicate device names.
    pub fn into_devices(self) -> Result<Vec<Device>, ConfigError> {
        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(self.devices.len());
        for def in self.devices {
            if !seen.insert(def.name.clone()) {
                return Err(CoreError::DuplicateIdentity {
                    what: "device",
                    name: def.name,
                }
                .into());
            }
            devices.push(def.into_device()?);
        }
        Ok(devices)
    }
}

impl DeviceDef {
    pub fn into_device(self) -> Result<Device, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation("device.name", "must not be empty"));
        }
        let mut device = Device::new(&self.name);
        for def in self.vectors {
            let vector = def.into_vector(&self.name)?;
            device.add_vector(vector)?;
        }
        Ok(if self.enable { device } else { device.disabled() })
    }
}

impl VectorDef {
    fn into_vector(self, device: &str) -> Result<Vector, ConfigError> {
        let path = format!("{device}/{}", self.name);
        let kind = match (self.kind, self.rule) {
            (MemberKind::Switch, Some(rule)) => VectorKind::Switch(rule),
            (MemberKind::Switch, None) => {
                return Err(ConfigError::validation(
                    path,
                    "switch vectors need a rule (OneOfMany, AtMostOne or AnyOfMany)",
                ));
            }
            (_, Some(_)) => {
                return Err(ConfigError::validation(path, "only switch vectors take a rule"));
            }
            (MemberKind::Text, None) => VectorKind::Text,
            (MemberKind::Number, None) => VectorKind::Number,
            (MemberKind::Light, None) => VectorKind::Light,
            (MemberKind::Blob, None) => VectorKind::Blob,
        };

        let members = self
            .members
            .into_iter()
            .map(|m| m.into_member(self.kind, &path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut vector = Vector::new(&self.name, kind, members)?;
        if let Some(label) = self.label {
            vector = vector.with_label(label);
        }
        if let Some(group) = self.group {
            vector = vector.with_group(group);
        }
        if let Some(perm) = self.perm {
            vector = vector.with_perm(perm);
        }
        if let Some(state) = self.state {
            vector = vector.with_state(state);
        }
        if let Some(timeout) = self.timeout {
            if !timeout.is_finite() || timeout < 0.0 {
                return Err(ConfigError::validation(
                    format!("{path}.timeout"),
                    format!("expected a non-negative number, got {timeout}"),
                ));
            }
            vector = vector.with_timeout(timeout);
        }
        if !self.enable {
            vector = vector.disabled();
        }

        // Device is not bound yet; name the vector in the error ourselves.
        vector.validate_rule().map_err(|e| match e {
            CoreError::RuleViolation { reason, .. } => CoreError::RuleViolation {
                device: device.to_owned(),
                vector: self.name.clone(),
                reason,
            },
            other => other,
        })?;
        Ok(vector)
    }
}

impl MemberDef {
    fn into_member(self, kind: MemberKind, vector: &str) -> Result<Member, ConfigError> {
        let field = format!("{vector}/{}", self.name);
        let invalid = |reason: String| ConfigError::validation(field.clone(), reason);

        let member = match (kind, self.value) {
            (MemberKind::Switch, None) => Member::switch(&self.name, SwitchState::Off),
            (MemberKind::Switch, Some(toml::Value::String(s))) => {
                let state = SwitchState::from_str(&s)
                    .map_err(|_| invalid(format!("expected On or Off, got '{s}'")))?;
                Member::switch(&self.name, state)
            }
            (MemberKind::Text, None) => Member::text(&self.name, ""),
            (MemberKind::Text, Some(toml::Value::String(s))) => Member::text(&self.name, s),
            (MemberKind::Number, value) => {
                let number = match value {
                    None => 0.0,
                    Some(toml::Value::Float(f)) => f,
                    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
                    Some(toml::Value::Integer(i)) => i as f64,
                    Some(toml::Value::String(s)) => parse_number(&s)
                        .ok_or_else(|| invalid(format!("'{s}' is not a number")))?,
                    Some(other) => {
                        return Err(invalid(format!("expected a number, got {}", other.type_str())));
                    }
                };
                let format = self.format.as_deref().unwrap_or("%g");
                let member = Member::number(&self.name, number, format);
                if self.min.is_some() || self.max.is_some() || self.step.is_some() {
                    member.with_range(
                        self.min.unwrap_or_default(),
                        self.max.unwrap_or_default(),
                        self.step.unwrap_or_default(),
                    )
                } else {
                    member
                }
            }
            (MemberKind::Light, None) => Member::light(&self.name, PropertyState::Idle),
            (MemberKind::Light, Some(toml::Value::String(s))) => {
                let state = PropertyState::from_str(&s).map_err(|_| {
                    invalid(format!("expected Idle, Ok, Busy or Alert, got '{s}'"))
                })?;
                Member::light(&self.name, state)
            }
            (MemberKind::Blob, None) => Member::blob(&self.name),
            (MemberKind::Blob, Some(_)) => {
                return Err(invalid("BLOB members cannot carry an initial value".into()));
            }
            (_, Some(other)) => {
                return Err(invalid(format!(
                    "expected a string for a {kind} member, got {}",
                    other.type_str()
                )));
            }
        };

        Ok(match self.label {
            Some(label) => member.with_label(label),
            None => member,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"
[[device]]
name = "board"

[[device.vector]]
name = "switches"
kind = "switch"
rule = "OneOfMany"

[[device.vector.member]]
name = "a"
value = "On"

[[device.vector.member]]
name = "b"

[[device.vector]]
name = "temperature"
kind = "number"
perm = "ro"

[[device.vector.member]]
name = "celsius"
value = "12:30"
format = "%5.2f"
min = -40.0
max = 80.0
"#;

    #[test]
    fn parses_vectors_in_order() {
        let devices = parse_devices(BOARD).unwrap();
        assert_eq!(devices.len(), 1);
        let board = &devices[0];
        let names: Vec<_> = board.vectors().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["switches", "temperature"]);

        let temp = board.vector("temperature").unwrap();
        assert_eq!(temp.perm(), Permission::ReadOnly);
        let celsius = temp.member("celsius").unwrap().number_value().unwrap();
        assert_eq!(celsius.value, "12.50");
        assert!((celsius.max - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn one_of_many_needs_exactly_one_on() {
        let text = BOARD.replace(r#"value = "On""#, r#"value = "Off""#);
        let err = parse_devices(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Device(CoreError::RuleViolation { ref device, ref vector, .. })
                if device == "board" && vector == "switches"
        ));
    }

    #[test]
    fn switch_without_rule_is_rejected() {
        let text = BOARD.replace(r#"rule = "OneOfMany""#, "");
        assert!(matches!(
            parse_devices(&text),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let twice = format!("{BOARD}\n[[device]]\nname = \"board\"\n");
        assert!(matches!(
            parse_devices(&twice),
            Err(ConfigError::Device(CoreError::DuplicateIdentity { what: "device", .. }))
        ));

        let members = r#"
[[device]]
name = "cam"
[[device.vector]]
name = "exposure"
kind = "number"
[[device.vector.member]]
name = "seconds"
[[device.vector.member]]
name = "seconds"
"#;
        assert!(matches!(
            parse_devices(members),
            Err(ConfigError::Device(CoreError::DuplicateIdentity { what: "member", .. }))
        ));
    }

    #[test]
    fn blob_members_take_no_value() {
        let text = r#"
[[device]]
name = "cam"
[[device.vector]]
name = "image"
kind = "blob"
[[device.vector.member]]
name = "frame"
value = "x"
"#;
        assert!(matches!(
            parse_devices(text),
            Err(ConfigError::Validation { ref field, .. }) if field == "cam/image/frame"
        ));
    }
}

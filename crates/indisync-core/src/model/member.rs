// ── Member domain types ──
//
// A member is a single typed value slot inside a vector. The value's
// variant is fixed at construction; every setter checks it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::number::{format_number, parse_number};
use crate::error::CoreError;

/// Switch member value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// State shared by vectors and light members.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum PropertyState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

/// Discriminant of a member (and vector) value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Switch,
    Text,
    Number,
    Light,
    Blob,
}

/// Number value with its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberValue {
    /// String-encoded decimal or sexagesimal value, as sent on the wire.
    pub value: String,
    /// printf-style format, e.g. `%3.1f` or `%9.6m`.
    pub format: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl NumberValue {
    pub fn as_f64(&self) -> Option<f64> {
        parse_number(&self.value)
    }

    /// The value rendered with this number's format.
    pub fn formatted(&self) -> Option<String> {
        self.as_f64().map(|v| format_number(v, &self.format))
    }
}

/// Binary payload with its declared size and format extension.
///
/// The payload is delivered whole; partial transfers are not modelled.
/// Serialization exports only the metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobValue {
    #[serde(skip)]
    pub data: Bytes,
    pub size: usize,
    /// File extension tag such as `.fits` or `.csv`.
    pub format: String,
}

impl BlobValue {
    pub fn new(data: impl Into<Bytes>, format: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            size: data.len(),
            data,
            format: format.into(),
        }
    }

    pub fn sizeformat(&self) -> (usize, &str) {
        (self.size, &self.format)
    }
}

/// Current value of a member, one variant per member type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MemberValue {
    Switch(SwitchState),
    Text(String),
    Number(NumberValue),
    Light(PropertyState),
    Blob(BlobValue),
}

impl MemberValue {
    pub fn kind(&self) -> MemberKind {
        match self {
            Self::Switch(_) => MemberKind::Switch,
            Self::Text(_) => MemberKind::Text,
            Self::Number(_) => MemberKind::Number,
            Self::Light(_) => MemberKind::Light,
            Self::Blob(_) => MemberKind::Blob,
        }
    }
}

/// A value submitted for a member by a client or a driver command.
///
/// Submissions are untyped until they meet the member they target:
/// switch, text, number and light members take text, BLOB members take
/// bytes plus a format extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberInput {
    Text(String),
    Blob { data: Bytes, format: String },
}

impl MemberInput {
    pub fn blob(data: impl Into<Bytes>, format: impl Into<String>) -> Self {
        Self::Blob {
            data: data.into(),
            format: format.into(),
        }
    }
}

impl From<&str> for MemberInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for MemberInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<SwitchState> for MemberInput {
    fn from(s: SwitchState) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for MemberInput {
    fn from(v: f64) -> Self {
        Self::Text(v.to_string())
    }
}

/// A single named value slot within a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub label: String,
    value: MemberValue,
}

impl Member {
    fn new(name: impl Into<String>, value: MemberValue) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            value,
        }
    }

    pub fn switch(name: impl Into<String>, state: SwitchState) -> Self {
        Self::new(name, MemberValue::Switch(state))
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, MemberValue::Text(text.into()))
    }

    /// A number member with an unbounded range and no step.
    pub fn number(name: impl Into<String>, value: f64, format: impl Into<String>) -> Self {
        let format = format.into();
        Self::new(
            name,
            MemberValue::Number(NumberValue {
                value: format_number(value, &format),
                format,
                min: 0.0,
                max: 0.0,
                step: 0.0,
            }),
        )
    }

    pub fn light(name: impl Into<String>, state: PropertyState) -> Self {
        Self::new(name, MemberValue::Light(state))
    }

    /// An empty BLOB member.
    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, MemberValue::Blob(BlobValue::default()))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set min/max/step on a number member; no-op for other kinds.
    pub fn with_range(mut self, min: f64, max: f64, step: f64) -> Self {
        if let MemberValue::Number(n) = &mut self.value {
            n.min = min;
            n.max = max;
            n.step = step;
        }
        self
    }

    pub fn kind(&self) -> MemberKind {
        self.value.kind()
    }

    pub fn value(&self) -> &MemberValue {
        &self.value
    }

    pub fn switch_state(&self) -> Option<SwitchState> {
        match self.value {
            MemberValue::Switch(s) => Some(s),
            _ => None,
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            MemberValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn number_value(&self) -> Option<&NumberValue> {
        match &self.value {
            MemberValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn light_state(&self) -> Option<PropertyState> {
        match self.value {
            MemberValue::Light(s) => Some(s),
            _ => None,
        }
    }

    pub fn blob_value(&self) -> Option<&BlobValue> {
        match &self.value {
            MemberValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Replace the value, refusing a change of variant.
    pub fn set_value(&mut self, value: MemberValue) -> Result<(), CoreError> {
        if value.kind() != self.kind() {
            return Err(CoreError::TypeMismatch {
                member: self.name.clone(),
                expected: self.kind().to_string(),
                got: value.kind().to_string(),
            });
        }
        // Number metadata stays with the member; only the value string moves.
        match (&mut self.value, value) {
            (MemberValue::Number(current), MemberValue::Number(incoming)) => {
                current.value = incoming.value;
            }
            (slot, incoming) => *slot = incoming,
        }
        Ok(())
    }

    /// Set a number member from a float, rendered with its format.
    pub fn set_number(&mut self, value: f64) -> Result<(), CoreError> {
        match &mut self.value {
            MemberValue::Number(n) => {
                n.value = format_number(value, &n.format);
                Ok(())
            }
            other => Err(CoreError::TypeMismatch {
                member: self.name.clone(),
                expected: MemberKind::Number.to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    /// Convert a submitted value into this member's variant.
    pub fn parse_input(&self, input: &MemberInput) -> Result<MemberValue, CoreError> {
        let invalid = |reason: String| CoreError::InvalidValue {
            member: self.name.clone(),
            reason,
        };
        match (&self.value, input) {
            (MemberValue::Switch(_), MemberInput::Text(t)) => t
                .trim()
                .parse::<SwitchState>()
                .map(MemberValue::Switch)
                .map_err(|_| invalid(format!("'{t}' is not On or Off"))),
            (MemberValue::Text(_), MemberInput::Text(t)) => Ok(MemberValue::Text(t.clone())),
            (MemberValue::Number(n), MemberInput::Text(t)) => {
                if parse_number(t).is_none() {
                    return Err(invalid(format!("'{t}' is not a number")));
                }
                Ok(MemberValue::Number(NumberValue {
                    value: t.trim().to_owned(),
                    ..n.clone()
                }))
            }
            (MemberValue::Light(_), MemberInput::Text(t)) => t
                .trim()
                .parse::<PropertyState>()
                .map(MemberValue::Light)
                .map_err(|_| invalid(format!("'{t}' is not a light state"))),
            (MemberValue::Blob(_), MemberInput::Blob { data, format }) => {
                Ok(MemberValue::Blob(BlobValue::new(data.clone(), format.clone())))
            }
            (MemberValue::Blob(_), MemberInput::Text(_)) => {
                Err(invalid("BLOB members take binary payloads".into()))
            }
            (_, MemberInput::Blob { .. }) => {
                Err(invalid("binary payload sent to a non-BLOB member".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_value_rejects_kind_change() {
        let mut m = Member::switch("led", SwitchState::Off);
        let err = m.set_value(MemberValue::Text("on".into())).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
        assert_eq!(m.switch_state(), Some(SwitchState::Off));
    }

    #[test]
    fn number_keeps_metadata_on_set() {
        let mut m = Member::number("temp", 20.0, "%3.1f").with_range(-50.0, 99.0, 0.0);
        assert_eq!(m.number_value().map(|n| n.value.as_str()), Some("20.0"));

        m.set_number(21.36).unwrap();
        let n = m.number_value().unwrap();
        assert_eq!(n.value, "21.4");
        assert!((n.min + 50.0).abs() < f64::EPSILON);
        assert_eq!(n.format, "%3.1f");
    }

    #[test]
    fn parse_input_validates_per_kind() {
        let switch = Member::switch("s", SwitchState::Off);
        assert_eq!(
            switch.parse_input(&"On".into()).unwrap(),
            MemberValue::Switch(SwitchState::On)
        );
        assert!(switch.parse_input(&"maybe".into()).is_err());

        let number = Member::number("n", 0.0, "%d");
        assert!(number.parse_input(&"12:30".into()).is_ok());
        assert!(number.parse_input(&"twelve".into()).is_err());

        let blob = Member::blob("b");
        let parsed = blob
            .parse_input(&MemberInput::blob(vec![1u8, 2, 3], ".bin"))
            .unwrap();
        match parsed {
            MemberValue::Blob(b) => assert_eq!(b.sizeformat(), (3, ".bin")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(blob.parse_input(&"text".into()).is_err());
    }
}

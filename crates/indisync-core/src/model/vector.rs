// ── Vector domain types ──
//
// A vector is an ordered, named group of members sharing permission,
// state, group and enable lifecycle. Switch vectors additionally carry a
// rule constraining how many members may be On.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::member::{
    Member, MemberInput, MemberKind, MemberValue, PropertyState, SwitchState,
};
use crate::error::CoreError;

/// Client access to a vector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum Permission {
    #[strum(serialize = "ro")]
    #[serde(rename = "ro")]
    ReadOnly,
    #[strum(serialize = "wo")]
    #[serde(rename = "wo")]
    WriteOnly,
    #[strum(serialize = "rw")]
    #[serde(rename = "rw")]
    ReadWrite,
}

impl Permission {
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Cardinality constraint on the On members of a switch vector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum SwitchRule {
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

/// Vector type; every member of a vector has the matching member kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rule", rename_all = "lowercase")]
pub enum VectorKind {
    Switch(SwitchRule),
    Text,
    Number,
    Light,
    Blob,
}

impl VectorKind {
    pub fn member_kind(self) -> MemberKind {
        match self {
            Self::Switch(_) => MemberKind::Switch,
            Self::Text => MemberKind::Text,
            Self::Number => MemberKind::Number,
            Self::Light => MemberKind::Light,
            Self::Blob => MemberKind::Blob,
        }
    }

    pub fn rule(self) -> Option<SwitchRule> {
        match self {
            Self::Switch(rule) => Some(rule),
            _ => None,
        }
    }
}

/// A named, ordered collection of members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vector {
    /// Owning device; set when the vector is added to a [`Device`](super::Device).
    pub device: String,
    pub name: String,
    pub label: String,
    pub group: String,
    perm: Permission,
    pub state: PropertyState,
    /// Advisory timeout in seconds.
    pub timeout: f64,
    pub enable: bool,
    kind: VectorKind,
    /// Message sent with the last update or definition.
    pub message: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    members: IndexMap<String, Member>,
}

impl Vector {
    /// Build a vector, checking member-name uniqueness and member kinds.
    ///
    /// Light vectors are always read-only. Switch cardinality is not
    /// checked here; see [`validate_rule`](Self::validate_rule).
    pub fn new(
        name: impl Into<String>,
        kind: VectorKind,
        members: Vec<Member>,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        let mut map = IndexMap::with_capacity(members.len());
        for member in members {
            if member.kind() != kind.member_kind() {
                return Err(CoreError::TypeMismatch {
                    member: member.name.clone(),
                    expected: kind.member_kind().to_string(),
                    got: member.kind().to_string(),
                });
            }
            if map.contains_key(&member.name) {
                return Err(CoreError::DuplicateIdentity {
                    what: "member",
                    name: format!("{name}/{}", member.name),
                });
            }
            map.insert(member.name.clone(), member);
        }
        Ok(Self {
            device: String::new(),
            label: name.clone(),
            name,
            group: String::new(),
            perm: if kind == VectorKind::Light {
                Permission::ReadOnly
            } else {
                Permission::ReadWrite
            },
            state: PropertyState::Idle,
            timeout: 0.0,
            enable: true,
            kind,
            message: None,
            timestamp: None,
            members: map,
        })
    }

    pub fn switch(
        name: impl Into<String>,
        rule: SwitchRule,
        members: Vec<Member>,
    ) -> Result<Self, CoreError> {
        Self::new(name, VectorKind::Switch(rule), members)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_perm(mut self, perm: Permission) -> Self {
        self.set_perm(perm);
        self
    }

    pub fn with_state(mut self, state: PropertyState) -> Self {
        self.state = state;
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Start withdrawn from client view.
    pub fn disabled(mut self) -> Self {
        self.enable = false;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn perm(&self) -> Permission {
        self.perm
    }

    pub fn set_perm(&mut self, perm: Permission) {
        if self.kind != VectorKind::Light {
            self.perm = perm;
        }
    }

    pub fn kind(&self) -> VectorKind {
        self.kind
    }

    pub fn is_blob(&self) -> bool {
        self.kind == VectorKind::Blob
    }

    /// Members in definition order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of switch members currently On.
    pub fn on_count(&self) -> usize {
        self.members()
            .filter(|m| m.switch_state() == Some(SwitchState::On))
            .count()
    }

    // ── Direct setters (driver side) ─────────────────────────────────

    fn member_mut(&mut self, name: &str) -> Result<&mut Member, CoreError> {
        self.members
            .get_mut(name)
            .ok_or_else(|| CoreError::UnknownMember {
                vector: self.name.clone(),
                member: name.to_owned(),
            })
    }

    /// Replace a member value; the variant must match.
    pub fn set(&mut self, member: &str, value: MemberValue) -> Result<(), CoreError> {
        self.member_mut(member)?.set_value(value)
    }

    pub fn set_switch(&mut self, member: &str, state: SwitchState) -> Result<(), CoreError> {
        self.set(member, MemberValue::Switch(state))
    }

    pub fn set_text(&mut self, member: &str, text: impl Into<String>) -> Result<(), CoreError> {
        self.set(member, MemberValue::Text(text.into()))
    }

    pub fn set_number(&mut self, member: &str, value: f64) -> Result<(), CoreError> {
        self.member_mut(member)?.set_number(value)
    }

    pub fn set_light(&mut self, member: &str, state: PropertyState) -> Result<(), CoreError> {
        self.set(member, MemberValue::Light(state))
    }

    pub fn set_blob(
        &mut self,
        member: &str,
        data: impl Into<bytes::Bytes>,
        format: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.set(
            member,
            MemberValue::Blob(super::member::BlobValue::new(data, format)),
        )
    }

    // ── Submission handling ──────────────────────────────────────────

    /// Check the switch rule against the current member values.
    pub fn validate_rule(&self) -> Result<(), CoreError> {
        let on = self.on_count();
        match self.kind.rule() {
            Some(SwitchRule::OneOfMany) if on != 1 => {
                Err(self.rule_violation(format!("OneOfMany requires exactly one On, found {on}")))
            }
            Some(SwitchRule::AtMostOne) if on > 1 => {
                Err(self.rule_violation(format!("AtMostOne allows at most one On, found {on}")))
            }
            _ => Ok(()),
        }
    }

    fn rule_violation(&self, reason: String) -> CoreError {
        CoreError::RuleViolation {
            device: self.device.clone(),
            vector: self.name.clone(),
            reason,
        }
    }

    /// Derive the member assignments a submission results in.
    ///
    /// Unknown member names are skipped. For `OneOfMany` and `AtMostOne`
    /// a single submitted On becomes the sole On member; more than one
    /// submitted On, or a result leaving a `OneOfMany` vector without
    /// exactly one On, is a rule violation. `AnyOfMany` and non-switch
    /// vectors take the submission verbatim.
    pub fn resolve_submission(
        &self,
        values: &IndexMap<String, MemberInput>,
    ) -> Result<Vec<(String, MemberValue)>, CoreError> {
        let mut parsed = Vec::with_capacity(values.len());
        for (name, input) in values {
            let Some(member) = self.member(name) else {
                debug!(vector = %self.name, member = %name, "ignoring unknown member");
                continue;
            };
            parsed.push((name.clone(), member.parse_input(input)?));
        }

        let Some(rule) = self.kind.rule() else {
            return Ok(parsed);
        };
        if rule == SwitchRule::AnyOfMany {
            return Ok(parsed);
        }

        let selected: Vec<&str> = parsed
            .iter()
            .filter(|(_, v)| *v == MemberValue::Switch(SwitchState::On))
            .map(|(n, _)| n.as_str())
            .collect();

        match selected.as_slice() {
            [] => {
                let remaining_on = self
                    .members()
                    .filter(|m| m.switch_state() == Some(SwitchState::On))
                    .filter(|m| !parsed.iter().any(|(n, _)| *n == m.name))
                    .count();
                if rule == SwitchRule::OneOfMany && remaining_on != 1 {
                    return Err(self.rule_violation(format!(
                        "submission leaves {remaining_on} members On"
                    )));
                }
                Ok(parsed)
            }
            [chosen] => Ok(self
                .members()
                .map(|m| {
                    let state = if m.name == *chosen {
                        SwitchState::On
                    } else {
                        SwitchState::Off
                    };
                    (m.name.clone(), MemberValue::Switch(state))
                })
                .collect()),
            many => Err(self.rule_violation(format!(
                "{rule} accepts one On member, {} submitted",
                many.len()
            ))),
        }
    }

    /// Apply previously resolved assignments.
    pub fn apply(&mut self, changes: Vec<(String, MemberValue)>) -> Result<(), CoreError> {
        for (name, value) in changes {
            self.set(&name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn switches(rule: SwitchRule, on: &[usize]) -> Vector {
        let members = (0..5)
            .map(|i| {
                let state = if on.contains(&i) {
                    SwitchState::On
                } else {
                    SwitchState::Off
                };
                Member::switch(format!("member{i}"), state)
            })
            .collect();
        Vector::switch("switches", rule, members).unwrap()
    }

    fn submit(v: &mut Vector, values: &[(&str, &str)]) -> Result<(), CoreError> {
        let map: IndexMap<String, MemberInput> = values
            .iter()
            .map(|(k, v)| ((*k).to_owned(), MemberInput::from(*v)))
            .collect();
        let changes = v.resolve_submission(&map)?;
        v.apply(changes)
    }

    fn on_members(v: &Vector) -> Vec<&str> {
        v.members()
            .filter(|m| m.switch_state() == Some(SwitchState::On))
            .map(|m| m.name.as_str())
            .collect()
    }

    #[test]
    fn rejects_duplicate_member_names() {
        let err = Vector::new(
            "v",
            VectorKind::Text,
            vec![Member::text("a", ""), Member::text("a", "")],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateIdentity { what: "member", .. }));
    }

    #[test]
    fn rejects_mismatched_member_kind() {
        let err = Vector::new("v", VectorKind::Number, vec![Member::text("a", "")]).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn light_vectors_stay_read_only() {
        let v = Vector::new("l", VectorKind::Light, vec![])
            .unwrap()
            .with_perm(Permission::ReadWrite);
        assert_eq!(v.perm(), Permission::ReadOnly);
    }

    #[test]
    fn one_of_many_moves_selection() {
        let mut v = switches(SwitchRule::OneOfMany, &[0]);
        submit(&mut v, &[("member3", "On")]).unwrap();
        assert_eq!(on_members(&v), ["member3"]);
    }

    #[test]
    fn one_of_many_rejects_two_on_and_zero_on() {
        let mut v = switches(SwitchRule::OneOfMany, &[0]);
        assert!(submit(&mut v, &[("member1", "On"), ("member2", "On")]).is_err());
        assert!(submit(&mut v, &[("member0", "Off")]).is_err());
        assert_eq!(on_members(&v), ["member0"]);
    }

    #[test]
    fn at_most_one_allows_clearing() {
        let mut v = switches(SwitchRule::AtMostOne, &[]);
        submit(&mut v, &[("member2", "On")]).unwrap();
        submit(&mut v, &[("member4", "On")]).unwrap();
        assert_eq!(on_members(&v), ["member4"]);
        submit(&mut v, &[("member4", "Off")]).unwrap();
        assert!(on_members(&v).is_empty());
        assert!(submit(&mut v, &[("member0", "On"), ("member1", "On")]).is_err());
    }

    #[test]
    fn any_of_many_applies_verbatim() {
        let mut v = switches(SwitchRule::AnyOfMany, &[]);
        submit(&mut v, &[("member1", "On"), ("member3", "On")]).unwrap();
        assert_eq!(on_members(&v), ["member1", "member3"]);
    }

    #[test]
    fn unknown_members_are_skipped() {
        let mut v = switches(SwitchRule::AnyOfMany, &[]);
        submit(&mut v, &[("nope", "On"), ("member0", "On")]).unwrap();
        assert_eq!(on_members(&v), ["member0"]);
    }

    #[test]
    fn validate_rule_checks_cardinality() {
        assert!(switches(SwitchRule::OneOfMany, &[]).validate_rule().is_err());
        assert!(switches(SwitchRule::AtMostOne, &[1, 2]).validate_rule().is_err());
        assert!(switches(SwitchRule::AnyOfMany, &[1, 2]).validate_rule().is_ok());
    }
}

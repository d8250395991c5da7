// ── Protocol messages ──
//
// Decoded wire traffic. Framing (XML, JSON lines, ...) belongs to the
// transport; the session only ever sees these values.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::blob::BlobPolicy;
use crate::model::{MemberInput, MemberValue, PropertyState, Vector};

/// One protocol-level message in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    /// Ask for definitions: every device, one device, or one vector.
    GetProperties {
        device: Option<String>,
        vector: Option<String>,
    },
    /// Full definition of a vector with its current member values.
    DefVector(Box<Vector>),
    /// New member values for an existing vector.
    SetVector(SetVector),
    /// A client asking the owning driver to change values.
    NewVector(NewVector),
    /// Withdraw a vector, or a whole device when `vector` is `None`.
    DelProperty {
        device: String,
        vector: Option<String>,
        message: Option<String>,
    },
    Message {
        device: Option<String>,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Set the sender's BLOB policy for a target.
    EnableBlob {
        device: String,
        vector: Option<String>,
        policy: BlobPolicy,
    },
}

impl ProtocolMessage {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetProperties { .. } => "getProperties",
            Self::DefVector(_) => "defVector",
            Self::SetVector(_) => "setVector",
            Self::NewVector(_) => "newVector",
            Self::DelProperty { .. } => "delProperty",
            Self::Message { .. } => "message",
            Self::EnableBlob { .. } => "enableBLOB",
        }
    }

    /// Device the message is about, if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::GetProperties { device, .. } | Self::Message { device, .. } => device.as_deref(),
            Self::DefVector(v) => Some(&v.device),
            Self::SetVector(s) => Some(&s.device),
            Self::NewVector(n) => Some(&n.device),
            Self::DelProperty { device, .. } | Self::EnableBlob { device, .. } => Some(device),
        }
    }
}

/// Value update for an existing vector.
///
/// `None` fields leave the receiver's copy unchanged; `message` is always
/// replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct SetVector {
    pub device: String,
    pub vector: String,
    pub state: Option<PropertyState>,
    pub timeout: Option<f64>,
    pub message: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub values: Vec<(String, MemberValue)>,
}

impl SetVector {
    /// Every member of `vector` with its current value.
    pub fn from_vector(vector: &Vector) -> Self {
        Self {
            device: vector.device.clone(),
            vector: vector.name.clone(),
            state: Some(vector.state),
            timeout: Some(vector.timeout),
            message: vector.message.clone(),
            timestamp: vector.timestamp,
            values: vector
                .members()
                .map(|m| (m.name.clone(), m.value().clone()))
                .collect(),
        }
    }
}

/// A write request for a vector owned by the receiving side.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVector {
    pub device: String,
    pub vector: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub values: IndexMap<String, MemberInput>,
}

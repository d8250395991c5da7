// ── Device domain type ──

use indexmap::IndexMap;
use serde::Serialize;

use super::message::MessageLog;
use super::vector::Vector;
use crate::error::CoreError;

/// A named collection of vectors; the unit of enable/disable and of
/// message association.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub name: String,
    pub enable: bool,
    vectors: IndexMap<String, Vector>,
    pub messages: MessageLog,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enable: true,
            vectors: IndexMap::new(),
            messages: MessageLog::default(),
        }
    }

    /// Build a device from vectors in definition order.
    pub fn with_vectors(
        name: impl Into<String>,
        vectors: impl IntoIterator<Item = Vector>,
    ) -> Result<Self, CoreError> {
        let mut device = Self::new(name);
        for vector in vectors {
            device.add_vector(vector)?;
        }
        Ok(device)
    }

    /// Start withdrawn from client view.
    pub fn disabled(mut self) -> Self {
        self.enable = false;
        self
    }

    /// Add a vector, binding it to this device.
    pub fn add_vector(&mut self, mut vector: Vector) -> Result<(), CoreError> {
        if self.vectors.contains_key(&vector.name) {
            return Err(CoreError::DuplicateIdentity {
                what: "vector",
                name: format!("{}/{}", self.name, vector.name),
            });
        }
        vector.device.clone_from(&self.name);
        self.vectors.insert(vector.name.clone(), vector);
        Ok(())
    }

    /// Insert or replace a vector, keeping its position when replaced.
    pub(crate) fn upsert_vector(&mut self, mut vector: Vector) {
        vector.device.clone_from(&self.name);
        self.vectors.insert(vector.name.clone(), vector);
    }

    pub fn vector(&self, name: &str) -> Option<&Vector> {
        self.vectors.get(name)
    }

    pub fn vector_mut(&mut self, name: &str) -> Option<&mut Vector> {
        self.vectors.get_mut(name)
    }

    /// Vectors in definition order.
    pub fn vectors(&self) -> impl Iterator<Item = &Vector> {
        self.vectors.values()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Messages are kept with the device's history capacity.
    pub(crate) fn set_message_capacity(&mut self, capacity: usize) {
        if self.messages.is_empty() {
            self.messages = MessageLog::new(capacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Member, VectorKind};

    #[test]
    fn binds_vectors_and_rejects_duplicates() {
        let text = || Vector::new("info", VectorKind::Text, vec![Member::text("t", "")]).unwrap();
        let mut device = Device::with_vectors("scope", [text()]).unwrap();
        assert_eq!(device.vector("info").map(|v| v.device.as_str()), Some("scope"));

        let err = device.add_vector(text()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(device.len(), 1);
    }
}

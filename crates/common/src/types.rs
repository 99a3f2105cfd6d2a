use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation key of a saga instance.
///
/// Opaque to the saga machinery: callers may supply any string (an upstream
/// message id, a UUID, a business key). Stable for the saga's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(String);

impl SagaId {
    /// Creates a new random saga ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SagaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SagaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for SagaId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl From<SagaId> for String {
    fn from(id: SagaId) -> Self {
        id.0
    }
}

/// Version number of a persisted saga record, used for optimistic concurrency control.
///
/// `initial()` (0) means "no record"; the first write lands at `first()` (1)
/// and every subsequent write increments by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a record that does not exist yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version (1) of a freshly inserted record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saga_id_new_creates_unique_ids() {
        let id1 = SagaId::new();
        let id2 = SagaId::new();
        assert_ne!(id1, id2);
        assert!(Uuid::parse_str(id1.as_str()).is_ok());
    }

    #[test]
    fn saga_id_accepts_arbitrary_strings() {
        let id = SagaId::from("order-42/ship");
        assert_eq!(id.as_str(), "order-42/ship");
        assert_eq!(id.to_string(), "order-42/ship");
        assert!(!id.is_empty());
        assert!(SagaId::from("").is_empty());
    }

    #[test]
    fn saga_id_serializes_as_plain_string() {
        let id = SagaId::from("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let deserialized: SagaId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn version_sequence() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::initial().next(), Version::first());
        assert_eq!(Version::first().next(), Version::new(2));
        assert!(Version::first() > Version::initial());
    }
}

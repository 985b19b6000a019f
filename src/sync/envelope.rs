//! Versioned document envelope and migration-on-read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A synced document tagged with the schema version of its payload.
///
/// Values written before envelopes existed are read as version 0 with the
/// whole value as payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub schema_version: u32,
    pub payload: Value,
}

impl Envelope {
    pub fn new(schema_version: u32, payload: Value) -> Self {
        Self {
            schema_version,
            payload,
        }
    }

    /// Envelope for a document that was never stored
    pub fn empty() -> Self {
        Self::new(0, Value::Null)
    }

    /// Read a stored value, accepting both enveloped and bare documents
    pub fn from_value(value: Value) -> Self {
        let is_envelope = value
            .as_object()
            .map(|map| {
                map.len() == 2
                    && map.get("schemaVersion").map(Value::is_u64).unwrap_or(false)
                    && map.contains_key("payload")
            })
            .unwrap_or(false);

        if is_envelope {
            if let Ok(envelope) = serde_json::from_value::<Envelope>(value.clone()) {
                return envelope;
            }
        }
        Self::new(0, value)
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "schemaVersion": self.schema_version,
            "payload": self.payload,
        })
    }
}

/// Upgrades payloads of one dataset to its current schema
pub trait Migration: Send + Sync {
    fn current_version(&self) -> u32;

    /// Bring a payload stored at `from_version` to the current version
    fn migrate(&self, from_version: u32, payload: Value) -> Value;
}

/// Result of running an envelope through its migration
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub envelope: Envelope,
    /// The payload differs from what was read and should be written back
    pub changed: bool,
}

/// Migrate an envelope if it is older than the current version.
///
/// Envelopes from a newer schema are passed through untouched.
pub fn upgrade(envelope: Envelope, migration: &dyn Migration) -> Migrated {
    let current = migration.current_version();
    if envelope.schema_version >= current {
        return Migrated {
            envelope,
            changed: false,
        };
    }

    let original = envelope.payload.clone();
    let payload = migration.migrate(envelope.schema_version, envelope.payload);
    let changed = payload != original;

    tracing::debug!(
        from = envelope.schema_version,
        to = current,
        changed,
        "Migrated synced document"
    );

    Migrated {
        envelope: Envelope::new(current, payload),
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct WrapInList;

    impl Migration for WrapInList {
        fn current_version(&self) -> u32 {
            1
        }

        fn migrate(&self, _from_version: u32, payload: Value) -> Value {
            match payload {
                Value::Array(_) => payload,
                other => json!([other]),
            }
        }
    }

    #[test]
    fn test_bare_values_are_version_zero() {
        let envelope = Envelope::from_value(json!({ "expenses": [] }));
        assert_eq!(envelope.schema_version, 0);
        assert_eq!(envelope.payload, json!({ "expenses": [] }));

        // An object that merely has a payload field is still a bare value
        let envelope = Envelope::from_value(json!({ "payload": 1, "other": 2 }));
        assert_eq!(envelope.schema_version, 0);
    }

    #[test]
    fn test_enveloped_values_keep_their_version() {
        let stored = json!({ "schemaVersion": 3, "payload": [1, 2] });
        let envelope = Envelope::from_value(stored.clone());
        assert_eq!(envelope, Envelope::new(3, json!([1, 2])));
        assert_eq!(envelope.to_value(), stored);
    }

    #[test]
    fn test_upgrade_reports_changes() {
        let migrated = upgrade(Envelope::new(0, json!(5)), &WrapInList);
        assert_eq!(migrated.envelope, Envelope::new(1, json!([5])));
        assert!(migrated.changed);

        let migrated = upgrade(Envelope::new(0, json!([5])), &WrapInList);
        assert_eq!(migrated.envelope.schema_version, 1);
        assert!(!migrated.changed);
    }

    #[test]
    fn test_current_and_newer_versions_pass_through() {
        let envelope = Envelope::new(7, json!("future"));
        let migrated = upgrade(envelope.clone(), &WrapInList);
        assert_eq!(migrated.envelope, envelope);
        assert!(!migrated.changed);
    }
}

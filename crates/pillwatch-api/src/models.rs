// ── Wire types for the Home Assistant APIs ──
//
// Raw response shapes, deserialized as-is. `pillwatch-core` converts these
// into its own domain types; nothing here is meant for display.

use serde::{Deserialize, Serialize};

/// One entity state as returned by `GET /api/states` and carried inside
/// `state_changed` events.
///
/// Attributes are kept as an untyped JSON map on purpose: the set of keys
/// is owned by whichever integration backs the entity, and consumers
/// resolve the keys they care about themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateObject {
    /// Entity identifier, e.g. `"sensor.pa_aspirin"`.
    pub entity_id: String,

    /// Current state string, e.g. `"due"`, `"taken"`.
    pub state: String,

    /// Integration-owned attribute map.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,

    /// ISO-8601 timestamp of the last state change.
    #[serde(default)]
    pub last_changed: Option<String>,

    /// ISO-8601 timestamp of the last state or attribute update.
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Payload of a `state_changed` event from the WebSocket event bus.
///
/// `new_state` is `None` when the entity was removed from the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChange {
    pub entity_id: String,

    #[serde(default)]
    pub new_state: Option<StateObject>,

    #[serde(default)]
    pub old_state: Option<StateObject>,
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_state_object() {
        let json = r#"{
            "entity_id": "sensor.pa_aspirin",
            "state": "scheduled",
            "attributes": {
                "friendly_name": "Aspirin",
                "Medication ID": "abc123",
                "Doses today": ["2024-01-01T08:00:00"]
            },
            "last_changed": "2024-01-01T08:00:00+00:00",
            "last_updated": "2024-01-01T08:00:00+00:00"
        }"#;

        let state: StateObject = serde_json::from_str(json).unwrap();
        assert_eq!(state.entity_id, "sensor.pa_aspirin");
        assert_eq!(state.state, "scheduled");
        assert_eq!(state.attributes["friendly_name"], "Aspirin");
        assert_eq!(state.attributes["Medication ID"], "abc123");
    }

    #[test]
    fn deserialize_state_object_without_attributes() {
        let json = r#"{ "entity_id": "sun.sun", "state": "above_horizon" }"#;

        let state: StateObject = serde_json::from_str(json).unwrap();
        assert!(state.attributes.is_empty());
        assert!(state.last_changed.is_none());
    }

    #[test]
    fn deserialize_state_change_with_removal() {
        let json = r#"{
            "entity_id": "sensor.pa_aspirin",
            "old_state": { "entity_id": "sensor.pa_aspirin", "state": "taken" },
            "new_state": null
        }"#;

        let change: StateChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.entity_id, "sensor.pa_aspirin");
        assert!(change.new_state.is_none());
        assert_eq!(change.old_state.unwrap().state, "taken");
    }
}

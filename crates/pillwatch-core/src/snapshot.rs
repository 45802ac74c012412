// ── Entity snapshot model ──
//
// The panel's entire world-view: a complete mapping from entity id to
// entity state, owned by the external platform and replaced wholesale on
// every update. Consumers hold an `Arc<StateSnapshot>` and never mutate
// it; the controller folds each incoming change into a fresh snapshot
// value and publishes that instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use pillwatch_api::models::{StateChange, StateObject};

/// Identifier prefix that marks an entity as a medication sensor.
pub const MEDICATION_PREFIX: &str = "sensor.pa_";

/// One externally-owned entity: identifier, state string, attribute map.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub entity_id: String,
    pub state: String,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    /// Look up an attribute by trying `keys` in order, returning the first
    /// present value. This is the single mechanism for attribute access --
    /// fallback spellings live in the caller's key list, not in scattered
    /// conditionals.
    pub fn attr_first<'a>(&'a self, keys: &[&str]) -> Option<&'a serde_json::Value> {
        keys.iter().find_map(|k| self.attributes.get(*k))
    }

    /// Whether this entity is a medication sensor.
    pub fn is_medication(&self) -> bool {
        self.entity_id.starts_with(MEDICATION_PREFIX)
    }
}

impl From<StateObject> for Entity {
    fn from(s: StateObject) -> Self {
        Self {
            entity_id: s.entity_id,
            state: s.state,
            attributes: s.attributes,
        }
    }
}

/// A complete point-in-time view of every entity the instance exposes.
///
/// Insertion order is preserved (first appearance wins) so that view
/// ordering ties can fall back to "original mapping order" deterministically.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    entities: IndexMap<String, Arc<Entity>>,
    /// When this snapshot value was assembled.
    pub received_at: Option<DateTime<Utc>>,
}

impl StateSnapshot {
    /// Build the initial snapshot from a full REST state dump.
    pub fn from_states(states: Vec<StateObject>, received_at: DateTime<Utc>) -> Self {
        let entities = states
            .into_iter()
            .map(|s| (s.entity_id.clone(), Arc::new(Entity::from(s))))
            .collect();
        Self {
            entities,
            received_at: Some(received_at),
        }
    }

    /// Produce the successor snapshot with one state change folded in.
    ///
    /// Never mutates `self`: the caller publishes the returned value as a
    /// full replacement. A change with `new_state: None` removes the
    /// entity; updates keep the entity's original position, new entities
    /// append at the end.
    pub fn with_change(&self, change: &StateChange, received_at: DateTime<Utc>) -> Self {
        let mut entities = self.entities.clone();
        match &change.new_state {
            Some(state) => {
                entities.insert(
                    change.entity_id.clone(),
                    Arc::new(Entity::from(state.clone())),
                );
            }
            None => {
                // shift_remove keeps the relative order of the remaining entities
                entities.shift_remove(&change.entity_id);
            }
        }
        Self {
            entities,
            received_at: Some(received_at),
        }
    }

    /// Look up one entity by id.
    pub fn get(&self, entity_id: &str) -> Option<&Arc<Entity>> {
        self.entities.get(entity_id)
    }

    /// Iterate entities in original mapping order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state(entity_id: &str, state: &str) -> StateObject {
        StateObject {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: serde_json::Map::new(),
            last_changed: None,
            last_updated: None,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn from_states_preserves_order() {
        let snap = StateSnapshot::from_states(
            vec![state("sensor.pa_b", "due"), state("sensor.pa_a", "taken")],
            now(),
        );

        let ids: Vec<_> = snap.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, ["sensor.pa_b", "sensor.pa_a"]);
    }

    #[test]
    fn with_change_does_not_touch_the_original() {
        let snap = StateSnapshot::from_states(vec![state("sensor.pa_a", "due")], now());

        let change = StateChange {
            entity_id: "sensor.pa_a".into(),
            new_state: Some(state("sensor.pa_a", "taken")),
            old_state: None,
        };
        let next = snap.with_change(&change, now());

        assert_eq!(snap.get("sensor.pa_a").unwrap().state, "due");
        assert_eq!(next.get("sensor.pa_a").unwrap().state, "taken");
    }

    #[test]
    fn with_change_keeps_position_on_update_and_appends_new() {
        let snap = StateSnapshot::from_states(
            vec![state("sensor.pa_a", "due"), state("sensor.pa_b", "due")],
            now(),
        );

        let update = StateChange {
            entity_id: "sensor.pa_a".into(),
            new_state: Some(state("sensor.pa_a", "taken")),
            old_state: None,
        };
        let insert = StateChange {
            entity_id: "sensor.pa_c".into(),
            new_state: Some(state("sensor.pa_c", "due")),
            old_state: None,
        };
        let next = snap.with_change(&update, now()).with_change(&insert, now());

        let ids: Vec<_> = next.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, ["sensor.pa_a", "sensor.pa_b", "sensor.pa_c"]);
    }

    #[test]
    fn with_change_removes_on_absent_new_state() {
        let snap = StateSnapshot::from_states(
            vec![state("sensor.pa_a", "due"), state("sensor.pa_b", "due")],
            now(),
        );

        let removal = StateChange {
            entity_id: "sensor.pa_a".into(),
            new_state: None,
            old_state: Some(state("sensor.pa_a", "due")),
        };
        let next = snap.with_change(&removal, now());

        assert!(next.get("sensor.pa_a").is_none());
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn attr_first_resolves_in_key_order() {
        let mut attributes = serde_json::Map::new();
        attributes.insert("next_dose_time".into(), "08:00".into());
        attributes.insert("Next dose at".into(), "09:00".into());
        let entity = Entity {
            entity_id: "sensor.pa_a".into(),
            state: "due".into(),
            attributes,
        };

        let v = entity.attr_first(&["Next dose at", "next_dose_time"]).unwrap();
        assert_eq!(v, "09:00");

        let v = entity.attr_first(&["missing", "next_dose_time"]).unwrap();
        assert_eq!(v, "08:00");

        assert!(entity.attr_first(&["missing"]).is_none());
    }

    #[test]
    fn medication_prefix_detection() {
        let med = Entity {
            entity_id: "sensor.pa_aspirin".into(),
            state: "due".into(),
            attributes: serde_json::Map::new(),
        };
        let other = Entity {
            entity_id: "sensor.patio_temp".into(),
            state: "21".into(),
            attributes: serde_json::Map::new(),
        };

        assert!(med.is_medication());
        // "sensor.pa" alone is not enough -- the underscore is part of the prefix
        assert!(!other.is_medication());
    }
}

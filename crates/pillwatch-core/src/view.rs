// ── View-model projection ──
//
// Pure transformation from a `StateSnapshot` to the per-medication view
// records and the flattened dose-history rows the panel displays. No side
// effects, no mutation of the snapshot: every call returns fresh values,
// recomputed in full on every update.

use crate::snapshot::{Entity, StateSnapshot};

/// Candidate attribute keys per logical field, in precedence order.
///
/// Attribute spellings are owned by the backing integration and exist in
/// both a human-readable and a machine form for some fields. Resolution is
/// first-present-wins over these lists -- kept as data so the table itself
/// is testable.
pub mod attr {
    pub const DISPLAY_NAME: &[&str] = &["friendly_name"];
    pub const MEDICATION_ID: &[&str] = &["Medication ID"];
    pub const DOSES_TODAY: &[&str] = &["Doses today"];
    pub const RATIO: &[&str] = &["taken_scheduled_ratio"];
    pub const NEXT_DOSE: &[&str] = &["Next dose at", "next_dose_time"];
    pub const LAST_TAKEN: &[&str] = &["Last taken at", "last_taken"];
}

/// Ephemeral, display-shaped projection of one medication sensor.
///
/// Recomputed on every snapshot update and discarded after reconciliation;
/// nothing here is cached or persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicationView {
    /// Friendly name, falling back to the raw entity id.
    pub display_name: String,
    /// Raw state string (`"scheduled"`, `"due"`, `"overdue"`, `"taken"`, ...).
    pub state: String,
    /// Stable, non-empty identifier used to address service calls back at
    /// the entity. Attribute-provided id preferred, entity id otherwise.
    pub medication_id: String,
    /// Timestamps of today's recorded doses, in attribute order.
    pub doses_today: Vec<String>,
    /// Taken/scheduled ratio string; `"0/0"` when absent or empty.
    pub ratio: String,
    /// Next scheduled dose, if the backend published one.
    pub next_dose_at: Option<String>,
    /// Most recent dose, if any.
    pub last_taken_at: Option<String>,
}

/// One row of the flattened dose history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoseRow {
    pub medication_name: String,
    pub timestamp: String,
}

// ── Projection ──────────────────────────────────────────────────────

/// Resolve a string attribute, treating an explicitly empty string the
/// same as an absent one (mirrors the falsy semantics of the upstream
/// attribute contract).
fn attr_string(entity: &Entity, keys: &[&str]) -> Option<String> {
    entity
        .attr_first(keys)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Sort key approximating locale-aware collation: case-insensitive
/// Unicode ordering on the raw display-name attribute, with missing
/// names keyed as the empty string (sorts first).
fn collation_key(entity: &Entity) -> String {
    attr_string(entity, attr::DISPLAY_NAME)
        .unwrap_or_default()
        .to_lowercase()
}

impl MedicationView {
    /// Project one entity into its view record, applying every documented
    /// fallback. Never fails: absent data resolves to a placeholder.
    fn project(entity: &Entity) -> Self {
        let display_name = attr_string(entity, attr::DISPLAY_NAME)
            .unwrap_or_else(|| entity.entity_id.clone());

        let medication_id = attr_string(entity, attr::MEDICATION_ID)
            .unwrap_or_else(|| entity.entity_id.clone());

        let doses_today = entity
            .attr_first(attr::DOSES_TODAY)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();

        let ratio = attr_string(entity, attr::RATIO).unwrap_or_else(|| "0/0".into());

        Self {
            display_name,
            state: entity.state.clone(),
            medication_id,
            doses_today,
            ratio,
            next_dose_at: attr_string(entity, attr::NEXT_DOSE),
            last_taken_at: attr_string(entity, attr::LAST_TAKEN),
        }
    }
}

/// Select every medication sensor from the snapshot and project it,
/// ordered ascending by display name (collation per [`collation_key`];
/// ties keep the snapshot's original mapping order via stable sort).
pub fn select_medications(snapshot: &StateSnapshot) -> Vec<MedicationView> {
    let mut meds: Vec<&std::sync::Arc<Entity>> =
        snapshot.iter().filter(|e| e.is_medication()).collect();

    meds.sort_by_key(|e| collation_key(e));

    meds.into_iter().map(|e| MedicationView::project(e)).collect()
}

/// Flatten every medication's dose timestamps into history rows, sorted
/// ascending by *lexical* comparison of the raw timestamp string.
///
/// Lexical ordering is correct only for zero-padded ISO-8601-like
/// timestamps, which is what the backend emits. Mixed or non-ISO formats
/// would sort wrong; that contract belongs to the source and is not
/// papered over here with datetime parsing.
pub fn build_history(views: &[MedicationView]) -> Vec<DoseRow> {
    let mut rows: Vec<DoseRow> = views
        .iter()
        .flat_map(|view| {
            view.doses_today.iter().map(|ts| DoseRow {
                medication_name: view.display_name.clone(),
                timestamp: ts.clone(),
            })
        })
        .collect();

    rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    rows
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use pillwatch_api::models::StateObject;

    fn entity(entity_id: &str, state: &str, attributes: serde_json::Value) -> StateObject {
        StateObject {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: attributes
                .as_object()
                .cloned()
                .unwrap_or_default(),
            last_changed: None,
            last_updated: None,
        }
    }

    fn snapshot_of(states: Vec<StateObject>) -> StateSnapshot {
        StateSnapshot::from_states(states, DateTime::from_timestamp(1_700_000_000, 0).unwrap())
    }

    // ── Selection ────────────────────────────────────────────────────

    #[test]
    fn selects_only_prefixed_entities() {
        let snapshot = snapshot_of(vec![
            entity("sensor.pa_aspirin", "due", json!({ "friendly_name": "Aspirin" })),
            entity("sensor.patio_temp", "21.5", json!({ "friendly_name": "Patio" })),
            entity("light.kitchen", "on", json!({})),
            entity("sensor.pa_ibuprofen", "taken", json!({ "friendly_name": "Ibuprofen" })),
        ]);

        let meds = select_medications(&snapshot);

        let ids: Vec<_> = meds.iter().map(|m| m.medication_id.as_str()).collect();
        assert_eq!(ids, ["sensor.pa_aspirin", "sensor.pa_ibuprofen"]);
    }

    #[test]
    fn empty_snapshot_selects_nothing() {
        let snapshot = snapshot_of(vec![]);
        assert!(select_medications(&snapshot).is_empty());
    }

    // ── Ordering ─────────────────────────────────────────────────────

    #[test]
    fn orders_by_display_name_case_insensitively() {
        let snapshot = snapshot_of(vec![
            entity("sensor.pa_1", "due", json!({ "friendly_name": "zinc" })),
            entity("sensor.pa_2", "due", json!({ "friendly_name": "Aspirin" })),
            entity("sensor.pa_3", "due", json!({ "friendly_name": "ibuprofen" })),
        ]);

        let names: Vec<_> = select_medications(&snapshot)
            .into_iter()
            .map(|m| m.display_name)
            .collect();
        assert_eq!(names, ["Aspirin", "ibuprofen", "zinc"]);
    }

    #[test]
    fn missing_names_sort_first_and_ties_keep_snapshot_order() {
        let snapshot = snapshot_of(vec![
            entity("sensor.pa_named", "due", json!({ "friendly_name": "Aspirin" })),
            entity("sensor.pa_anon_b", "due", json!({})),
            entity("sensor.pa_anon_a", "due", json!({})),
        ]);

        let ids: Vec<_> = select_medications(&snapshot)
            .into_iter()
            .map(|m| m.medication_id)
            .collect();
        // Both unnamed entities key as "" and precede "Aspirin"; between
        // themselves, snapshot order is preserved.
        assert_eq!(ids, ["sensor.pa_anon_b", "sensor.pa_anon_a", "sensor.pa_named"]);
    }

    #[test]
    fn duplicate_names_keep_snapshot_order() {
        let snapshot = snapshot_of(vec![
            entity("sensor.pa_evening", "due", json!({ "friendly_name": "Aspirin" })),
            entity("sensor.pa_morning", "due", json!({ "friendly_name": "Aspirin" })),
        ]);

        let ids: Vec<_> = select_medications(&snapshot)
            .into_iter()
            .map(|m| m.medication_id)
            .collect();
        assert_eq!(ids, ["sensor.pa_evening", "sensor.pa_morning"]);
    }

    // ── Field fallbacks ──────────────────────────────────────────────

    #[test]
    fn medication_id_falls_back_to_entity_id() {
        let snapshot = snapshot_of(vec![entity(
            "sensor.pa_aspirin",
            "scheduled",
            json!({ "friendly_name": "Aspirin" }),
        )]);

        let meds = select_medications(&snapshot);
        assert_eq!(meds[0].medication_id, "sensor.pa_aspirin");
    }

    #[test]
    fn medication_id_prefers_the_attribute() {
        let snapshot = snapshot_of(vec![entity(
            "sensor.pa_aspirin",
            "scheduled",
            json!({ "Medication ID": "abc123" }),
        )]);

        let meds = select_medications(&snapshot);
        assert_eq!(meds[0].medication_id, "abc123");
    }

    #[test]
    fn display_name_falls_back_to_entity_id() {
        let snapshot = snapshot_of(vec![entity("sensor.pa_aspirin", "scheduled", json!({}))]);

        let meds = select_medications(&snapshot);
        assert_eq!(meds[0].display_name, "sensor.pa_aspirin");
    }

    #[test]
    fn missing_doses_project_as_empty_list() {
        let snapshot = snapshot_of(vec![entity("sensor.pa_aspirin", "scheduled", json!({}))]);

        let meds = select_medications(&snapshot);
        assert!(meds[0].doses_today.is_empty());
    }

    #[test]
    fn absent_and_empty_ratio_both_collapse_to_zero_over_zero() {
        let snapshot = snapshot_of(vec![
            entity("sensor.pa_a", "due", json!({ "friendly_name": "A" })),
            entity(
                "sensor.pa_b",
                "due",
                json!({ "friendly_name": "B", "taken_scheduled_ratio": "" }),
            ),
            entity(
                "sensor.pa_c",
                "due",
                json!({ "friendly_name": "C", "taken_scheduled_ratio": "1/2" }),
            ),
        ]);

        let ratios: Vec<_> = select_medications(&snapshot)
            .into_iter()
            .map(|m| m.ratio)
            .collect();
        assert_eq!(ratios, ["0/0", "0/0", "1/2"]);
    }

    #[test]
    fn next_and_last_prefer_the_human_readable_spelling() {
        let snapshot = snapshot_of(vec![entity(
            "sensor.pa_aspirin",
            "scheduled",
            json!({
                "Next dose at": "2024-01-01T20:00:00",
                "next_dose_time": "2024-01-01T08:00:00",
                "last_taken": "2024-01-01T07:55:00"
            }),
        )]);

        let meds = select_medications(&snapshot);
        assert_eq!(meds[0].next_dose_at.as_deref(), Some("2024-01-01T20:00:00"));
        // Only the machine key is present for last-taken, so it wins by default
        assert_eq!(meds[0].last_taken_at.as_deref(), Some("2024-01-01T07:55:00"));
    }

    #[test]
    fn absent_next_and_last_stay_absent_in_the_record() {
        let snapshot = snapshot_of(vec![entity("sensor.pa_aspirin", "scheduled", json!({}))]);

        let meds = select_medications(&snapshot);
        // "n/a" is a view-layer placeholder, not part of the record
        assert!(meds[0].next_dose_at.is_none());
        assert!(meds[0].last_taken_at.is_none());
    }

    // ── History ──────────────────────────────────────────────────────

    #[test]
    fn history_flattens_and_sorts_lexically() {
        let snapshot = snapshot_of(vec![
            entity(
                "sensor.pa_a",
                "taken",
                json!({
                    "friendly_name": "Aspirin",
                    "Doses today": ["2024-01-01T09:00:00"]
                }),
            ),
            entity(
                "sensor.pa_b",
                "taken",
                json!({
                    "friendly_name": "Ibuprofen",
                    "Doses today": ["2024-01-01T08:00:00", "2024-01-01T12:30:00"]
                }),
            ),
        ]);

        let rows = build_history(&select_medications(&snapshot));

        let timestamps: Vec<_> = rows.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(
            timestamps,
            ["2024-01-01T08:00:00", "2024-01-01T09:00:00", "2024-01-01T12:30:00"]
        );
        assert_eq!(rows[0].medication_name, "Ibuprofen");
        assert_eq!(rows[1].medication_name, "Aspirin");
    }

    #[test]
    fn history_of_nothing_is_empty() {
        assert!(build_history(&[]).is_empty());

        let snapshot = snapshot_of(vec![entity("sensor.pa_a", "scheduled", json!({}))]);
        assert!(build_history(&select_medications(&snapshot)).is_empty());
    }

    #[test]
    fn single_dose_scenario() {
        let snapshot = snapshot_of(vec![entity(
            "sensor.pa_aspirin",
            "taken",
            json!({
                "friendly_name": "Aspirin",
                "Doses today": ["2024-01-01T08:00:00"]
            }),
        )]);

        let meds = select_medications(&snapshot);
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].medication_id, "sensor.pa_aspirin");
        assert_eq!(meds[0].doses_today.len(), 1);

        let rows = build_history(&meds);
        assert_eq!(
            rows,
            vec![DoseRow {
                medication_name: "Aspirin".into(),
                timestamp: "2024-01-01T08:00:00".into(),
            }]
        );
    }
}

//! All possible UI actions. Actions are the sole mechanism for state mutation.

use std::sync::Arc;

use pillwatch_core::StateSnapshot;

/// Every state transition in the TUI is expressed as an Action.
#[derive(Debug, Clone)]
pub enum Action {
    // ── Lifecycle ──────────────────────────────────────────────────
    Quit,
    Tick,
    Render,
    Resize(u16, u16),

    // ── Data events (from the data bridge) ─────────────────────────
    /// A fresh whole-state snapshot replaced the previous one.
    SnapshotUpdated(Arc<StateSnapshot>),

    // ── Connection status ──────────────────────────────────────────
    Connected,
    Disconnected(String),
    Connecting,

    // ── Card selection ─────────────────────────────────────────────
    SelectNext,
    SelectPrev,

    // ── Gestures ───────────────────────────────────────────────────
    /// An action control was triggered. Carries the raw control tags;
    /// validation (known kind, non-empty id, live connection) happens at
    /// dispatch time, and anything malformed is silently dropped.
    MedicationAction { medication_id: String, kind: String },

    // ── Help ───────────────────────────────────────────────────────
    ToggleHelp,
}

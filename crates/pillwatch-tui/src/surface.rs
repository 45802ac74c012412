//! Retained panel surface — the tree the reconciler writes and the
//! renderer paints.
//!
//! The skeleton (header, badge slot, grid slot, history slot) is built
//! exactly once per mounted panel; every snapshot refresh replaces the
//! slot *contents* wholesale. Full replacement is the point: stale cards
//! and their gesture bindings are discarded together on every refresh, so
//! nothing can accumulate across updates.

use pillwatch_core::{ActionKind, DoseRow};

/// Empty-state message for the medication grid.
pub const NO_MEDICATIONS_MSG: &str = "No medications configured yet.";

/// Empty-state message for the dose history table.
pub const NO_DOSES_MSG: &str = "No doses recorded today.";

/// Panel configuration supplied by the hosting shell. Display-only.
#[derive(Debug, Clone, Default)]
pub struct PanelConfig {
    /// CSV dose-log location, shown in the header badge.
    pub log_path: Option<String>,
}

/// One action control on a card, tagged with the medication id and the
/// gesture kind it triggers (the inspectable "data attributes").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionControl {
    pub medication_id: String,
    pub kind: String,
    pub label: &'static str,
}

/// One medication card.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub display_name: String,
    pub state: String,
    pub next_dose: Option<String>,
    pub last_taken: Option<String>,
    pub dose_count: usize,
    pub ratio: String,
    pub actions: Vec<ActionControl>,
}

impl Card {
    /// The three per-medication controls, in display order.
    pub fn standard_actions(medication_id: &str) -> Vec<ActionControl> {
        [ActionKind::Take, ActionKind::Snooze, ActionKind::Test]
            .into_iter()
            .map(|kind| ActionControl {
                medication_id: medication_id.to_owned(),
                kind: kind.as_str().to_owned(),
                label: kind.label(),
            })
            .collect()
    }
}

/// Contents of the medication grid slot.
#[derive(Debug, Clone, PartialEq)]
pub enum GridContent {
    Empty(&'static str),
    Cards(Vec<Card>),
}

/// Contents of the dose-history slot.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryContent {
    Empty(&'static str),
    Rows(Vec<DoseRow>),
}

/// The mounted panel surface.
#[derive(Debug, Clone)]
pub struct PanelSurface {
    /// Fixed header line, written once at skeleton build.
    pub title: &'static str,
    pub subtitle: &'static str,
    /// Header badge text; empty when no log path is configured.
    pub badge: String,
    pub grid: GridContent,
    pub history: HistoryContent,
}

impl PanelSurface {
    /// Build the one-time skeleton. Slots start empty; the first refresh
    /// fills them in the same pass.
    pub fn skeleton() -> Self {
        Self {
            title: "Pill Assistant",
            subtitle: "Admin-only quick actions and daily view.",
            badge: String::new(),
            grid: GridContent::Empty(NO_MEDICATIONS_MSG),
            history: HistoryContent::Empty(NO_DOSES_MSG),
        }
    }

    /// Number of cards currently displayed.
    pub fn card_count(&self) -> usize {
        match &self.grid {
            GridContent::Empty(_) => 0,
            GridContent::Cards(cards) => cards.len(),
        }
    }

    /// The card at `index`, if the grid has one.
    pub fn card(&self, index: usize) -> Option<&Card> {
        match &self.grid {
            GridContent::Empty(_) => None,
            GridContent::Cards(cards) => cards.get(index),
        }
    }
}

// ── Command API ──
//
// All write operations flow through a unified `Command` enum. Each variant
// lowers to exactly one service call against the backing integration; the
// panel dispatches these fire-and-forget and observes effects only through
// later snapshot updates.

use serde_json::json;

/// Service domain owned by the backing medication integration.
pub const SERVICE_DOMAIN: &str = "pill_assistant";

/// The gesture kinds a medication card exposes.
///
/// Parsing is forward-compatible: an unknown kind is `None`, and callers
/// treat that as a silent no-op rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Take,
    Snooze,
    Test,
}

impl ActionKind {
    /// Parse a gesture tag. Unknown tags yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "take" => Some(Self::Take),
            "snooze" => Some(Self::Snooze),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    /// The gesture tag carried on action controls.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Take => "take",
            Self::Snooze => "snooze",
            Self::Test => "test",
        }
    }

    /// Short label for the control itself.
    pub fn label(self) -> &'static str {
        match self {
            Self::Take => "Mark taken",
            Self::Snooze => "Snooze",
            Self::Test => "Test notify",
        }
    }
}

/// All possible write operations against the medication integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TakeMedication { medication_id: String },
    SnoozeMedication { medication_id: String },
    TestNotification { medication_id: String },
}

/// A fully-lowered service invocation: domain, service name, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCall {
    pub domain: &'static str,
    pub service: &'static str,
    pub data: serde_json::Value,
}

impl Command {
    /// Build the command for a card gesture.
    pub fn for_action(kind: ActionKind, medication_id: impl Into<String>) -> Self {
        let medication_id = medication_id.into();
        match kind {
            ActionKind::Take => Self::TakeMedication { medication_id },
            ActionKind::Snooze => Self::SnoozeMedication { medication_id },
            ActionKind::Test => Self::TestNotification { medication_id },
        }
    }

    /// The service name this command maps to.
    pub fn service(&self) -> &'static str {
        match self {
            Self::TakeMedication { .. } => "take_medication",
            Self::SnoozeMedication { .. } => "snooze_medication",
            Self::TestNotification { .. } => "test_notification",
        }
    }

    /// Lower to the exact wire-level service call.
    pub fn into_service_call(self) -> ServiceCall {
        let service = self.service();
        let (Self::TakeMedication { medication_id }
        | Self::SnoozeMedication { medication_id }
        | Self::TestNotification { medication_id }) = self;

        ServiceCall {
            domain: SERVICE_DOMAIN,
            service,
            data: json!({ "medication_id": medication_id }),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

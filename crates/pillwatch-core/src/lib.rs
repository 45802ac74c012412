// pillwatch-core: Reactive data layer between pillwatch-api and the TUI.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod snapshot;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{ActionKind, Command, ServiceCall, SERVICE_DOMAIN};
pub use config::{ControllerConfig, TlsVerification};
pub use controller::{ConnectionState, Controller};
pub use error::CoreError;
pub use snapshot::{Entity, StateSnapshot, MEDICATION_PREFIX};
pub use view::{build_history, select_medications, DoseRow, MedicationView};

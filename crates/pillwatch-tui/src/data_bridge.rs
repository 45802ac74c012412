//! Data bridge — connects [`Controller`] watch channels to TUI actions.
//!
//! Runs as a background task: subscribes to the snapshot stream and the
//! connection state, forwarding every change as an [`Action`] through the
//! TUI's action channel.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pillwatch_core::{ConnectionState, Controller};

use crate::action::Action;

/// Spawn the data bridge connecting a [`Controller`] to the TUI.
///
/// Connects to the instance, pushes the initial snapshot so the panel has
/// data immediately, then loops forwarding every snapshot replacement and
/// connection-state transition. Shuts down cleanly on cancellation.
pub async fn run_data_bridge(
    controller: Controller,
    action_tx: mpsc::UnboundedSender<Action>,
    cancel: CancellationToken,
) {
    let _ = action_tx.send(Action::Connecting);

    if let Err(e) = controller.connect().await {
        tracing::warn!(error = %e, "failed to connect to instance");
        let _ = action_tx.send(Action::Disconnected(format!("{e}")));
        return;
    }

    let _ = action_tx.send(Action::Connected);

    let mut snapshots = controller.snapshots();
    let mut conn_state = controller.connection_state();

    // Push the snapshot loaded during connect so the panel renders
    // without waiting for the first delta.
    let _ = action_tx.send(Action::SnapshotUpdated(snapshots.borrow_and_update().clone()));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            Ok(()) = snapshots.changed() => {
                let snapshot = snapshots.borrow_and_update().clone();
                let _ = action_tx.send(Action::SnapshotUpdated(snapshot));
            }

            Ok(()) = conn_state.changed() => {
                let state = conn_state.borrow_and_update().clone();
                match state {
                    ConnectionState::Connected => {
                        let _ = action_tx.send(Action::Connected);
                    }
                    ConnectionState::Disconnected | ConnectionState::Failed => {
                        let _ = action_tx.send(Action::Disconnected("disconnected".into()));
                    }
                    ConnectionState::Connecting => {
                        let _ = action_tx.send(Action::Connecting);
                    }
                }
            }
        }
    }

    controller.disconnect().await;
    debug!("data bridge shut down");
}

// ── Controller abstraction ──
//
// Full lifecycle management for a Home Assistant connection. Handles
// authentication, the initial state fetch, the WebSocket delta stream,
// and fire-and-forget service dispatch. Consumers observe the world
// exclusively through whole-snapshot values on a watch channel: every
// state change publishes a fresh `Arc<StateSnapshot>`, never a patch.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pillwatch_api::transport::{TlsMode, TransportConfig};
use pillwatch_api::websocket::{ws_url_from_base, EventStreamHandle, ReconnectConfig};
use pillwatch_api::RestClient;

use crate::command::Command;
use crate::config::{ControllerConfig, TlsVerification};
use crate::error::CoreError;
use crate::snapshot::StateSnapshot;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Manages the connection
/// lifecycle: token auth, initial state load, delta streaming, and
/// one-way command dispatch.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    snapshot_tx: watch::Sender<Arc<StateSnapshot>>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    rest: Mutex<Option<RestClient>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a new Controller from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to authenticate and start the
    /// background stream.
    pub fn new(config: ControllerConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(StateSnapshot::default()));
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                snapshot_tx,
                connection_state,
                cancel: CancellationToken::new(),
                rest: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Access the controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the instance.
    ///
    /// Fetches the initial full state dump over REST, publishes it as the
    /// first snapshot, then spawns the WebSocket task that folds every
    /// `state_changed` event into a successor snapshot.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Connecting);

        let config = &self.inner.config;
        let transport = build_transport(config);

        let rest = match RestClient::new(config.url.clone(), config.token.clone(), &transport) {
            Ok(c) => c,
            Err(e) => {
                let _ = self.inner.connection_state.send(ConnectionState::Failed);
                return Err(e.into());
            }
        };

        // Initial data load -- also proves the token works before we
        // bother opening the WebSocket.
        let states = match rest.get_states().await {
            Ok(s) => s,
            Err(e) => {
                let _ = self.inner.connection_state.send(ConnectionState::Failed);
                return Err(e.into());
            }
        };
        let initial = StateSnapshot::from_states(states, Utc::now());
        debug!(entities = initial.len(), "initial state dump loaded");
        let _ = self.inner.snapshot_tx.send(Arc::new(initial));

        if let Ok(mut guard) = self.inner.rest.lock() {
            *guard = Some(rest);
        }

        // Spawn the WebSocket delta stream
        let ws_url = ws_url_from_base(&config.url).map_err(CoreError::from)?;
        let events = EventStreamHandle::connect(
            ws_url,
            config.token.clone(),
            ReconnectConfig::default(),
            self.inner.cancel.child_token(),
        );

        let inner = Arc::clone(&self.inner);
        let mut rx = events.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        let next = inner
                            .snapshot_tx
                            .borrow()
                            .with_change(&change, Utc::now());
                        let _ = inner.snapshot_tx.send(Arc::new(next));
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "snapshot fold task lagged behind the event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        // The stream task gave up (cancelled, or auth rejected)
                        let _ = inner
                            .connection_state
                            .send(ConnectionState::Disconnected);
                        break;
                    }
                }
            }
            debug!("snapshot fold task exiting");
        });
        if let Ok(mut handles) = self.inner.task_handles.lock() {
            handles.push(handle);
        }

        let _ = self.inner.connection_state.send(ConnectionState::Connected);
        info!("connected to instance");
        Ok(())
    }

    /// Disconnect from the instance: cancel background tasks and reset
    /// the connection state.
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self
            .inner
            .task_handles
            .lock()
            .map(|mut h| h.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            let _ = handle.await;
        }

        if let Ok(mut guard) = self.inner.rest.lock() {
            *guard = None;
        }
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Subscribe to whole-snapshot updates. The receiver always holds the
    /// latest snapshot; intermediate values may be skipped.
    pub fn snapshots(&self) -> watch::Receiver<Arc<StateSnapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Subscribe to connection-state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Whether a live connection is currently established.
    pub fn is_connected(&self) -> bool {
        *self.inner.connection_state.borrow() == ConnectionState::Connected
    }

    // ── Command dispatch ─────────────────────────────────────────

    /// Dispatch a command fire-and-forget.
    ///
    /// The call is lowered to its service invocation and sent on a spawned
    /// task; this method returns as soon as the task is queued. Failures
    /// are logged and otherwise dropped -- effects (including the absence
    /// of one) surface only through later snapshot updates. Dispatching
    /// while disconnected is a silent no-op.
    pub fn dispatch(&self, command: Command) {
        let Some(rest) = self
            .inner
            .rest
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
        else {
            debug!(?command, "dispatch while disconnected ignored");
            return;
        };

        let call = command.into_service_call();
        tokio::spawn(async move {
            debug!(service = call.service, "dispatching service call");
            if let Err(e) = rest.call_service(call.domain, call.service, &call.data).await {
                warn!(service = call.service, error = %e, "service call failed");
            }
        });
    }
}

/// Map core TLS settings onto the api transport config.
fn build_transport(config: &ControllerConfig) -> TransportConfig {
    let tls = match &config.tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    };
    TransportConfig {
        tls,
        timeout: config.timeout,
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn test_config() -> ControllerConfig {
        ControllerConfig::new(
            "http://homeassistant.local:8123".parse().unwrap(),
            SecretString::from("token".to_owned()),
        )
    }

    #[test]
    fn starts_disconnected_with_an_empty_snapshot() {
        let controller = Controller::new(test_config());

        assert!(!controller.is_connected());
        assert_eq!(
            *controller.connection_state().borrow(),
            ConnectionState::Disconnected
        );
        assert!(controller.snapshots().borrow().is_empty());
    }

    #[tokio::test]
    async fn dispatch_while_disconnected_is_a_silent_no_op() {
        let controller = Controller::new(test_config());

        // Must not panic, spawn anything, or change state.
        controller.dispatch(Command::TakeMedication {
            medication_id: "M1".into(),
        });

        assert!(!controller.is_connected());
    }
}

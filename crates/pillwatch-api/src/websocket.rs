//! WebSocket event stream with auto-reconnect.
//!
//! Connects to a Home Assistant instance's WebSocket API, performs the
//! token handshake, subscribes to `state_changed` events, and streams the
//! parsed changes through a [`tokio::sync::broadcast`] channel. Handles
//! reconnection with exponential backoff + jitter automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use pillwatch_api::websocket::{EventStreamHandle, ReconnectConfig, ws_url_from_base};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let ws_url = ws_url_from_base(&Url::parse("http://homeassistant.local:8123")?)?;
//!
//! let handle = EventStreamHandle::connect(ws_url, token, ReconnectConfig::default(), cancel.clone());
//! let mut rx = handle.subscribe();
//!
//! while let Ok(change) = rx.recv().await {
//!     println!("{} changed", change.entity_id);
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::StateChange;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Subscription id used in the `subscribe_events` request. The server
/// echoes it on every event frame; anything else on the socket is ignored.
const SUBSCRIPTION_ID: u64 = 1;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── URL construction ─────────────────────────────────────────────────

/// Derive the WebSocket endpoint from an instance base URL:
/// `http(s)://host[:port]` becomes `ws(s)://host[:port]/api/websocket`.
pub fn ws_url_from_base(base: &Url) -> Result<Url, Error> {
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    let trimmed = base.as_str().trim_end_matches('/');
    let rest = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    Ok(Url::parse(&format!("{scheme}://{rest}/api/websocket"))?)
}

// ── EventStreamHandle ────────────────────────────────────────────────

/// Handle to a running WebSocket event stream.
///
/// Drop all receivers and call [`shutdown`](Self::shutdown) to tear down
/// the background task.
pub struct EventStreamHandle {
    event_rx: broadcast::Receiver<Arc<StateChange>>,
    cancel: CancellationToken,
}

impl EventStreamHandle {
    /// Spawn the connection + reconnection loop.
    ///
    /// Returns immediately; the first connection attempt happens
    /// asynchronously. Subscribe to the event receiver to start consuming
    /// state changes.
    pub fn connect(
        ws_url: Url,
        token: SecretString,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(ws_url, token, event_tx, reconnect, task_cancel).await;
        });

        Self { event_rx, cancel }
    }

    /// Get a new broadcast receiver for the state-change stream.
    ///
    /// Multiple consumers can subscribe concurrently. If a consumer falls
    /// behind, it receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StateChange>> {
        self.event_rx.resubscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → handshake → read → on error, backoff → reconnect.
async fn ws_loop(
    ws_url: Url,
    token: SecretString,
    event_tx: broadcast::Sender<Arc<StateChange>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &token, &event_tx, &cancel) => {
                match result {
                    // Clean disconnect (server close frame or stream ended).
                    // Reset attempt counter and reconnect immediately.
                    Ok(()) => {
                        tracing::info!("WebSocket disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) if e.is_auth_rejected() => {
                        tracing::error!(error = %e, "access token rejected, giving up");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "WebSocket error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "WebSocket reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = delay.as_millis() as u64,
                            attempt,
                            "Waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    tracing::debug!("WebSocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Messages the server sends during and after the handshake.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    AuthRequired,
    AuthOk,
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
    },
    Event {
        id: u64,
        event: EventEnvelope,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    event_type: String,
    data: serde_json::Value,
}

/// Establish one WebSocket connection: authenticate, subscribe to
/// `state_changed`, then read events until the connection drops.
async fn connect_and_read(
    url: &Url,
    token: &SecretString,
    event_tx: &broadcast::Sender<Arc<StateChange>>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");

    let (mut write, mut read) = ws_stream.split();
    let mut authenticated = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        let msg: ServerMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                tracing::debug!(error = %e, "unrecognized WebSocket frame");
                                continue;
                            }
                        };

                        match msg {
                            ServerMessage::AuthRequired => {
                                let auth = serde_json::json!({
                                    "type": "auth",
                                    "access_token": token.expose_secret(),
                                });
                                write
                                    .send(tungstenite::Message::Text(auth.to_string().into()))
                                    .await
                                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                            }
                            ServerMessage::AuthOk => {
                                authenticated = true;
                                let subscribe = serde_json::json!({
                                    "id": SUBSCRIPTION_ID,
                                    "type": "subscribe_events",
                                    "event_type": "state_changed",
                                });
                                write
                                    .send(tungstenite::Message::Text(subscribe.to_string().into()))
                                    .await
                                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                            }
                            ServerMessage::AuthInvalid { message } => {
                                return Err(Error::Authentication {
                                    message: message
                                        .unwrap_or_else(|| "auth_invalid".into()),
                                });
                            }
                            ServerMessage::Result { id, success } => {
                                if id == SUBSCRIPTION_ID && !success {
                                    return Err(Error::WebSocketConnect(
                                        "state_changed subscription rejected".into(),
                                    ));
                                }
                                tracing::debug!(id, success, "subscription result");
                            }
                            ServerMessage::Event { id, event } => {
                                if id == SUBSCRIPTION_ID {
                                    parse_and_broadcast(&event, event_tx);
                                }
                            }
                            ServerMessage::Other => {}
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        // Disconnecting mid-handshake means auth never completed;
                        // surface that as an error so the loop backs off.
                        if !authenticated {
                            let (code, reason) = frame
                                .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                                .unwrap_or((1006, String::new()));
                            return Err(Error::WebSocketClosed { code, reason });
                        }
                        tracing::info!("WebSocket close frame received");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        // Stream ended without a close frame
                        tracing::info!("WebSocket stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Event parsing ────────────────────────────────────────────────────

/// Extract a [`StateChange`] from an event envelope and broadcast it.
/// Non-`state_changed` events (there should be none on this subscription)
/// and malformed payloads are logged and dropped.
fn parse_and_broadcast(envelope: &EventEnvelope, event_tx: &broadcast::Sender<Arc<StateChange>>) {
    if envelope.event_type != "state_changed" {
        tracing::debug!(event_type = %envelope.event_type, "ignoring non-state event");
        return;
    }

    match serde_json::from_value::<StateChange>(envelope.data.clone()) {
        Ok(change) => {
            // Ignore send errors -- just means no active subscribers right now
            let _ = event_tx.send(Arc::new(change));
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse state_changed payload");
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config
        .initial_delay
        .as_secs_f64()
        * 2.0_f64.powi(attempt as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    // Not cryptographically random, but good enough for backoff spread.
    let jitter_factor = 1.0 + 0.25 * ((attempt as f64 * 7.3).sin());
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

//! Application core — event loop, action processing, command dispatch.

use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pillwatch_core::{ActionKind, Command, Controller};

use crate::action::Action;
use crate::component::Component;
use crate::event::{Event, EventReader};
use crate::panel::PanelScreen;
use crate::surface::PanelConfig;
use crate::theme;
use crate::tui::Tui;

/// Connection status as seen by the TUI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Top-level application state and event loop.
pub struct App {
    /// The single panel screen.
    panel: PanelScreen,
    /// Whether the app should keep running.
    running: bool,
    /// Connection status indicator.
    connection_status: ConnectionStatus,
    /// Help overlay visibility.
    help_visible: bool,
    /// Action sender — components can dispatch actions through this.
    action_tx: mpsc::UnboundedSender<Action>,
    /// Action receiver — main loop drains this.
    action_rx: mpsc::UnboundedReceiver<Action>,
    /// Optional controller for live data.
    controller: Option<Controller>,
    /// Cancellation token for the data bridge task.
    data_cancel: CancellationToken,
}

impl App {
    /// Create a new App. Without a [`Controller`] the panel stays on its
    /// waiting placeholder — useful for previewing the layout.
    pub fn new(controller: Option<Controller>, panel_config: PanelConfig) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        Self {
            panel: PanelScreen::new(panel_config),
            running: true,
            connection_status: ConnectionStatus::default(),
            help_visible: false,
            action_tx,
            action_rx,
            controller,
            data_cancel: CancellationToken::new(),
        }
    }

    /// Run the main event loop. This is the heart of the TUI.
    pub async fn run(&mut self) -> Result<()> {
        let mut tui = Tui::new()?;
        tui.enter()?;

        self.panel.init(self.action_tx.clone())?;
        self.panel.set_focused(true);

        // Spawn the data bridge if we have a controller
        if let Some(controller) = self.controller.clone() {
            let cancel = self.data_cancel.clone();
            let tx = self.action_tx.clone();
            tokio::spawn(async move {
                crate::data_bridge::run_data_bridge(controller, tx, cancel).await;
            });
        }

        let mut events = EventReader::new(
            Duration::from_millis(250), // 4 Hz tick
            Duration::from_millis(33),  // ~30 FPS render
        );

        info!("TUI event loop started");

        while self.running {
            // 1. Wait for the next event
            let Some(event) = events.next().await else {
                break;
            };

            // 2. Map event → action
            match event {
                Event::Key(key) => {
                    if let Some(action) = self.handle_key_event(key)? {
                        self.action_tx.send(action)?;
                    }
                }
                Event::Resize(w, h) => {
                    self.action_tx.send(Action::Resize(w, h))?;
                }
                Event::Tick => {
                    self.action_tx.send(Action::Tick)?;
                }
                Event::Render => {
                    self.action_tx.send(Action::Render)?;
                }
            }

            // 3. Drain and process all queued actions
            while let Ok(action) = self.action_rx.try_recv() {
                self.process_action(&action)?;

                if let Action::Render = action {
                    tui.draw(|frame| self.render(frame))?;
                }
            }
        }

        // Cancel the data bridge and clean up
        self.data_cancel.cancel();
        events.stop();
        info!("TUI event loop ended");
        Ok(())
    }

    /// Map a key event to an action. Global keys are handled here;
    /// everything else is delegated to the panel.
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        if self.help_visible {
            // In help mode, Esc or ? closes help
            return match key.code {
                KeyCode::Esc | KeyCode::Char('?') => Ok(Some(Action::ToggleHelp)),
                _ => Ok(None),
            };
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c'))
            | (KeyModifiers::NONE, KeyCode::Char('q')) => return Ok(Some(Action::Quit)),
            (KeyModifiers::NONE, KeyCode::Char('?')) => return Ok(Some(Action::ToggleHelp)),
            _ => {}
        }

        self.panel.handle_key_event(key)
    }

    /// Process a single action — update app state and propagate to the panel.
    fn process_action(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Quit => {
                self.running = false;
            }

            Action::Render | Action::Tick | Action::Resize(..) => {}

            Action::Connected => {
                self.connection_status = ConnectionStatus::Connected;
            }

            Action::Connecting => {
                self.connection_status = ConnectionStatus::Connecting;
            }

            Action::Disconnected(reason) => {
                debug!(%reason, "connection lost");
                self.connection_status = ConnectionStatus::Disconnected;
            }

            Action::ToggleHelp => {
                self.help_visible = !self.help_visible;
            }

            Action::MedicationAction {
                medication_id,
                kind,
            } => {
                self.dispatch_medication_action(medication_id, kind);
            }

            // Everything else belongs to the panel
            other => {
                if let Some(follow_up) = self.panel.update(other)? {
                    self.action_tx.send(follow_up)?;
                }
            }
        }

        Ok(())
    }

    // ── Command dispatch ─────────────────────────────────────────

    /// Validate a gesture and dispatch its command fire-and-forget.
    ///
    /// Anything malformed — no live connection, empty id or kind, an
    /// unrecognized kind — is silently dropped: no call, no error, no
    /// visible state change. The outcome of a dispatched call is never
    /// awaited or displayed; it surfaces only through a later snapshot.
    fn dispatch_medication_action(&self, medication_id: &str, kind: &str) {
        let Some(controller) = self.controller.as_ref() else {
            return;
        };
        if !controller.is_connected() || medication_id.is_empty() || kind.is_empty() {
            return;
        }
        // Unknown kinds are a forward-compatible no-op
        let Some(kind) = ActionKind::parse(kind) else {
            return;
        };

        controller.dispatch(Command::for_action(kind, medication_id));
    }

    // ── Rendering ────────────────────────────────────────────────

    /// Render the full application frame.
    fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        // Layout: [panel content] [status bar]
        let layout = Layout::vertical([
            Constraint::Min(1),    // Panel content
            Constraint::Length(1), // Status bar
        ])
        .split(area);

        self.panel.render(frame, layout[0]);
        self.render_status_bar(frame, layout[1]);

        if self.help_visible {
            self.render_help_overlay(frame, area);
        }
    }

    /// Render the bottom status bar with connection status and key hints.
    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let connection_indicator = match self.connection_status {
            ConnectionStatus::Connected => {
                Span::styled("● connected", Style::default().fg(theme::SUCCESS_GREEN))
            }
            ConnectionStatus::Disconnected => {
                Span::styled("○ disconnected", Style::default().fg(theme::ALERT_RED))
            }
            ConnectionStatus::Connecting => {
                Span::styled("◐ connecting", Style::default().fg(theme::WARN_AMBER))
            }
        };

        let hints = Span::styled(
            " │ ←/→ select  t take  z snooze  n test  ? help  q quit",
            theme::key_hint(),
        );

        let mut spans = vec![Span::raw(" "), connection_indicator, hints];
        if let Some(updated) = self.panel.last_updated() {
            spans.push(Span::styled(
                format!("  updated {}", updated.format("%H:%M:%S")),
                theme::key_hint(),
            ));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    /// Render the help overlay centered on screen.
    #[allow(clippy::unused_self)]
    fn render_help_overlay(&self, frame: &mut Frame, area: Rect) {
        let help_width = 48u16.min(area.width.saturating_sub(4));
        let help_height = 14u16.min(area.height.saturating_sub(4));

        let x = (area.width.saturating_sub(help_width)) / 2;
        let y = (area.height.saturating_sub(help_height)) / 2;

        let help_area = Rect::new(area.x + x, area.y + y, help_width, help_height);

        // Clear the background
        frame.render_widget(
            Block::default().style(Style::default().bg(theme::BG_DARK)),
            help_area,
        );

        let block = Block::default()
            .title(" Keyboard Shortcuts ")
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_focused());

        let inner = block.inner(help_area);
        frame.render_widget(block, help_area);

        let hint = |k: &str, desc: &str| -> Line<'static> {
            Line::from(vec![
                Span::styled(format!("  {k:<10}"), theme::key_hint_key()),
                Span::styled(desc.to_owned(), theme::key_hint()),
            ])
        };

        let help_text = vec![
            Line::from(""),
            hint("←/→ h/l", "Select medication card"),
            hint("t", "Mark selected as taken"),
            hint("z", "Snooze selected"),
            hint("n", "Send a test notification"),
            Line::from(""),
            hint("?", "Toggle this help"),
            hint("q", "Quit"),
            Line::from(""),
            Line::from(Span::styled(
                "               Esc or ? to close",
                theme::key_hint(),
            )),
        ];

        frame.render_widget(Paragraph::new(help_text), inner);
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn app_without_controller() -> App {
        App::new(None, PanelConfig::default())
    }

    #[test]
    fn gesture_without_a_connection_is_silently_dropped() {
        let app = app_without_controller();
        // Must not panic or spawn anything.
        app.dispatch_medication_action("M1", "take");
    }

    #[test]
    fn malformed_gestures_are_silently_dropped() {
        let app = app_without_controller();
        app.dispatch_medication_action("", "take");
        app.dispatch_medication_action("M1", "");
        app.dispatch_medication_action("M1", "refill");
    }

    #[test]
    fn quit_action_stops_the_loop() {
        let mut app = app_without_controller();
        assert!(app.running);
        app.process_action(&Action::Quit).unwrap();
        assert!(!app.running);
    }

    #[test]
    fn connection_actions_drive_the_status_indicator() {
        let mut app = app_without_controller();
        app.process_action(&Action::Connecting).unwrap();
        assert_eq!(app.connection_status, ConnectionStatus::Connecting);

        app.process_action(&Action::Connected).unwrap();
        assert_eq!(app.connection_status, ConnectionStatus::Connected);

        app.process_action(&Action::Disconnected("gone".into())).unwrap();
        assert_eq!(app.connection_status, ConnectionStatus::Disconnected);
    }
}

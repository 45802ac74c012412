//! Medication panel screen — owns the render/update/dispatch cycle.
//!
//! The screen holds the most recent snapshot (discarding the previous one
//! on arrival), derives view records through `pillwatch_core::view` on
//! every update, and reconciles them into the retained [`PanelSurface`].
//! The skeleton is built exactly once, on the first snapshot; every
//! subsequent snapshot replaces the slot contents in place. Gestures are
//! translated into [`Action::MedicationAction`] values carrying the tags
//! of the control they hit; the app loop validates and dispatches them.

use std::sync::Arc;

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table};
use tokio::sync::mpsc::UnboundedSender;

use pillwatch_core::{build_history, select_medications, ActionKind, StateSnapshot};

use crate::action::Action;
use crate::component::Component;
use crate::surface::{
    Card, GridContent, HistoryContent, PanelConfig, PanelSurface, NO_DOSES_MSG,
    NO_MEDICATIONS_MSG,
};
use crate::theme;

/// The panel screen state.
pub struct PanelScreen {
    focused: bool,
    config: PanelConfig,
    /// Most recent snapshot; replaced wholesale on every update.
    snapshot: Option<Arc<StateSnapshot>>,
    /// Retained surface. `None` until the first snapshot arrives.
    surface: Option<PanelSurface>,
    /// Selected card index. Survives refreshes, clamped to the card count.
    selected: usize,
    #[allow(dead_code)]
    action_tx: Option<UnboundedSender<Action>>,
}

impl PanelScreen {
    pub fn new(config: PanelConfig) -> Self {
        Self {
            focused: false,
            config,
            snapshot: None,
            surface: None,
            selected: 0,
            action_tx: None,
        }
    }

    /// Store a new panel configuration. No immediate visual effect -- the
    /// badge is re-rendered on the next refresh. Safe to call before or
    /// after the first snapshot.
    pub fn set_config(&mut self, config: PanelConfig) {
        self.config = config;
    }

    /// Receive a snapshot. An absent snapshot is a defined no-op: nothing
    /// is drawn until a real one arrives. The first real snapshot builds
    /// the skeleton; every call runs a full refresh.
    pub fn on_snapshot(&mut self, snapshot: Option<Arc<StateSnapshot>>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        self.snapshot = Some(snapshot);

        if self.surface.is_none() {
            self.surface = Some(PanelSurface::skeleton());
        }
        self.refresh();
    }

    /// Re-derive view records from the current snapshot and replace the
    /// surface slot contents. Full replace, not a diff: medication
    /// cardinality is small, and rebuilding everything is what guarantees
    /// stale controls can never outlive the refresh that replaced them.
    fn refresh(&mut self) {
        let Some(snapshot) = self.snapshot.clone() else {
            return;
        };
        let Some(surface) = self.surface.as_mut() else {
            return;
        };

        let views = select_medications(&snapshot);
        let history = build_history(&views);

        surface.badge = match &self.config.log_path {
            Some(path) => format!("Log: {path}"),
            None => String::new(),
        };

        surface.grid = if views.is_empty() {
            GridContent::Empty(NO_MEDICATIONS_MSG)
        } else {
            GridContent::Cards(
                views
                    .into_iter()
                    .map(|view| Card {
                        actions: Card::standard_actions(&view.medication_id),
                        display_name: view.display_name,
                        state: view.state,
                        next_dose: view.next_dose_at,
                        last_taken: view.last_taken_at,
                        dose_count: view.doses_today.len(),
                        ratio: view.ratio,
                    })
                    .collect(),
            )
        };

        surface.history = if history.is_empty() {
            HistoryContent::Empty(NO_DOSES_MSG)
        } else {
            HistoryContent::Rows(history)
        };

        // Keep the selection on a card that still exists.
        self.selected = self.selected.min(surface.card_count().saturating_sub(1));
    }

    /// The currently displayed surface, if the first snapshot has arrived.
    pub fn surface(&self) -> Option<&PanelSurface> {
        self.surface.as_ref()
    }

    /// When the displayed snapshot was assembled (for the status bar).
    pub fn last_updated(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.snapshot.as_ref().and_then(|s| s.received_at)
    }

    /// The selected card index.
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Translate a gesture on the selected card into the action carried by
    /// the matching control. Returns `None` when there is no card to act
    /// on -- a gesture with nothing under it is dropped, not an error.
    fn trigger_selected(&self, kind: ActionKind) -> Option<Action> {
        let card = self.surface.as_ref()?.card(self.selected)?;
        let control = card.actions.iter().find(|c| c.kind == kind.as_str())?;
        Some(Action::MedicationAction {
            medication_id: control.medication_id.clone(),
            kind: control.kind.clone(),
        })
    }

    // ── Rendering ────────────────────────────────────────────────────

    fn render_header(&self, surface: &PanelSurface, frame: &mut Frame, area: Rect) {
        let cols = Layout::horizontal([Constraint::Min(20), Constraint::Length(40)]).split(area);

        let header = vec![
            Line::from(Span::styled(surface.title, theme::title_style())),
            Line::from(Span::styled(surface.subtitle, theme::key_hint())),
        ];
        frame.render_widget(Paragraph::new(header), cols[0]);

        // CSV history location
        let badge = Paragraph::new(Line::from(Span::styled(
            surface.badge.as_str(),
            Style::default().fg(theme::ACCENT_PURPLE),
        )))
        .right_aligned();
        frame.render_widget(badge, cols[1]);
    }

    fn render_grid(&self, surface: &PanelSurface, frame: &mut Frame, area: Rect) {
        let cards = match &surface.grid {
            GridContent::Empty(msg) => {
                frame.render_widget(
                    Paragraph::new(*msg).style(Style::default().fg(theme::BORDER_GRAY)),
                    area,
                );
                return;
            }
            GridContent::Cards(cards) => cards,
        };

        // Responsive columns: as many 32-cell cards per row as fit.
        let columns = usize::from(area.width / 32).max(1).min(cards.len());
        let card_height = 8u16;

        let rows_needed = cards.len().div_ceil(columns);
        let row_areas = Layout::vertical(vec![Constraint::Length(card_height); rows_needed])
            .split(area);

        for (row_idx, chunk) in cards.chunks(columns).enumerate() {
            let Some(row_area) = row_areas.get(row_idx) else {
                break;
            };
            let col_areas = Layout::horizontal(vec![
                Constraint::Ratio(1, u32::try_from(columns).unwrap_or(1));
                columns
            ])
            .split(*row_area);

            for (col_idx, card) in chunk.iter().enumerate() {
                let index = row_idx * columns + col_idx;
                let highlighted = self.focused && index == self.selected;
                if let Some(card_area) = col_areas.get(col_idx) {
                    self.render_card(card, highlighted, frame, *card_area);
                }
            }
        }
    }

    #[allow(clippy::unused_self)]
    fn render_card(&self, card: &Card, selected: bool, frame: &mut Frame, area: Rect) {
        let border = if selected {
            theme::border_focused()
        } else {
            theme::border_default()
        };

        let title = Line::from(vec![
            Span::styled(format!(" {} ", card.display_name), theme::title_style()),
            Span::styled(
                format!("[{}] ", card.state),
                Style::default().fg(theme::state_color(&card.state)),
            ),
        ]);

        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border);

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let kv = |label: &str, value: &str| -> Line<'static> {
            Line::from(vec![
                Span::styled(format!(" {label:<12}"), Style::default().fg(theme::DIM_WHITE)),
                Span::styled(value.to_owned(), Style::default().fg(theme::SOFT_CYAN)),
            ])
        };

        // Absent values render as the "n/a" placeholder here, in the view
        // layer -- the underlying records keep them absent.
        let mut lines = vec![
            kv("Next", card.next_dose.as_deref().unwrap_or("n/a")),
            kv("Last taken", card.last_taken.as_deref().unwrap_or("n/a")),
            kv("Doses today", &card.dose_count.to_string()),
            kv("Ratio", &card.ratio),
        ];

        let mut action_spans = vec![Span::raw(" ")];
        for (key, control) in ["t", "z", "n"].iter().zip(&card.actions) {
            action_spans.push(Span::styled(format!("[{key}] "), theme::key_hint_key()));
            action_spans.push(Span::styled(
                format!("{}  ", control.label),
                theme::key_hint(),
            ));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(action_spans));

        frame.render_widget(Paragraph::new(lines), inner);
    }

    #[allow(clippy::unused_self)]
    fn render_history(&self, surface: &PanelSurface, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(Span::styled(" Today's doses ", theme::title_style()))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_default());

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = match &surface.history {
            HistoryContent::Empty(msg) => {
                frame.render_widget(
                    Paragraph::new(*msg).style(Style::default().fg(theme::BORDER_GRAY)),
                    inner,
                );
                return;
            }
            HistoryContent::Rows(rows) => rows,
        };

        let table_rows: Vec<Row> = rows
            .iter()
            .map(|dose| {
                Row::new(vec![
                    Cell::from(dose.medication_name.clone()),
                    Cell::from(dose.timestamp.clone()),
                ])
                .style(theme::table_row())
            })
            .collect();

        let table = Table::new(
            table_rows,
            [Constraint::Percentage(50), Constraint::Percentage(50)],
        )
        .header(Row::new(vec!["Medication", "Time"]).style(theme::table_header()));

        frame.render_widget(table, inner);
    }
}

impl Component for PanelScreen {
    fn init(&mut self, action_tx: UnboundedSender<Action>) -> Result<()> {
        self.action_tx = Some(action_tx);
        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        let action = match key.code {
            KeyCode::Left | KeyCode::Char('h') => Some(Action::SelectPrev),
            KeyCode::Right | KeyCode::Char('l') => Some(Action::SelectNext),
            KeyCode::Char('t') => self.trigger_selected(ActionKind::Take),
            KeyCode::Char('z') => self.trigger_selected(ActionKind::Snooze),
            KeyCode::Char('n') => self.trigger_selected(ActionKind::Test),
            _ => None,
        };
        Ok(action)
    }

    fn update(&mut self, action: &Action) -> Result<Option<Action>> {
        match action {
            Action::SnapshotUpdated(snapshot) => {
                self.on_snapshot(Some(Arc::clone(snapshot)));
            }
            Action::SelectNext => {
                let count = self.surface.as_ref().map_or(0, PanelSurface::card_count);
                if count > 0 {
                    self.selected = (self.selected + 1) % count;
                }
            }
            Action::SelectPrev => {
                let count = self.surface.as_ref().map_or(0, PanelSurface::card_count);
                if count > 0 {
                    self.selected = (self.selected + count - 1) % count;
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let Some(surface) = self.surface.as_ref() else {
            // No snapshot yet -- nothing to draw beyond a quiet placeholder.
            frame.render_widget(
                Paragraph::new("  Waiting for data…")
                    .style(Style::default().fg(theme::BORDER_GRAY)),
                area,
            );
            return;
        };

        let layout = Layout::vertical([
            Constraint::Length(2),  // header + badge
            Constraint::Min(8),     // medication grid
            Constraint::Length(10), // dose history
        ])
        .split(area);

        self.render_header(surface, frame, layout[0]);
        self.render_grid(surface, frame, layout[1]);
        self.render_history(surface, frame, layout[2]);
    }

    fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    fn id(&self) -> &str {
        "panel"
    }
}

// ── Tests ────────────────────────────────────────────────────────────

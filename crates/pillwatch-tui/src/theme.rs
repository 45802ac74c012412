//! Palette and semantic styling for the panel.

use ratatui::style::{Color, Modifier, Style};

// ── Core Palette ──────────────────────────────────────────────────────

pub const ACCENT_PURPLE: Color = Color::Rgb(149, 117, 205); // #9575cd
pub const SOFT_CYAN: Color = Color::Rgb(128, 203, 196); // #80cbc4
pub const WARN_AMBER: Color = Color::Rgb(255, 183, 77); // #ffb74d
pub const SUCCESS_GREEN: Color = Color::Rgb(129, 199, 132); // #81c784
pub const ALERT_RED: Color = Color::Rgb(229, 115, 115); // #e57373

// ── Extended Palette ──────────────────────────────────────────────────

pub const DIM_WHITE: Color = Color::Rgb(189, 193, 207); // #bdc1cf
pub const BORDER_GRAY: Color = Color::Rgb(98, 114, 164); // #6272a4
pub const BG_DARK: Color = Color::Rgb(30, 31, 41); // #1e1f29

// ── Semantic Styles ───────────────────────────────────────────────────

/// Title text for blocks/panels.
pub fn title_style() -> Style {
    Style::default().fg(SOFT_CYAN).add_modifier(Modifier::BOLD)
}

/// Border for the focused card.
pub fn border_focused() -> Style {
    Style::default().fg(ACCENT_PURPLE)
}

/// Border for an unfocused panel.
pub fn border_default() -> Style {
    Style::default().fg(BORDER_GRAY)
}

/// Table header row.
pub fn table_header() -> Style {
    Style::default()
        .fg(SOFT_CYAN)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
}

/// Normal table row text.
pub fn table_row() -> Style {
    Style::default().fg(DIM_WHITE)
}

/// Dimmed hint text (key legends, placeholders).
pub fn key_hint() -> Style {
    Style::default().fg(BORDER_GRAY)
}

/// Highlighted key in a hint line.
pub fn key_hint_key() -> Style {
    Style::default().fg(SOFT_CYAN).add_modifier(Modifier::BOLD)
}

/// Color for a medication state badge.
///
/// States come from the backing integration's sensor: `scheduled`,
/// `due`, `overdue`, `taken`, `refill_needed`. Unknown states render
/// neutral rather than erroring.
pub fn state_color(state: &str) -> Color {
    match state {
        "taken" => SUCCESS_GREEN,
        "due" => WARN_AMBER,
        "overdue" | "refill_needed" => ALERT_RED,
        _ => DIM_WHITE,
    }
}

//! Plain-text and JSON rendering of the board.

pub mod board_panel;

pub use board_panel::{render, render_json};

/// Shortens `text` to at most `width` characters, ending in `…` when cut.
#[must_use]
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(width - 1).collect();
    out.push('…');
    out
}

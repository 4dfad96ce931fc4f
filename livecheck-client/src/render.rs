//! Terminal rendering of a [`SessionView`].
//!
//! Pure projection: the same view always renders the same text.

use std::fmt::Write as _;

use livecheck_core::{ConnectionStatus, SessionView};

use crate::config::DisplayConfig;

pub const TITLE: &str = "Liveliness Check";

/// Render `view` as a block of terminal lines.
pub fn render(view: &SessionView, display: &DisplayConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "── {TITLE} ── [{}]", connection_tag(view.connection));

    if view.verified {
        let _ = writeln!(out, "   ***  VERIFIED  ***");
    }

    let _ = writeln!(out, "Status: {}", view.status);
    let _ = writeln!(out, "{}", view.message);
    let _ = writeln!(
        out,
        "Blinks Detected: {} / {}",
        view.blink_count, display.required_blinks
    );

    if display.show_transform && !view.view.is_identity() {
        let _ = writeln!(out, "Zoom: {}", view.view.css());
    }

    let hint = if view.has_photo {
        "[r] restart  [d] download photo  [q] quit"
    } else {
        "[r] restart  [q] quit"
    };
    let _ = write!(out, "{hint}");
    out
}

fn connection_tag(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected { .. } => "online",
        ConnectionStatus::Disconnected => "offline",
    }
}

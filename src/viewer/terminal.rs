//! Terminal I/O layer: raw mode, card drawing, status bar, OSC 52.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use crossterm::{
    ExecutableCommand, QueueableCommand, cursor,
    event::{DisableFocusChange, EnableFocusChange},
    style::{self, Stylize},
    terminal,
};
use std::io::{self, Write, stdout};

use super::state::{self, Layout, ViewState, VisibleCards};
use crate::feed::FeedSnapshot;

// ---------------------------------------------------------------------------
// RawGuard: restores raw mode / alternate screen / focus reporting on Drop
// ---------------------------------------------------------------------------

pub(super) struct RawGuard {
    cleaned: bool,
}

impl RawGuard {
    pub(super) fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        stdout().execute(terminal::EnterAlternateScreen)?;
        stdout().execute(cursor::Hide)?;
        stdout().execute(EnableFocusChange)?;
        Ok(Self { cleaned: false })
    }

    pub(super) fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let mut out = stdout();
        let _ = out.execute(DisableFocusChange);
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

/// Redraw the card area and the status bar.
pub(super) fn redraw(
    snap: &FeedSnapshot,
    layout: &Layout,
    view: &ViewState,
    acc_peek: Option<u32>,
) -> io::Result<()> {
    let mut out = stdout();
    out.queue(terminal::Clear(terminal::ClearType::All))?;

    if snap.is_loading || snap.init_error.is_some() || snap.items.is_empty() {
        let msg = match &snap.init_error {
            Some(_) => "Nothing to show.",
            None => "Loading your feed…",
        };
        out.queue(cursor::MoveTo(2, layout.card_rows / 2))?;
        write!(out, "{msg}")?;
    } else {
        match state::visible_cards(view.scroll_row, layout, snap.end()) {
            VisibleCards::Single { idx, src_row, rows } => {
                draw_card(&mut out, snap, layout, idx, src_row, 0, rows)?;
            }
            VisibleCards::Split {
                top_idx,
                top_src_row,
                top_rows,
                bot_idx,
                bot_rows,
            } => {
                draw_card(&mut out, snap, layout, top_idx, top_src_row, 0, top_rows)?;
                draw_card(&mut out, snap, layout, bot_idx, 0, top_rows, bot_rows)?;
            }
        }
    }
    out.flush()?;
    draw_status_bar(snap, layout, view, acc_peek)
}

/// Draw rows `src_row..src_row + rows` of card `idx` starting at screen row `screen_row`.
fn draw_card(
    out: &mut impl Write,
    snap: &FeedSnapshot,
    layout: &Layout,
    idx: usize,
    src_row: u16,
    screen_row: u16,
    rows: u16,
) -> io::Result<()> {
    let Some(item) = snap.item_at(idx) else {
        return Ok(());
    };
    let text_rows = layout.card_rows.saturating_sub(1) as usize;
    let lines = state::clip_lines(state::card_lines(item, idx, layout.cols), text_rows);
    // Row 0 of a card is its top border; text starts one row below.
    for r in 0..rows {
        let card_row = (src_row + r) as usize;
        out.queue(cursor::MoveTo(0, screen_row + r))?;
        if card_row == 0 {
            let rule = "─".repeat(layout.cols as usize);
            write!(out, "{}", rule.dark_grey())?;
        } else if let Some(line) = lines.get(card_row - 1) {
            if card_row == 3 {
                write!(out, "  {}", line.as_str().bold())?;
            } else {
                write!(out, "  {line}")?;
            }
        }
    }
    Ok(())
}

/// Draw the status bar on the last terminal row.
///
/// `acc_peek`: pending count shown as `:5_`.
pub(super) fn draw_status_bar(
    snap: &FeedSnapshot,
    layout: &Layout,
    view: &ViewState,
    acc_peek: Option<u32>,
) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;
    let text = state::status_text(snap, view, acc_peek);
    let padded = state::fit_width(&text, layout.cols as usize);
    write!(out, "{}", padded.on_dark_grey().white())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Send text to the system clipboard via OSC 52.
pub(super) fn send_osc52(text: &str) -> io::Result<()> {
    let encoded = BASE64.encode(text.as_bytes());
    let mut out = stdout();
    write!(out, "\x1b]52;c;{encoded}\x1b\\")?;
    out.flush()
}

pub(super) fn check_tty() -> anyhow::Result<()> {
    use std::io::IsTerminal;
    // Only stdout matters. crossterm's `use-dev-tty` reads keyboard from /dev/tty,
    // so stdin being a pipe is fine.
    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "feedcast viewer requires an interactive terminal.\n\
             \n\
             For non-interactive use, try: feedcast bookmarks | feedcast search <query>"
        );
    }
    Ok(())
}

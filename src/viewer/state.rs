//! View state: layout, scroll position, visible cards, card text layout.
//!
//! Cards are stacked at absolute feed positions, one screen tall each, so
//! card `p` spans rows `p * card_rows .. (p + 1) * card_rows` of a virtual
//! document. The viewport is `card_rows` tall and shows at most two cards.

use log::debug;
use unicode_width::UnicodeWidthChar;

use crate::feed::{FeedSnapshot, Visibility};
use crate::item::FeedItem;

// ---------------------------------------------------------------------------
// Layout / ViewState
// ---------------------------------------------------------------------------

pub(super) struct Layout {
    pub cols: u16,
    pub card_rows: u16,  // カード1枚の高さ (= term_rows - 1)
    pub status_row: u16, // ステータスバーの行 (= term_rows - 1)
}

pub(super) fn compute_layout(term_cols: u16, term_rows: u16) -> Layout {
    let card_rows = term_rows.saturating_sub(1).max(1);
    Layout {
        cols: term_cols.max(1),
        card_rows,
        status_row: term_rows.saturating_sub(1),
    }
}

pub(super) struct ViewState {
    /// Top of the viewport, in virtual rows.
    pub scroll_row: u64,
    /// User audio toggle (`a`).
    pub audio_on: bool,
    /// Terminal focus as last reported.
    pub focused: bool,
    /// One-shot message, cleared on the next key press.
    pub flash: Option<String>,
}

impl ViewState {
    pub(super) fn new(audio_on: bool) -> Self {
        Self {
            scroll_row: 0,
            audio_on,
            focused: true,
            flash: None,
        }
    }

    pub(super) fn view_active(&self) -> bool {
        self.audio_on && self.focused
    }
}

/// Keep the viewport inside the held cards.
pub(super) fn clamp_scroll(scroll_row: u64, layout: &Layout, first: usize, end: usize) -> u64 {
    let h = layout.card_rows as u64;
    let min = first as u64 * h;
    let max = (end.saturating_sub(1) as u64 * h).max(min);
    scroll_row.clamp(min, max)
}

/// Scroll position that puts card `index` exactly on screen.
pub(super) fn card_top(index: usize, layout: &Layout) -> u64 {
    index as u64 * layout.card_rows as u64
}

// ---------------------------------------------------------------------------
// Visible cards
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub(super) enum VisibleCards {
    Single {
        idx: usize,
        src_row: u16,
        rows: u16,
    },
    Split {
        top_idx: usize,
        top_src_row: u16,
        top_rows: u16,
        bot_idx: usize,
        bot_rows: u16,
    },
}

/// Which cards the viewport shows, and which rows of each.
pub(super) fn visible_cards(scroll_row: u64, layout: &Layout, end: usize) -> VisibleCards {
    let h = layout.card_rows as u64;
    let top_idx = (scroll_row / h) as usize;
    let src_row = (scroll_row % h) as u16;
    let remaining_in_top = layout.card_rows - src_row;

    if src_row == 0 || top_idx + 1 >= end {
        debug!("display: single card {top_idx}, src_row={src_row}");
        VisibleCards::Single {
            idx: top_idx,
            src_row,
            rows: remaining_in_top,
        }
    } else {
        debug!("display: split cards [{top_idx}, {}], top_src_row={src_row}", top_idx + 1);
        VisibleCards::Split {
            top_idx,
            top_src_row: src_row,
            top_rows: remaining_in_top,
            bot_idx: top_idx + 1,
            bot_rows: layout.card_rows - remaining_in_top,
        }
    }
}

/// Visibility report for the presentation's current frame.
pub(super) fn visibility(visible: &VisibleCards, layout: &Layout) -> Vec<Visibility> {
    let h = layout.card_rows as f32;
    match *visible {
        VisibleCards::Single { idx, rows, .. } => vec![Visibility {
            index: idx,
            fraction: rows as f32 / h,
        }],
        VisibleCards::Split {
            top_idx,
            top_rows,
            bot_idx,
            bot_rows,
            ..
        } => vec![
            Visibility {
                index: top_idx,
                fraction: top_rows as f32 / h,
            },
            Visibility {
                index: bot_idx,
                fraction: bot_rows as f32 / h,
            },
        ],
    }
}

// ---------------------------------------------------------------------------
// Card text
// ---------------------------------------------------------------------------

/// Lay out one card as plain lines, `width` columns wide.
pub(super) fn card_lines(item: &FeedItem, position: usize, width: u16) -> Vec<String> {
    let width = (width as usize).saturating_sub(4).max(10);
    let mut lines = Vec::new();

    let mark = if item.bookmarked { "★" } else { "☆" };
    lines.push(format!("#{} {mark}", position + 1));
    lines.push(String::new());
    lines.extend(wrap(&item.title, width));
    let authors = item.author_line();
    if !authors.is_empty() {
        lines.extend(wrap(&authors, width));
    }
    lines.push(String::new());
    for paragraph in item.body.split('\n') {
        lines.extend(wrap(paragraph, width));
    }
    if !item.external_url.is_empty() {
        lines.push(String::new());
        lines.extend(wrap(&item.external_url, width));
    }
    lines
}

/// Word wrap to `width` display columns. Wide (CJK) characters count as two.
pub(super) fn wrap(text: &str, width: usize) -> Vec<String> {
    textwrap::wrap(text, width)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

/// Keep the first `rows` lines; when text is cut, the last kept line becomes `…`.
pub(super) fn clip_lines(mut lines: Vec<String>, rows: usize) -> Vec<String> {
    if lines.len() > rows {
        lines.truncate(rows);
        if let Some(last) = lines.last_mut() {
            *last = "…".into();
        }
    }
    lines
}

/// Truncate or pad `text` to exactly `cols` display columns.
pub(super) fn fit_width(text: &str, cols: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > cols {
            break;
        }
        out.push(c);
        used += w;
    }
    out.extend(std::iter::repeat_n(' ', cols - used));
    out
}

/// Flash shown once, on the first launch of a device.
pub(super) const WELCOME: &str = "welcome! J/space: next paper, b: bookmark, a: audio, q: quit";

/// Short status summary of a snapshot.
pub(super) fn status_text(snap: &FeedSnapshot, state: &ViewState, acc_peek: Option<u32>) -> String {
    if let Some(err) = &snap.init_error {
        return format!(" could not load feed: {err} | r:retry q:quit");
    }
    if snap.is_loading {
        return " loading feed…".into();
    }
    let mut parts = vec![format!("{}/{}", snap.current_index + 1, snap.end())];
    if let Some(item) = snap.current_item() {
        parts.push(if item.bookmarked { "★".into() } else { "☆".into() });
    }
    parts.push(if state.audio_on {
        snap.playback.to_string()
    } else {
        "audio off".into()
    });
    if snap.is_waiting_for_next {
        parts.push("waiting for next item".into());
    }
    if let Some(n) = acc_peek {
        parts.push(format!(":{n}_"));
    }
    if let Some(msg) = &state.flash {
        parts.push(msg.clone());
    } else {
        parts.push("[j/k J/K b:bookmark o:open s:share a:audio q:quit]".into());
    }
    format!(" {}", parts.join(" | "))
}

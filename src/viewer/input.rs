//! Input processing layer: key mapping and numeric prefix accumulator.
//!
//! Pure logic, no I/O. All functions are deterministic and testable.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const MAX_COUNT: u32 = 9_999;

/// Accumulated numeric prefix for vim/less-style commands.
///
/// Users type digits then a command character: `10j` scrolls 10 steps down,
/// `3J` skips three cards.
pub(super) struct InputAccumulator {
    count: Option<u32>,
}

impl InputAccumulator {
    pub(super) fn new() -> Self {
        Self { count: None }
    }

    /// Feed a digit. Returns false if overflow would occur.
    fn push_digit(&mut self, d: u32) -> bool {
        let current = self.count.unwrap_or(0);
        let new = current.saturating_mul(10).saturating_add(d);
        if new > MAX_COUNT {
            return false;
        }
        self.count = Some(new);
        true
    }

    fn take(&mut self) -> Option<u32> {
        self.count.take()
    }

    pub(super) fn peek(&self) -> Option<u32> {
        self.count
    }

    pub(super) fn reset(&mut self) {
        self.count = None;
    }
}

/// Actions produced by key input processing.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Action {
    Quit,
    ScrollDown(u32),
    ScrollUp(u32),
    NextCard(u32),
    PrevCard(u32),
    JumpToTop,
    Bookmark,
    OpenLink,
    Share,
    ToggleAudio,
    Retry,
    CancelInput,
    /// A digit was accumulated; caller should redraw status bar.
    Digit,
}

/// Map a key event to an `Action`, consuming/updating the accumulator as needed.
///
/// Returns `None` for unknown keys (caller should reset accumulator).
pub(super) fn map_key_event(key: KeyEvent, acc: &mut InputAccumulator) -> Option<Action> {
    let KeyEvent { code, modifiers, .. } = key;
    let count = |acc: &mut InputAccumulator| acc.take().unwrap_or(1);

    match (code, modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            Some(Action::Quit)
        }

        (KeyCode::Esc, _) => {
            acc.reset();
            Some(Action::CancelInput)
        }

        (KeyCode::Char(c @ '0'..='9'), KeyModifiers::NONE) => {
            acc.push_digit(c as u32 - '0' as u32);
            Some(Action::Digit)
        }

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(Action::ScrollDown(count(acc))),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(Action::ScrollUp(count(acc))),

        (KeyCode::Char('J'), _) | (KeyCode::Char(' '), _) | (KeyCode::PageDown, _) => {
            Some(Action::NextCard(count(acc)))
        }
        (KeyCode::Char('K'), _) | (KeyCode::PageUp, _) => Some(Action::PrevCard(count(acc))),

        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => {
            acc.reset();
            Some(Action::JumpToTop)
        }

        // Triggers ignore any pending count.
        (KeyCode::Char(c @ ('b' | 'o' | 's' | 'a' | 'r')), _) => {
            acc.reset();
            Some(match c {
                'b' => Action::Bookmark,
                'o' => Action::OpenLink,
                's' => Action::Share,
                'a' => Action::ToggleAudio,
                _ => Action::Retry,
            })
        }
        (KeyCode::Enter, _) => {
            acc.reset();
            Some(Action::OpenLink)
        }

        _ => None,
    }
}

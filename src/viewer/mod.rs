//! Terminal feed viewer.
//!
//! Layout:
//!   rows 0..term_rows-1 : card viewport (one card tall, may straddle two)
//!   row term_rows-1     : status bar
//!
//! The viewer owns the [`FeedSession`] and is the only thread touching the
//! controller. Every scroll produces a visibility report; the controller
//! decides what the current item is. Network results are drained each
//! loop iteration and applied before drawing.

mod input;
mod state;
mod terminal;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyEventKind},
    terminal as crossterm_terminal,
};
use log::{debug, info, warn};

use crate::config::Config;
use crate::device::DeviceStore;
use crate::feed::{AudioOutput, FeedController};
use crate::runtime::{Dispatcher, FeedSession, Notice};
use crate::source::ItemSource;

use input::{Action, InputAccumulator, map_key_event};
use state::{Layout, ViewState};

/// Poll interval while background jobs are running.
const JOB_POLL: Duration = Duration::from_millis(50);

/// Run the interactive viewer until the user quits.
pub fn run<O: AudioOutput>(
    config: &Config,
    source: Arc<dyn ItemSource>,
    output: O,
    device: &mut DeviceStore,
) -> anyhow::Result<()> {
    terminal::check_tty()?;

    let (term_cols, term_rows) = crossterm_terminal::size()
        .map_err(|e| anyhow::anyhow!("failed to get terminal size: {e}"))?;
    let mut layout = state::compute_layout(term_cols, term_rows);

    let controller = FeedController::new(config.feed, output);
    let dispatcher = Dispatcher::new(source, config.server.user_id);
    let mut session = FeedSession::new(controller, dispatcher, device.is_initialized());
    let mut view = ViewState::new(config.playback_enabled);
    let mut acc = InputAccumulator::new();

    let mut guard = terminal::RawGuard::enter()?;
    info!("viewer: started ({term_cols}x{term_rows})");

    let notices = session.start();
    handle_notices(notices, &mut view, device);

    let mut dirty = true;
    let mut last_render = Instant::now();
    let mut drawn_revision = None;

    loop {
        let notices = session.pump(Instant::now());
        handle_notices(notices, &mut view, device);

        let snap = session.controller().snapshot();
        let clamped = state::clamp_scroll(view.scroll_row, &layout, snap.first_position, snap.end());
        if clamped != view.scroll_row {
            view.scroll_row = clamped;
            report_visibility(&mut session, &mut view, &layout, device);
        }
        if drawn_revision != Some(snap.revision) {
            dirty = true;
        }

        if dirty && last_render.elapsed() >= config.viewer.frame_budget {
            let snap = session.controller().snapshot();
            terminal::redraw(&snap, &layout, &view, acc.peek())?;
            drawn_revision = Some(snap.revision);
            last_render = Instant::now();
            dirty = false;
        }

        let timeout = poll_timeout(&session, dirty, last_render, config.viewer.frame_budget);
        if !event::poll(timeout)? {
            continue;
        }

        let ev = event::read()?;
        debug!("event: {:?}", ev);
        match ev {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                view.flash = None;
                dirty = true;
                let step = config.viewer.scroll_step as u64;
                let current = session.controller().current_index();
                match map_key_event(key, &mut acc) {
                    Some(Action::Quit) => break,
                    Some(Action::CancelInput) | Some(Action::Digit) => {}
                    None => acc.reset(),
                    Some(Action::ScrollDown(n)) => {
                        scroll_to(&mut session, &mut view, &layout, device, |s| s + n as u64 * step);
                    }
                    Some(Action::ScrollUp(n)) => {
                        scroll_to(&mut session, &mut view, &layout, device, |s| {
                            s.saturating_sub(n as u64 * step)
                        });
                    }
                    Some(Action::NextCard(n)) => {
                        let target = state::card_top(current + n as usize, &layout);
                        scroll_to(&mut session, &mut view, &layout, device, |_| target);
                    }
                    Some(Action::PrevCard(n)) => {
                        let target = state::card_top(current.saturating_sub(n as usize), &layout);
                        scroll_to(&mut session, &mut view, &layout, device, |_| target);
                    }
                    Some(Action::JumpToTop) => {
                        scroll_to(&mut session, &mut view, &layout, device, |_| 0);
                    }
                    Some(Action::Bookmark) => {
                        let notices = session.with(|c| c.on_bookmark_pressed());
                        handle_notices(notices, &mut view, device);
                    }
                    Some(Action::OpenLink) => {
                        let notices = session.with(|c| c.on_link_pressed());
                        handle_notices(notices, &mut view, device);
                    }
                    Some(Action::Share) => {
                        let notices = session.with(|c| c.on_share_pressed());
                        handle_notices(notices, &mut view, device);
                    }
                    Some(Action::ToggleAudio) => {
                        view.audio_on = !view.audio_on;
                        let msg = if view.audio_on { "audio on" } else { "audio off" };
                        view.flash = Some(msg.to_string());
                        sync_view_active(&mut session, &mut view, device);
                    }
                    Some(Action::Retry) => {
                        let notices = session.with(|c| c.retry_initial());
                        handle_notices(notices, &mut view, device);
                    }
                }
            }
            Event::FocusGained | Event::FocusLost => {
                view.focused = matches!(ev, Event::FocusGained);
                sync_view_active(&mut session, &mut view, device);
            }
            Event::Resize(cols, rows) => {
                // Keep the current card on top after the card height changes.
                let current = session.controller().current_index();
                layout = state::compute_layout(cols, rows);
                view.scroll_row = state::card_top(current, &layout);
                dirty = true;
            }
            _ => {}
        }
    }

    info!("viewer: quitting");
    session.teardown();
    guard.cleanup();
    Ok(())
}

fn poll_timeout<O: AudioOutput>(
    session: &FeedSession<O>,
    dirty: bool,
    last_render: Instant,
    frame_budget: Duration,
) -> Duration {
    let mut timeout = Duration::from_secs(86400);
    if dirty {
        timeout = timeout.min(frame_budget.saturating_sub(last_render.elapsed()));
    }
    if session.in_flight() > 0 {
        timeout = timeout.min(JOB_POLL);
    }
    if let Some(deadline) = session.next_deadline() {
        timeout = timeout.min(deadline.saturating_duration_since(Instant::now()));
    }
    timeout
}

fn scroll_to<O: AudioOutput>(
    session: &mut FeedSession<O>,
    view: &mut ViewState,
    layout: &Layout,
    device: &mut DeviceStore,
    f: impl FnOnce(u64) -> u64,
) {
    let snap = session.controller().snapshot();
    if snap.items.is_empty() {
        return;
    }
    let old = view.scroll_row;
    view.scroll_row = state::clamp_scroll(f(old), layout, snap.first_position, snap.end());
    debug!("scroll: row {old} → {}", view.scroll_row);
    report_visibility(session, view, layout, device);
}

fn report_visibility<O: AudioOutput>(
    session: &mut FeedSession<O>,
    view: &mut ViewState,
    layout: &Layout,
    device: &mut DeviceStore,
) {
    let end = session.controller().snapshot().end();
    let visible = state::visibility(&state::visible_cards(view.scroll_row, layout, end), layout);
    let notices = session.with(|c| c.on_visibility(&visible));
    handle_notices(notices, view, device);
}

fn sync_view_active<O: AudioOutput>(
    session: &mut FeedSession<O>,
    view: &mut ViewState,
    device: &mut DeviceStore,
) {
    let active = view.view_active();
    let notices = session.with(|c| c.set_view_active(active));
    handle_notices(notices, view, device);
}

fn handle_notices(notices: Vec<Notice>, view: &mut ViewState, device: &mut DeviceStore) {
    for notice in notices {
        match notice {
            Notice::OpenLink(url) => {
                info!("viewer: opening {url}");
                view.flash = Some(match open::that(&url) {
                    Ok(()) => "opened in browser".into(),
                    Err(e) => {
                        warn!("viewer: open failed: {e}");
                        format!("could not open link: {e}")
                    }
                });
            }
            Notice::Share { title, url } => {
                let text = if url.is_empty() { title } else { format!("{title}\n{url}") };
                view.flash = Some(match terminal::send_osc52(&text) {
                    Ok(()) => "copied title and link".into(),
                    Err(e) => {
                        debug!("OSC 52 failed: {e}");
                        "could not copy to clipboard".into()
                    }
                });
            }
            Notice::FirstLoad => {
                view.flash = Some(state::WELCOME.into());
                if let Err(e) = device.mark_initialized() {
                    warn!("viewer: could not persist device state: {e:#}");
                }
            }
            Notice::BookmarkReverted(e) => {
                view.flash = Some(format!("bookmark not saved: {e}"));
            }
        }
    }
}

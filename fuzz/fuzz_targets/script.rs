//! Byte-coded event scripts for the feed controller.
//!
//! Each pair of bytes is one event (opcode, argument). After every event the
//! controller's invariants are checked; a violation panics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use feedcast::config::FeedConfig;
use feedcast::feed::{AudioOutput, Effect, FeedController, MutationRequest, Visibility};
use feedcast::item::FeedItem;
use feedcast::source::SourceError;
use log::debug;

#[derive(Default)]
struct Output {
    live: usize,
}

impl AudioOutput for Output {
    type Handle = ();

    fn load(&mut self, _item_id: &str, _media: Vec<u8>) -> anyhow::Result<()> {
        self.live += 1;
        assert!(self.live <= 1, "two playback resources live at once");
        Ok(())
    }

    fn release(&mut self, _handle: ()) {
        self.live -= 1;
    }
}

fn item(n: usize) -> FeedItem {
    FeedItem {
        id: format!("item-{n}"),
        content_id: format!("paper-{n}"),
        title: format!("Paper {n}"),
        authors: Vec::new(),
        body: String::new(),
        media_url: format!("https://media.invalid/{n}.mp3"),
        external_url: String::new(),
        bookmarked: false,
    }
}

fn failure() -> SourceError {
    SourceError::Transport {
        endpoint: "fuzz".into(),
        message: "scripted failure".into(),
    }
}

struct Run {
    c: FeedController<Output>,
    config: FeedConfig,
    now: Instant,
    next_id: usize,
    fetches_out: usize,
    furthest: usize,
    last_reported: usize,
    reached_tail: bool,
    view_active: bool,
    media: VecDeque<u64>,
    writes: VecDeque<MutationRequest>,
}

impl Run {
    fn absorb(&mut self, effects: Vec<Effect>) {
        let snap = self.c.snapshot();
        self.reached_tail |= snap.current_index + 1 == snap.end();
        for effect in effects {
            match effect {
                Effect::FetchNextItem => {
                    self.fetches_out += 1;
                    assert!(self.fetches_out <= 1, "two prefetches in flight");
                    assert!(
                        self.furthest >= self.config.arm_threshold || self.reached_tail,
                        "prefetch below the threshold with items still ahead"
                    );
                }
                Effect::ResolveMedia(req) => self.media.push_back(req.ticket),
                Effect::WriteBookmark(req) => {
                    assert!(
                        self.writes.iter().all(|w| w.content_id != req.content_id),
                        "second write for {} while one is in flight",
                        req.content_id
                    );
                    self.writes.push_back(req);
                }
                other => debug!("ignored effect {other:?}"),
            }
        }
    }

    fn step(&mut self, op: u8, arg: u8) {
        match op % 8 {
            0 => {
                let snap = self.c.snapshot();
                let index = snap.first_position + arg as usize % snap.items.len().max(1);
                self.furthest = self.furthest.max(index);
                self.last_reported = index;
                let effects = self.c.on_visibility(&[Visibility {
                    index,
                    fraction: 1.0,
                }]);
                self.absorb(effects);
            }
            1 | 2 if self.fetches_out > 0 => {
                self.fetches_out -= 1;
                let result = if op % 8 == 1 {
                    self.next_id += 1;
                    Ok(item(self.next_id))
                } else {
                    Err(failure())
                };
                let effects = self.c.on_next_item(result, self.now);
                self.absorb(effects);
            }
            3 => {
                self.now += Duration::from_millis(arg as u64 * 50);
                let effects = self.c.tick(self.now);
                self.absorb(effects);
            }
            4 => {
                if let Some(ticket) = self.media.pop_front() {
                    let result = if arg % 4 == 0 { Err(failure()) } else { Ok(vec![arg]) };
                    self.c.on_media_resolved(ticket, result);
                }
            }
            5 => {
                self.view_active = arg % 2 == 0;
                let effects = self.c.set_view_active(self.view_active);
                self.absorb(effects);
            }
            6 => {
                let effects = self.c.on_bookmark_pressed();
                self.absorb(effects);
            }
            7 => {
                if let Some(req) = self.writes.pop_front() {
                    let before = self.c.buffer().bookmarked(&req.content_id);
                    let result = if arg % 2 == 0 { Ok(()) } else { Err(failure()) };
                    let failed = result.is_err();
                    self.c.on_bookmark_written(req.ticket, result);
                    let after = self.c.buffer().bookmarked(&req.content_id);
                    if failed && before.is_some() {
                        assert_eq!(after, Some(!req.bookmarked), "failed write not rolled back");
                    } else {
                        assert_eq!(before, after, "successful write changed local state");
                    }
                }
            }
            _ => {}
        }
        self.check();
    }

    fn check(&self) {
        let snap = self.c.snapshot();
        assert_eq!(snap.current_index, self.last_reported);
        assert!(
            snap.current_item().is_some(),
            "current position {} outside held range {}..{}",
            snap.current_index,
            snap.first_position,
            snap.end()
        );
        if let Some(active) = self.c.active_playback_item() {
            assert!(self.view_active, "playback while the view is inactive");
            assert_eq!(Some(active), snap.current_item().map(|i| i.id.as_str()));
        }
        assert!(self.c.audio_output().live <= 1);
    }
}

/// Run one script. The first byte picks the initial batch size (1..=6).
/// Returns the number of events applied.
pub fn run(data: &[u8]) -> usize {
    let Some((&size, data)) = data.split_first() else {
        return 0;
    };
    let size = 1 + size as usize % 6;
    let config = FeedConfig {
        arm_threshold: 3,
        retry_delay: Duration::from_secs(3),
        visible_threshold: 0.5,
    };
    let mut c = FeedController::new(config, Output::default());
    c.start();
    let initial = (0..size).map(item).collect();
    let mut run = Run {
        c,
        config,
        now: Instant::now(),
        next_id: size - 1,
        fetches_out: 0,
        furthest: 0,
        last_reported: 0,
        reached_tail: false,
        view_active: true,
        media: VecDeque::new(),
        writes: VecDeque::new(),
    };
    let effects = run.c.on_initial_batch(Ok(initial));
    run.absorb(effects);

    let mut steps = 0;
    for pair in data.chunks_exact(2) {
        run.step(pair[0], pair[1]);
        steps += 1;
    }
    run.c.teardown();
    assert_eq!(run.c.audio_output().live, 0, "teardown left audio loaded");
    steps
}

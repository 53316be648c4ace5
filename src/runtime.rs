//! Effect runtime: runs Item Source calls off the UI thread.
//!
//! Each network effect gets its own short-lived thread. Results come back
//! over one `mpsc` channel and are applied to the controller by the thread
//! that owns it, one at a time, in arrival order. Nothing here blocks the
//! caller except [`FeedSession::wait`].
//!
//! Media downloads run one at a time. A request that arrives while one is
//! running waits; a newer one replaces it, since every media request
//! supersedes the previous ticket.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::feed::{AudioOutput, Effect, FeedController, LoadPhase, MediaRequest};
use crate::item::FeedItem;
use crate::source::{ItemSource, SourceError, UserId};

/// Result of one background call.
#[derive(Debug)]
pub enum Outcome {
    InitialBatch(Result<Vec<FeedItem>, SourceError>),
    GenerationStarted(Result<(), SourceError>),
    NextItem(Result<FeedItem, SourceError>),
    MediaResolved {
        ticket: u64,
        result: Result<Vec<u8>, SourceError>,
    },
    BookmarkWritten {
        ticket: u64,
        result: Result<(), SourceError>,
    },
}

/// Things only the presentation layer can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    OpenLink(String),
    Share { title: String, url: String },
    /// The first initial batch of this device arrived.
    FirstLoad,
    /// A bookmark toggle was reverted.
    BookmarkReverted(SourceError),
}

pub struct Dispatcher {
    source: Arc<dyn ItemSource>,
    user: UserId,
    tx: mpsc::Sender<Outcome>,
    rx: mpsc::Receiver<Outcome>,
    in_flight: usize,
    media_running: bool,
    media_queued: Option<MediaRequest>,
}

impl Dispatcher {
    pub fn new(source: Arc<dyn ItemSource>, user: UserId) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            user,
            tx,
            rx,
            in_flight: 0,
            media_running: false,
            media_queued: None,
        }
    }

    /// Jobs started but not yet received back.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Start the background call for a network effect.
    ///
    /// Returns the effect back when it is not a network effect.
    pub fn dispatch(&mut self, effect: Effect) -> Option<Effect> {
        let user = self.user;
        match effect {
            Effect::FetchInitialBatch => {
                self.spawn("initial", move |src| {
                    Outcome::InitialBatch(src.fetch_initial_batch(user))
                });
            }
            Effect::BeginGeneration => {
                self.spawn("generate", move |src| {
                    Outcome::GenerationStarted(src.begin_generation(user))
                });
            }
            Effect::FetchNextItem => {
                self.spawn("next", move |src| {
                    Outcome::NextItem(src.fetch_next_item(user))
                });
            }
            Effect::ResolveMedia(req) if self.media_running => {
                if let Some(old) = self.media_queued.replace(req) {
                    debug!("runtime: media ticket {} superseded before start", old.ticket);
                }
            }
            Effect::ResolveMedia(req) => self.spawn_media(req),
            Effect::WriteBookmark(req) => {
                self.spawn("bookmark", move |src| {
                    let result = if req.bookmarked {
                        src.add_bookmark(&req.content_id, user)
                    } else {
                        src.remove_bookmark(&req.content_id, user)
                    };
                    Outcome::BookmarkWritten {
                        ticket: req.ticket,
                        result,
                    }
                });
            }
            other @ (Effect::OpenLink(_) | Effect::Share { .. }) => return Some(other),
        }
        None
    }

    fn spawn_media(&mut self, req: MediaRequest) {
        self.media_running = true;
        self.spawn("media", move |src| Outcome::MediaResolved {
            ticket: req.ticket,
            result: src.resolve_media(&req.locator),
        });
    }

    /// Jobs waiting behind a running media download.
    pub fn queued(&self) -> usize {
        usize::from(self.media_queued.is_some())
    }

    fn spawn<F>(&mut self, name: &'static str, job: F)
    where
        F: FnOnce(&dyn ItemSource) -> Outcome + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        self.in_flight += 1;
        debug!("runtime: start {name} job ({} in flight)", self.in_flight);
        thread::spawn(move || {
            let started = Instant::now();
            let outcome = job(source.as_ref());
            debug!(
                "runtime: {name} job done in {:.1}ms",
                started.elapsed().as_secs_f64() * 1000.0
            );
            // Receiver gone means the session ended; the result is moot.
            let _ = tx.send(outcome);
        });
    }

    pub fn try_recv(&mut self) -> Option<Outcome> {
        let outcome = self.rx.try_recv().ok()?;
        Some(self.received(outcome))
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Outcome> {
        let outcome = self.rx.recv_timeout(timeout).ok()?;
        Some(self.received(outcome))
    }

    fn received(&mut self, outcome: Outcome) -> Outcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        if matches!(outcome, Outcome::MediaResolved { .. }) {
            self.media_running = false;
            if let Some(req) = self.media_queued.take() {
                self.spawn_media(req);
            }
        }
        outcome
    }
}

/// A controller wired to a dispatcher.
pub struct FeedSession<O: AudioOutput> {
    controller: FeedController<O>,
    dispatcher: Dispatcher,
    initialized_before: bool,
}

impl<O: AudioOutput> FeedSession<O> {
    pub fn new(controller: FeedController<O>, dispatcher: Dispatcher, initialized_before: bool) -> Self {
        Self {
            controller,
            dispatcher,
            initialized_before,
        }
    }

    pub fn controller(&self) -> &FeedController<O> {
        &self.controller
    }

    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    pub fn start(&mut self) -> Vec<Notice> {
        let effects = self.controller.start();
        self.run(effects)
    }

    /// Run a controller call and carry out the effects it returns.
    pub fn with<F>(&mut self, f: F) -> Vec<Notice>
    where
        F: FnOnce(&mut FeedController<O>) -> Vec<Effect>,
    {
        let effects = f(&mut self.controller);
        self.run(effects)
    }

    /// Apply every result that has arrived, then fire due timers.
    pub fn pump(&mut self, now: Instant) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Some(outcome) = self.dispatcher.try_recv() {
            notices.extend(self.apply(outcome, now));
        }
        let effects = self.controller.tick(now);
        notices.extend(self.run(effects));
        notices
    }

    /// Block up to `timeout` for one result, then behave like [`pump`](Self::pump).
    pub fn wait(&mut self, timeout: Duration) -> Vec<Notice> {
        let mut notices = Vec::new();
        if let Some(outcome) = self.dispatcher.recv_timeout(timeout) {
            notices.extend(self.apply(outcome, Instant::now()));
        }
        notices.extend(self.pump(Instant::now()));
        notices
    }

    /// When a timer is due, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.controller.next_deadline()
    }

    pub fn teardown(&mut self) {
        self.controller.teardown();
    }

    fn apply(&mut self, outcome: Outcome, now: Instant) -> Vec<Notice> {
        let mut notices = Vec::new();
        let effects = match outcome {
            Outcome::InitialBatch(result) => {
                let effects = self.controller.on_initial_batch(result);
                if *self.controller.phase() == LoadPhase::Ready && !self.initialized_before {
                    self.initialized_before = true;
                    notices.push(Notice::FirstLoad);
                }
                effects
            }
            Outcome::GenerationStarted(result) => {
                self.controller.on_generation_started(result);
                Vec::new()
            }
            Outcome::NextItem(result) => self.controller.on_next_item(result, now),
            Outcome::MediaResolved { ticket, result } => {
                self.controller.on_media_resolved(ticket, result);
                Vec::new()
            }
            Outcome::BookmarkWritten { ticket, result } => {
                if let Some(e) = self.controller.on_bookmark_written(ticket, result) {
                    warn!("runtime: bookmark reverted: {e}");
                    notices.push(Notice::BookmarkReverted(e));
                }
                Vec::new()
            }
        };
        notices.extend(self.run(effects));
        notices
    }

    fn run(&mut self, effects: Vec<Effect>) -> Vec<Notice> {
        effects
            .into_iter()
            .filter_map(|effect| match self.dispatcher.dispatch(effect)? {
                Effect::OpenLink(url) => Some(Notice::OpenLink(url)),
                Effect::Share { title, url } => Some(Notice::Share { title, url }),
                other => {
                    debug!("runtime: unhandled effect {other:?}");
                    None
                }
            })
            .collect()
    }
}

//! Feed Consumption Controller.
//!
//! Single-threaded and non-blocking: every method returns immediately with
//! the [`Effect`]s the caller must carry out. Results of those effects come
//! back through the matching `on_*` method, in whatever order they finish.
//! Field ownership: `current_index` is written here only, the prefetch flags
//! live inside the scheduler, the buffer changes through initialize/append.

use std::time::Instant;

use log::{debug, error, info, warn};

use super::buffer::FeedBuffer;
use super::mutation::{BookmarkCoordinator, MutationRequest, ToggleOutcome};
use super::playback::{AudioOutput, MediaRequest, PlaybackManager, PlaybackState};
use super::prefetch::{PrefetchScheduler, PrefetchState};
use super::viewability::{ViewabilityTracker, Visibility};
use crate::config::FeedConfig;
use crate::item::FeedItem;
use crate::source::SourceError;

/// Work requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchInitialBatch,
    /// Fire-and-forget; the result only gets logged.
    BeginGeneration,
    FetchNextItem,
    ResolveMedia(MediaRequest),
    WriteBookmark(MutationRequest),
    OpenLink(String),
    Share { title: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    NotStarted,
    Loading,
    Ready,
    /// The initial batch could not be loaded; nothing to show.
    Failed(String),
}

/// Everything the presentation layer needs to render one frame.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub items: Vec<FeedItem>,
    /// Absolute position of `items[0]`.
    pub first_position: usize,
    pub current_index: usize,
    pub is_loading: bool,
    pub is_waiting_for_next: bool,
    pub playback: PlaybackState,
    pub prefetch: PrefetchState,
    pub init_error: Option<String>,
    /// Increases on every state change.
    pub revision: u64,
}

impl FeedSnapshot {
    pub fn item_at(&self, index: usize) -> Option<&FeedItem> {
        index
            .checked_sub(self.first_position)
            .and_then(|i| self.items.get(i))
    }

    pub fn current_item(&self) -> Option<&FeedItem> {
        self.item_at(self.current_index)
    }

    /// One past the last held position.
    pub fn end(&self) -> usize {
        self.first_position + self.items.len()
    }
}

/// What playback was last bound to; re-evaluation is skipped when unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlaybackKey {
    index: usize,
    item_id: Option<String>,
    view_active: bool,
}

pub struct FeedController<O: AudioOutput> {
    buffer: FeedBuffer,
    tracker: ViewabilityTracker,
    scheduler: PrefetchScheduler,
    playback: PlaybackManager<O>,
    bookmarks: BookmarkCoordinator,
    visible_threshold: f32,
    current_index: usize,
    view_active: bool,
    phase: LoadPhase,
    playback_key: Option<PlaybackKey>,
    revision: u64,
    torn_down: bool,
}

impl<O: AudioOutput> FeedController<O> {
    pub fn new(config: FeedConfig, output: O) -> Self {
        Self {
            buffer: FeedBuffer::new(),
            tracker: ViewabilityTracker::new(config.visible_threshold),
            scheduler: PrefetchScheduler::new(config.arm_threshold, config.retry_delay),
            playback: PlaybackManager::new(output),
            bookmarks: BookmarkCoordinator::new(),
            visible_threshold: config.visible_threshold,
            current_index: 0,
            view_active: true,
            phase: LoadPhase::NotStarted,
            playback_key: None,
            revision: 0,
            torn_down: false,
        }
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    /// Initial batch fetch plus the one-time generation request.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.phase != LoadPhase::NotStarted || self.torn_down {
            return Vec::new();
        }
        info!("controller: starting");
        self.phase = LoadPhase::Loading;
        self.touch();
        vec![Effect::FetchInitialBatch, Effect::BeginGeneration]
    }

    /// Try the initial batch again after it failed.
    pub fn retry_initial(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, LoadPhase::Failed(_)) || self.torn_down {
            return Vec::new();
        }
        info!("controller: retrying initial batch");
        self.phase = LoadPhase::Loading;
        self.touch();
        vec![Effect::FetchInitialBatch]
    }

    pub fn on_initial_batch(&mut self, result: Result<Vec<FeedItem>, SourceError>) -> Vec<Effect> {
        if self.torn_down || self.phase != LoadPhase::Loading {
            debug!("controller: late initial batch ignored");
            return Vec::new();
        }
        self.touch();
        match result {
            Ok(items) if items.is_empty() => {
                error!("controller: initial batch is empty");
                self.phase = LoadPhase::Failed("the feed has no items yet".into());
                Vec::new()
            }
            Ok(items) => {
                info!("controller: initial batch of {} items", items.len());
                self.buffer.initialize(items);
                self.tracker = ViewabilityTracker::new(self.visible_threshold);
                self.current_index = 0;
                self.phase = LoadPhase::Ready;
                let mut effects = self.maybe_refill();
                effects.extend(self.reevaluate_playback());
                effects
            }
            Err(e) => {
                error!("controller: initial batch failed: {e}");
                self.phase = LoadPhase::Failed(e.to_string());
                Vec::new()
            }
        }
    }

    pub fn on_generation_started(&mut self, result: Result<(), SourceError>) {
        match result {
            Ok(()) => info!("controller: personalized generation requested"),
            Err(e) => warn!("controller: generation request failed: {e}"),
        }
    }

    // -----------------------------------------------------------------------
    // Position
    // -----------------------------------------------------------------------

    /// Feed a raw visibility report from the presentation layer.
    pub fn on_visibility(&mut self, visible: &[Visibility]) -> Vec<Effect> {
        match self.tracker.report(visible) {
            Some(index) => self.apply_index(index),
            None => Vec::new(),
        }
    }

    /// Feed a report that already names the current position.
    pub fn on_index_reported(&mut self, index: usize) -> Vec<Effect> {
        match self.tracker.report_index(index) {
            Some(index) => self.apply_index(index),
            None => Vec::new(),
        }
    }

    fn apply_index(&mut self, index: usize) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        debug!("controller: current index {} → {index}", self.current_index);
        self.current_index = index;
        self.touch();

        let mut effects = Vec::new();
        if self.scheduler.on_index_changed(index) {
            effects.push(Effect::FetchNextItem);
        } else {
            effects.extend(self.maybe_refill());
        }
        effects.extend(self.reevaluate_playback());
        effects
    }

    // -----------------------------------------------------------------------
    // Prefetch
    // -----------------------------------------------------------------------

    pub fn on_next_item(&mut self, result: Result<FeedItem, SourceError>, now: Instant) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        if self.scheduler.state() != PrefetchState::Fetching {
            debug!("controller: unexpected prefetch result in {:?}", self.scheduler.state());
            return Vec::new();
        }
        self.touch();
        match result {
            Ok(item) => {
                self.buffer.append(item, self.current_index);
                self.scheduler.on_fetch_succeeded();
                let mut effects = self.maybe_refill();
                effects.extend(self.reevaluate_playback());
                effects
            }
            Err(e) => {
                let retry_at = self.scheduler.on_fetch_failed(now);
                warn!(
                    "controller: prefetch failed, retrying in {}ms: {e}",
                    retry_at.saturating_duration_since(now).as_millis()
                );
                Vec::new()
            }
        }
    }

    /// Fire due timers.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        if self.torn_down || !self.scheduler.poll_retry(now) {
            return Vec::new();
        }
        self.touch();
        vec![Effect::FetchNextItem]
    }

    /// When [`tick`](Self::tick) has something to do next.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    fn at_tail(&self) -> bool {
        self.buffer.current_item(self.current_index + 1).is_none()
    }

    /// Fetch right away when the viewer sits on the last held item.
    fn maybe_refill(&mut self) -> Vec<Effect> {
        let at_tail = self.phase == LoadPhase::Ready && self.at_tail();
        if at_tail && self.scheduler.request_refill() {
            vec![Effect::FetchNextItem]
        } else {
            Vec::new()
        }
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    pub fn set_view_active(&mut self, active: bool) -> Vec<Effect> {
        if self.view_active == active || self.torn_down {
            return Vec::new();
        }
        debug!("controller: view active {} → {active}", self.view_active);
        self.view_active = active;
        self.touch();
        self.reevaluate_playback()
    }

    pub fn on_media_resolved(&mut self, ticket: u64, result: Result<Vec<u8>, SourceError>) {
        if self.torn_down {
            return;
        }
        self.playback.on_media_resolved(ticket, result);
        self.touch();
    }

    fn reevaluate_playback(&mut self) -> Vec<Effect> {
        if self.phase != LoadPhase::Ready {
            return Vec::new();
        }
        let item = self.buffer.current_item(self.current_index);
        let key = PlaybackKey {
            index: self.current_index,
            item_id: item.map(|i| i.id.clone()),
            view_active: self.view_active,
        };
        if self.playback_key.as_ref() == Some(&key) {
            return Vec::new();
        }
        self.playback_key = Some(key);
        self.playback
            .reconcile(item, self.view_active)
            .map(Effect::ResolveMedia)
            .into_iter()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Toggle the bookmark of the item at the current position.
    pub fn on_bookmark_pressed(&mut self) -> Vec<Effect> {
        let Some(content_id) = self
            .buffer
            .current_item(self.current_index)
            .map(|i| i.content_id.clone())
        else {
            return Vec::new();
        };
        self.toggle_bookmark(&content_id)
    }

    pub fn toggle_bookmark(&mut self, content_id: &str) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        match self.bookmarks.toggle(&mut self.buffer, content_id) {
            ToggleOutcome::Issued(req) => {
                self.touch();
                vec![Effect::WriteBookmark(req)]
            }
            ToggleOutcome::Busy | ToggleOutcome::Missing => Vec::new(),
        }
    }

    /// Settle a bookmark write. Returns the error when the toggle was reverted.
    pub fn on_bookmark_written(
        &mut self,
        ticket: u64,
        result: Result<(), SourceError>,
    ) -> Option<SourceError> {
        let reverted = self.bookmarks.on_settled(&mut self.buffer, ticket, result);
        self.touch();
        reverted
    }

    pub fn is_bookmark_pending(&self, content_id: &str) -> bool {
        self.bookmarks.is_pending(content_id)
    }

    pub fn on_link_pressed(&self) -> Vec<Effect> {
        match self.buffer.current_item(self.current_index) {
            Some(item) if !item.external_url.is_empty() => {
                vec![Effect::OpenLink(item.external_url.clone())]
            }
            _ => Vec::new(),
        }
    }

    pub fn on_share_pressed(&self) -> Vec<Effect> {
        match self.buffer.current_item(self.current_index) {
            Some(item) => vec![Effect::Share {
                title: item.title.clone(),
                url: item.external_url.clone(),
            }],
            None => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Teardown / observation
    // -----------------------------------------------------------------------

    /// Release playback and stop reacting to anything.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        info!("controller: teardown");
        self.playback.shutdown();
        self.playback_key = None;
        self.torn_down = true;
        self.touch();
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let is_ready = self.phase == LoadPhase::Ready;
        FeedSnapshot {
            items: self.buffer.items().cloned().collect(),
            first_position: self.buffer.first_position(),
            current_index: self.current_index,
            is_loading: self.phase == LoadPhase::Loading,
            is_waiting_for_next: is_ready && self.at_tail(),
            playback: self.playback.state().clone(),
            prefetch: self.scheduler.state(),
            init_error: match &self.phase {
                LoadPhase::Failed(msg) => Some(msg.clone()),
                _ => None,
            },
            revision: self.revision,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn phase(&self) -> &LoadPhase {
        &self.phase
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn buffer(&self) -> &FeedBuffer {
        &self.buffer
    }

    pub fn prefetch_state(&self) -> PrefetchState {
        self.scheduler.state()
    }

    pub fn prefetch_failures(&self) -> u32 {
        self.scheduler.failures()
    }

    pub fn playback_state(&self) -> &PlaybackState {
        self.playback.state()
    }

    pub fn active_playback_item(&self) -> Option<&str> {
        self.playback.active_item()
    }

    pub fn audio_output(&self) -> &O {
        self.playback.output()
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::feed::playback::tests::RecordingOutput;
    use crate::item::test_item;

    type Controller = FeedController<RecordingOutput>;

    fn ready(ids: &[&str]) -> Controller {
        let mut c = FeedController::new(FeedConfig::default(), RecordingOutput::default());
        c.start();
        c.on_initial_batch(Ok(ids.iter().map(|id| test_item(id)).collect()));
        c
    }

    fn media_ticket(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|e| match e {
            Effect::ResolveMedia(req) => Some(req.ticket),
            _ => None,
        })
    }

    fn fetches(effects: &[Effect]) -> usize {
        effects.iter().filter(|e| **e == Effect::FetchNextItem).count()
    }

    #[test]
    fn start_requests_batch_and_generation_once() {
        let mut c = FeedController::new(FeedConfig::default(), RecordingOutput::default());
        assert_eq!(c.start(), vec![Effect::FetchInitialBatch, Effect::BeginGeneration]);
        assert!(c.start().is_empty());
        assert!(c.snapshot().is_loading);
    }

    #[test]
    fn initial_batch_loads_first_item_audio() {
        let mut c = FeedController::new(FeedConfig::default(), RecordingOutput::default());
        c.start();
        let effects = c.on_initial_batch(Ok(vec![test_item("A"), test_item("B")]));
        assert_eq!(effects.len(), 1);
        assert!(matches!(&effects[0], Effect::ResolveMedia(r) if r.item_id == "A"));
        assert_eq!(c.phase(), &LoadPhase::Ready);
    }

    #[test]
    fn initial_failure_is_surfaced_and_retryable() {
        let mut c = FeedController::new(FeedConfig::default(), RecordingOutput::default());
        c.start();
        c.on_initial_batch(Err(SourceError::Transport {
            endpoint: "feed/initial".into(),
            message: "connection refused".into(),
        }));
        let snap = c.snapshot();
        assert!(!snap.is_loading);
        assert!(snap.init_error.unwrap().contains("connection refused"));

        assert_eq!(c.retry_initial(), vec![Effect::FetchInitialBatch]);
        assert!(c.snapshot().init_error.is_none());
    }

    #[test]
    fn empty_initial_batch_is_an_init_error() {
        let mut c = FeedController::new(FeedConfig::default(), RecordingOutput::default());
        c.start();
        c.on_initial_batch(Ok(Vec::new()));
        assert!(c.snapshot().init_error.is_some());
    }

    #[test]
    fn no_prefetch_before_threshold() {
        let mut c = ready(&["A", "B", "C", "D", "E", "F"]);
        for i in 1..=3 {
            assert_eq!(fetches(&c.on_index_reported(i)), 0);
        }
        assert_eq!(c.prefetch_state(), PrefetchState::Armed);
        assert_eq!(fetches(&c.on_index_reported(4)), 1);
    }

    #[test]
    fn fast_advance_keeps_single_fetch() {
        let mut c = ready(&["A", "B", "C", "D", "E", "F", "G", "H"]);
        c.on_index_reported(3);
        let mut total = 0;
        for i in 4..8 {
            total += fetches(&c.on_index_reported(i));
        }
        assert_eq!(total, 1);
    }

    #[test]
    fn arrival_beside_viewer_needs_no_refill() {
        let mut c = ready(&["A", "B", "C", "D", "E"]);
        c.on_index_reported(3);
        c.on_index_reported(4);
        assert!(c.snapshot().is_waiting_for_next);

        let effects = c.on_next_item(Ok(test_item("F")), Instant::now());
        assert_eq!(fetches(&effects), 0);
        let snap = c.snapshot();
        assert!(!snap.is_waiting_for_next);
        assert_eq!(snap.first_position, 1);
        assert_eq!(snap.current_item().unwrap().id, "E");
        assert_eq!(snap.item_at(5).unwrap().id, "F");
    }

    #[test]
    fn arming_on_last_item_fetches_immediately() {
        let mut c = ready(&["A", "B", "C", "D"]);
        c.on_index_reported(1);
        c.on_index_reported(2);
        assert_eq!(fetches(&c.on_index_reported(3)), 1);
        assert_eq!(c.prefetch_state(), PrefetchState::Fetching);
    }

    #[test]
    fn tail_of_short_batch_fetches_below_threshold() {
        let mut c = ready(&["A", "B", "C"]);
        assert_eq!(fetches(&c.on_index_reported(1)), 0);
        assert_eq!(fetches(&c.on_index_reported(2)), 1);
        assert!(c.snapshot().is_waiting_for_next);
        assert!(c.on_index_reported(1).iter().all(|e| *e != Effect::FetchNextItem));
    }

    #[test]
    fn retry_fires_from_tick() {
        let t0 = Instant::now();
        let mut c = ready(&["A", "B", "C", "D", "E"]);
        c.on_index_reported(3);
        c.on_index_reported(4);
        c.on_next_item(
            Err(SourceError::Status {
                endpoint: "feed/next".into(),
                code: 502,
            }),
            t0,
        );
        let due = c.next_deadline().unwrap();
        assert!(c.tick(due - Duration::from_millis(1)).is_empty());
        assert_eq!(c.tick(due), vec![Effect::FetchNextItem]);
        assert!(c.tick(due).is_empty());
    }

    #[test]
    fn stale_media_never_installs() {
        let mut c = ready(&["A", "B", "C", "D", "E"]);
        let t_c = media_ticket(&c.on_index_reported(2)).unwrap();
        let t_d = media_ticket(&c.on_index_reported(3)).unwrap();
        c.on_media_resolved(t_c, Ok(vec![1]));
        assert_eq!(c.active_playback_item(), None);
        c.on_media_resolved(t_d, Ok(vec![1]));
        assert_eq!(c.active_playback_item(), Some("D"));
    }

    #[test]
    fn focus_loss_releases_and_regain_reloads() {
        let mut c = ready(&["A", "B"]);
        let snap = c.snapshot();
        assert_eq!(snap.playback, PlaybackState::Resolving { item_id: "A".into() });

        assert!(c.set_view_active(false).is_empty());
        assert_eq!(c.playback_state(), &PlaybackState::Idle);
        let effects = c.set_view_active(true);
        assert!(media_ticket(&effects).is_some());
        assert!(c.set_view_active(true).is_empty());
    }

    #[test]
    fn bookmark_round_trip_through_controller() {
        let mut c = ready(&["A", "B"]);
        let effects = c.on_bookmark_pressed();
        let Some(Effect::WriteBookmark(req)) = effects.first().cloned() else {
            panic!("expected WriteBookmark, got {effects:?}");
        };
        assert!(c.snapshot().current_item().unwrap().bookmarked);
        assert!(c.on_bookmark_pressed().is_empty());

        let err = c.on_bookmark_written(
            req.ticket,
            Err(SourceError::Status {
                endpoint: "bookmarks/add".into(),
                code: 503,
            }),
        );
        assert!(err.is_some());
        assert!(!c.snapshot().current_item().unwrap().bookmarked);
    }

    #[test]
    fn link_and_share_use_current_item() {
        let mut c = ready(&["A", "B"]);
        c.on_index_reported(1);
        assert_eq!(
            c.on_link_pressed(),
            vec![Effect::OpenLink("https://arxiv.invalid/abs/B".into())]
        );
        assert_eq!(
            c.on_share_pressed(),
            vec![Effect::Share {
                title: "Title B".into(),
                url: "https://arxiv.invalid/abs/B".into()
            }]
        );
    }

    #[test]
    fn teardown_releases_and_ignores_results() {
        let mut c = ready(&["A", "B", "C", "D", "E"]);
        let ticket = media_ticket(&c.on_index_reported(1)).unwrap();
        c.on_media_resolved(ticket, Ok(vec![]));
        assert_eq!(c.audio_output().live, 1);

        c.teardown();
        assert_eq!(c.audio_output().live, 0);
        assert!(c.on_index_reported(4).is_empty());
        assert!(c.tick(Instant::now() + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn revision_moves_on_changes() {
        let mut c = ready(&["A", "B"]);
        let r0 = c.revision();
        c.on_index_reported(1);
        assert!(c.revision() > r0);
        let r1 = c.revision();
        c.on_index_reported(1);
        assert_eq!(c.revision(), r1);
    }
}

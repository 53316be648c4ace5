//! Playback Resource Manager.
//!
//! Owns at most one loaded playback resource, bound to the current item and
//! only while the view is active. Every re-evaluation releases the active
//! resource before anything else, so two resources never coexist.
//!
//! Loading is two-step: the media locator is resolved off-thread (requested
//! as a [`MediaRequest`]), then the bytes are handed to the [`AudioOutput`].
//! Each request carries a ticket; a resolution whose ticket is not the
//! latest one is stale and gets dropped.

use std::fmt;

use log::{debug, warn};

use crate::item::FeedItem;

/// Device-side half of playback. The manager is its only caller.
pub trait AudioOutput {
    type Handle;

    /// Start playing `media`; the returned handle keeps it alive.
    fn load(&mut self, item_id: &str, media: Vec<u8>) -> anyhow::Result<Self::Handle>;

    /// Stop and free a resource returned by [`load`](Self::load).
    fn release(&mut self, handle: Self::Handle);
}

/// A loaded resource and the item it was loaded for.
struct PlaybackHandle<H> {
    item_id: String,
    resource: H,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing loaded (view inactive or no current item).
    Idle,
    /// Media for `item_id` is being resolved.
    Resolving { item_id: String },
    Playing { item_id: String },
    /// Resolution or loading failed; browsing continues silently.
    Unavailable { item_id: String },
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Resolving { .. } => write!(f, "loading audio"),
            PlaybackState::Playing { .. } => write!(f, "playing"),
            PlaybackState::Unavailable { .. } => write!(f, "no audio"),
        }
    }
}

/// Ask the runtime to resolve a media locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub ticket: u64,
    pub item_id: String,
    pub locator: String,
}

struct PendingLoad {
    ticket: u64,
    item_id: String,
}

pub struct PlaybackManager<O: AudioOutput> {
    output: O,
    active: Option<PlaybackHandle<O::Handle>>,
    pending: Option<PendingLoad>,
    next_ticket: u64,
    state: PlaybackState,
}

impl<O: AudioOutput> PlaybackManager<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            active: None,
            pending: None,
            next_ticket: 1,
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Item whose resource is currently loaded.
    pub fn active_item(&self) -> Option<&str> {
        self.active.as_ref().map(|h| h.item_id.as_str())
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Re-bind playback to `target`.
    ///
    /// 1. release whatever is loaded, and forget any pending load;
    /// 2. stop if the view is inactive or there is no item;
    /// 3. otherwise request resolution of the item's media.
    pub fn reconcile(&mut self, target: Option<&FeedItem>, view_active: bool) -> Option<MediaRequest> {
        self.release_active();
        if let Some(p) = self.pending.take() {
            debug!("playback: superseding pending load #{} for {}", p.ticket, p.item_id);
        }

        let item = match target {
            Some(item) if view_active => item,
            _ => {
                debug!(
                    "playback: nothing to load (view_active={view_active}, item={:?})",
                    target.map(|i| i.id.as_str())
                );
                self.state = PlaybackState::Idle;
                return None;
            }
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        debug!("playback: request #{ticket} for {}", item.id);
        self.pending = Some(PendingLoad {
            ticket,
            item_id: item.id.clone(),
        });
        self.state = PlaybackState::Resolving {
            item_id: item.id.clone(),
        };
        Some(MediaRequest {
            ticket,
            item_id: item.id.clone(),
            locator: item.media_url.clone(),
        })
    }

    /// Deliver the outcome of a [`MediaRequest`].
    ///
    /// Stale tickets are discarded. Failures are logged and swallowed.
    pub fn on_media_resolved<E: fmt::Display>(&mut self, ticket: u64, result: Result<Vec<u8>, E>) {
        let item_id = match &self.pending {
            Some(p) if p.ticket == ticket => p.item_id.clone(),
            _ => {
                debug!("playback: discarding stale media result #{ticket}");
                return;
            }
        };
        self.pending = None;

        let media = match result {
            Ok(media) => media,
            Err(e) => {
                warn!("playback: could not resolve media for {item_id}: {e}");
                self.state = PlaybackState::Unavailable { item_id };
                return;
            }
        };

        // reconcile() released before issuing this ticket, and nothing loads
        // without a ticket, so the slot is empty here.
        debug_assert!(self.active.is_none());
        match self.output.load(&item_id, media) {
            Ok(resource) => {
                debug!("playback: loaded #{ticket} for {item_id}");
                self.active = Some(PlaybackHandle {
                    item_id: item_id.clone(),
                    resource,
                });
                self.state = PlaybackState::Playing { item_id };
            }
            Err(e) => {
                warn!("playback: could not load audio for {item_id}: {e:#}");
                self.state = PlaybackState::Unavailable { item_id };
            }
        }
    }

    /// Release everything; later results are ignored.
    pub fn shutdown(&mut self) {
        self.release_active();
        self.pending = None;
        self.state = PlaybackState::Idle;
    }

    fn release_active(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!("playback: release {}", handle.item_id);
            self.output.release(handle.resource);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::item::test_item;

    /// Output that records calls and tracks how many resources are live.
    #[derive(Default)]
    pub(crate) struct RecordingOutput {
        pub log: Vec<String>,
        pub live: usize,
        pub max_live: usize,
        pub fail_loads: bool,
    }

    impl AudioOutput for RecordingOutput {
        type Handle = String;

        fn load(&mut self, item_id: &str, _media: Vec<u8>) -> anyhow::Result<String> {
            if self.fail_loads {
                anyhow::bail!("undecodable");
            }
            self.live += 1;
            self.max_live = self.max_live.max(self.live);
            self.log.push(format!("load {item_id}"));
            Ok(item_id.to_string())
        }

        fn release(&mut self, handle: String) {
            self.live -= 1;
            self.log.push(format!("release {handle}"));
        }
    }

    fn manager() -> PlaybackManager<RecordingOutput> {
        PlaybackManager::new(RecordingOutput::default())
    }

    #[test]
    fn loads_current_item_when_active() {
        let mut m = manager();
        let a = test_item("A");
        let req = m.reconcile(Some(&a), true).unwrap();
        assert_eq!(req.item_id, "A");
        assert_eq!(req.locator, a.media_url);
        assert_eq!(m.state(), &PlaybackState::Resolving { item_id: "A".into() });

        m.on_media_resolved::<String>(req.ticket, Ok(vec![1]));
        assert_eq!(m.active_item(), Some("A"));
        assert_eq!(m.state(), &PlaybackState::Playing { item_id: "A".into() });
    }

    #[test]
    fn inactive_view_loads_nothing_and_releases() {
        let mut m = manager();
        let a = test_item("A");
        let req = m.reconcile(Some(&a), true).unwrap();
        m.on_media_resolved::<String>(req.ticket, Ok(vec![1]));

        assert!(m.reconcile(Some(&a), false).is_none());
        assert_eq!(m.active_item(), None);
        assert_eq!(m.output().live, 0);
        assert_eq!(m.state(), &PlaybackState::Idle);
    }

    #[test]
    fn release_precedes_next_load() {
        let mut m = manager();
        let (a, b) = (test_item("A"), test_item("B"));
        let ra = m.reconcile(Some(&a), true).unwrap();
        m.on_media_resolved::<String>(ra.ticket, Ok(vec![]));
        let rb = m.reconcile(Some(&b), true).unwrap();
        m.on_media_resolved::<String>(rb.ticket, Ok(vec![]));

        assert_eq!(m.output().log, ["load A", "release A", "load B"]);
        assert_eq!(m.output().max_live, 1);
    }

    #[test]
    fn stale_resolution_is_discarded() {
        let mut m = manager();
        let (a, b) = (test_item("A"), test_item("B"));
        let ra = m.reconcile(Some(&a), true).unwrap();
        let rb = m.reconcile(Some(&b), true).unwrap();

        m.on_media_resolved::<String>(rb.ticket, Ok(vec![]));
        m.on_media_resolved::<String>(ra.ticket, Ok(vec![]));
        assert_eq!(m.active_item(), Some("B"));
        assert_eq!(m.output().log, ["load B"]);
    }

    #[test]
    fn stale_resolution_arriving_first_is_discarded_too() {
        let mut m = manager();
        let (a, b) = (test_item("A"), test_item("B"));
        let ra = m.reconcile(Some(&a), true).unwrap();
        let _rb = m.reconcile(Some(&b), true).unwrap();

        m.on_media_resolved::<String>(ra.ticket, Ok(vec![]));
        assert_eq!(m.active_item(), None);
        assert_eq!(m.state(), &PlaybackState::Resolving { item_id: "B".into() });
    }

    #[test]
    fn resolution_failure_is_swallowed() {
        let mut m = manager();
        let a = test_item("A");
        let req = m.reconcile(Some(&a), true).unwrap();
        m.on_media_resolved(req.ticket, Err("404"));
        assert_eq!(m.active_item(), None);
        assert_eq!(m.state(), &PlaybackState::Unavailable { item_id: "A".into() });
    }

    #[test]
    fn load_failure_is_swallowed() {
        let mut m = PlaybackManager::new(RecordingOutput {
            fail_loads: true,
            ..Default::default()
        });
        let a = test_item("A");
        let req = m.reconcile(Some(&a), true).unwrap();
        m.on_media_resolved::<String>(req.ticket, Ok(vec![0]));
        assert_eq!(m.state(), &PlaybackState::Unavailable { item_id: "A".into() });
        assert_eq!(m.output().live, 0);
    }

    #[test]
    fn shutdown_ignores_late_results() {
        let mut m = manager();
        let a = test_item("A");
        let req = m.reconcile(Some(&a), true).unwrap();
        m.shutdown();
        m.on_media_resolved::<String>(req.ticket, Ok(vec![]));
        assert_eq!(m.active_item(), None);
        assert!(m.output().log.is_empty());
    }
}

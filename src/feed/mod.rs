//! Feed consumption core.
//!
//! Components, leaves first:
//!   buffer: items held in memory, addressed by absolute feed position
//!   viewability: noisy visibility reports → one current position
//!   prefetch: IDLE / ARMED / FETCHING / WAITING_RETRY state machine
//!   playback: the single playback resource bound to the current item
//!   mutation: optimistic bookmark toggles with rollback
//!   controller: composes the above, emits [`Effect`]s for the runtime
//!
//! Nothing in here performs I/O except through [`playback::AudioOutput`].
//! Network work is requested as effects and its results are fed back in.

pub mod buffer;
pub mod controller;
pub mod mutation;
pub mod playback;
pub mod prefetch;
pub mod viewability;

pub use buffer::FeedBuffer;
pub use controller::{Effect, FeedController, FeedSnapshot, LoadPhase};
pub use mutation::{BookmarkCoordinator, MutationRequest, ToggleOutcome};
pub use playback::{AudioOutput, MediaRequest, PlaybackManager, PlaybackState};
pub use prefetch::{PrefetchScheduler, PrefetchState};
pub use viewability::{ViewabilityTracker, Visibility};

//! Prefetch Scheduler.
//!
//! ```text
//!   IDLE ──(position reaches threshold)──▶ ARMED
//!   IDLE ──(viewer on last held item)──▶ FETCHING
//!   ARMED ──(position passes furthest seen)──▶ FETCHING
//!   FETCHING ──ok──▶ ARMED
//!   FETCHING ──err──▶ WAITING_RETRY ──(retry delay elapsed)──▶ FETCHING
//! ```
//!
//! The scheduler only decides; the caller performs the fetch and reports
//! back. Time is passed in, never read, so retries are deterministic.
//! At most one fetch is in flight: FETCHING and WAITING_RETRY swallow
//! position changes instead of queueing them.

use std::time::{Duration, Instant};

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchState {
    Idle,
    Armed,
    Fetching,
    WaitingRetry { retry_at: Instant },
}

#[derive(Debug)]
pub struct PrefetchScheduler {
    arm_threshold: usize,
    retry_delay: Duration,
    state: PrefetchState,
    /// Furthest position reached so far.
    furthest: usize,
    /// Consecutive failures of the current fetch.
    failures: u32,
}

impl PrefetchScheduler {
    pub fn new(arm_threshold: usize, retry_delay: Duration) -> Self {
        Self {
            arm_threshold,
            retry_delay,
            state: PrefetchState::Idle,
            furthest: 0,
            failures: 0,
        }
    }

    pub fn state(&self) -> PrefetchState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        !matches!(self.state, PrefetchState::Idle)
    }

    pub fn awaiting_retry(&self) -> bool {
        matches!(self.state, PrefetchState::WaitingRetry { .. })
    }

    /// True while a fetch is running or scheduled to run again.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            PrefetchState::Fetching | PrefetchState::WaitingRetry { .. }
        )
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Feed a new current position. Returns true when a fetch must start now.
    pub fn on_index_changed(&mut self, index: usize) -> bool {
        let advanced = index > self.furthest;
        self.furthest = self.furthest.max(index);

        match self.state {
            PrefetchState::Idle => {
                if index >= self.arm_threshold {
                    debug!("prefetch: IDLE → ARMED at position {index}");
                    self.state = PrefetchState::Armed;
                }
                false
            }
            PrefetchState::Armed if advanced => {
                debug!("prefetch: ARMED → FETCHING at position {index}");
                self.state = PrefetchState::Fetching;
                true
            }
            PrefetchState::Armed => false,
            PrefetchState::Fetching | PrefetchState::WaitingRetry { .. } => {
                if advanced {
                    debug!("prefetch: position {index} while {:?}, not refetching", self.state);
                }
                false
            }
        }
    }

    /// Start a fetch without a position change (viewer sits on the last item).
    /// Also starts from IDLE: with nothing held ahead, the threshold no
    /// longer applies.
    pub fn request_refill(&mut self) -> bool {
        match self.state {
            PrefetchState::Idle => {
                debug!("prefetch: IDLE → FETCHING (tail reached below threshold)");
                self.state = PrefetchState::Fetching;
                true
            }
            PrefetchState::Armed => {
                debug!("prefetch: ARMED → FETCHING (refill)");
                self.state = PrefetchState::Fetching;
                true
            }
            PrefetchState::Fetching | PrefetchState::WaitingRetry { .. } => false,
        }
    }

    pub fn on_fetch_succeeded(&mut self) {
        if self.state != PrefetchState::Fetching {
            debug!("prefetch: success reported in {:?}, ignoring", self.state);
            return;
        }
        debug!("prefetch: FETCHING → ARMED");
        self.state = PrefetchState::Armed;
        self.failures = 0;
    }

    /// Record a failure; returns when the retry is due.
    pub fn on_fetch_failed(&mut self, now: Instant) -> Instant {
        let retry_at = now + self.retry_delay;
        self.failures += 1;
        debug!(
            "prefetch: FETCHING → WAITING_RETRY (failure #{}, retry in {}ms)",
            self.failures,
            self.retry_delay.as_millis()
        );
        self.state = PrefetchState::WaitingRetry { retry_at };
        retry_at
    }

    /// Fire the retry timer. Returns true when the retry fetch must start now.
    pub fn poll_retry(&mut self, now: Instant) -> bool {
        match self.state {
            PrefetchState::WaitingRetry { retry_at } if now >= retry_at => {
                debug!("prefetch: WAITING_RETRY → FETCHING (retry)");
                self.state = PrefetchState::Fetching;
                true
            }
            _ => false,
        }
    }

    /// When the caller must next call [`poll_retry`](Self::poll_retry).
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            PrefetchState::WaitingRetry { retry_at } => Some(retry_at),
            _ => None,
        }
    }
}

//! Optimistic Mutation Coordinator for bookmarks.
//!
//! A toggle flips the local flag immediately and hands back a
//! [`MutationRequest`] for the remote write. When the write fails the flag
//! returns to its pre-toggle value. While a write for a content id is in
//! flight, further toggles of that id are refused, never queued.

use std::collections::HashMap;

use log::{debug, warn};

use super::buffer::FeedBuffer;
use crate::source::SourceError;

/// Remote write the runtime must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub ticket: u64,
    pub content_id: String,
    /// Desired remote state: true = add bookmark, false = remove.
    pub bookmarked: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ToggleOutcome {
    Issued(MutationRequest),
    /// A write for this content id is still in flight.
    Busy,
    /// No such item in the buffer.
    Missing,
}

struct InFlight {
    ticket: u64,
    previous: bool,
}

#[derive(Default)]
pub struct BookmarkCoordinator {
    in_flight: HashMap<String, InFlight>,
    next_ticket: u64,
}

impl BookmarkCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, content_id: &str) -> bool {
        self.in_flight.contains_key(content_id)
    }

    pub fn toggle(&mut self, buffer: &mut FeedBuffer, content_id: &str) -> ToggleOutcome {
        if self.is_pending(content_id) {
            debug!("bookmark: {content_id} already in flight, ignoring toggle");
            return ToggleOutcome::Busy;
        }
        let Some(previous) = buffer.bookmarked(content_id) else {
            return ToggleOutcome::Missing;
        };

        let target = !previous;
        buffer.set_bookmarked(content_id, target);
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.in_flight
            .insert(content_id.to_string(), InFlight { ticket, previous });
        debug!("bookmark: {content_id} {previous} → {target} (optimistic, #{ticket})");

        ToggleOutcome::Issued(MutationRequest {
            ticket,
            content_id: content_id.to_string(),
            bookmarked: target,
        })
    }

    /// Settle a write. Returns the error when the local flag was rolled back.
    pub fn on_settled(
        &mut self,
        buffer: &mut FeedBuffer,
        ticket: u64,
        result: Result<(), SourceError>,
    ) -> Option<SourceError> {
        let content_id = self
            .in_flight
            .iter()
            .find(|(_, f)| f.ticket == ticket)
            .map(|(id, _)| id.clone())?;
        let flight = self.in_flight.remove(&content_id)?;

        match result {
            Ok(()) => {
                debug!("bookmark: #{ticket} for {content_id} confirmed");
                None
            }
            Err(e) => {
                buffer.set_bookmarked(&content_id, flight.previous);
                warn!(
                    "bookmark: write for {content_id} failed, reverted to {}: {e}",
                    flight.previous
                );
                Some(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::test_item;

    fn setup() -> (BookmarkCoordinator, FeedBuffer) {
        let mut buffer = FeedBuffer::new();
        buffer.initialize(vec![test_item("A"), test_item("B")]);
        (BookmarkCoordinator::new(), buffer)
    }

    fn issued(outcome: ToggleOutcome) -> MutationRequest {
        match outcome {
            ToggleOutcome::Issued(req) => req,
            other => panic!("expected Issued, got {other:?}"),
        }
    }

    fn failure() -> SourceError {
        SourceError::Status {
            endpoint: "bookmarks/add".into(),
            code: 500,
        }
    }

    #[test]
    fn toggle_is_immediate() {
        let (mut c, mut b) = setup();
        let req = issued(c.toggle(&mut b, "paper-A"));
        assert!(req.bookmarked);
        assert_eq!(b.bookmarked("paper-A"), Some(true));
        assert!(c.is_pending("paper-A"));
    }

    #[test]
    fn success_keeps_new_value() {
        let (mut c, mut b) = setup();
        let req = issued(c.toggle(&mut b, "paper-A"));
        assert!(c.on_settled(&mut b, req.ticket, Ok(())).is_none());
        assert_eq!(b.bookmarked("paper-A"), Some(true));
        assert!(!c.is_pending("paper-A"));
    }

    #[test]
    fn failure_rolls_back() {
        let (mut c, mut b) = setup();
        let req = issued(c.toggle(&mut b, "paper-A"));
        let err = c.on_settled(&mut b, req.ticket, Err(failure()));
        assert_eq!(err, Some(failure()));
        assert_eq!(b.bookmarked("paper-A"), Some(false));
    }

    #[test]
    fn unbookmark_failure_restores_true() {
        let (mut c, mut b) = setup();
        b.set_bookmarked("paper-B", true);
        let req = issued(c.toggle(&mut b, "paper-B"));
        assert!(!req.bookmarked);
        c.on_settled(&mut b, req.ticket, Err(failure()));
        assert_eq!(b.bookmarked("paper-B"), Some(true));
    }

    #[test]
    fn second_toggle_while_in_flight_is_refused() {
        let (mut c, mut b) = setup();
        let req = issued(c.toggle(&mut b, "paper-A"));
        assert_eq!(c.toggle(&mut b, "paper-A"), ToggleOutcome::Busy);
        assert_eq!(b.bookmarked("paper-A"), Some(true));

        // Other items are independent.
        issued(c.toggle(&mut b, "paper-B"));

        c.on_settled(&mut b, req.ticket, Ok(()));
        let again = issued(c.toggle(&mut b, "paper-A"));
        assert!(!again.bookmarked);
    }

    #[test]
    fn unknown_item_and_ticket() {
        let (mut c, mut b) = setup();
        assert_eq!(c.toggle(&mut b, "paper-Z"), ToggleOutcome::Missing);
        assert!(c.on_settled(&mut b, 99, Err(failure())).is_none());
    }
}

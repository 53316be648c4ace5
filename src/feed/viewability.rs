//! Viewability Tracker: turns visibility reports into one current position.

use log::trace;

/// How much of one card is on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visibility {
    /// Absolute feed position.
    pub index: usize,
    /// Visible share of the card's area, 0.0..=1.0.
    pub fraction: f32,
}

#[derive(Debug)]
pub struct ViewabilityTracker {
    threshold: f32,
    current: usize,
}

impl ViewabilityTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            current: 0,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Apply one visibility report.
    ///
    /// A card qualifies once `fraction >= threshold`; among qualifying cards
    /// the lowest position wins. Returns the new position only when it
    /// differs from the previous one. Reports where nothing qualifies leave
    /// the position unchanged.
    pub fn report(&mut self, visible: &[Visibility]) -> Option<usize> {
        let winner = visible
            .iter()
            .filter(|v| v.fraction >= self.threshold)
            .map(|v| v.index)
            .min()?;
        trace!("viewability: report {visible:?} → {winner}");
        self.report_index(winner)
    }

    /// Apply a report that already names the current position.
    pub fn report_index(&mut self, index: usize) -> Option<usize> {
        if index == self.current {
            return None;
        }
        self.current = index;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vis(index: usize, fraction: f32) -> Visibility {
        Visibility { index, fraction }
    }

    #[test]
    fn first_qualifying_index_wins() {
        let mut t = ViewabilityTracker::new(0.5);
        assert_eq!(t.report(&[vis(3, 0.5), vis(2, 0.5)]), Some(2));
        assert_eq!(t.current(), 2);
    }

    #[test]
    fn below_threshold_is_ignored() {
        let mut t = ViewabilityTracker::new(0.5);
        assert_eq!(t.report(&[vis(0, 0.3), vis(1, 0.49)]), None);
        assert_eq!(t.current(), 0);
        assert_eq!(t.report(&[vis(0, 0.4), vis(1, 0.6)]), Some(1));
    }

    #[test]
    fn no_redundant_updates() {
        let mut t = ViewabilityTracker::new(0.5);
        assert_eq!(t.report(&[vis(1, 1.0)]), Some(1));
        assert_eq!(t.report(&[vis(1, 0.9), vis(2, 0.1)]), None);
        assert_eq!(t.report_index(1), None);
    }

    #[test]
    fn converges_to_last_reported_index() {
        let mut t = ViewabilityTracker::new(0.5);
        let sequence = [0usize, 1, 2, 2, 5, 3, 3, 7, 0, 4];
        for &i in &sequence {
            t.report(&[vis(i, 1.0)]);
        }
        assert_eq!(t.current(), 4);
    }

    #[test]
    fn empty_report_changes_nothing() {
        let mut t = ViewabilityTracker::new(0.5);
        t.report_index(3);
        assert_eq!(t.report(&[]), None);
        assert_eq!(t.current(), 3);
    }
}

//! Feed Buffer: the items currently held in memory.
//!
//! Items are addressed by absolute feed position: the first item of the
//! session is position 0, and positions never shift when the head is
//! evicted. The buffer remembers how many items it dropped (`base`), so
//! `current_item(4)` keeps naming the same item after an eviction.

use std::collections::VecDeque;

use log::debug;

use crate::item::FeedItem;

#[derive(Debug, Default)]
pub struct FeedBuffer {
    items: VecDeque<FeedItem>,
    /// Absolute position of `items[0]`.
    base: usize,
}

impl FeedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the buffer wholesale. Positions restart at 0.
    pub fn initialize(&mut self, items: Vec<FeedItem>) {
        debug!("buffer: initialize with {} items", items.len());
        self.items = items.into();
        self.base = 0;
    }

    /// Append a fetched item, first dropping the head if it has been consumed.
    ///
    /// The head is consumed when its position is strictly before `current`.
    /// The current item and everything after it are never evicted.
    /// Returns the evicted item, if any.
    pub fn append(&mut self, item: FeedItem, current: usize) -> Option<FeedItem> {
        let evicted = if !self.items.is_empty() && self.base < current {
            let head = self.items.pop_front();
            self.base += 1;
            head
        } else {
            None
        };
        debug!(
            "buffer: append {} at position {}, evicted={:?}",
            item.id,
            self.end(),
            evicted.as_ref().map(|e| e.id.as_str())
        );
        self.items.push_back(item);
        evicted
    }

    /// The item at an absolute position, or `None` when out of range.
    pub fn current_item(&self, index: usize) -> Option<&FeedItem> {
        index
            .checked_sub(self.base)
            .and_then(|offset| self.items.get(offset))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Absolute position of the first held item.
    pub fn first_position(&self) -> usize {
        self.base
    }

    /// One past the absolute position of the last held item.
    pub fn end(&self) -> usize {
        self.base + self.items.len()
    }

    pub fn last_position(&self) -> Option<usize> {
        self.end().checked_sub(1).filter(|_| !self.is_empty())
    }

    /// Items in display order.
    pub fn items(&self) -> impl Iterator<Item = &FeedItem> {
        self.items.iter()
    }

    /// Current bookmark flag of the first item with this content id.
    pub fn bookmarked(&self, content_id: &str) -> Option<bool> {
        self.items
            .iter()
            .find(|i| i.content_id == content_id)
            .map(|i| i.bookmarked)
    }

    /// Set the bookmark flag on every held item sharing `content_id`.
    /// Returns how many items were touched.
    pub fn set_bookmarked(&mut self, content_id: &str, value: bool) -> usize {
        let mut touched = 0;
        for item in self.items.iter_mut().filter(|i| i.content_id == content_id) {
            item.bookmarked = value;
            touched += 1;
        }
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::test_item;

    fn buffer_of(ids: &[&str]) -> FeedBuffer {
        let mut b = FeedBuffer::new();
        b.initialize(ids.iter().map(|id| test_item(id)).collect());
        b
    }

    fn ids(b: &FeedBuffer) -> Vec<&str> {
        b.items().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn out_of_range_is_none() {
        let b = buffer_of(&["A", "B"]);
        assert_eq!(b.current_item(1).map(|i| i.id.as_str()), Some("B"));
        assert!(b.current_item(2).is_none());
        assert!(FeedBuffer::new().current_item(0).is_none());
    }

    #[test]
    fn append_evicts_consumed_head_and_keeps_positions() {
        let mut b = buffer_of(&["A", "B", "C", "D", "E"]);
        let evicted = b.append(test_item("F"), 4);
        assert_eq!(evicted.map(|i| i.id), Some("A".to_string()));
        assert_eq!(ids(&b), ["B", "C", "D", "E", "F"]);
        assert_eq!(b.current_item(4).unwrap().id, "E");
        assert_eq!(b.current_item(5).unwrap().id, "F");
        assert!(b.current_item(0).is_none());
        assert_eq!(b.first_position(), 1);
        assert_eq!(b.end(), 6);
    }

    #[test]
    fn append_never_evicts_current_item() {
        let mut b = buffer_of(&["A", "B"]);
        assert!(b.append(test_item("C"), 0).is_none());
        assert_eq!(ids(&b), ["A", "B", "C"]);

        // Head is current: stays.
        let mut b = buffer_of(&["A"]);
        assert!(b.append(test_item("B"), 0).is_none());
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn append_to_empty_buffer() {
        let mut b = FeedBuffer::new();
        assert!(b.append(test_item("A"), 3).is_none());
        assert_eq!(b.last_position(), Some(0));
    }

    #[test]
    fn initialize_resets_base() {
        let mut b = buffer_of(&["A", "B", "C"]);
        b.append(test_item("D"), 2);
        assert_eq!(b.first_position(), 1);
        b.initialize(vec![test_item("X")]);
        assert_eq!(b.first_position(), 0);
        assert_eq!(b.current_item(0).unwrap().id, "X");
    }

    #[test]
    fn bookmark_flag_follows_content_id() {
        let mut b = buffer_of(&["A", "B"]);
        assert_eq!(b.bookmarked("paper-A"), Some(false));
        assert_eq!(b.set_bookmarked("paper-A", true), 1);
        assert_eq!(b.bookmarked("paper-A"), Some(true));
        assert_eq!(b.set_bookmarked("paper-missing", true), 0);
        assert_eq!(b.bookmarked("paper-missing"), None);
    }
}

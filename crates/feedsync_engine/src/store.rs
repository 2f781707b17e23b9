//! In-memory feed content owned by a single engine.
//!
//! Items are kept newest first. An optional gap marker splits the feed into
//! an unread block at the top and older content below a "load more"
//! affordance; `gap == Some(n)` means the first `n` items form the block.

use crate::feed::FeedState;
use feedsync_protocol::{FeedItem, PaginationWindow, ProtocolResult};
use std::collections::HashSet;

/// Items, window and visible state of one feed.
#[derive(Debug, Clone)]
pub struct FeedStore<T> {
    items: Vec<T>,
    window: Option<PaginationWindow>,
    state: FeedState,
    more_available: bool,
    gap: Option<usize>,
    reading_newest: bool,
}

impl<T: FeedItem> FeedStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            window: None,
            state: FeedState::Idle,
            more_available: true,
            gap: None,
            reading_newest: true,
        }
    }

    /// Returns the items, newest first.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the feed holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the current pagination window.
    pub fn window(&self) -> Option<&PaginationWindow> {
        self.window.as_ref()
    }

    /// Returns the visible state.
    pub fn state(&self) -> &FeedState {
        &self.state
    }

    /// Returns true if older content may still be available.
    pub fn more_available(&self) -> bool {
        self.more_available
    }

    /// Returns the size of the unread block above the "load more" marker.
    pub fn gap(&self) -> Option<usize> {
        self.gap
    }

    /// Returns true if the reader is caught up with the top of the feed.
    pub fn is_reading_newest(&self) -> bool {
        self.reading_newest
    }

    /// Id of the newest item.
    pub fn newest_id(&self) -> Option<&str> {
        self.items.first().map(|item| item.unique_id())
    }

    /// Id of the oldest item.
    pub fn oldest_id(&self) -> Option<&str> {
        self.items.last().map(|item| item.unique_id())
    }

    /// Returns true if an item with this id is held.
    pub fn contains_id(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.unique_id() == id)
    }

    /// The item the reader is caught up to.
    ///
    /// That is the top item, unless an unread block exists and the reader
    /// has not caught up with it, in which case it is the first item below
    /// the marker.
    pub fn reading_boundary_id(&self) -> Option<&str> {
        match self.gap {
            Some(_) if !self.reading_newest => self.first_below_gap_id(),
            _ => self.newest_id(),
        }
    }

    /// Id of the first item below the "load more" marker.
    pub fn first_below_gap_id(&self) -> Option<&str> {
        self.gap
            .and_then(|g| self.items.get(g))
            .map(|item| item.unique_id())
    }

    /// Id of the last item of the unread block.
    pub fn last_of_unread_block_id(&self) -> Option<&str> {
        self.gap
            .and_then(|g| g.checked_sub(1))
            .and_then(|i| self.items.get(i))
            .map(|item| item.unique_id())
    }

    /// Keeps only fresh items whose ids are not already held, dropping
    /// repeats within the batch.
    pub fn unique_new(&self, fresh: Vec<T>) -> Vec<T> {
        dedup(fresh, &self.items)
    }

    pub(crate) fn set_state(&mut self, state: FeedState) {
        self.state = state;
    }

    pub(crate) fn set_more_available(&mut self, more: bool) {
        self.more_available = more;
    }

    pub(crate) fn set_reading_newest(&mut self, reading_newest: bool) {
        self.reading_newest = reading_newest;
    }

    /// Replaces content and window wholesale.
    pub(crate) fn replace_all(&mut self, items: Vec<T>, window: Option<PaginationWindow>) {
        self.items = items;
        self.window = window;
        self.gap = None;
    }

    /// Merges a window into the current one, adopting it if none is held.
    pub(crate) fn merge_window(&mut self, incoming: &PaginationWindow) -> ProtocolResult<()> {
        let merged = match &self.window {
            Some(current) => current.merge(incoming)?,
            None => incoming.clone(),
        };
        self.window = Some(merged);
        Ok(())
    }

    /// Appends older items at the bottom.
    pub(crate) fn append(&mut self, items: Vec<T>) {
        self.items.extend(items);
    }

    /// Inserts newer items at the top, keeping the marker above the same item.
    pub(crate) fn prepend(&mut self, items: Vec<T>) {
        let added = items.len();
        self.items.splice(0..0, items);
        self.gap = self.gap.map(|g| g + added);
    }

    /// Inserts an unread block at the top.
    ///
    /// With `include_load_more` the block is separated from older content
    /// by a marker; without it the block is contiguous and any stale marker
    /// is cleared. A reader who has not caught up keeps the previous unread
    /// block inside the new one.
    pub(crate) fn insert_newest(&mut self, items: Vec<T>, include_load_more: bool) {
        let added = items.len();
        let carried = if self.reading_newest {
            0
        } else {
            self.gap.unwrap_or(0)
        };
        self.items.splice(0..0, items);
        self.gap = if include_load_more && added > 0 {
            Some(added + carried)
        } else {
            None
        };
    }

    /// Inserts items directly below the marker.
    pub(crate) fn insert_below_gap(&mut self, items: Vec<T>) {
        let at = self.gap.unwrap_or(0).min(self.items.len());
        self.items.splice(at..at, items);
    }

    /// Removes the "load more" marker.
    pub(crate) fn close_gap(&mut self) {
        self.gap = None;
    }

    /// Swaps in an item with the same id. Returns false if none was held.
    pub(crate) fn replace_item(&mut self, item: T) -> bool {
        match self
            .items
            .iter()
            .position(|held| held.unique_id() == item.unique_id())
        {
            Some(index) => {
                self.items[index] = item;
                true
            }
            None => false,
        }
    }

    /// Removes the item with this id. Returns false if none was held.
    pub(crate) fn remove_item(&mut self, id: &str) -> bool {
        let Some(index) = self.items.iter().position(|held| held.unique_id() == id) else {
            return false;
        };
        self.items.remove(index);
        if let Some(g) = self.gap {
            if index < g {
                self.gap = (g > 1).then(|| g - 1);
            }
        }
        true
    }
}

impl<T: FeedItem> Default for FeedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the items of `fresh` whose ids are neither in `held` nor repeated
/// earlier in `fresh`. Order is preserved.
pub fn dedup<T: FeedItem>(fresh: Vec<T>, held: &[T]) -> Vec<T> {
    let mut seen: HashSet<String> = held
        .iter()
        .map(|item| item.unique_id().to_string())
        .collect();
    fresh
        .into_iter()
        .filter(|item| seen.insert(item.unique_id().to_string()))
        .collect()
}

/// Items of a fresh page strictly above the boundary item.
///
/// If the boundary is absent from the page, the whole page is newer. A page
/// consisting only of the boundary item yields nothing.
pub fn slice_above<'a, T: FeedItem>(fresh: &'a [T], boundary: Option<&str>) -> &'a [T] {
    let Some(boundary) = boundary else {
        return fresh;
    };
    match fresh.iter().position(|item| item.unique_id() == boundary) {
        Some(index) => &fresh[..index],
        None => fresh,
    }
}

/// Items of a fresh page strictly below the boundary item.
///
/// If the boundary is absent from the page, the whole page is kept.
pub fn slice_below<'a, T: FeedItem>(fresh: &'a [T], boundary: Option<&str>) -> &'a [T] {
    let Some(boundary) = boundary else {
        return fresh;
    };
    match fresh.iter().position(|item| item.unique_id() == boundary) {
        Some(index) => &fresh[index + 1..],
        None => fresh,
    }
}

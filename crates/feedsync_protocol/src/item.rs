//! Feed items and fetched pages.

use crate::window::PaginationWindow;

/// An item held in a feed.
///
/// The engine only needs a stable unique id. Items are ordered newest first
/// by the source; a numerically higher id is newer.
pub trait FeedItem: Clone + Send + Sync + 'static {
    /// Returns the stable unique identifier used for deduplication.
    fn unique_id(&self) -> &str;
}

/// One page of items returned by a fetch provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage<T> {
    /// Items in source order (newest first).
    pub items: Vec<T>,
    /// The window describing this page.
    pub window: PaginationWindow,
}

impl<T> FetchedPage<T> {
    /// Creates a page with an explicit window.
    pub fn new(items: Vec<T>, window: PaginationWindow) -> Self {
        Self { items, window }
    }

    /// Returns the number of items in the page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: FeedItem> FetchedPage<T> {
    /// Creates a page whose window is derived from its first and last items.
    pub fn derived(items: Vec<T>) -> Self {
        let window = PaginationWindow::derived_from(&items);
        Self { items, window }
    }
}

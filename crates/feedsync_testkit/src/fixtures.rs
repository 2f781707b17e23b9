//! Test items, page builders and an in-memory timeline.

use feedsync_protocol::{numeric_id, Cursor, FeedItem, FetchedPage, PaginationWindow};

/// Limit carried by cursors in link windows built here.
pub const LINK_LIMIT: u32 = 40;

/// A feed item with a numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestItem {
    /// Numeric id; higher is newer.
    pub id: u64,
    /// The id rendered as a string.
    pub key: String,
    /// Author handle, for filter tests.
    pub author: String,
    /// Content, for replacement tests.
    pub body: String,
}

impl TestItem {
    /// Creates an item with default author and body.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            key: id.to_string(),
            author: "anon".to_string(),
            body: format!("item {}", id),
        }
    }

    /// Sets the author.
    pub fn with_author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }
}

impl FeedItem for TestItem {
    fn unique_id(&self) -> &str {
        &self.key
    }
}

/// Builds items from ids, in the given order.
pub fn ids(ids: &[u64]) -> Vec<TestItem> {
    ids.iter().copied().map(TestItem::new).collect()
}

/// Returns the unique ids of `items`, in order.
pub fn item_ids<T: FeedItem>(items: &[T]) -> Vec<String> {
    items.iter().map(|item| item.unique_id().to_string()).collect()
}

/// Returns `count` ids counting down from `newest`.
pub fn descending(newest: u64, count: usize) -> Vec<u64> {
    (0..count as u64)
        .map_while(|offset| newest.checked_sub(offset))
        .collect()
}

/// Builds a page whose window is derived from its items.
pub fn derived_page(item_ids: &[u64]) -> FetchedPage<TestItem> {
    FetchedPage::derived(ids(item_ids))
}

/// Builds a page with a link window.
///
/// `next` becomes an upper-bound cursor and `previous` a min cursor.
pub fn link_page(
    item_ids: &[u64],
    next: Option<&str>,
    previous: Option<&str>,
) -> FetchedPage<TestItem> {
    FetchedPage::new(
        ids(item_ids),
        PaginationWindow::link(
            next.map(|id| Cursor::upper_bound(id, Some(LINK_LIMIT))),
            previous.map(|id| Cursor::min(id, Some(LINK_LIMIT))),
        ),
    )
}

/// An in-memory timeline that answers cursors like a remote source.
///
/// Ids are kept newest first and are unique.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    ids: Vec<u64>,
}

impl Timeline {
    /// Creates a timeline from ids in any order.
    pub fn new(mut ids: Vec<u64>) -> Self {
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        Self { ids }
    }

    /// Creates a timeline of `count` ids counting down from `newest`.
    pub fn descending(newest: u64, count: usize) -> Self {
        Self::new(descending(newest, count))
    }

    /// Publishes a new item and returns its id.
    pub fn publish(&mut self) -> u64 {
        let id = self.ids.first().map_or(1, |newest| newest + 1);
        self.ids.insert(0, id);
        id
    }

    /// Deletes an item. Returns false if it did not exist.
    pub fn delete(&mut self, id: u64) -> bool {
        let before = self.ids.len();
        self.ids.retain(|held| *held != id);
        self.ids.len() < before
    }

    /// Returns the ids, newest first.
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the timeline is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Answers `cursor` with at most `limit` (or `page_size_hint`) items,
    /// newest first.
    ///
    /// With `link` the page carries a link window whose `next` is absent
    /// once no older item exists; otherwise the window is derived.
    pub fn serve(&self, cursor: &Cursor, page_size_hint: u32, link: bool) -> FetchedPage<TestItem> {
        let take = cursor.requested_limit().unwrap_or(page_size_hint) as usize;
        let bound = cursor.id().map(|id| numeric_id(id).max(0) as u64);

        let selected: Vec<u64> = match (cursor, bound) {
            (Cursor::UpperBound { .. }, Some(bound)) => self
                .ids
                .iter()
                .copied()
                .filter(|id| *id < bound)
                .take(take)
                .collect(),
            (Cursor::LowerBoundSince { .. }, Some(bound)) => self
                .ids
                .iter()
                .copied()
                .filter(|id| *id > bound)
                .take(take)
                .collect(),
            (Cursor::LowerBoundMin { .. }, Some(bound)) => {
                let newer: Vec<u64> = self.ids.iter().copied().filter(|id| *id > bound).collect();
                let skip = newer.len().saturating_sub(take);
                newer.into_iter().skip(skip).collect()
            }
            _ => self.ids.iter().copied().take(take).collect(),
        };

        if !link {
            return derived_page(&selected);
        }
        let next = selected
            .last()
            .filter(|oldest| self.ids.iter().any(|id| id < *oldest))
            .map(|oldest| oldest.to_string());
        let previous = selected.first().map(|newest| newest.to_string());
        link_page(&selected, next.as_deref(), previous.as_deref())
    }
}

//! Feed descriptors, visible state and update notifications.

use feedsync_protocol::WindowKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a feed's source paginates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaginationStyle {
    /// The source accepts arbitrary id bounds; the window is derived from
    /// fetched items.
    Derived,
    /// The source pages through opaque link cursors.
    Link,
}

impl PaginationStyle {
    /// Returns the window representation this style produces.
    pub fn window_kind(&self) -> WindowKind {
        match self {
            PaginationStyle::Derived => WindowKind::Derived,
            PaginationStyle::Link => WindowKind::Link,
        }
    }
}

/// Identifies a feed and the properties that affect how it is synced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedDescriptor {
    /// Feed name, used in logs and notifications.
    pub name: String,
    /// Pagination style of the source.
    pub pagination: PaginationStyle,
    /// Whether the source serves unfiltered remote content. Only remote
    /// feeds pass through the filter pipeline.
    pub remote: bool,
}

impl FeedDescriptor {
    /// Creates a local, derived-range feed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pagination: PaginationStyle::Derived,
            remote: false,
        }
    }

    /// Sets the pagination style.
    pub fn with_pagination(mut self, pagination: PaginationStyle) -> Self {
        self.pagination = pagination;
        self
    }

    /// Marks the feed as serving remote content.
    pub fn remote(mut self) -> Self {
        self.remote = true;
        self
    }
}

impl fmt::Display for FeedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The visible state of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    /// Nothing has been requested yet.
    Idle,
    /// A fetch is in progress.
    Loading,
    /// The last fetch was committed.
    Success,
    /// The last fetch failed.
    Error {
        /// Error message.
        message: String,
    },
}

impl FeedState {
    /// Returns true if the feed is loading.
    pub fn is_loading(&self) -> bool {
        matches!(self, FeedState::Loading)
    }

    /// Returns true if the feed is in the error state.
    pub fn is_error(&self) -> bool {
        matches!(self, FeedState::Error { .. })
    }
}

/// The kind of change a committed merge made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Older items were appended at the bottom.
    Append,
    /// Newer items were inserted at the top.
    Insert,
    /// The whole feed was replaced.
    Replace,
    /// Items or the gap marker were removed.
    Remove,
    /// Content changed without structural change.
    None,
}

/// A hint for keeping the reader's position after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollAnchor {
    /// Scroll to the top of the feed.
    Top,
    /// Keep the item with this id in place.
    Item(String),
}

/// Notification sent to the observer after each committed merge.
#[derive(Debug, Clone)]
pub struct FeedUpdate<T> {
    /// The feed that changed.
    pub feed: FeedDescriptor,
    /// Snapshot of the items after the merge.
    pub items: Vec<T>,
    /// Kind of change.
    pub kind: UpdateKind,
    /// Optional position hint.
    pub scroll_anchor: Option<ScrollAnchor>,
    /// Number of items in the unread block above the "load more" marker.
    pub gap: Option<usize>,
}

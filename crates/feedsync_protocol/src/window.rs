//! Pagination windows.
//!
//! A feed tracks the extent of the content it has already fetched in one of
//! two representations:
//!
//! - a **derived range**, computed from the ids of the first and last item
//!   of the most recent fetch, used by sources that accept arbitrary id
//!   bounds;
//! - a **link window**, the `next`/`previous` cursors the source returned
//!   in its pagination headers, used by sources that only page through
//!   opaque links.
//!
//! A feed uses exactly one of them for its whole lifetime.

use crate::cursor::Cursor;
use crate::error::{ProtocolError, ProtocolResult};
use crate::item::FeedItem;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The representation a [`PaginationWindow`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// Range derived from fetched item ids.
    Derived,
    /// Window supplied by the source's link headers.
    Link,
}

impl WindowKind {
    /// Returns a stable lowercase name for logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Derived => "derived",
            WindowKind::Link => "link",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boundary cursors supplied by a link-paginated source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPagination {
    /// Cursor for the next (older) page.
    pub next: Option<Cursor>,
    /// Cursor for the previous (newer) page.
    pub previous: Option<Cursor>,
}

impl LinkPagination {
    /// Creates a new link pagination pair.
    pub fn new(next: Option<Cursor>, previous: Option<Cursor>) -> Self {
        Self { next, previous }
    }
}

/// The known extent of a feed's fetched content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaginationWindow {
    /// First and last item ids of the most recent fetch.
    ///
    /// The first id is expected to be numerically higher (newer).
    DerivedRange {
        /// Id of the first (newest) fetched item.
        first_id: Option<String>,
        /// Id of the last (oldest) fetched item.
        last_id: Option<String>,
    },
    /// Cursors returned by the source.
    LinkWindow(LinkPagination),
}

impl PaginationWindow {
    /// Creates a derived range.
    pub fn derived(first_id: Option<String>, last_id: Option<String>) -> Self {
        PaginationWindow::DerivedRange { first_id, last_id }
    }

    /// Creates a derived range from the first and last of `items`.
    pub fn derived_from<T: FeedItem>(items: &[T]) -> Self {
        PaginationWindow::DerivedRange {
            first_id: items.first().map(|item| item.unique_id().to_string()),
            last_id: items.last().map(|item| item.unique_id().to_string()),
        }
    }

    /// Creates a link window.
    pub fn link(next: Option<Cursor>, previous: Option<Cursor>) -> Self {
        PaginationWindow::LinkWindow(LinkPagination::new(next, previous))
    }

    /// Returns the representation in use.
    pub fn kind(&self) -> WindowKind {
        match self {
            PaginationWindow::DerivedRange { .. } => WindowKind::Derived,
            PaginationWindow::LinkWindow(_) => WindowKind::Link,
        }
    }

    /// Returns the cursor for the next (older) page of a link window.
    pub fn next_cursor(&self) -> Option<&Cursor> {
        match self {
            PaginationWindow::LinkWindow(link) => link.next.as_ref(),
            PaginationWindow::DerivedRange { .. } => None,
        }
    }

    /// Returns the cursor for the previous (newer) page of a link window.
    pub fn previous_cursor(&self) -> Option<&Cursor> {
        match self {
            PaginationWindow::LinkWindow(link) => link.previous.as_ref(),
            PaginationWindow::DerivedRange { .. } => None,
        }
    }

    /// Returns true if the window offers no continuation toward older content.
    ///
    /// For a derived range that means the fetch returned no items; for a
    /// link window it means the source sent no `next` cursor.
    pub fn is_exhausted(&self) -> bool {
        match self {
            PaginationWindow::DerivedRange { last_id, .. } => last_id.is_none(),
            PaginationWindow::LinkWindow(link) => link.next.is_none(),
        }
    }

    /// Merges an incoming window into this one.
    ///
    /// A derived range is replaced outright. A link window keeps the widest
    /// extent seen so far: an already-advanced `next` is not regressed by a
    /// higher incoming value, and an already-advanced `previous` is not
    /// regressed by a lower one. Mixing representations fails with
    /// [`ProtocolError::IncompatibleVariant`].
    pub fn merge(&self, incoming: &PaginationWindow) -> ProtocolResult<PaginationWindow> {
        match (self, incoming) {
            (PaginationWindow::DerivedRange { .. }, PaginationWindow::DerivedRange { .. }) => {
                Ok(incoming.clone())
            }
            (PaginationWindow::LinkWindow(current), PaginationWindow::LinkWindow(newer)) => {
                Ok(PaginationWindow::LinkWindow(extend_link(current, newer)))
            }
            _ => Err(ProtocolError::IncompatibleVariant {
                current: self.kind().to_string(),
                incoming: incoming.kind().to_string(),
            }),
        }
    }
}

/// Widens `current` with `newer`, preferring the incoming cursors unless the
/// current one is further out.
fn extend_link(current: &LinkPagination, newer: &LinkPagination) -> LinkPagination {
    LinkPagination {
        next: keep_outer(&current.next, &newer.next, Ordering::Less),
        previous: keep_outer(&current.previous, &newer.previous, Ordering::Greater),
    }
}

/// Keeps `current` only when both are set, comparable, and `current` orders
/// as `outer` relative to `incoming`.
fn keep_outer(
    current: &Option<Cursor>,
    incoming: &Option<Cursor>,
    outer: Ordering,
) -> Option<Cursor> {
    match (current, incoming) {
        (Some(cur), Some(inc))
            if cur.is_comparable_with(inc) && cur.compare(inc).ok() == Some(outer) =>
        {
            Some(cur.clone())
        }
        _ => incoming.clone(),
    }
}

impl fmt::Display for PaginationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaginationWindow::DerivedRange { first_id, last_id } => write!(
                f,
                "derived first={} last={}",
                first_id.as_deref().unwrap_or("-"),
                last_id.as_deref().unwrap_or("-")
            ),
            PaginationWindow::LinkWindow(link) => {
                let show = |c: &Option<Cursor>| c.as_ref().map_or("-".to_string(), |c| c.to_string());
                write!(f, "link next=[{}] previous=[{}]", show(&link.next), show(&link.previous))
            }
        }
    }
}

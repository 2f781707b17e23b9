//! Property-based test generators using proptest.
//!
//! Provides strategies for generating ids, cursors, windows and pages that
//! keep the invariants a real source guarantees (unique ids, newest first).

use crate::fixtures::{derived_page, link_page, TestItem};
use feedsync_protocol::{Cursor, FetchedPage, PaginationWindow};
use proptest::prelude::*;

/// Strategy for generating item ids.
pub fn item_id_strategy() -> impl Strategy<Value = u64> {
    1u64..1_000_000
}

/// Strategy for generating unique ids sorted newest first.
pub fn id_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::btree_set(item_id_strategy(), 0..=max_len)
        .prop_map(|set| set.into_iter().rev().collect())
}

/// Strategy for generating optional page limits.
pub fn limit_strategy() -> impl Strategy<Value = Option<u32>> {
    prop::option::of(1u32..200)
}

/// Strategy for generating cursors of every kind.
pub fn cursor_strategy() -> impl Strategy<Value = Cursor> {
    prop_oneof![
        (item_id_strategy(), limit_strategy())
            .prop_map(|(id, limit)| Cursor::upper_bound(id.to_string(), limit)),
        (item_id_strategy(), limit_strategy())
            .prop_map(|(id, limit)| Cursor::since(id.to_string(), limit)),
        (item_id_strategy(), limit_strategy())
            .prop_map(|(id, limit)| Cursor::min(id.to_string(), limit)),
        (1u32..200).prop_map(Cursor::limit),
        Just(Cursor::Default),
    ]
}

/// Strategy for generating link windows with upper-bound `next` and min
/// `previous` cursors.
pub fn link_window_strategy() -> impl Strategy<Value = PaginationWindow> {
    (
        prop::option::of(item_id_strategy()),
        prop::option::of(item_id_strategy()),
    )
        .prop_map(|(next, previous)| {
            PaginationWindow::link(
                next.map(|id| Cursor::upper_bound(id.to_string(), Some(40))),
                previous.map(|id| Cursor::min(id.to_string(), Some(40))),
            )
        })
}

/// Strategy for generating pages with derived windows.
pub fn derived_page_strategy(max_len: usize) -> impl Strategy<Value = FetchedPage<TestItem>> {
    id_batch_strategy(max_len).prop_map(|ids| derived_page(&ids))
}

/// Strategy for generating pages with link windows taken from their items.
pub fn link_page_strategy(max_len: usize) -> impl Strategy<Value = FetchedPage<TestItem>> {
    id_batch_strategy(max_len).prop_map(|ids| {
        let next = ids.last().map(|id| id.to_string());
        let previous = ids.first().map(|id| id.to_string());
        link_page(&ids, next.as_deref(), previous.as_deref())
    })
}

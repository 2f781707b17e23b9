//! Sync engine for a single feed.
//!
//! Every operation follows the same shape: capture the session token and
//! cancellation token, build a cursor, await the provider, then take the
//! commit gate and re-check both before touching the store. Fetches may
//! overlap; commits never do.

use crate::config::SyncConfig;
use crate::error::{FetchError, SyncError, SyncResult};
use crate::feed::{FeedDescriptor, FeedState, FeedUpdate, PaginationStyle, ScrollAnchor, UpdateKind};
use crate::filter::FilterPipeline;
use crate::item_sync::ItemRefresh;
use crate::observer::FeedObserver;
use crate::provider::FetchProvider;
use crate::session::{SessionIdentity, SessionToken};
use crate::store::{dedup, slice_above, slice_below, FeedStore};
use feedsync_protocol::{
    Cursor, FeedItem, FetchedPage, PaginationWindow, ProtocolError, ProtocolResult,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why an operation finished without changing the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The session changed while the fetch was in flight.
    StaleContext,
    /// The engine was cancelled.
    Cancelled,
    /// The feed holds no item to page from.
    NoAnchor,
    /// The source reported no older content.
    EndOfFeed,
    /// Fewer new items than the threshold were found.
    BelowThreshold {
        /// Number of new unique items found.
        found: usize,
        /// Threshold in effect.
        threshold: usize,
    },
    /// There is no "load more" gap to fill.
    NoGap,
}

/// Result of a fetch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// The fetch was committed.
    Merged {
        /// Items added or replaced by the merge.
        items: Vec<T>,
        /// Kind of change.
        kind: UpdateKind,
    },
    /// Nothing was committed.
    Skipped(SkipReason),
}

impl<T> FetchOutcome<T> {
    /// Returns the merged items; empty when skipped.
    pub fn items(&self) -> &[T] {
        match self {
            FetchOutcome::Merged { items, .. } => items,
            FetchOutcome::Skipped(_) => &[],
        }
    }

    /// Consumes the outcome, returning the merged items.
    pub fn into_items(self) -> Vec<T> {
        match self {
            FetchOutcome::Merged { items, .. } => items,
            FetchOutcome::Skipped(_) => Vec::new(),
        }
    }

    /// Returns true if the fetch was committed.
    pub fn is_merged(&self) -> bool {
        matches!(self, FetchOutcome::Merged { .. })
    }

    /// Returns the skip reason, if any.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            FetchOutcome::Skipped(reason) => Some(*reason),
            FetchOutcome::Merged { .. } => None,
        }
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Fetches dispatched to the provider.
    pub fetches: u64,
    /// Merges committed.
    pub merges: u64,
    /// Items added or replaced by committed merges.
    pub items_merged: u64,
    /// Results discarded because the session changed.
    pub discarded_stale: u64,
    /// Results discarded because of cancellation.
    pub discarded_cancelled: u64,
    /// Failed fetches.
    pub failures: u64,
    /// Time of the last committed merge.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Intent {
    Refresh,
    NextPage,
    PreviousPage,
    Latest,
    GapFill,
}

impl Intent {
    fn as_str(&self) -> &'static str {
        match self {
            Intent::Refresh => "refresh",
            Intent::NextPage => "next_page",
            Intent::PreviousPage => "previous_page",
            Intent::Latest => "latest",
            Intent::GapFill => "gap_fill",
        }
    }

    // Polling must not flicker the visible state.
    fn shows_loading(&self) -> bool {
        !matches!(self, Intent::Latest)
    }
}

struct FetchContext {
    intent: Intent,
    token: SessionToken,
    cancel: CancellationToken,
    previous_state: Option<FeedState>,
}

enum Fetched<T> {
    Page(FetchedPage<T>),
    Skip(SkipReason),
}

enum Merge<T> {
    Applied {
        items: Vec<T>,
        kind: UpdateKind,
        anchor: Option<ScrollAnchor>,
    },
    Skipped(SkipReason),
}

/// Fetches, filters, deduplicates and merges content for one feed.
///
/// The engine is the only writer of its feed's items, window and state.
/// Share it behind an [`Arc`] to drive it from a [`PollScheduler`] and user
/// actions at the same time.
///
/// [`PollScheduler`]: crate::PollScheduler
pub struct SyncEngine<T: FeedItem> {
    feed: FeedDescriptor,
    config: SyncConfig,
    provider: Arc<dyn FetchProvider<T>>,
    filters: FilterPipeline<T>,
    session: Arc<dyn SessionIdentity>,
    observer: RwLock<Option<Arc<dyn FeedObserver<T>>>>,
    store: RwLock<FeedStore<T>>,
    commit_gate: Mutex<()>,
    cancel: RwLock<CancellationToken>,
    stats: RwLock<SyncStats>,
}

impl<T: FeedItem> SyncEngine<T> {
    /// Creates a new engine.
    pub fn new(
        feed: FeedDescriptor,
        config: SyncConfig,
        provider: Arc<dyn FetchProvider<T>>,
        session: Arc<dyn SessionIdentity>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            feed,
            config,
            provider,
            filters: FilterPipeline::disabled(),
            session,
            observer: RwLock::new(None),
            store: RwLock::new(FeedStore::new()),
            commit_gate: Mutex::new(()),
            cancel: RwLock::new(CancellationToken::new()),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    /// Sets the filter pipeline.
    pub fn with_filters(mut self, filters: FilterPipeline<T>) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the observer.
    pub fn with_observer(self, observer: Arc<dyn FeedObserver<T>>) -> Self {
        *self.observer.write() = Some(observer);
        self
    }

    /// Replaces the observer.
    pub fn set_observer(&self, observer: Arc<dyn FeedObserver<T>>) {
        *self.observer.write() = Some(observer);
    }

    /// Removes the observer.
    pub fn clear_observer(&self) {
        *self.observer.write() = None;
    }

    /// Returns the feed descriptor.
    pub fn feed(&self) -> &FeedDescriptor {
        &self.feed
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns a snapshot of the items, newest first.
    pub fn items(&self) -> Vec<T> {
        self.store.read().items().to_vec()
    }

    /// Returns the number of items held.
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// Returns true if the feed holds no items.
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Gets the visible state.
    pub fn state(&self) -> FeedState {
        self.store.read().state().clone()
    }

    /// Gets the current pagination window.
    pub fn window(&self) -> Option<PaginationWindow> {
        self.store.read().window().cloned()
    }

    /// Returns true if older content may still be available.
    pub fn more_available(&self) -> bool {
        self.store.read().more_available()
    }

    /// Returns the size of the unread block above the "load more" marker.
    pub fn gap(&self) -> Option<usize> {
        self.store.read().gap()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the token of the active session.
    pub fn current_session(&self) -> SessionToken {
        self.session.current()
    }

    /// Returns the current cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.read().clone()
    }

    /// Cancels in-flight operations and the tasks derived from this engine.
    pub fn cancel(&self) {
        self.cancel.read().cancel();
    }

    /// Re-arms the engine after [`cancel`](Self::cancel).
    pub fn reset_cancel(&self) {
        let mut cancel = self.cancel.write();
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
    }

    /// Returns true if the engine is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.read().is_cancelled()
    }

    /// Records whether the reader has caught up with the top of the feed.
    pub fn mark_reading_newest(&self, reading_newest: bool) {
        let _gate = self.commit_gate.lock();
        self.store.write().set_reading_newest(reading_newest);
    }

    /// Replaces the whole feed with the freshest page.
    pub async fn refresh(&self) -> SyncResult<FetchOutcome<T>> {
        let size = self.clamped(self.config.refresh_page_size);
        let cursor = match self.feed.pagination {
            PaginationStyle::Derived => Cursor::limit(size),
            PaginationStyle::Link => Cursor::Default,
        };

        let ctx = self.begin(Intent::Refresh);
        let FetchedPage { items, window } = match self.fetch(&ctx, cursor, size).await? {
            Fetched::Page(page) => page,
            Fetched::Skip(reason) => return Ok(FetchOutcome::Skipped(reason)),
        };

        self.commit(&ctx, &window, |store| {
            let items = dedup(items, &[]);
            store.replace_all(items.clone(), Some(window.clone()));
            store.set_more_available(true);
            Ok(Merge::Applied {
                items,
                kind: UpdateKind::Replace,
                anchor: Some(ScrollAnchor::Top),
            })
        })
    }

    /// Appends older content at the bottom.
    ///
    /// A no-op without an oldest item, or once the source has reported the
    /// end of the feed.
    pub async fn load_next_page(&self) -> SyncResult<FetchOutcome<T>> {
        let size = self.clamped(self.config.next_page_size);
        let cursor = {
            let store = self.store.read();
            if !store.more_available() {
                return Ok(FetchOutcome::Skipped(SkipReason::EndOfFeed));
            }
            let Some(oldest) = store.oldest_id() else {
                return Ok(FetchOutcome::Skipped(SkipReason::NoAnchor));
            };
            match self.feed.pagination {
                PaginationStyle::Derived => Cursor::upper_bound(oldest, Some(size)),
                PaginationStyle::Link => store
                    .window()
                    .and_then(|window| window.next_cursor())
                    .cloned()
                    .unwrap_or(Cursor::Default),
            }
        };

        let ctx = self.begin(Intent::NextPage);
        let FetchedPage { items, window } = match self.fetch(&ctx, cursor, size).await? {
            Fetched::Page(page) => page,
            Fetched::Skip(reason) => return Ok(FetchOutcome::Skipped(reason)),
        };

        self.commit(&ctx, &window, |store| {
            store.merge_window(&window)?;
            let unique = store.unique_new(items);
            if window.is_exhausted() {
                store.set_more_available(false);
            }
            store.append(unique.clone());
            Ok(Merge::Applied {
                kind: if unique.is_empty() {
                    UpdateKind::None
                } else {
                    UpdateKind::Append
                },
                items: unique,
                anchor: None,
            })
        })
    }

    /// Inserts newer content at the top, or refreshes an empty feed.
    pub async fn load_previous_page(&self) -> SyncResult<FetchOutcome<T>> {
        let size = self.clamped(self.config.previous_page_size);
        let cursor = {
            let store = self.store.read();
            match store.newest_id() {
                None => None,
                Some(newest) => Some(match self.feed.pagination {
                    PaginationStyle::Derived => Cursor::min(newest, Some(size)),
                    PaginationStyle::Link => store
                        .window()
                        .and_then(|window| window.previous_cursor())
                        .cloned()
                        .unwrap_or(Cursor::Default),
                }),
            }
        };
        let Some(cursor) = cursor else {
            debug!(feed = %self.feed, "no newest item, refreshing instead");
            return self.refresh().await;
        };

        let ctx = self.begin(Intent::PreviousPage);
        let FetchedPage { items, window } = match self.fetch(&ctx, cursor, size).await? {
            Fetched::Page(page) => page,
            Fetched::Skip(reason) => return Ok(FetchOutcome::Skipped(reason)),
        };

        self.commit(&ctx, &window, |store| {
            store.merge_window(&window)?;
            let unique = store.unique_new(items);
            let anchor = store
                .newest_id()
                .map(|id| ScrollAnchor::Item(id.to_string()));
            store.prepend(unique.clone());
            Ok(Merge::Applied {
                kind: if unique.is_empty() {
                    UpdateKind::None
                } else {
                    UpdateKind::Insert
                },
                items: unique,
                anchor,
            })
        })
    }

    /// Fetches the newest page and inserts genuinely new items as an unread
    /// block at the top.
    ///
    /// Items at or below the reading boundary are ignored. Fewer than
    /// `threshold` new items (the configured threshold when `None`) are
    /// treated as noise and not merged.
    pub async fn load_latest(&self, threshold: Option<usize>) -> SyncResult<FetchOutcome<T>> {
        let size = self.clamped(self.config.latest_page_size);
        let threshold = threshold.unwrap_or(self.config.new_items_threshold);
        let cursor = match self.feed.pagination {
            PaginationStyle::Derived => Cursor::limit(size),
            PaginationStyle::Link => Cursor::Default,
        };

        let ctx = self.begin(Intent::Latest);
        let FetchedPage { items, window } = match self.fetch(&ctx, cursor, size).await? {
            Fetched::Page(page) => page,
            Fetched::Skip(reason) => return Ok(FetchOutcome::Skipped(reason)),
        };

        let config = &self.config;
        self.commit(&ctx, &window, |store| {
            if store.is_empty() {
                let items = dedup(items, &[]);
                store.replace_all(items.clone(), Some(window.clone()));
                return Ok(Merge::Applied {
                    items,
                    kind: UpdateKind::Replace,
                    anchor: Some(ScrollAnchor::Top),
                });
            }

            let boundary = store.reading_boundary_id().map(str::to_string);
            let fresh = slice_above(&items, boundary.as_deref()).to_vec();
            let mut unique = store.unique_new(fresh);
            if unique.is_empty() || unique.len() < threshold {
                return Ok(Merge::Skipped(SkipReason::BelowThreshold {
                    found: unique.len(),
                    threshold,
                }));
            }

            store.merge_window(&window)?;
            let include_load_more = if unique.len() >= config.newest_section_length {
                // Only a full block is shown; the rest comes back through the gap.
                unique.truncate(config.newest_section_length);
                true
            } else {
                unique.len() > config.optimistic_load_more_after
            };
            let anchor = store
                .newest_id()
                .map(|id| ScrollAnchor::Item(id.to_string()));
            store.insert_newest(unique.clone(), include_load_more);
            Ok(Merge::Applied {
                items: unique,
                kind: UpdateKind::Insert,
                anchor,
            })
        })
    }

    /// Loads the items missing between the unread block and older content.
    ///
    /// The marker stays while the fetched page does not reach the unread
    /// block, and is removed once it does or when nothing new arrives.
    pub async fn fill_gap(&self) -> SyncResult<FetchOutcome<T>> {
        let size = self.clamped(self.config.gap_fill_page_size);
        let anchor = {
            let store = self.store.read();
            if store.gap().is_none() {
                return Ok(FetchOutcome::Skipped(SkipReason::NoGap));
            }
            match store.first_below_gap_id() {
                Some(id) => id.to_string(),
                None => return Ok(FetchOutcome::Skipped(SkipReason::NoAnchor)),
            }
        };

        let ctx = self.begin(Intent::GapFill);
        let cursor = Cursor::min(anchor.as_str(), Some(size));
        let FetchedPage { items, window } = match self.fetch(&ctx, cursor, size).await? {
            Fetched::Page(page) => page,
            Fetched::Skip(reason) => return Ok(FetchOutcome::Skipped(reason)),
        };

        self.commit(&ctx, &window, |store| {
            if store.gap().is_none() {
                return Ok(Merge::Skipped(SkipReason::NoGap));
            }
            let block_last = store.last_of_unread_block_id().map(str::to_string);
            let reached_block = block_last
                .as_deref()
                .is_some_and(|id| items.iter().any(|item| item.unique_id() == id));
            let fresh = slice_below(&items, block_last.as_deref()).to_vec();
            let unique = store.unique_new(fresh);

            if unique.is_empty() {
                store.close_gap();
                return Ok(Merge::Applied {
                    items: unique,
                    kind: UpdateKind::Remove,
                    anchor: None,
                });
            }

            store.insert_below_gap(unique.clone());
            if reached_block {
                store.close_gap();
            }
            Ok(Merge::Applied {
                items: unique,
                kind: UpdateKind::Insert,
                anchor: Some(ScrollAnchor::Item(anchor.clone())),
            })
        })
    }

    /// Swaps in a server-side edit of a held item.
    ///
    /// Returns false if no item with the same id is held.
    pub fn replace_item(&self, item: T) -> bool {
        let _gate = self.commit_gate.lock();
        self.replace_locked(item)
    }

    /// Removes a held item. Returns false if it was not held.
    pub fn remove_item(&self, id: &str) -> bool {
        let _gate = self.commit_gate.lock();
        self.remove_locked(id)
    }

    /// Applies a per-item refresh, re-checking the session and
    /// cancellation at commit time.
    pub(crate) fn apply_item_refresh(
        &self,
        token: SessionToken,
        cancel: &CancellationToken,
        id: &str,
        refresh: ItemRefresh<T>,
    ) -> Result<bool, SkipReason> {
        let _gate = self.commit_gate.lock();
        if cancel.is_cancelled() {
            return Err(SkipReason::Cancelled);
        }
        if self.session.current() != token {
            return Err(SkipReason::StaleContext);
        }
        Ok(match refresh {
            ItemRefresh::Updated(item) => self.replace_locked(item),
            ItemRefresh::Removed => self.remove_locked(id),
            ItemRefresh::Unchanged => false,
        })
    }

    fn replace_locked(&self, item: T) -> bool {
        let mut store = self.store.write();
        if !store.replace_item(item) {
            return false;
        }
        let update = self.snapshot(&store, UpdateKind::None, None);
        drop(store);
        self.notify(&update);
        true
    }

    fn remove_locked(&self, id: &str) -> bool {
        let mut store = self.store.write();
        if !store.remove_item(id) {
            return false;
        }
        let update = self.snapshot(&store, UpdateKind::Remove, None);
        drop(store);
        debug!(feed = %self.feed, id, "removed item");
        self.notify(&update);
        true
    }

    fn clamped(&self, size: u32) -> u32 {
        self.config.limit_clamp.apply(size)
    }

    fn begin(&self, intent: Intent) -> FetchContext {
        let token = self.session.current();
        let cancel = self.cancel.read().clone();
        let previous_state = if intent.shows_loading() {
            let _gate = self.commit_gate.lock();
            let mut store = self.store.write();
            let previous = store.state().clone();
            store.set_state(FeedState::Loading);
            Some(previous)
        } else {
            None
        };
        self.stats.write().fetches += 1;
        FetchContext {
            intent,
            token,
            cancel,
            previous_state,
        }
    }

    async fn fetch(
        &self,
        ctx: &FetchContext,
        cursor: Cursor,
        page_size_hint: u32,
    ) -> SyncResult<Fetched<T>> {
        debug!(
            feed = %self.feed,
            intent = ctx.intent.as_str(),
            cursor = %cursor,
            "fetching page"
        );

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            result = self.provider.fetch_page(&cursor, page_size_hint) => Some(result),
        };

        let result = match result {
            Some(Ok(page)) => {
                let items = self.filters.apply(&self.feed, page.items);
                return Ok(Fetched::Page(FetchedPage::new(items, page.window)));
            }
            Some(Err(err)) => Err(err),
            None => Ok(()),
        };

        let _gate = self.commit_gate.lock();
        let mut store = self.store.write();
        let reason = match result {
            Ok(()) => SkipReason::Cancelled,
            Err(err) => match self.check_context(ctx) {
                Some(reason) => reason,
                None => {
                    self.fail(ctx, &mut store, &err);
                    return Err(SyncError::Fetch(err));
                }
            },
        };
        self.discard(ctx, &mut store, reason);
        Ok(Fetched::Skip(reason))
    }

    /// Runs `merge` against the store under the commit gate, after the
    /// stale-context and cancellation checks, then notifies the observer.
    fn commit<F>(
        &self,
        ctx: &FetchContext,
        window: &PaginationWindow,
        merge: F,
    ) -> SyncResult<FetchOutcome<T>>
    where
        F: FnOnce(&mut FeedStore<T>) -> ProtocolResult<Merge<T>>,
    {
        let _gate = self.commit_gate.lock();
        let mut store = self.store.write();

        if let Some(reason) = self.check_context(ctx) {
            self.discard(ctx, &mut store, reason);
            return Ok(FetchOutcome::Skipped(reason));
        }

        let expected = self.feed.pagination.window_kind();
        if window.kind() != expected {
            let err = ProtocolError::IncompatibleVariant {
                current: expected.to_string(),
                incoming: window.kind().to_string(),
            };
            return Err(self.reject(ctx, &mut store, err));
        }

        let merged = match merge(&mut store) {
            Ok(merged) => merged,
            Err(err) => return Err(self.reject(ctx, &mut store, err)),
        };

        match merged {
            Merge::Skipped(reason) => {
                self.restore(ctx, &mut store);
                debug!(
                    feed = %self.feed,
                    intent = ctx.intent.as_str(),
                    reason = ?reason,
                    "nothing to merge"
                );
                Ok(FetchOutcome::Skipped(reason))
            }
            Merge::Applied {
                items,
                kind,
                anchor,
            } => {
                store.set_state(FeedState::Success);
                let update = self.snapshot(&store, kind, anchor);
                drop(store);

                {
                    let mut stats = self.stats.write();
                    stats.merges += 1;
                    stats.items_merged += items.len() as u64;
                    stats.last_sync_time = Some(Instant::now());
                }
                info!(
                    feed = %self.feed,
                    intent = ctx.intent.as_str(),
                    kind = ?kind,
                    count = items.len(),
                    total = update.items.len(),
                    "merged page"
                );
                self.notify(&update);
                Ok(FetchOutcome::Merged { items, kind })
            }
        }
    }

    fn check_context(&self, ctx: &FetchContext) -> Option<SkipReason> {
        if ctx.cancel.is_cancelled() {
            Some(SkipReason::Cancelled)
        } else if self.session.current() != ctx.token {
            Some(SkipReason::StaleContext)
        } else {
            None
        }
    }

    fn restore(&self, ctx: &FetchContext, store: &mut FeedStore<T>) {
        if let Some(previous) = &ctx.previous_state {
            if store.state().is_loading() {
                store.set_state(previous.clone());
            }
        }
    }

    fn discard(&self, ctx: &FetchContext, store: &mut FeedStore<T>, reason: SkipReason) {
        self.restore(ctx, store);
        {
            let mut stats = self.stats.write();
            match reason {
                SkipReason::StaleContext => stats.discarded_stale += 1,
                SkipReason::Cancelled => stats.discarded_cancelled += 1,
                _ => {}
            }
        }
        debug!(
            feed = %self.feed,
            intent = ctx.intent.as_str(),
            reason = ?reason,
            "discarded fetch result"
        );
    }

    fn fail(&self, ctx: &FetchContext, store: &mut FeedStore<T>, err: &FetchError) {
        store.set_state(FeedState::Error {
            message: err.to_string(),
        });
        store.set_more_available(true);
        {
            let mut stats = self.stats.write();
            stats.failures += 1;
            stats.last_error = Some(err.to_string());
        }
        warn!(
            feed = %self.feed,
            intent = ctx.intent.as_str(),
            retryable = err.retryable,
            error = %err,
            "fetch failed"
        );
    }

    fn reject(&self, ctx: &FetchContext, store: &mut FeedStore<T>, err: ProtocolError) -> SyncError {
        self.restore(ctx, store);
        self.stats.write().last_error = Some(err.to_string());
        error!(
            feed = %self.feed,
            intent = ctx.intent.as_str(),
            error = %err,
            "rejected fetched window"
        );
        SyncError::Protocol(err)
    }

    fn snapshot(
        &self,
        store: &FeedStore<T>,
        kind: UpdateKind,
        scroll_anchor: Option<ScrollAnchor>,
    ) -> FeedUpdate<T> {
        FeedUpdate {
            feed: self.feed.clone(),
            items: store.items().to_vec(),
            kind,
            scroll_anchor,
            gap: store.gap(),
        }
    }

    fn notify(&self, update: &FeedUpdate<T>) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_feed_updated(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use crate::provider::MockProvider;
    use crate::session::SessionGeneration;
    use feedsync_testkit::{derived_page, item_ids, link_page, TestItem};

    struct Harness {
        engine: SyncEngine<TestItem>,
        provider: Arc<MockProvider<TestItem>>,
        observer: Arc<RecordingObserver<TestItem>>,
        session: SessionGeneration,
    }

    fn harness_with(feed: FeedDescriptor, config: SyncConfig) -> Harness {
        let provider = Arc::new(MockProvider::new());
        let observer = Arc::new(RecordingObserver::new());
        let session = SessionGeneration::new();
        let engine = SyncEngine::new(feed, config, provider.clone(), Arc::new(session.clone()))
            .unwrap()
            .with_observer(observer.clone());
        Harness {
            engine,
            provider,
            observer,
            session,
        }
    }

    fn harness() -> Harness {
        harness_with(FeedDescriptor::new("home"), SyncConfig::default())
    }

    async fn seeded(ids_newest_first: &[u64]) -> Harness {
        let h = harness();
        h.provider.push_page(derived_page(ids_newest_first));
        h.engine.refresh().await.unwrap();
        h
    }

    #[test]
    fn rejects_invalid_config() {
        let provider: Arc<MockProvider<TestItem>> = Arc::new(MockProvider::new());
        let result = SyncEngine::new(
            FeedDescriptor::new("home"),
            SyncConfig::new().with_next_page_size(0),
            provider,
            Arc::new(SessionGeneration::new()),
        );
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn refresh_replaces_feed() {
        let h = seeded(&[5, 4, 3]).await;
        assert_eq!(item_ids(&h.engine.items()), vec!["5", "4", "3"]);
        assert_eq!(h.engine.state(), FeedState::Success);

        h.provider.push_page(derived_page(&[9, 8]));
        let outcome = h.engine.refresh().await.unwrap();
        assert_eq!(item_ids(outcome.items()), vec!["9", "8"]);
        assert_eq!(item_ids(&h.engine.items()), vec!["9", "8"]);
        assert_eq!(
            h.engine.window(),
            Some(PaginationWindow::derived(Some("9".into()), Some("8".into())))
        );
        assert_eq!(h.observer.kinds(), vec![UpdateKind::Replace, UpdateKind::Replace]);
        assert_eq!(
            h.provider.requests()[0].cursor,
            Cursor::limit(h.engine.config().refresh_page_size)
        );
    }

    #[tokio::test]
    async fn refresh_failure_sets_error_and_propagates() {
        let h = harness();
        h.provider.push_error(FetchError::retryable("503"));

        let err = h.engine.refresh().await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch(_)));
        assert!(h.engine.state().is_error());
        assert!(h.engine.more_available());
        assert_eq!(h.engine.stats().failures, 1);
        assert!(h.observer.is_empty());
    }

    #[tokio::test]
    async fn next_page_appends_unique_items() {
        let h = seeded(&[50, 40, 30]).await;
        h.provider.push_page(derived_page(&[30, 20, 10]));

        let outcome = h.engine.load_next_page().await.unwrap();
        assert_eq!(item_ids(outcome.items()), vec!["20", "10"]);
        assert_eq!(
            item_ids(&h.engine.items()),
            vec!["50", "40", "30", "20", "10"]
        );
        assert_eq!(
            h.provider.requests()[1].cursor,
            Cursor::upper_bound("30", Some(20))
        );
        assert_eq!(h.observer.last().map(|u| u.kind), Some(UpdateKind::Append));
    }

    #[tokio::test]
    async fn next_page_without_anchor_is_noop() {
        let h = harness();
        let outcome = h.engine.load_next_page().await.unwrap();
        assert_eq!(outcome.skip_reason(), Some(SkipReason::NoAnchor));
        assert_eq!(h.provider.request_count(), 0);
        assert_eq!(h.engine.state(), FeedState::Idle);
    }

    #[tokio::test]
    async fn previous_page_prepends_with_anchor() {
        let h = seeded(&[30, 20]).await;
        h.provider.push_page(derived_page(&[50, 40, 30]));

        let outcome = h.engine.load_previous_page().await.unwrap();
        assert_eq!(item_ids(outcome.items()), vec!["50", "40"]);
        assert_eq!(item_ids(&h.engine.items()), vec!["50", "40", "30", "20"]);
        assert_eq!(h.provider.requests()[1].cursor, Cursor::min("30", Some(100)));

        let update = h.observer.last().unwrap();
        assert_eq!(update.kind, UpdateKind::Insert);
        assert_eq!(update.scroll_anchor, Some(ScrollAnchor::Item("30".into())));
    }

    #[tokio::test]
    async fn previous_page_on_empty_feed_refreshes() {
        let h = harness();
        h.provider.push_page(derived_page(&[3, 2, 1]));

        let outcome = h.engine.load_previous_page().await.unwrap();
        assert!(matches!(
            outcome,
            FetchOutcome::Merged {
                kind: UpdateKind::Replace,
                ..
            }
        ));
        assert!(matches!(h.provider.requests()[0].cursor, Cursor::Limit { .. }));
    }

    #[tokio::test]
    async fn latest_inserts_unread_block() {
        let h = seeded(&[30, 20, 10]).await;
        h.provider.push_page(derived_page(&[60, 50, 40, 30, 20]));

        let outcome = h.engine.load_latest(None).await.unwrap();
        assert_eq!(item_ids(outcome.items()), vec!["60", "50", "40"]);
        assert_eq!(h.engine.len(), 6);
        // Small block: contiguous, no marker
        assert_eq!(h.engine.gap(), None);

        let update = h.observer.last().unwrap();
        assert_eq!(update.kind, UpdateKind::Insert);
        assert_eq!(update.scroll_anchor, Some(ScrollAnchor::Item("30".into())));
    }

    #[tokio::test]
    async fn latest_large_block_gets_marker() {
        let h = seeded(&[10, 9]).await;
        let fresh: Vec<u64> = (100..130).rev().collect();
        h.provider.push_page(derived_page(&fresh));

        let outcome = h.engine.load_latest(None).await.unwrap();
        assert_eq!(outcome.items().len(), 20);
        assert_eq!(h.engine.gap(), Some(20));
        assert_eq!(h.engine.len(), 22);
        assert_eq!(h.engine.items()[0].unique_id(), "129");
        assert_eq!(h.engine.items()[19].unique_id(), "110");
    }

    #[tokio::test]
    async fn gap_fill_returns_items_left_out_of_full_block() {
        let h = seeded(&[10, 9]).await;
        let fresh: Vec<u64> = (10..=40).rev().collect();
        h.provider.push_page(derived_page(&fresh));

        h.engine.load_latest(None).await.unwrap();
        assert_eq!(h.engine.gap(), Some(20));
        assert_eq!(h.engine.items()[19].unique_id(), "21");

        let below: Vec<u64> = (11..=30).rev().collect();
        h.provider.push_page(derived_page(&below));
        let outcome = h.engine.fill_gap().await.unwrap();

        assert_eq!(outcome.items().len(), 10);
        assert_eq!(h.engine.gap(), None);
        let expected: Vec<String> = (9..=40).rev().map(|id: u64| id.to_string()).collect();
        assert_eq!(item_ids(&h.engine.items()), expected);
    }

    #[tokio::test]
    async fn latest_over_optimistic_limit_gets_marker() {
        let h = seeded(&[10, 9]).await;
        let fresh: Vec<u64> = (100..116).rev().collect();
        h.provider.push_page(derived_page(&fresh));

        h.engine.load_latest(None).await.unwrap();
        assert_eq!(h.engine.gap(), Some(16));
    }

    #[tokio::test]
    async fn latest_on_empty_feed_replaces() {
        let h = harness();
        h.provider.push_page(derived_page(&[2, 1]));

        let outcome = h.engine.load_latest(Some(5)).await.unwrap();
        assert!(outcome.is_merged());
        assert_eq!(h.observer.kinds(), vec![UpdateKind::Replace]);
    }

    #[tokio::test]
    async fn latest_below_threshold_leaves_state() {
        let h = seeded(&[30, 20]).await;
        h.provider.push_page(derived_page(&[32, 31, 30]));

        let outcome = h.engine.load_latest(Some(3)).await.unwrap();
        assert_eq!(
            outcome.skip_reason(),
            Some(SkipReason::BelowThreshold {
                found: 2,
                threshold: 3
            })
        );
        assert_eq!(h.engine.len(), 2);
        assert_eq!(h.observer.len(), 1);
    }

    #[tokio::test]
    async fn latest_does_not_show_loading() {
        let h = seeded(&[30]).await;
        h.provider.set_delay(std::time::Duration::from_millis(5));
        let engine = &h.engine;

        let observe_state = async {
            tokio::task::yield_now().await;
            engine.state()
        };
        let (_, state) = tokio::join!(engine.load_latest(None), observe_state);
        assert_eq!(state, FeedState::Success);
    }

    #[tokio::test]
    async fn fill_gap_inserts_below_marker() {
        let h = seeded(&[10, 9, 8]).await;
        let fresh: Vec<u64> = (100..120).rev().collect();
        h.provider.push_page(derived_page(&fresh));
        h.engine.load_latest(None).await.unwrap();
        assert_eq!(h.engine.gap(), Some(20));

        // Page starting above the anchor but not reaching the block
        h.provider.push_page(derived_page(&[40, 39, 38]));
        let outcome = h.engine.fill_gap().await.unwrap();
        assert_eq!(item_ids(outcome.items()), vec!["40", "39", "38"]);
        assert_eq!(h.engine.gap(), Some(20));
        assert_eq!(
            h.provider.requests().last().map(|r| r.cursor.clone()),
            Some(Cursor::min("10", Some(20)))
        );
        let items = h.engine.items();
        assert_eq!(items[20].unique_id(), "40");
        assert_eq!(items[23].unique_id(), "10");
    }

    #[tokio::test]
    async fn fill_gap_closes_when_block_reached() {
        let h = seeded(&[10, 9]).await;
        let fresh: Vec<u64> = (100..120).rev().collect();
        h.provider.push_page(derived_page(&fresh));
        h.engine.load_latest(None).await.unwrap();

        h.provider.push_page(derived_page(&[101, 100, 12, 11]));
        let outcome = h.engine.fill_gap().await.unwrap();
        assert_eq!(item_ids(outcome.items()), vec!["12", "11"]);
        assert_eq!(h.engine.gap(), None);
    }

    #[tokio::test]
    async fn fill_gap_with_nothing_new_removes_marker() {
        let h = seeded(&[10, 9]).await;
        let fresh: Vec<u64> = (100..120).rev().collect();
        h.provider.push_page(derived_page(&fresh));
        h.engine.load_latest(None).await.unwrap();

        h.provider.push_page(derived_page(&[100]));
        let outcome = h.engine.fill_gap().await.unwrap();
        assert!(outcome.items().is_empty());
        assert_eq!(h.engine.gap(), None);
        assert_eq!(h.observer.last().map(|u| u.kind), Some(UpdateKind::Remove));
    }

    #[tokio::test]
    async fn fill_gap_without_gap_is_noop() {
        let h = seeded(&[2, 1]).await;
        let outcome = h.engine.fill_gap().await.unwrap();
        assert_eq!(outcome.skip_reason(), Some(SkipReason::NoGap));
    }

    #[tokio::test]
    async fn cancelled_engine_discards_silently() {
        let h = seeded(&[2, 1]).await;
        h.engine.cancel();
        h.provider.push_page(derived_page(&[3]));

        let outcome = h.engine.load_previous_page().await.unwrap();
        assert_eq!(outcome.skip_reason(), Some(SkipReason::Cancelled));
        assert_eq!(h.engine.state(), FeedState::Success);
        assert_eq!(h.engine.stats().discarded_cancelled, 1);

        h.engine.reset_cancel();
        let outcome = h.engine.load_previous_page().await.unwrap();
        assert!(outcome.is_merged());
    }

    #[tokio::test]
    async fn stale_failure_is_discarded() {
        let h = seeded(&[2, 1]).await;
        let session = h.session.clone();
        h.provider.set_before_fetch(move |_| {
            session.advance();
        });
        h.provider.push_error(FetchError::retryable("reset"));

        let outcome = h.engine.load_next_page().await.unwrap();
        assert_eq!(outcome.skip_reason(), Some(SkipReason::StaleContext));
        assert_eq!(h.engine.state(), FeedState::Success);
    }

    #[tokio::test]
    async fn mixed_window_is_rejected() {
        let h = seeded(&[2, 1]).await;
        h.provider.push_page(link_page(&[4, 3], Some("3"), Some("4")));

        let err = h.engine.load_previous_page().await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert_eq!(h.engine.state(), FeedState::Success);
        assert_eq!(h.engine.len(), 2);
    }

    #[tokio::test]
    async fn link_feed_uses_window_cursors() {
        let feed = FeedDescriptor::new("bookmarks").with_pagination(PaginationStyle::Link);
        let h = harness_with(feed, SyncConfig::default());
        h.provider.push_page(link_page(&[9, 8], Some("8"), Some("9")));
        h.engine.refresh().await.unwrap();
        assert_eq!(h.provider.requests()[0].cursor, Cursor::Default);

        h.provider.push_page(link_page(&[7, 6], Some("6"), Some("7")));
        h.engine.load_next_page().await.unwrap();
        assert_eq!(
            h.provider.requests()[1].cursor,
            Cursor::upper_bound("8", Some(40))
        );
        assert_eq!(
            h.engine.window().and_then(|w| w.previous_cursor().cloned()),
            Some(Cursor::min("9", Some(40)))
        );
    }

    #[tokio::test]
    async fn replace_and_remove_notify() {
        let h = seeded(&[3, 2, 1]).await;

        assert!(h.engine.replace_item(TestItem::new(2).with_body("edited")));
        assert_eq!(h.engine.items()[1].body, "edited");
        assert!(!h.engine.replace_item(TestItem::new(7)));
        assert!(h.engine.remove_item("3"));
        assert!(!h.engine.remove_item("3"));
        assert_eq!(
            h.observer.kinds(),
            vec![UpdateKind::Replace, UpdateKind::None, UpdateKind::Remove]
        );
        assert_eq!(item_ids(&h.engine.items()), vec!["2", "1"]);
    }
}

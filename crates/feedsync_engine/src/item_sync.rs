//! Per-item refresh tasks.
//!
//! Hosts request a refresh of a single item (for example when it scrolls
//! into view) to pick up server-side edits or deletions. The registry keeps
//! at most one task per item id and belongs to a single engine; dropping it
//! cancels every outstanding task.

use crate::engine::SyncEngine;
use crate::error::FetchError;
use crate::poll::RateLimitMonitor;
use async_trait::async_trait;
use feedsync_protocol::FeedItem;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The server's view of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRefresh<T> {
    /// The item changed; this is the new copy.
    Updated(T),
    /// The item is unchanged.
    Unchanged,
    /// The item no longer exists.
    Removed,
}

/// Fetches the current server copy of an item.
#[async_trait]
pub trait ItemRefresher<T: FeedItem>: Send + Sync {
    /// Looks up the item with `id`.
    async fn refresh_item(&self, id: &str) -> Result<ItemRefresh<T>, FetchError>;
}

struct ItemTask {
    cancel: CancellationToken,
    generation: u64,
}

type TaskTable = Arc<Mutex<HashMap<String, ItemTask>>>;

/// Tracks in-flight per-item refresh tasks for one engine.
pub struct ItemSyncRegistry<T: FeedItem> {
    engine: Weak<SyncEngine<T>>,
    refresher: Arc<dyn ItemRefresher<T>>,
    rate_limit: Option<Arc<dyn RateLimitMonitor>>,
    tasks: TaskTable,
    root: CancellationToken,
    generation: AtomicU64,
}

impl<T: FeedItem> ItemSyncRegistry<T> {
    /// Creates a registry for `engine`.
    ///
    /// Tasks are children of the engine's cancellation token at the time of
    /// creation.
    pub fn new(engine: &Arc<SyncEngine<T>>, refresher: Arc<dyn ItemRefresher<T>>) -> Self {
        Self {
            engine: Arc::downgrade(engine),
            refresher,
            rate_limit: None,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            root: engine.cancellation_token().child_token(),
            generation: AtomicU64::new(0),
        }
    }

    /// Skips refreshes while `monitor` reports backpressure.
    pub fn with_rate_limit(mut self, monitor: Arc<dyn RateLimitMonitor>) -> Self {
        self.rate_limit = Some(monitor);
        self
    }

    /// Schedules a refresh of `id` after `delay`, replacing any task already
    /// scheduled for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request_sync(&self, id: impl Into<String>, delay: Duration) -> JoinHandle<()> {
        let id = id.into();
        let cancel = self.root.child_token();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(previous) = self.tasks.lock().insert(
            id.clone(),
            ItemTask {
                cancel: cancel.clone(),
                generation,
            },
        ) {
            previous.cancel.cancel();
        }

        let engine = self.engine.clone();
        let refresher = self.refresher.clone();
        let rate_limit = self.rate_limit.clone();
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(id = %id, "item sync cancelled");
                }
                _ = sync_item(&engine, refresher.as_ref(), rate_limit.as_deref(), &id, &cancel, delay) => {}
            }

            let mut tasks = tasks.lock();
            if tasks.get(&id).is_some_and(|task| task.generation == generation) {
                tasks.remove(&id);
            }
        })
    }

    /// Cancels the task for `id`. Returns false if none was scheduled.
    pub fn cancel(&self, id: &str) -> bool {
        match self.tasks.lock().remove(id) {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every task.
    pub fn cancel_all(&self) {
        for (_, task) in self.tasks.lock().drain() {
            task.cancel.cancel();
        }
    }

    /// Returns true if a task is scheduled for `id`.
    pub fn is_pending(&self, id: &str) -> bool {
        self.tasks.lock().contains_key(id)
    }

    /// Returns the number of scheduled tasks.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl<T: FeedItem> Drop for ItemSyncRegistry<T> {
    fn drop(&mut self) {
        self.root.cancel();
        self.tasks.lock().clear();
    }
}

async fn sync_item<T: FeedItem>(
    engine: &Weak<SyncEngine<T>>,
    refresher: &dyn ItemRefresher<T>,
    rate_limit: Option<&dyn RateLimitMonitor>,
    id: &str,
    cancel: &CancellationToken,
    delay: Duration,
) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if rate_limit.is_some_and(|monitor| monitor.is_near_limit()) {
        debug!(id, "near rate limit, skipping item sync");
        return;
    }

    let Some(token) = engine.upgrade().map(|engine| engine.current_session()) else {
        return;
    };
    let refresh = match refresher.refresh_item(id).await {
        Ok(refresh) => refresh,
        Err(err) => {
            warn!(id, error = %err, "item sync failed");
            return;
        }
    };

    let Some(engine) = engine.upgrade() else {
        return;
    };
    match engine.apply_item_refresh(token, cancel, id, refresh) {
        Ok(changed) => debug!(feed = %engine.feed(), id, changed, "item synced"),
        Err(reason) => debug!(feed = %engine.feed(), id, reason = ?reason, "discarded item sync"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::engine::SkipReason;
    use crate::feed::FeedDescriptor;
    use crate::provider::MockProvider;
    use crate::session::SessionGeneration;
    use feedsync_testkit::{derived_page, item_ids, TestItem};

    struct ScriptedRefresher {
        responses: Mutex<HashMap<String, ItemRefresh<TestItem>>>,
        on_call: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    }

    impl ScriptedRefresher {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                on_call: Mutex::new(None),
            }
        }

        fn respond(&self, id: &str, refresh: ItemRefresh<TestItem>) {
            self.responses.lock().insert(id.to_string(), refresh);
        }
    }

    #[async_trait]
    impl ItemRefresher<TestItem> for ScriptedRefresher {
        async fn refresh_item(&self, id: &str) -> Result<ItemRefresh<TestItem>, FetchError> {
            if let Some(hook) = self.on_call.lock().as_ref() {
                hook();
            }
            self.responses
                .lock()
                .get(id)
                .cloned()
                .ok_or_else(|| FetchError::fatal("not scripted"))
        }
    }

    async fn seeded(session: SessionGeneration) -> Arc<SyncEngine<TestItem>> {
        let provider = Arc::new(MockProvider::new());
        provider.push_page(derived_page(&[3, 2, 1]));
        let engine = Arc::new(
            SyncEngine::new(
                FeedDescriptor::new("home"),
                SyncConfig::default(),
                provider,
                Arc::new(session),
            )
            .unwrap(),
        );
        engine.refresh().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn applies_updates_and_removals() {
        let engine = seeded(SessionGeneration::new()).await;
        let refresher = Arc::new(ScriptedRefresher::new());
        refresher.respond("2", ItemRefresh::Updated(TestItem::new(2).with_body("edited")));
        refresher.respond("3", ItemRefresh::Removed);
        let registry = ItemSyncRegistry::new(&engine, refresher);

        registry.request_sync("2", Duration::ZERO).await.unwrap();
        registry.request_sync("3", Duration::ZERO).await.unwrap();

        assert_eq!(item_ids(&engine.items()), vec!["2", "1"]);
        assert_eq!(engine.items()[0].body, "edited");
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_apply() {
        let engine = seeded(SessionGeneration::new()).await;
        let refresher = Arc::new(ScriptedRefresher::new());
        refresher.respond("1", ItemRefresh::Removed);
        let registry = ItemSyncRegistry::new(&engine, refresher);

        let handle = registry.request_sync("1", Duration::from_secs(5));
        assert!(registry.is_pending("1"));
        assert!(registry.cancel("1"));
        assert!(!registry.cancel("1"));
        handle.await.unwrap();

        assert_eq!(engine.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn new_request_replaces_pending() {
        let engine = seeded(SessionGeneration::new()).await;
        let refresher = Arc::new(ScriptedRefresher::new());
        refresher.respond("1", ItemRefresh::Removed);
        let registry = ItemSyncRegistry::new(&engine, refresher);

        let first = registry.request_sync("1", Duration::from_secs(60));
        let second = registry.request_sync("1", Duration::from_secs(1));
        assert_eq!(registry.pending(), 1);

        first.await.unwrap();
        assert!(registry.is_pending("1"));
        second.await.unwrap();
        assert!(!registry.is_pending("1"));
        assert_eq!(engine.len(), 2);
    }

    #[tokio::test]
    async fn session_change_discards_refresh() {
        let session = SessionGeneration::new();
        let engine = seeded(session.clone()).await;
        let refresher = Arc::new(ScriptedRefresher::new());
        refresher.respond("1", ItemRefresh::Removed);
        *refresher.on_call.lock() = Some(Box::new(move || {
            session.advance();
        }));
        let registry = ItemSyncRegistry::new(&engine, refresher);

        registry.request_sync("1", Duration::ZERO).await.unwrap();
        assert_eq!(engine.len(), 3);
    }

    #[tokio::test]
    async fn rate_limit_skips_refresh() {
        let engine = seeded(SessionGeneration::new()).await;
        let refresher = Arc::new(ScriptedRefresher::new());
        refresher.respond("1", ItemRefresh::Removed);
        let flag = Arc::new(crate::poll::RateLimitFlag::new());
        flag.set(true);
        let registry = ItemSyncRegistry::new(&engine, refresher).with_rate_limit(flag);

        registry.request_sync("1", Duration::ZERO).await.unwrap();
        assert_eq!(engine.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_everything() {
        let engine = seeded(SessionGeneration::new()).await;
        let refresher = Arc::new(ScriptedRefresher::new());
        refresher.respond("1", ItemRefresh::Removed);
        refresher.respond("2", ItemRefresh::Removed);
        let registry = ItemSyncRegistry::new(&engine, refresher);

        let handles = vec![
            registry.request_sync("1", Duration::from_secs(5)),
            registry.request_sync("2", Duration::from_secs(5)),
        ];
        drop(registry);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(engine.len(), 3);
    }

    #[tokio::test]
    async fn cancelled_token_is_reported() {
        let engine = seeded(SessionGeneration::new()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine.apply_item_refresh(
            engine.current_session(),
            &cancel,
            "1",
            ItemRefresh::Removed,
        );
        assert_eq!(result, Err(SkipReason::Cancelled));
    }
}

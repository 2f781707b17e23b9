//! Filter pipeline applied to freshly fetched items.
//!
//! Predicates (muted authors, blocked authors, content filters) are owned by
//! the host and handed to the engine through a [`FilterProvider`]. The
//! provider is queried on every fetch, so changes to the host's mute or
//! block state take effect on the next page without touching the engine.

use crate::feed::FeedDescriptor;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// A predicate that excludes items from a feed.
pub trait ItemFilter<T>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Returns true if the item must be dropped.
    fn is_excluded(&self, item: &T) -> bool;
}

/// An [`ItemFilter`] backed by a closure.
pub struct FnFilter<T, F> {
    name: String,
    predicate: F,
    _item: PhantomData<fn(&T)>,
}

impl<T, F> FnFilter<T, F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    /// Creates a filter excluding items for which `predicate` returns true.
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
            _item: PhantomData,
        }
    }
}

impl<T, F> ItemFilter<T> for FnFilter<T, F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_excluded(&self, item: &T) -> bool {
        (self.predicate)(item)
    }
}

/// Supplies the active, ordered set of filters.
pub trait FilterProvider<T>: Send + Sync {
    /// Returns the filters to apply to the next batch.
    fn active_filters(&self) -> Vec<Arc<dyn ItemFilter<T>>>;
}

/// A mutable in-memory [`FilterProvider`].
pub struct FilterSet<T> {
    filters: RwLock<Vec<Arc<dyn ItemFilter<T>>>>,
}

impl<T> FilterSet<T> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            filters: RwLock::new(Vec::new()),
        }
    }

    /// Appends a filter.
    pub fn push(&self, filter: Arc<dyn ItemFilter<T>>) {
        self.filters.write().push(filter);
    }

    /// Removes every filter with this name.
    pub fn remove(&self, name: &str) {
        self.filters.write().retain(|filter| filter.name() != name);
    }

    /// Removes all filters.
    pub fn clear(&self) {
        self.filters.write().clear();
    }

    /// Returns the number of filters.
    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    /// Returns true if no filter is registered.
    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }
}

impl<T> Default for FilterSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FilterProvider<T> for FilterSet<T> {
    fn active_filters(&self) -> Vec<Arc<dyn ItemFilter<T>>> {
        self.filters.read().clone()
    }
}

/// Applies the provider's filters to remote feeds.
pub struct FilterPipeline<T> {
    provider: Option<Arc<dyn FilterProvider<T>>>,
}

impl<T> FilterPipeline<T> {
    /// Creates a pipeline backed by `provider`.
    pub fn new(provider: Arc<dyn FilterProvider<T>>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Creates a pipeline that passes everything through.
    pub fn disabled() -> Self {
        Self { provider: None }
    }

    /// Filters `items` for `feed`, preserving order.
    ///
    /// Feeds not marked remote are returned untouched.
    pub fn apply(&self, feed: &FeedDescriptor, items: Vec<T>) -> Vec<T> {
        let Some(provider) = self.provider.as_ref().filter(|_| feed.remote) else {
            return items;
        };
        let filters = provider.active_filters();
        if filters.is_empty() {
            return items;
        }

        let before = items.len();
        let kept: Vec<T> = items
            .into_iter()
            .filter(|item| !filters.iter().any(|filter| filter.is_excluded(item)))
            .collect();
        if kept.len() < before {
            debug!(
                feed = %feed,
                removed = before - kept.len(),
                filters = filters.len(),
                "filtered fetched items"
            );
        }
        kept
    }
}

impl<T> Default for FilterPipeline<T> {
    fn default() -> Self {
        Self::disabled()
    }
}

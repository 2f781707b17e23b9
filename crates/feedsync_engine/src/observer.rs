//! Observer notified after each committed merge.

use crate::feed::{FeedUpdate, UpdateKind};
use parking_lot::Mutex;

/// Receives feed updates.
///
/// Notifications are delivered while the engine's commit gate is held, in
/// commit order. Implementations must not call back into the engine's
/// mutating operations from inside the callback.
pub trait FeedObserver<T>: Send + Sync {
    /// Called once per committed merge.
    fn on_feed_updated(&self, update: &FeedUpdate<T>);
}

/// An observer that records every update, for tests and diagnostics.
pub struct RecordingObserver<T> {
    updates: Mutex<Vec<FeedUpdate<T>>>,
}

impl<T: Clone> RecordingObserver<T> {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
        }
    }

    /// Returns all recorded updates.
    pub fn updates(&self) -> Vec<FeedUpdate<T>> {
        self.updates.lock().clone()
    }

    /// Returns the kinds of all recorded updates, in order.
    pub fn kinds(&self) -> Vec<UpdateKind> {
        self.updates.lock().iter().map(|update| update.kind).collect()
    }

    /// Returns the most recent update.
    pub fn last(&self) -> Option<FeedUpdate<T>> {
        self.updates.lock().last().cloned()
    }

    /// Returns the number of recorded updates.
    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.updates.lock().is_empty()
    }
}

impl<T: Clone> Default for RecordingObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> FeedObserver<T> for RecordingObserver<T> {
    fn on_feed_updated(&self, update: &FeedUpdate<T>) {
        self.updates.lock().push(update.clone());
    }
}

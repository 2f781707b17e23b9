//! # Feedsync Engine
//!
//! Incremental synchronization of paginated remote feeds.
//!
//! This crate provides:
//! - A per-feed sync engine (refresh, next page, previous page, latest, gap fill)
//! - Deduplication and filtering of fetched items before merge
//! - An unattended polling loop with a retry budget and failure backoff
//! - Per-item refresh tasks tied to the engine's lifetime
//! - Provider traits for fetching, filtering, session identity and rate limits
//! - In-memory doubles for testing
//!
//! ## Architecture
//!
//! Fetches run concurrently; merges do not. Each operation captures the
//! active session and a cancellation token before it awaits the provider,
//! then re-checks both under a per-engine commit gate:
//! 1. Fetch a page through the [`FetchProvider`]
//! 2. Filter it through the [`FilterPipeline`] (remote feeds only)
//! 3. Drop items already held, by unique id
//! 4. Merge items and the pagination window into the [`FeedStore`]
//! 5. Notify the [`FeedObserver`]
//!
//! ## Key Invariants
//!
//! - The engine is the only writer of its feed's items, window and state
//! - A feed never holds two items with the same unique id
//! - Results from a previous session or a cancelled engine are discarded
//!   without touching the feed
//! - Only fetch failures put a feed into the error state
//! - Poll ticks never overlap

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod feed;
mod filter;
mod item_sync;
mod observer;
mod poll;
mod provider;
mod session;
mod store;

pub use config::{PollConfig, ReadDirection, SyncConfig};
pub use engine::{FetchOutcome, SkipReason, SyncEngine, SyncStats};
pub use error::{FetchError, SyncError, SyncResult};
pub use feed::{FeedDescriptor, FeedState, FeedUpdate, PaginationStyle, ScrollAnchor, UpdateKind};
pub use filter::{FilterPipeline, FilterProvider, FilterSet, FnFilter, ItemFilter};
pub use item_sync::{ItemRefresh, ItemRefresher, ItemSyncRegistry};
pub use observer::{FeedObserver, RecordingObserver};
pub use poll::{PollExit, PollScheduler, RateLimitFlag, RateLimitMonitor, TickOutcome};
pub use provider::{FetchProvider, FetchRequest, MockProvider};
pub use session::{SessionGeneration, SessionIdentity, SessionToken};
pub use store::{dedup, slice_above, slice_below, FeedStore};

pub use feedsync_protocol::{Cursor, FeedItem, FetchedPage, LimitClamp, PaginationWindow};

//! # Feedsync Testkit
//!
//! Test utilities for feedsync.
//!
//! This crate provides:
//! - A numeric-id test item and page builders
//! - An in-memory timeline that answers cursors like a remote source
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use feedsync_testkit::prelude::*;
//!
//! let timeline = Timeline::descending(100, 50);
//! let page = timeline.serve(&Cursor::limit(20), 20, false);
//! assert_eq!(page.len(), 20);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use feedsync_protocol::{Cursor, FeedItem, FetchedPage, PaginationWindow};
}

pub use fixtures::*;
pub use generators::*;

//! # feedsync protocol
//!
//! Pagination types shared by the feedsync engine and its fetch providers.
//!
//! This crate provides:
//! - `Cursor` for describing the next page request
//! - `ParameterSet` and `LimitClamp` for rendering cursors into query parameters
//! - `PaginationWindow` for tracking the extent of already-fetched content
//! - `FeedItem` and `FetchedPage` for the items a provider returns
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - Cursors are immutable once constructed
//! - Only cursors of the same kind are ordered against each other
//! - A feed uses exactly one window representation; mixing them is an error
//! - A link window never shrinks when merged with a narrower response

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod error;
mod item;
mod window;

pub use cursor::{numeric_id, Cursor, CursorKind, LimitClamp, Parameter, ParameterSet};
pub use error::{ProtocolError, ProtocolResult};
pub use item::{FeedItem, FetchedPage};
pub use window::{LinkPagination, PaginationWindow, WindowKind};

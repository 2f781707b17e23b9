//! Session identity used to detect stale fetch results.
//!
//! The engine captures a [`SessionToken`] before every fetch and compares it
//! with the current token before committing. Any change in between means the
//! active account switched and the result belongs to the previous one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An opaque identity of the active account or session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(pub u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Exposes the currently active session.
pub trait SessionIdentity: Send + Sync {
    /// Returns the token of the active session.
    fn current(&self) -> SessionToken;
}

/// A session identity driven by a generation counter.
///
/// Clones share the same counter; the host calls [`advance`](Self::advance)
/// whenever the active account changes.
#[derive(Debug, Clone, Default)]
pub struct SessionGeneration {
    generation: Arc<AtomicU64>,
}

impl SessionGeneration {
    /// Creates a counter at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to a new generation and returns its token.
    pub fn advance(&self) -> SessionToken {
        SessionToken(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl SessionIdentity for SessionGeneration {
    fn current(&self) -> SessionToken {
        SessionToken(self.generation.load(Ordering::SeqCst))
    }
}

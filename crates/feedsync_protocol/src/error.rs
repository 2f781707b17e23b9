//! Error types for the pagination protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised by cursor and window operations.
///
/// Both variants indicate a caller bug rather than a runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A derived-range window was merged with a link window (or vice versa).
    #[error("cannot merge {incoming} window into {current} window")]
    IncompatibleVariant {
        /// Kind of the window being updated.
        current: String,
        /// Kind of the window being merged in.
        incoming: String,
    },

    /// Two cursors of different kinds were compared.
    #[error("cursors are not comparable: {left} vs {right}")]
    IncomparableCursors {
        /// Kind of the left-hand cursor.
        left: String,
        /// Kind of the right-hand cursor.
        right: String,
    },
}

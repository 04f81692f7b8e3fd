//! Error types for the protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
///
/// Decode failures are deliberately absent: the line codec resolves
/// them through its encoding fallback chain and never surfaces them
/// to the read loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Outgoing message exceeded the maximum line length.
    #[error("message too long: {actual} bytes (limit: {limit})")]
    MessageTooLong {
        /// Actual message length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },
}

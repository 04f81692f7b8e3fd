//! Unified error handling for the bot.
//!
//! Transient I/O and protocol failures are handled inside the
//! connection loop (reconnect, never crash); errors that reach the
//! caller of [`crate::conn::Bot::run`] are the fatal startup class.

use thiserror::Error;

/// Convenience type alias for Results using [`BotError`].
pub type Result<T, E = BotError> = std::result::Result<T, E>;

/// Top-level bot errors.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("database error: {0}")]
    Db(#[from] crate::db::DbError),

    #[error("protocol error: {0}")]
    Protocol(#[from] magpie_proto::ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The outgoing queue's receiving end is gone; the connection is dead.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid server name for TLS: {0}")]
    InvalidServerName(String),
}

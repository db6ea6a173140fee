//! Error types for server and client operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::channel::ChannelKind;

/// Error type for server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Another process is already listening on the channel.
    #[error("channel {channel} is already in use at '{}'", .path.display())]
    ChannelInUse {
        /// Channel that failed to bind.
        channel: ChannelKind,
        /// Socket path.
        path: PathBuf,
    },

    /// Something other than a socket occupies the channel path.
    #[error("channel {channel} path '{}' exists and is not a socket", .path.display())]
    NotASocket {
        /// Channel that failed to bind.
        channel: ChannelKind,
        /// Socket path.
        path: PathBuf,
    },

    /// Binding the channel socket failed.
    #[error("failed to bind channel {channel} at '{}': {source}", .path.display())]
    Bind {
        /// Channel that failed to bind.
        channel: ChannelKind,
        /// Socket path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// No channel could be bound.
    #[error("no channel could be bound")]
    NoChannels,

    /// Worker pool settings are unusable.
    #[error("invalid worker pool size: min {min}, max {max}")]
    PoolSize {
        /// Minimum concurrency.
        min: usize,
        /// Maximum concurrency.
        max: usize,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error terminating a single connection handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Peer closed the connection before sending a request.
    #[error("connection closed before a request was received")]
    ClosedEarly,

    /// Request line exceeded the configured limit.
    #[error("request line exceeds {limit} bytes")]
    LineTooLong {
        /// Maximum line length in bytes.
        limit: usize,
    },

    /// Peer did not send a full request in time.
    #[error("no request received within {0:?}")]
    Timeout(Duration),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for client sessions.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Channel endpoint unreachable.
    #[error("cannot connect to channel {channel} at '{}': {source}", .path.display())]
    Connect {
        /// Channel the session targeted.
        channel: ChannelKind,
        /// Socket path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Request text spans more than one line.
    #[error("request must be a single line")]
    MultiLineRequest,

    /// Server closed the connection without a response line.
    #[error("connection closed")]
    ConnectionClosed,

    /// No response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

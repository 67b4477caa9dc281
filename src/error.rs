//! Error types for the chat server
//!
//! Defines server-level startup errors, send-handle errors, and room
//! admission errors. Uses thiserror for ergonomic error definitions.
//! Peer I/O failures on an established session are not modeled here: the
//! session worker treats them as disconnects, and business-level
//! rejections are reported to the peer as protocol lines.

use thiserror::Error;

/// Server-level errors
///
/// Fatal failures at startup: these abort the process rather than any one
/// session.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the listener path (socket setup, bind, listen)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The event log file could not be opened
    #[error("Failed to open log file: {0}")]
    LogOpen(std::io::Error),
}

/// Message send errors
///
/// Occurs when attempting to send through a closed outbound channel
/// (the peer's writer task is gone).
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Room admission errors
///
/// Rejections raised by the room registry when a join cannot be honored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    /// All room slots are in use and the named room does not exist
    #[error("No room slot available")]
    NoSlot,

    /// The room already holds the maximum number of members
    #[error("Room is full")]
    Full,
}

//! Event log sink
//!
//! Receives structured events from every component and appends them to the
//! server log file, one line per event:
//!
//! ```text
//! YYYY-MM-DD HH:MM:SS - [TAG] free-form message
//! ```
//!
//! The file handle sits behind its own mutex so concurrent records never
//! interleave within a line. The lock is a leaf: nothing else is acquired
//! while it is held.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Local;
use parking_lot::Mutex;

use crate::error::AppError;

/// Default log file, appended to in the working directory.
pub const DEFAULT_LOG_PATH: &str = "server.log";

/// Event classification tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTag {
    Login,
    Rejected,
    Join,
    Leave,
    Broadcast,
    Whisper,
    FileQueue,
    SendFile,
    Disconnect,
    Shutdown,
    Error,
    Server,
}

impl std::fmt::Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            EventTag::Login => "LOGIN",
            EventTag::Rejected => "REJECTED",
            EventTag::Join => "JOIN",
            EventTag::Leave => "LEAVE",
            EventTag::Broadcast => "BROADCAST",
            EventTag::Whisper => "WHISPER",
            EventTag::FileQueue => "FILE-QUEUE",
            EventTag::SendFile => "SEND FILE",
            EventTag::Disconnect => "DISCONNECT",
            EventTag::Shutdown => "SHUTDOWN",
            EventTag::Error => "ERROR",
            EventTag::Server => "SERVER",
        };
        f.write_str(tag)
    }
}

/// Append-only event sink shared by all components
#[derive(Debug)]
pub struct EventLog {
    file: Mutex<File>,
}

impl EventLog {
    /// Open (or create) the log file in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(AppError::LogOpen)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one timestamped event record
    ///
    /// Write failures are swallowed: the event stream is diagnostics, and a
    /// failing sink must not take a session worker down with it.
    pub fn record(&self, tag: EventTag, message: impl AsRef<str>) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut file = self.file.lock();
        let _ = writeln!(file, "{} - [{}] {}", timestamp, tag, message.as_ref());
        let _ = file.flush();
    }
}

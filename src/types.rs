//! Basic type definitions and contract constants
//!
//! Provides the `SessionId` newtype, the server's fixed capacity limits,
//! and the validation rules for usernames, room names, and filenames.

use uuid::Uuid;

/// Maximum number of concurrently connected sessions.
pub const MAX_SESSIONS: usize = 15;

/// Maximum number of concurrently active rooms.
pub const MAX_ROOMS: usize = 10;

/// Maximum username length in characters.
pub const MAX_USERNAME_LEN: usize = 16;

/// Maximum room name length in characters.
pub const MAX_ROOM_NAME_LEN: usize = 32;

/// Maximum filename length in bytes for a file transfer.
pub const MAX_FILENAME_LEN: usize = 255;

/// Maximum size of a transferred file (3 MiB).
pub const MAX_FILE_SIZE: u64 = 3 * 1024 * 1024;

/// Capacity of the bounded upload queue.
pub const UPLOAD_QUEUE_CAPACITY: usize = 5;

/// File extensions accepted by `/sendfile`.
pub const ALLOWED_EXTENSIONS: [&str; 4] = [".txt", ".pdf", ".jpg", ".png"];

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe session identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a username: 1..=16 ASCII alphanumeric characters.
pub fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validate a room name: 1..=32 ASCII alphanumeric characters.
pub fn valid_room_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ROOM_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validate a transfer filename.
///
/// Requires at least one character before the dot, a length within the
/// 255-byte limit, and an extension from the allow-list.
pub fn valid_filename(filename: &str) -> bool {
    if filename.len() < 5 || filename.len() > MAX_FILENAME_LEN {
        return false;
    }
    ALLOWED_EXTENSIONS.iter().any(|ext| filename.ends_with(ext))
}

//! Command line parsing
//!
//! Turns one LF-stripped input line into a `Command`. The grammar is
//! space-delimited: `/leave` and `/exit` match exactly, argument-taking
//! commands require the space after the command word, and anything else is
//! an unknown command.

/// A parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join or create the named room
    Join(String),
    /// Leave the current room
    Leave,
    /// Fan a message out to the current room
    Broadcast(String),
    /// Direct message to one user
    Whisper { target: String, message: String },
    /// Queue a file transfer to one user
    SendFile { path: String, target: String },
    /// End the session
    Exit,
}

/// Reasons a line failed to parse into a `Command`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// `/whisper` without a message after the target
    WhisperUsage,
    /// `/sendfile` without exactly a path and a target
    SendFileUsage,
    /// Not a recognized command shape
    Unknown,
}

impl Command {
    /// Parse one input line (already stripped of its terminator)
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        if line == "/leave" {
            return Ok(Command::Leave);
        }
        if line == "/exit" {
            return Ok(Command::Exit);
        }
        if let Some(rest) = line.strip_prefix("/join ") {
            // First whitespace token; empty names are caught by validation.
            let room = rest.split_whitespace().next().unwrap_or("").to_string();
            return Ok(Command::Join(room));
        }
        if let Some(rest) = line.strip_prefix("/broadcast ") {
            return Ok(Command::Broadcast(rest.to_string()));
        }
        if let Some(rest) = line.strip_prefix("/whisper ") {
            return match rest.split_once(' ') {
                Some((target, message)) => Ok(Command::Whisper {
                    target: target.to_string(),
                    message: message.to_string(),
                }),
                None => Err(ParseError::WhisperUsage),
            };
        }
        if let Some(rest) = line.strip_prefix("/sendfile ") {
            let mut parts = rest.split_whitespace();
            return match (parts.next(), parts.next(), parts.next()) {
                (Some(path), Some(target), None) => Ok(Command::SendFile {
                    path: path.to_string(),
                    target: target.to_string(),
                }),
                _ => Err(ParseError::SendFileUsage),
            };
        }
        Err(ParseError::Unknown)
    }
}

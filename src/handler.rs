//! Per-connection session worker
//!
//! Owns one client connection and drives its state machine:
//! Naming (username registration loop) -> Active (command loop) ->
//! Terminated (cleanup, exactly once). The socket is split; a dedicated
//! writer task drains the session's outbound channel, so everything here
//! only reads.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tracing::{debug, info};

use crate::command::{Command, ParseError};
use crate::eventlog::EventTag;
use crate::server::ServerState;
use crate::session::{write_outbound, Session};
use crate::types::valid_username;

const USERNAME_PROMPT: &str = "Enter username (max 16 chars, alphanumeric): ";
const COMMAND_SUMMARY: &str =
    "Commands: /join <room>, /leave, /broadcast <msg>, /whisper <user> <msg>, /sendfile <file> <user>, /exit\n";

/// Handle one accepted connection from registration to teardown
///
/// Holds the session-slot permit for the whole connection lifetime; the
/// slot frees when this task returns.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
    _slot: OwnedSemaphorePermit,
) {
    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(write_half, outbound_rx));

    let mut session = Session::new(addr, outbound_tx);
    let mut reader = BufReader::new(read_half);
    debug!("session {} connected from {}", session.id, addr);

    if naming(&mut reader, &mut session, &state).await {
        state.log.record(
            EventTag::Login,
            format!("user '{}' connected from {}", session.display_name(), addr.ip()),
        );
        info!("new client registered: {} from {}", session.display_name(), addr);
        let _ = session.send("[SUCCESS] Connected to chat server!\n");
        let _ = session.send(COMMAND_SUMMARY);

        active(&mut reader, &mut session, &state).await;
    }

    terminate(&state, &mut session).await;

    // Dropping the session drops the last outbound sender; the writer task
    // flushes what is queued and closes the stream. Registry removal has
    // already happened, so nothing can dispatch to this session anymore.
    drop(session);
    let _ = writer.await;
}

/// Naming state: prompt until a valid, unique username is registered
///
/// Returns `false` if the peer goes away before registering.
async fn naming<R>(reader: &mut R, session: &mut Session, state: &ServerState) -> bool
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        if session.send(USERNAME_PROMPT).is_err() {
            return false;
        }

        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => return false,
            Ok(_) => {}
            Err(e) => {
                debug!("read failed during naming: {}", e);
                return false;
            }
        }
        let name = strip_line_ending(&line);

        if !valid_username(name) {
            let _ = session.send("[ERROR] Invalid username. Use alphanumeric characters only.\n");
            continue;
        }

        // Commit the name before building the registry handle so the handle
        // carries it; rolled back if the registration loses the race.
        session.username = Some(name.to_string());
        if !state.users.insert_if_absent(name, session.handle()).await {
            session.username = None;
            let _ = session.send("[ERROR] Username already taken. Choose another.\n");
            state.log.record(
                EventTag::Rejected,
                format!("Duplicate username attempted: {}", name),
            );
            continue;
        }

        return true;
    }
}

/// Active state: read and dispatch one command line per iteration
async fn active<R>(reader: &mut R, session: &mut Session, state: &ServerState)
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("read failed for '{}': {}", session.display_name(), e);
                break;
            }
        }
        let input = strip_line_ending(&line);
        if input.is_empty() {
            continue;
        }

        match Command::parse(input) {
            Ok(Command::Join(room)) => state.handle_join(session, &room).await,
            Ok(Command::Leave) => state.handle_leave(session).await,
            Ok(Command::Broadcast(msg)) => state.handle_broadcast(session, &msg).await,
            Ok(Command::Whisper { target, message }) => {
                state.handle_whisper(session, &target, &message).await
            }
            Ok(Command::SendFile { path, target }) => {
                state.handle_sendfile(session, &path, &target).await
            }
            Ok(Command::Exit) => {
                let _ = session.send("[INFO] Goodbye!\n");
                break;
            }
            Err(ParseError::WhisperUsage) => {
                let _ = session.send("[ERROR] Usage: /whisper <username> <message>\n");
            }
            Err(ParseError::SendFileUsage) => {
                let _ = session.send("[ERROR] Usage: /sendfile <filename> <username>\n");
            }
            Err(ParseError::Unknown) => {
                let _ = session.send("[ERROR] Unknown command. Type a valid command.\n");
            }
        }
    }
}

/// Terminated state: leave any room, drop the registration, log
///
/// Runs exactly once per session; registry removal precedes the stream
/// close performed by the writer task afterwards.
async fn terminate(state: &ServerState, session: &mut Session) {
    if session.current_room.is_some() {
        state.handle_leave(session).await;
    }

    if let Some(name) = session.username.take() {
        state.users.remove(&name).await;
        state.log.record(
            EventTag::Disconnect,
            format!("user '{}' lost connection. Cleaned up resources.", name),
        );
        info!("client {} disconnected", name);
    }
}

/// Strip one trailing LF, tolerating a CR before it
fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::EventLog;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn test_state() -> (Arc<ServerState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path().join("server.log")).unwrap();
        (
            ServerState::with_transfer_delay(log, Duration::from_millis(10)),
            dir,
        )
    }

    fn test_session() -> (Session, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new("127.0.0.1:0".parse().unwrap(), tx), rx)
    }

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending("alice\n"), "alice");
        assert_eq!(strip_line_ending("alice\r\n"), "alice");
        assert_eq!(strip_line_ending("alice"), "alice");
        assert_eq!(strip_line_ending("\n"), "");
    }

    #[tokio::test]
    async fn test_naming_accepts_valid_name() {
        let (state, _dir) = test_state();
        let (mut session, mut rx) = test_session();

        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(b"alice\n").await.unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        assert!(naming(&mut reader, &mut session, &state).await);

        assert_eq!(session.username.as_deref(), Some("alice"));
        assert!(state.users.lookup("alice").await.is_some());
        assert_eq!(rx.recv().await.unwrap(), USERNAME_PROMPT);
    }

    #[tokio::test]
    async fn test_naming_reprompts_on_invalid_name() {
        let (state, _dir) = test_state();
        let (mut session, mut rx) = test_session();

        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(b"not valid!\nalice\n").await.unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        assert!(naming(&mut reader, &mut session, &state).await);

        assert_eq!(rx.recv().await.unwrap(), USERNAME_PROMPT);
        assert_eq!(
            rx.recv().await.unwrap(),
            "[ERROR] Invalid username. Use alphanumeric characters only.\n"
        );
        assert_eq!(rx.recv().await.unwrap(), USERNAME_PROMPT);
        assert_eq!(session.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_naming_rejects_duplicate_then_registers() {
        let (state, dir) = test_state();

        let (other, _other_rx) = test_session();
        let mut other = other;
        other.username = Some("alice".to_string());
        assert!(state.users.insert_if_absent("alice", other.handle()).await);

        let (mut session, mut rx) = test_session();
        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(b"alice\nbob\n").await.unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        assert!(naming(&mut reader, &mut session, &state).await);

        assert_eq!(rx.recv().await.unwrap(), USERNAME_PROMPT);
        assert_eq!(
            rx.recv().await.unwrap(),
            "[ERROR] Username already taken. Choose another.\n"
        );
        assert_eq!(rx.recv().await.unwrap(), USERNAME_PROMPT);
        assert_eq!(session.username.as_deref(), Some("bob"));

        let log = std::fs::read_to_string(dir.path().join("server.log")).unwrap();
        assert!(log.contains("[REJECTED] Duplicate username attempted: alice"));
    }

    #[tokio::test]
    async fn test_naming_peer_close_returns_false() {
        let (state, _dir) = test_state();
        let (mut session, _rx) = test_session();

        let (client, server) = tokio::io::duplex(256);
        drop(client);

        let mut reader = BufReader::new(server);
        assert!(!naming(&mut reader, &mut session, &state).await);
        assert!(session.username.is_none());
        assert!(state.users.is_empty().await);
    }

    #[tokio::test]
    async fn test_active_exit_says_goodbye() {
        let (state, _dir) = test_state();
        let (session, mut rx) = test_session();
        let mut session = session;
        session.username = Some("alice".to_string());

        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(b"/exit\n").await.unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        active(&mut reader, &mut session, &state).await;

        assert_eq!(rx.recv().await.unwrap(), "[INFO] Goodbye!\n");
    }

    #[tokio::test]
    async fn test_active_unknown_command_and_empty_lines() {
        let (state, _dir) = test_state();
        let (session, mut rx) = test_session();
        let mut session = session;
        session.username = Some("alice".to_string());

        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(b"\n/frobnicate\n").await.unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        active(&mut reader, &mut session, &state).await;

        // The empty line produced no response at all.
        assert_eq!(
            rx.recv().await.unwrap(),
            "[ERROR] Unknown command. Type a valid command.\n"
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_active_usage_errors() {
        let (state, _dir) = test_state();
        let (session, mut rx) = test_session();
        let mut session = session;
        session.username = Some("alice".to_string());

        let (mut client, server) = tokio::io::duplex(256);
        client
            .write_all(b"/whisper bob\n/sendfile a.txt\n")
            .await
            .unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        active(&mut reader, &mut session, &state).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            "[ERROR] Usage: /whisper <username> <message>\n"
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            "[ERROR] Usage: /sendfile <filename> <username>\n"
        );
    }

    #[tokio::test]
    async fn test_terminate_cleans_registration_and_room() {
        let (state, dir) = test_state();
        let (session, mut rx) = test_session();
        let mut session = session;
        session.username = Some("alice".to_string());
        assert!(state.users.insert_if_absent("alice", session.handle()).await);
        state.handle_join(&mut session, "room1").await;
        rx.recv().await.unwrap();

        terminate(&state, &mut session).await;

        assert!(session.username.is_none());
        assert!(session.current_room.is_none());
        assert!(state.users.is_empty().await);
        assert!(!state.rooms.exists("room1").await);

        let log = std::fs::read_to_string(dir.path().join("server.log")).unwrap();
        assert!(log.contains("[LEAVE] user 'alice' left room 'room1'"));
        assert!(log.contains("[DISCONNECT] user 'alice' lost connection. Cleaned up resources."));
    }

    #[tokio::test]
    async fn test_terminate_unnamed_session_logs_nothing() {
        let (state, dir) = test_state();
        let (session, _rx) = test_session();
        let mut session = session;

        terminate(&state, &mut session).await;

        let log = std::fs::read_to_string(dir.path().join("server.log")).unwrap();
        assert!(log.is_empty());
    }
}

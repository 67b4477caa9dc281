//! Server state and engine
//!
//! `ServerState` owns the shared registries, the upload queue, the event
//! log sink, and the lifecycle flags; each session worker gets an `Arc` to
//! it. The command handlers here implement the Active-state operations and
//! speak the wire protocol verbatim. `Server` wraps the listening socket
//! and the accept loop.
//!
//! Locking discipline: the user and room registries have independent locks
//! and are never nested; fan-out sends under a registry lock go to channel
//! handles and cannot re-enter a registry; the queue mutex and the log
//! mutex are leaf locks.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{AppError, RoomError};
use crate::eventlog::{EventLog, EventTag};
use crate::handler::handle_connection;
use crate::registry::UserRegistry;
use crate::room::RoomRegistry;
use crate::session::Session;
use crate::types::{valid_filename, valid_room_name, MAX_FILE_SIZE, MAX_SESSIONS};
use crate::upload::{transfer_worker, FileTransfer, UploadQueue, DEFAULT_TRANSFER_DELAY};

/// Shared server context handed to every worker task
#[derive(Debug)]
pub struct ServerState {
    /// Username -> session handle mapping
    pub users: Arc<UserRegistry>,
    /// Room name -> member set mapping
    pub rooms: RoomRegistry,
    /// Bounded file-transfer queue
    pub uploads: Arc<UploadQueue>,
    /// Structured event sink
    pub log: Arc<EventLog>,
    /// Process-wide running flag; cleared on SIGINT
    running: Arc<AtomicBool>,
    /// Session-slot pool enforcing the connection cap
    session_slots: Arc<Semaphore>,
    /// Wakes the accept loop out of `accept` on shutdown
    shutdown_signal: Notify,
    /// Simulated transfer duration for the worker
    transfer_delay: Duration,
}

impl ServerState {
    /// Create server state with the contract's default transfer delay
    pub fn new(log: EventLog) -> Arc<Self> {
        Self::with_transfer_delay(log, DEFAULT_TRANSFER_DELAY)
    }

    /// Create server state with an explicit transfer delay
    pub fn with_transfer_delay(log: EventLog, transfer_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            users: Arc::new(UserRegistry::new()),
            rooms: RoomRegistry::new(),
            uploads: Arc::new(UploadQueue::default()),
            log: Arc::new(log),
            running: Arc::new(AtomicBool::new(true)),
            session_slots: Arc::new(Semaphore::new(MAX_SESSIONS)),
            shutdown_signal: Notify::new(),
            transfer_delay,
        })
    }

    /// Whether the server is still accepting work
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the single transfer worker task
    pub fn spawn_transfer_worker(&self) -> JoinHandle<()> {
        tokio::spawn(transfer_worker(
            Arc::clone(&self.uploads),
            Arc::clone(&self.users),
            Arc::clone(&self.log),
            Arc::clone(&self.running),
            self.transfer_delay,
        ))
    }

    /// Atomically reserve a session slot; `None` when the server is full
    pub(crate) fn try_acquire_session_slot(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.session_slots).try_acquire_owned().ok()
    }

    /// Graceful shutdown: notify every registered session, log the count,
    /// wake the transfer worker, and unblock the accept loop
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let count = self
            .users
            .notify_all("[SERVER] Server shutting down. Goodbye!\n")
            .await;
        self.log.record(
            EventTag::Shutdown,
            format!("SIGINT received. Disconnecting {} clients, saving logs.", count),
        );
        self.uploads.wake_consumer();
        self.shutdown_signal.notify_one();
        info!("shutting down, {} clients notified", count);
    }

    /// `/join <room>`: join or create the named room, leaving any current one
    pub async fn handle_join(&self, session: &mut Session, room_name: &str) {
        if !valid_room_name(room_name) {
            let _ = session.send("[ERROR] Invalid room name. Use alphanumeric characters only.\n");
            return;
        }

        // Leave current room if any
        if session.current_room.is_some() {
            self.handle_leave(session).await;
        }

        match self.rooms.join(room_name, session.handle()).await {
            Ok(()) => {
                session.current_room = Some(room_name.to_string());
                let _ = session.send(format!("[SUCCESS] Joined room '{}'\n", room_name));
                self.log.record(
                    EventTag::Join,
                    format!("user '{}' joined room '{}'", session.display_name(), room_name),
                );
                info!("{} joined room '{}'", session.display_name(), room_name);
            }
            Err(RoomError::NoSlot) => {
                let _ = session.send("[ERROR] Unable to join room.\n");
            }
            Err(RoomError::Full) => {
                let _ = session.send("[ERROR] Room is full.\n");
            }
        }
    }

    /// `/leave`: leave the current room, deactivating it if now empty
    pub async fn handle_leave(&self, session: &mut Session) {
        let Some(room_name) = session.current_room.take() else {
            let _ = session.send("[ERROR] You are not in any room.\n");
            return;
        };

        self.rooms.leave(&room_name, session.id).await;
        let _ = session.send(format!("[SUCCESS] Left room '{}'\n", room_name));
        self.log.record(
            EventTag::Leave,
            format!("user '{}' left room '{}'", session.display_name(), room_name),
        );
        debug!("{} left room '{}'", session.display_name(), room_name);
    }

    /// `/broadcast <msg>`: fan out to the current room
    pub async fn handle_broadcast(&self, session: &Session, msg: &str) {
        let Some(room_name) = session.current_room.as_deref() else {
            let _ = session.send("[ERROR] Join a room first.\n");
            return;
        };

        self.rooms
            .broadcast(room_name, session.id, session.display_name(), msg)
            .await;
        let _ = session.send("[SUCCESS] Message broadcasted.\n");
        self.log.record(
            EventTag::Broadcast,
            format!("user '{}': {}", session.display_name(), msg),
        );
    }

    /// `/whisper <user> <msg>`: direct message via the user registry
    pub async fn handle_whisper(&self, session: &Session, target: &str, msg: &str) {
        let Some(target_handle) = self.users.lookup(target).await else {
            let _ = session.send("[ERROR] User not found or offline.\n");
            return;
        };

        let _ = target_handle.send(format!(
            "[WHISPER from {}]: {}\n",
            session.display_name(),
            msg
        ));
        let _ = session.send("[SUCCESS] Whisper sent.\n");
        self.log.record(
            EventTag::Whisper,
            format!("{} to {}: {}", session.display_name(), target, msg),
        );
    }

    /// `/sendfile <path> <user>`: validate and enqueue a file transfer
    ///
    /// Producers reserve a queue slot non-blocking first; when the queue is
    /// full they are told so and then block until the worker drains a slot.
    pub async fn handle_sendfile(&self, session: &Session, path: &str, target: &str) {
        if !valid_filename(path) {
            let _ = session.send("[ERROR] Invalid file type. Allowed: .txt, .pdf, .jpg, .png\n");
            return;
        }

        if self.users.lookup(target).await.is_none() {
            let _ = session.send("[ERROR] Target user not found or offline.\n");
            return;
        }

        // Oversize enforcement needs a successful stat of a regular file.
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                let _ = session.send("[ERROR] File not found or unreadable.\n");
                return;
            }
        };
        if size > MAX_FILE_SIZE {
            let _ = session.send("[ERROR] File exceeds size limit (3MB).\n");
            self.log.record(
                EventTag::Error,
                format!(
                    "File '{}' from user '{}' exceeds size limit",
                    path,
                    session.display_name()
                ),
            );
            return;
        }

        let transfer = FileTransfer::new(path, session.display_name(), target, size);
        if self.uploads.try_reserve_slot() {
            let len = self.uploads.commit(transfer);
            let _ = session.send("[SUCCESS] File added to upload queue.\n");
            self.log.record(
                EventTag::FileQueue,
                format!(
                    "Upload '{}' from {} added to queue. Queue size: {}",
                    path,
                    session.display_name(),
                    len
                ),
            );
        } else {
            let _ = session.send("[INFO] Upload queue full. Waiting...\n");
            self.uploads.reserve_slot().await;
            let len = self.uploads.commit(transfer);
            let _ = session.send("[SUCCESS] File queued for upload.\n");
            self.log.record(
                EventTag::FileQueue,
                format!(
                    "Upload '{}' from {} added to queue after wait. Queue size: {}",
                    path,
                    session.display_name(),
                    len
                ),
            );
        }
    }
}

/// Listening socket plus accept loop
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind the TCP listener on the given port (all interfaces)
    ///
    /// Address reuse is enabled and the listen backlog equals the session
    /// cap, so overflow connections queue no deeper than the server would
    /// ever admit.
    pub async fn bind(port: u16, state: Arc<ServerState>) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(MAX_SESSIONS as i32)?;
        socket.set_nonblocking(true)?;
        let listener = TcpListener::from_std(socket.into())?;
        Ok(Self { listener, state })
    }

    /// Address the listener actually bound (useful with port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown
    ///
    /// Each accepted connection atomically reserves a session slot; with
    /// none free the peer gets a diagnostic and an immediate close. The
    /// shutdown notification unblocks a pending `accept`.
    pub async fn run(self) {
        let Server { listener, state } = self;
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, addr)) => {
                        debug!("new connection from {}", addr);
                        match state.try_acquire_session_slot() {
                            Some(slot) => {
                                let state = Arc::clone(&state);
                                tokio::spawn(handle_connection(stream, addr, state, slot));
                            }
                            None => reject_full(stream).await,
                        }
                    }
                    Err(e) => {
                        if state.is_running() {
                            error!("failed to accept connection: {}", e);
                        }
                    }
                },
                _ = state.shutdown_signal.notified() => break,
            }
        }
        info!("accept loop stopped");
    }
}

/// Turn away a connection that exceeds the session cap
async fn reject_full(mut stream: TcpStream) {
    let _ = stream
        .write_all(b"[ERROR] Server full. Try again later.\n")
        .await;
    let _ = stream.shutdown().await;
}

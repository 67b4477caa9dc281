//! Multi-user TCP Chat Server Library
//!
//! A line-oriented TCP chat server with named rooms, direct messages, and
//! asynchronous file transfers through a bounded upload queue.
//!
//! # Features
//! - Username registration with global uniqueness
//! - Named rooms created on demand, destroyed when emptied
//! - Room broadcast with best-effort fan-out
//! - One-to-one whispers
//! - Bounded file-transfer queue with producer backpressure
//! - Structured event log and graceful SIGINT shutdown
//!
//! # Architecture
//! One accept loop admits connections up to a fixed session cap and spawns
//! a worker task per connection. Workers drive a small state machine
//! (Naming -> Active -> Terminated) and dispatch commands against two
//! independently locked registries (users, rooms) owned by a shared
//! [`ServerState`]. Outbound delivery goes through a per-session channel
//! drained by a writer task, so registry fan-out never blocks on a socket.
//! A single transfer worker consumes the upload queue in commit order.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use chatroomd::{EventLog, Server, ServerState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = ServerState::new(EventLog::open("server.log")?);
//!     state.spawn_transfer_worker();
//!
//!     let server = Server::bind(9000, Arc::clone(&state)).await?;
//!     tokio::spawn({
//!         let state = Arc::clone(&state);
//!         async move {
//!             if tokio::signal::ctrl_c().await.is_ok() {
//!                 state.shutdown().await;
//!             }
//!         }
//!     });
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod error;
pub mod eventlog;
pub mod handler;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod types;
pub mod upload;

// Re-export main types for convenience
pub use command::{Command, ParseError};
pub use error::{AppError, RoomError, SendError};
pub use eventlog::{EventLog, EventTag};
pub use handler::handle_connection;
pub use registry::UserRegistry;
pub use room::{Room, RoomRegistry};
pub use server::{Server, ServerState};
pub use session::{Session, SessionHandle};
pub use types::SessionId;
pub use upload::{FileTransfer, UploadQueue};

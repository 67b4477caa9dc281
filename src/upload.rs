//! Bounded upload queue and transfer worker
//!
//! Classic bounded-buffer coordination: a `slots` semaphore counts free
//! capacity, an `items` semaphore counts queued transfers, and a mutex
//! guards the ring itself. Producers reserve a slot (non-blocking first,
//! then blocking when the queue is full), commit under the mutex, and post
//! an item. The single transfer worker is the only consumer; transfers
//! deliver strictly in commit order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::eventlog::{EventLog, EventTag};
use crate::registry::UserRegistry;
use crate::types::UPLOAD_QUEUE_CAPACITY;

/// Default simulated transfer duration.
///
/// Long enough that queue backpressure is externally observable when
/// producers outrun the single consumer.
pub const DEFAULT_TRANSFER_DELAY: Duration = Duration::from_secs(2);

/// One pending file transfer
#[derive(Debug, Clone)]
pub struct FileTransfer {
    /// Name of the file as given to `/sendfile`
    pub filename: String,
    /// Sender username
    pub sender: String,
    /// Receiver username
    pub receiver: String,
    /// Declared size in bytes (from a successful stat)
    pub size: u64,
    /// When the transfer was enqueued
    pub queued_at: SystemTime,
    /// Payload bytes; absent in the notification-only flow
    pub payload: Option<Vec<u8>>,
}

impl FileTransfer {
    /// Build a notification-only transfer record
    pub fn new(filename: &str, sender: &str, receiver: &str, size: u64) -> Self {
        Self {
            filename: filename.to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            size,
            queued_at: SystemTime::now(),
            payload: None,
        }
    }
}

/// Fixed-capacity FIFO of pending transfers
///
/// At rest, `free_slots() + pending() == capacity` and the ring length
/// equals `pending()`. The semaphores are authoritative; the ring length is
/// advisory (it feeds the queue-size log message).
#[derive(Debug)]
pub struct UploadQueue {
    slots: Semaphore,
    items: Semaphore,
    ring: Mutex<VecDeque<FileTransfer>>,
    capacity: usize,
}

impl UploadQueue {
    /// Create a queue with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Semaphore::new(capacity),
            items: Semaphore::new(0),
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserve a free slot without blocking; `false` when the queue is full
    pub fn try_reserve_slot(&self) -> bool {
        match self.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Reserve a free slot, blocking until the consumer drains one
    pub async fn reserve_slot(&self) {
        if let Ok(permit) = self.slots.acquire().await {
            permit.forget();
        }
    }

    /// Commit a transfer into a previously reserved slot
    ///
    /// Returns the queue length after the push, for logging.
    pub fn commit(&self, transfer: FileTransfer) -> usize {
        let len = {
            let mut ring = self.ring.lock();
            ring.push_back(transfer);
            ring.len()
        };
        self.items.add_permits(1);
        len
    }

    /// Consumer side: wait until an item (or a shutdown wake-up) is posted
    ///
    /// Returns `false` only if the semaphore is closed.
    pub async fn wait_item(&self) -> bool {
        match self.items.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Consumer side: pop the head transfer
    pub fn take_head(&self) -> Option<FileTransfer> {
        self.ring.lock().pop_front()
    }

    /// Consumer side: return a drained slot to the producers
    pub fn release_slot(&self) {
        self.slots.add_permits(1);
    }

    /// Post a sentinel item so a blocked consumer wakes and can observe
    /// shutdown
    pub fn wake_consumer(&self) {
        self.items.add_permits(1);
    }

    /// Current queue length
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    /// Whether the queue holds no transfers
    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// Free capacity according to the `slots` semaphore
    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Queued items according to the `items` semaphore
    pub fn pending(&self) -> usize {
        self.items.available_permits()
    }
}

impl Default for UploadQueue {
    fn default() -> Self {
        Self::new(UPLOAD_QUEUE_CAPACITY)
    }
}

/// Single consumer of the upload queue
///
/// Pops transfers in commit order, simulates the transfer duration, then
/// notifies the receiver if it is still online. Exits when the running flag
/// drops, after being woken by a sentinel item.
pub async fn transfer_worker(
    queue: Arc<UploadQueue>,
    users: Arc<UserRegistry>,
    log: Arc<EventLog>,
    running: Arc<AtomicBool>,
    delay: Duration,
) {
    info!("transfer worker started");
    loop {
        if !queue.wait_item().await {
            break;
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let Some(transfer) = queue.take_head() else {
            continue;
        };

        // Simulated transfer duration; keeps backpressure observable.
        tokio::time::sleep(delay).await;

        match users.lookup(&transfer.receiver).await {
            Some(receiver) => {
                let _ = receiver.send(format!(
                    "[FILE] Received '{}' from {} ({} bytes)\n",
                    transfer.filename, transfer.sender, transfer.size
                ));
                log.record(
                    EventTag::SendFile,
                    format!(
                        "'{}' sent from {} to {} (success)",
                        transfer.filename, transfer.sender, transfer.receiver
                    ),
                );
                debug!(
                    file = %transfer.filename,
                    to = %transfer.receiver,
                    "transfer delivered"
                );
            }
            None => {
                log.record(
                    EventTag::SendFile,
                    format!(
                        "'{}' from {} to {} (failed - user offline)",
                        transfer.filename, transfer.sender, transfer.receiver
                    ),
                );
            }
        }

        queue.release_slot();
    }
    info!("transfer worker stopped");
}

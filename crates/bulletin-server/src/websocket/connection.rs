//! Per-connection lifecycle state and bounded outbound queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bulletin_core::{Bulletin, ConnectionId};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Lifecycle of a connection.
///
/// `Connecting -> Open -> Draining -> Closed`, or `Open -> Closed` directly
/// on a transport error or missed heartbeat. No transition leaves `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport accepted, not yet registered.
    Connecting = 0,
    /// Registered; receives broadcasts.
    Open = 1,
    /// Flushing what is already queued; receives nothing new.
    Draining = 2,
    /// Terminal.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

/// Result of pushing a bulletin onto an outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended without loss.
    Queued,
    /// Appended after evicting the oldest entry, which is returned.
    Evicted(Arc<Bulletin>),
    /// The queue no longer accepts bulletins.
    Rejected,
}

#[derive(Default)]
struct QueueInner {
    items: VecDeque<Arc<Bulletin>>,
    /// No more pushes; remaining items may still be popped.
    finished: bool,
    /// No more pushes or pops; items were discarded.
    closed: bool,
}

/// Bounded FIFO of bulletins awaiting write, dropping the oldest on overflow.
///
/// `push` never waits. A single consumer awaits `pop`.
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    notify: Notify,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` bulletins (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            capacity: capacity.max(1),
            notify: Notify::new(),
        }
    }

    /// Append a bulletin, evicting the oldest entry when full.
    pub fn push(&self, bulletin: Arc<Bulletin>) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.finished || inner.closed {
                return PushOutcome::Rejected;
            }
            let evicted = if inner.items.len() >= self.capacity {
                inner.items.pop_front()
            } else {
                None
            };
            inner.items.push_back(bulletin);
            evicted.map_or(PushOutcome::Queued, PushOutcome::Evicted)
        };
        self.notify.notify_one();
        outcome
    }

    /// Take the next bulletin without waiting.
    pub fn try_pop(&self) -> Option<Arc<Bulletin>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.items.pop_front()
    }

    /// Wait for the next bulletin.
    ///
    /// Returns `None` once the queue is closed, or finished and empty.
    pub async fn pop(&self) -> Option<Arc<Bulletin>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if let Some(bulletin) = inner.items.pop_front() {
                    return Some(bulletin);
                }
                if inner.finished {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting pushes; already-queued bulletins can still be popped.
    pub fn finish(&self) {
        self.inner.lock().finished = true;
        self.notify.notify_one();
    }

    /// Stop accepting pushes and discard everything queued.
    ///
    /// Returns the number of discarded bulletins.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.finished = true;
            let n = inner.items.len();
            inner.items.clear();
            n
        };
        self.notify.notify_one();
        discarded
    }

    /// Number of queued bulletins.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Result of offering a bulletin to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Queued without loss.
    Delivered,
    /// Queued, but the oldest pending bulletin was evicted to make room.
    DeliveredWithEviction(Arc<Bulletin>),
    /// The connection is not open; nothing was queued.
    Skipped,
}

/// One client connection as seen by the registry and the broadcast engine.
pub struct Connection {
    /// Unique connection ID.
    pub id: ConnectionId,
    state: AtomicU8,
    queue: OutboundQueue,
    connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat tick.
    pub is_alive: AtomicBool,
    last_activity: Mutex<Instant>,
    dropped: AtomicU64,
    username: Mutex<Option<String>>,
}

impl Connection {
    /// Create a connection in `Connecting` with a queue of `capacity`.
    pub fn new(id: ConnectionId, capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            queue: OutboundQueue::new(capacity),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_activity: Mutex::new(now),
            dropped: AtomicU64::new(0),
            username: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the connection currently receives broadcasts.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Connecting -> Open`. Returns `false` from any other state.
    pub fn open(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Open)
    }

    /// `Open -> Draining`. Queued bulletins stay; new ones are refused.
    ///
    /// Returns `false` if the connection was not open.
    pub fn begin_draining(&self) -> bool {
        if self.transition(ConnectionState::Open, ConnectionState::Draining) {
            self.queue.finish();
            true
        } else {
            false
        }
    }

    /// Move to `Closed` from any state and discard the queue.
    ///
    /// Returns the previous state.
    pub fn close(&self) -> ConnectionState {
        let previous =
            ConnectionState::from_u8(self.state.swap(ConnectionState::Closed as u8, Ordering::AcqRel));
        let _ = self.queue.close();
        previous
    }

    /// Offer a bulletin. Never waits.
    pub fn enqueue(&self, bulletin: Arc<Bulletin>) -> EnqueueOutcome {
        if !self.is_open() {
            return EnqueueOutcome::Skipped;
        }
        match self.queue.push(bulletin) {
            PushOutcome::Queued => EnqueueOutcome::Delivered,
            PushOutcome::Evicted(old) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::DeliveredWithEviction(old)
            }
            PushOutcome::Rejected => EnqueueOutcome::Skipped,
        }
    }

    /// The outbound queue, consumed by the session writer.
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Total bulletins evicted from this connection's queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_activity.lock() = Instant::now();
    }

    /// Duration since the last inbound activity.
    pub fn last_activity_elapsed(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Roster name bound by `join`, if any.
    pub fn username(&self) -> Option<String> {
        self.username.lock().clone()
    }

    /// Bind a roster name, returning the one it replaces.
    pub fn set_username(&self, username: String) -> Option<String> {
        self.username.lock().replace(username)
    }

    /// Release the roster name.
    pub fn take_username(&self) -> Option<String> {
        self.username.lock().take()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .field("dropped", &self.drop_count())
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

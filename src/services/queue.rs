//! Shared priority queue feeding the worker pool.
//!
//! A min-heap over `(priority, sequence)`: lower priority values dequeue
//! first, and the monotonically increasing sequence keeps submission order
//! within a priority band (FIFO). Dequeue blocks with a timeout so workers
//! can observe the running flag; shutdown enqueues one sentinel per worker.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

/// What a worker pulls off the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItem {
    /// A job id to look up in the registry and execute.
    Job(Uuid),
    /// Shutdown sentinel; the dequeuing worker exits without requeueing.
    Shutdown,
}

/// Sentinels outrank every job so shutdown preempts queued work; the durable
/// mirror brings pending jobs back after restart.
const SHUTDOWN_PRIORITY: i32 = i32::MIN;

#[derive(Debug)]
struct Entry {
    priority: i32,
    sequence: u64,
    item: QueueItem,
}

impl Entry {
    fn key(&self) -> (i32, u64) {
        (self.priority, self.sequence)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the maximum; reverse so the smallest
        // (priority, sequence) pair surfaces first.
        other.key().cmp(&self.key())
    }
}

#[derive(Default)]
struct QueueInner {
    heap: BinaryHeap<Entry>,
    next_sequence: u64,
}

/// Min-priority queue with blocking dequeue and sentinel-based shutdown.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job, assigning the next sequence number atomically.
    /// Returns the assigned sequence.
    pub fn enqueue(&self, job_id: Uuid, priority: i32) -> u64 {
        let sequence = self.push(QueueItem::Job(job_id), priority);
        self.notify.notify_one();
        sequence
    }

    /// Enqueue one shutdown sentinel.
    pub fn enqueue_shutdown(&self) {
        self.push(QueueItem::Shutdown, SHUTDOWN_PRIORITY);
        self.notify.notify_one();
    }

    fn push(&self, item: QueueItem, priority: i32) -> u64 {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.heap.push(Entry {
            priority,
            sequence,
            item,
        });
        sequence
    }

    fn pop(&self) -> Option<QueueItem> {
        self.inner
            .lock()
            .expect("queue lock poisoned")
            .heap
            .pop()
            .map(|entry| entry.item)
    }

    /// Dequeue the next item, blocking up to `timeout`.
    ///
    /// Returns `None` on timeout; callers treat that as a retry-loop signal
    /// and re-check their shutdown flag.
    pub async fn dequeue(&self, timeout: Duration) -> Option<QueueItem> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            let notified = self.notify.notified();
            // An enqueue may have landed between the pop and registering the
            // waiter; re-check before sleeping.
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop();
            }
        }
    }

    /// Remove any unconsumed shutdown sentinels, e.g. after a worker exited
    /// on the running flag instead of its sentinel. Returns how many were
    /// swept.
    pub fn drain_shutdown(&self) -> usize {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let before = inner.heap.len();
        inner.heap.retain(|entry| entry.item != QueueItem::Shutdown);
        before - inner.heap.len()
    }

    /// Drop a queued job entry (cancellation). Returns whether an entry was
    /// removed.
    pub fn remove(&self, job_id: Uuid) -> bool {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let before = inner.heap.len();
        inner.heap.retain(|entry| entry.item != QueueItem::Job(job_id));
        inner.heap.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

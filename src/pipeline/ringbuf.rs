//! Bounded blocking ring buffer for the frame pipeline

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use thiserror::Error;

/// Smallest capacity that lets `peek_second` ever complete.
pub const MIN_CAPACITY: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue capacity {0} is too small (minimum {MIN_CAPACITY})")]
    CapacityTooSmall(usize),
}

/// Returned by every blocking call once the queue has been closed.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("frame queue closed")]
pub struct QueueClosed;

/// Items that expose the timestamp used by the peek operations.
pub trait Timestamped {
    fn timestamp(&self) -> u64;
}

struct State<T> {
    ring: HeapRb<T>,
    closed: bool,
}

#[derive(Default)]
struct Stats {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

/// Fixed-capacity FIFO shared between one producer and one consumer.
///
/// `enqueue` blocks while the queue is full, `dequeue` and the peeks block
/// until enough items are ready. `close` wakes every waiter; after that all
/// calls fail with [`QueueClosed`] and pending items are dropped with the queue.
pub struct FrameQueue<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
    stats: CachePadded<Stats>,
}

impl<T> FrameQueue<T> {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity < MIN_CAPACITY {
            return Err(QueueError::CapacityTooSmall(capacity));
        }

        Ok(Self {
            state: Mutex::new(State {
                ring: HeapRb::new(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            stats: CachePadded::new(Stats::default()),
        })
    }

    /// Producer: wait for a free slot and append at the tail.
    pub fn enqueue(&self, item: T) -> Result<(), QueueClosed> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueClosed);
            }
            if !state.ring.is_full() {
                break;
            }
            self.not_full.wait(&mut state);
        }

        // Fullness was checked under the same lock.
        let pushed = state.ring.try_push(item).is_ok();
        debug_assert!(pushed, "ring full after free-slot wait");
        if pushed {
            self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        }
        drop(state);

        // Peeks wait for different counts, so every waiter re-checks.
        self.not_empty.notify_all();
        Ok(())
    }

    /// Consumer: wait for an item and take the head.
    pub fn dequeue(&self) -> Result<T, QueueClosed> {
        let mut state = self.state.lock();
        self.wait_for_items(&mut state, 1)?;

        let item = state.ring.try_pop().ok_or(QueueClosed)?;
        self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
        drop(state);

        self.not_full.notify_one();
        Ok(item)
    }

    /// Wait until `index + 1` items are ready and read the item at `index`
    /// without removing it.
    pub fn peek_with<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> Result<R, QueueClosed> {
        let mut state = self.state.lock();
        self.wait_for_items(&mut state, index + 1)?;
        state.ring.iter().nth(index).map(f).ok_or(QueueClosed)
    }

    fn wait_for_items(
        &self,
        state: &mut parking_lot::MutexGuard<'_, State<T>>,
        count: usize,
    ) -> Result<(), QueueClosed> {
        loop {
            if state.closed {
                return Err(QueueClosed);
            }
            if state.ring.occupied_len() >= count {
                return Ok(());
            }
            self.not_empty.wait(state);
        }
    }

    /// Close the queue and release every blocked caller.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);

        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Items ready to dequeue.
    pub fn len(&self) -> usize {
        self.state.lock().ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free_slots(&self) -> usize {
        self.state.lock().ring.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (enqueued, dequeued) totals since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.enqueued.load(Ordering::Relaxed),
            self.stats.dequeued.load(Ordering::Relaxed),
        )
    }
}

impl<T: Timestamped> FrameQueue<T> {
    /// Timestamp of the head item, waiting for at least one item.
    pub fn peek_first(&self) -> Result<u64, QueueClosed> {
        self.peek_with(0, Timestamped::timestamp)
    }

    /// Timestamp of the item after the head, waiting for at least two items.
    pub fn peek_second(&self) -> Result<u64, QueueClosed> {
        self.peek_with(1, Timestamped::timestamp)
    }
}

pub mod ringbuf;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use ringbuf::{FrameQueue, QueueClosed, QueueError, Timestamped};

/// Shared cancellation flag between the capture owner and its producer thread.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

//! Property tests for the bounded frame queue.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use rtsp_capture::pipeline::{FrameQueue, Timestamped};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Stamped(u64);

impl Timestamped for Stamped {
    fn timestamp(&self) -> u64 {
        self.0
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Up to `capacity` items go in without blocking and come out in order.
    #[test]
    fn prop_fifo_within_capacity(
        capacity in 2usize..16,
        seed in prop::collection::vec(any::<u64>(), 0..16),
    ) {
        let items: Vec<u64> = seed.into_iter().take(capacity).collect();
        let queue = FrameQueue::new(capacity).unwrap();

        for &item in &items {
            queue.enqueue(Stamped(item)).unwrap();
        }
        prop_assert_eq!(queue.len(), items.len());
        prop_assert_eq!(queue.free_slots(), capacity - items.len());

        if items.len() >= 2 {
            prop_assert_eq!(queue.peek_first().unwrap(), items[0]);
            prop_assert_eq!(queue.peek_second().unwrap(), items[1]);
        }

        for &item in &items {
            prop_assert_eq!(queue.dequeue().unwrap(), Stamped(item));
        }
        prop_assert!(queue.is_empty());
    }

    /// A producer pushing more than `capacity` items never loses or reorders any.
    #[test]
    fn prop_fifo_across_threads(capacity in 2usize..8, count in 0u64..200) {
        let queue = Arc::new(FrameQueue::new(capacity).unwrap());

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..count {
                    queue.enqueue(Stamped(i)).unwrap();
                }
            })
        };

        for i in 0..count {
            prop_assert!(queue.len() <= capacity);
            prop_assert_eq!(queue.dequeue().unwrap(), Stamped(i));
        }
        producer.join().unwrap();

        let (enqueued, dequeued) = queue.stats();
        prop_assert_eq!(enqueued, count);
        prop_assert_eq!(dequeued, count);
    }
}

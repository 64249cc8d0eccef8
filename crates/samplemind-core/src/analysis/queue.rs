//! Bounded hand-off queue from the audio thread to the analysis worker
//!
//! # Backpressure
//!
//! The audio thread must never wait on the worker. When the queue is full,
//! the oldest queued block is evicted to make room for the newest one
//! (drop-oldest), so analysis falls behind gracefully under load while
//! audio throughput is unaffected.
//!
//! The queue keeps both ends of a bounded crossbeam channel. Because the
//! channel is MPMC, the producer side can evict from the front with a
//! non-blocking `try_recv` before retrying its `try_send`.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

use crate::types::AudioBlock;

/// What happened to a block handed to [`AnalysisQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Block queued without evicting anything
    Queued,
    /// Block queued after evicting this many older blocks
    DroppedOldest(usize),
    /// Block could not be queued (contention outlasted the retry bound)
    Rejected,
}

/// Bounded FIFO of audio blocks awaiting analysis
#[derive(Debug)]
pub struct AnalysisQueue {
    tx: Sender<AudioBlock>,
    rx: Receiver<AudioBlock>,
    capacity: usize,
}

impl AnalysisQueue {
    /// Create a queue holding at most `capacity` blocks (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = channel::bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Queue a block without blocking (audio thread)
    ///
    /// Evicts the oldest blocks if the queue is full.
    pub fn enqueue(&self, block: AudioBlock) -> EnqueueOutcome {
        let mut block = block;
        let mut evicted = 0usize;

        // With a single producer the second attempt always succeeds; the
        // bound only matters if several producers race for the last slot.
        for _ in 0..=self.capacity {
            match self.tx.try_send(block) {
                Ok(()) => {
                    return if evicted == 0 {
                        EnqueueOutcome::Queued
                    } else {
                        EnqueueOutcome::DroppedOldest(evicted)
                    };
                }
                Err(TrySendError::Full(returned)) => {
                    block = returned;
                    if self.rx.try_recv().is_ok() {
                        evicted += 1;
                    }
                }
                // Unreachable while we hold the receiver
                Err(TrySendError::Disconnected(_)) => return EnqueueOutcome::Rejected,
            }
        }
        EnqueueOutcome::Rejected
    }

    /// Take the oldest block if one is waiting
    pub fn try_dequeue(&self) -> Option<AudioBlock> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a block (worker)
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<AudioBlock> {
        match self.rx.recv_timeout(timeout) {
            Ok(block) => Some(block),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard every queued block, returning how many were dropped
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn tagged(tag: u64) -> AudioBlock {
        AudioBlock::mono(tag, vec![tag as f32; 4], 48000)
    }

    #[test]
    fn test_fifo_order() {
        let queue = AnalysisQueue::new(4);
        for tag in 1..=3 {
            assert_eq!(queue.enqueue(tagged(tag)), EnqueueOutcome::Queued);
        }
        let tags: Vec<u64> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|b| b.sequence())
            .collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let queue = AnalysisQueue::new(3);
        let mut dropped = 0;
        for tag in 1..=10 {
            match queue.enqueue(tagged(tag)) {
                EnqueueOutcome::Queued => {}
                EnqueueOutcome::DroppedOldest(n) => dropped += n,
                EnqueueOutcome::Rejected => panic!("single producer must never be rejected"),
            }
            assert!(queue.len() <= queue.capacity());
        }
        assert_eq!(dropped, 7);

        let tags: Vec<u64> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|b| b.sequence())
            .collect();
        assert_eq!(tags, vec![8, 9, 10]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let queue = AnalysisQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.enqueue(tagged(1));
        assert_eq!(queue.enqueue(tagged(2)), EnqueueOutcome::DroppedOldest(1));
        assert_eq!(queue.try_dequeue().map(|b| b.sequence()), Some(2));
    }

    #[test]
    fn test_drain() {
        let queue = AnalysisQueue::new(8);
        for tag in 0..5 {
            queue.enqueue(tagged(tag));
        }
        assert_eq!(queue.drain(), 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dequeue_timeout_is_bounded() {
        let queue = AnalysisQueue::new(2);
        let start = Instant::now();
        assert!(queue.dequeue_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_consumer_wakes_on_enqueue() {
        let queue = Arc::new(AnalysisQueue::new(2));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        queue.enqueue(tagged(42));
        let block = consumer.join().unwrap();
        assert_eq!(block.map(|b| b.sequence()), Some(42));
    }

    #[test]
    fn test_sustained_overload_respects_capacity() {
        let queue = Arc::new(AnalysisQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut last = None;
                let deadline = Instant::now() + Duration::from_secs(5);
                while Instant::now() < deadline {
                    if let Some(block) = queue.dequeue_timeout(Duration::from_millis(50)) {
                        // FIFO: sequences only ever increase
                        if let Some(prev) = last {
                            assert!(block.sequence() > prev);
                        }
                        last = Some(block.sequence());
                        if block.sequence() == 9_999 {
                            break;
                        }
                        thread::sleep(Duration::from_micros(200));
                    }
                }
                last
            })
        };

        for tag in 0..10_000 {
            queue.enqueue(tagged(tag));
            assert!(queue.len() <= 4);
        }

        assert_eq!(consumer.join().unwrap(), Some(9_999));
    }
}

//! Fixed-depth message queue.

use super::Timing;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Bounded FIFO of small messages over a `crossbeam_channel::bounded` pair.
///
/// `try_put` never blocks, so it may be used from callback context; a full
/// queue drops the message and reports it. The queue owns both ends, so the
/// channel never disconnects while it is alive.
#[derive(Debug)]
pub struct MessageQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> MessageQueue<T> {
    /// Create an empty queue holding at most `depth` messages (minimum one).
    pub fn new(depth: usize) -> Self {
        let (tx, rx) = bounded(depth.max(1));
        Self { tx, rx }
    }

    /// Enqueue without blocking. Returns false if the queue was full.
    pub fn try_put(&self, item: T) -> bool {
        self.tx.try_send(item).is_ok()
    }

    /// Dequeue the oldest message, waiting according to `timing`.
    pub fn get(&self, timing: Timing) -> Option<T> {
        match timing {
            Timing::Immediate => self.rx.try_recv().ok(),
            // recv_timeout falls back to an unbounded wait when the deadline
            // overflows.
            Timing::Bounded(d) => self.rx.recv_timeout(d).ok(),
            Timing::Forever => self.rx.recv().ok(),
        }
    }

    /// Drop every queued message.
    pub fn reset(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order_and_depth() {
        let q = MessageQueue::new(2);
        assert!(q.try_put(1u8));
        assert!(q.try_put(2u8));
        assert!(!q.try_put(3u8));
        assert_eq!(q.get(Timing::Immediate), Some(1));
        assert_eq!(q.get(Timing::Immediate), Some(2));
        assert_eq!(q.get(Timing::Immediate), None);
    }

    #[test]
    fn test_bounded_get_times_out() {
        let q: MessageQueue<u8> = MessageQueue::new(1);
        assert_eq!(q.get(Timing::Bounded(Duration::from_millis(15))), None);
    }

    #[test]
    fn test_put_from_other_thread_wakes_getter() {
        let q = Arc::new(MessageQueue::new(1));
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                assert!(q.try_put(7u32));
            })
        };
        assert_eq!(q.get(Timing::Bounded(Duration::MAX)), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn test_reset() {
        let q = MessageQueue::new(4);
        q.try_put('a');
        q.try_put('b');
        assert_eq!(q.len(), 2);
        q.reset();
        assert!(q.is_empty());
        assert!(q.try_put('c'));
    }

    #[test]
    fn test_zero_depth_rounds_up() {
        let q: MessageQueue<u8> = MessageQueue::new(0);
        assert_eq!(q.capacity(), 1);
    }
}

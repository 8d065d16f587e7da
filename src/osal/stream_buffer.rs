//! Bounded byte stream buffer.
//!
//! The basic flow-control primitive of the engine. Producers block (or not,
//! per [`Timing`]) when the ring is full, consumers when it is empty. The lock
//! guarding the ring is held only while bytes are copied, never across a wait.

use super::Timing;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

#[derive(Debug)]
struct Ring {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl Ring {
    fn free(&self) -> usize {
        self.capacity - self.bytes.len()
    }
}

/// Bounded byte ring with immediate, bounded and unbounded send/receive.
#[derive(Debug)]
pub struct StreamBuffer {
    ring: Mutex<Ring>,
    readable: Condvar,
    writable: Condvar,
}

impl StreamBuffer {
    /// Create an empty buffer holding at most `capacity` bytes.
    ///
    /// A zero capacity is rounded up to one byte.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                bytes: VecDeque::with_capacity(capacity),
                capacity,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Copy `data` into the buffer.
    ///
    /// Returns the number of bytes accepted. With [`Timing::Forever`] this is
    /// always `data.len()`; the other variants may return a short count when
    /// the ring stays full.
    pub fn send(&self, data: &[u8], timing: Timing) -> usize {
        let (timing, deadline) = timing.with_deadline();
        let mut sent = 0;
        let mut ring = self.ring.lock();
        loop {
            let n = ring.free().min(data.len() - sent);
            if n > 0 {
                ring.bytes.extend(&data[sent..sent + n]);
                sent += n;
                self.readable.notify_all();
            }
            if sent == data.len() {
                return sent;
            }
            match (timing, deadline) {
                (Timing::Immediate, _) => return sent,
                (Timing::Forever, _) => self.writable.wait(&mut ring),
                (Timing::Bounded(_), Some(deadline)) => {
                    if self.writable.wait_until(&mut ring, deadline).timed_out() {
                        let n = ring.free().min(data.len() - sent);
                        ring.bytes.extend(&data[sent..sent + n]);
                        if n > 0 {
                            self.readable.notify_all();
                        }
                        return sent + n;
                    }
                }
                (Timing::Bounded(_), None) => return sent,
            }
        }
    }

    /// Move up to `buffer.len()` bytes out of the buffer.
    ///
    /// Returns as soon as at least one byte is available; zero means the wait
    /// ended (or was not allowed) with the buffer still empty.
    pub fn receive(&self, buffer: &mut [u8], timing: Timing) -> usize {
        if buffer.is_empty() {
            return 0;
        }
        let (timing, deadline) = timing.with_deadline();
        let mut ring = self.ring.lock();
        while ring.bytes.is_empty() {
            match (timing, deadline) {
                (Timing::Immediate, _) | (Timing::Bounded(_), None) => return 0,
                (Timing::Forever, _) => self.readable.wait(&mut ring),
                (Timing::Bounded(_), Some(deadline)) => {
                    if self.readable.wait_until(&mut ring, deadline).timed_out()
                        && ring.bytes.is_empty()
                    {
                        return 0;
                    }
                }
            }
        }
        let n = buffer.len().min(ring.bytes.len());
        for (slot, byte) in buffer.iter_mut().zip(ring.bytes.drain(..n)) {
            *slot = byte;
        }
        self.writable.notify_all();
        n
    }

    /// Discard all buffered bytes and wake blocked senders.
    pub fn reset(&self) {
        let mut ring = self.ring.lock();
        ring.bytes.clear();
        self.writable.notify_all();
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.ring.lock().bytes.is_empty()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.ring.lock().bytes.len()
    }

    /// Free space in bytes.
    pub fn free(&self) -> usize {
        self.ring.lock().free()
    }

    /// Maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity
    }
}

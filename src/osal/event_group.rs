//! Event-bit group.
//!
//! Producers set bits with a single atomic `fetch_or`; the consumer blocks in
//! [`EventGroup::wait_any`] until one of the bits it cares about is raised.
//! Bits are independent and may coexist.

use super::Timing;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::sync::atomic::{AtomicU32, Ordering};

/// A set of event bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventBits(u32);

impl EventBits {
    /// No bits set.
    pub const NONE: EventBits = EventBits(0);

    /// Bit set from a raw mask.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw mask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is also set here.
    pub const fn contains(self, other: EventBits) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// True when at least one bit of `other` is set here.
    pub const fn intersects(self, other: EventBits) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventBits {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventBits {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventBits {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for EventBits {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for EventBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBits({:#06b})", self.0)
    }
}

/// Group of event bits with a blocking wait.
#[derive(Debug, Default)]
pub struct EventGroup {
    bits: AtomicU32,
    gate: Mutex<()>,
    raised: Condvar,
}

impl EventGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `bits`, returning the set as it was before.
    ///
    /// Never blocks on the consumer; safe to call from callback context.
    pub fn set(&self, bits: EventBits) -> EventBits {
        let previous = self.bits.fetch_or(bits.0, Ordering::AcqRel);
        // Taking the gate orders the notify after a waiter's check.
        let _gate = self.gate.lock();
        self.raised.notify_all();
        EventBits(previous)
    }

    /// Lower `bits`, returning the set as it was before.
    pub fn clear(&self, bits: EventBits) -> EventBits {
        EventBits(self.bits.fetch_and(!bits.0, Ordering::AcqRel))
    }

    /// Current bits, without consuming them.
    pub fn peek(&self) -> EventBits {
        EventBits(self.bits.load(Ordering::Acquire))
    }

    /// Wait until any bit of `mask` is set.
    ///
    /// Returns the subset of `mask` that was set, which is cleared from the
    /// group when `clear_on_exit` is true. An empty result means the wait
    /// timed out.
    pub fn wait_any(&self, mask: EventBits, clear_on_exit: bool, timing: Timing) -> EventBits {
        let (timing, deadline) = timing.with_deadline();
        let mut gate = self.gate.lock();
        loop {
            let hit = self.take(mask, clear_on_exit);
            if !hit.is_empty() {
                return hit;
            }
            match (timing, deadline) {
                (Timing::Immediate, _) | (Timing::Bounded(_), None) => return EventBits::NONE,
                (Timing::Forever, _) => self.raised.wait(&mut gate),
                (Timing::Bounded(_), Some(deadline)) => {
                    if self.raised.wait_until(&mut gate, deadline).timed_out() {
                        return self.take(mask, clear_on_exit);
                    }
                }
            }
        }
    }

    fn take(&self, mask: EventBits, clear: bool) -> EventBits {
        let current = if clear {
            self.bits.fetch_and(!mask.0, Ordering::AcqRel)
        } else {
            self.bits.load(Ordering::Acquire)
        };
        EventBits(current & mask.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const A: EventBits = EventBits::from_bits(1 << 0);
    const B: EventBits = EventBits::from_bits(1 << 1);
    const C: EventBits = EventBits::from_bits(1 << 2);

    #[test]
    fn test_set_and_wait_clears_only_mask() {
        let group = EventGroup::new();
        group.set(A | C);
        let got = group.wait_any(A | B, true, Timing::Immediate);
        assert_eq!(got, A);
        assert_eq!(group.peek(), C);
    }

    #[test]
    fn test_wait_without_clear() {
        let group = EventGroup::new();
        group.set(B);
        assert_eq!(group.wait_any(B, false, Timing::Immediate), B);
        assert_eq!(group.peek(), B);
    }

    #[test]
    fn test_wait_times_out_empty() {
        let group = EventGroup::new();
        let got = group.wait_any(A, true, Timing::Bounded(Duration::from_millis(20)));
        assert!(got.is_empty());
    }

    #[test]
    fn test_max_bound_waits_for_set() {
        let group = Arc::new(EventGroup::new());
        let waiter = {
            let group = group.clone();
            thread::spawn(move || group.wait_any(A, true, Timing::Bounded(Duration::MAX)))
        };
        thread::sleep(Duration::from_millis(10));
        group.set(A);
        assert_eq!(waiter.join().unwrap(), A);
    }

    #[test]
    fn test_cross_thread_wakeup() {
        let group = Arc::new(EventGroup::new());
        let waiter = {
            let group = group.clone();
            thread::spawn(move || group.wait_any(B, true, Timing::Forever))
        };
        thread::sleep(Duration::from_millis(10));
        group.set(B);
        assert_eq!(waiter.join().unwrap(), B);
        assert!(group.peek().is_empty());
    }

    #[test]
    fn test_set_returns_previous() {
        let group = EventGroup::new();
        assert!(group.set(A).is_empty());
        assert_eq!(group.set(B), A);
        assert!(group.peek().contains(A | B));
    }
}

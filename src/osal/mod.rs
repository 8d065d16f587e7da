//! Scheduling and synchronisation primitives.
//!
//! Host implementations of the objects the VCP engine is built from: a bounded
//! byte stream, an event-bit group, a fixed-depth message queue and a periodic
//! timer. Every blocking call takes a [`Timing`] so callers choose between a
//! non-blocking poll, a bounded wait and an unbounded wait.

pub mod event_group;
pub mod queue;
pub mod stream_buffer;
pub mod timer;

pub use event_group::{EventBits, EventGroup};
pub use queue::MessageQueue;
pub use stream_buffer::StreamBuffer;
pub use timer::PeriodicTimer;

use std::time::{Duration, Instant};

/// How long a send, receive or wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// Return at once with whatever could be done.
    Immediate,
    /// Block for at most the given duration.
    Bounded(Duration),
    /// Block until the operation can make progress.
    Forever,
}

impl Timing {
    /// Pair the timing with the absolute deadline of a bounded wait.
    ///
    /// A bound too large to express as an [`Instant`] waits forever.
    pub(crate) fn with_deadline(self) -> (Timing, Option<Instant>) {
        match self {
            Timing::Bounded(d) => match Instant::now().checked_add(d) {
                Some(at) => (self, Some(at)),
                None => (Timing::Forever, None),
            },
            other => (other, None),
        }
    }
}

impl From<Duration> for Timing {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timing::Immediate
        } else if Instant::now().checked_add(d).is_none() {
            Timing::Forever
        } else {
            Timing::Bounded(d)
        }
    }
}

//! Engine event bits and the hardware callback bridge.

use super::metrics::Metrics;
use crate::osal::{EventBits, EventGroup, MessageQueue, StreamBuffer};
use crate::port::LinkEvents;
use std::sync::Arc;

/// Inbound bytes may be waiting in the hardware.
pub const RX_PENDING: EventBits = EventBits::from_bits(1 << 0);
/// Outbound bytes are waiting in the physical TX buffer.
pub const TX_PENDING: EventBits = EventBits::from_bits(1 << 1);
/// A transfer failed; run the recovery action.
pub const ERROR: EventBits = EventBits::from_bits(1 << 2);
/// Inspection timer tick.
pub const INSPECT: EventBits = EventBits::from_bits(1 << 3);
/// Engine teardown; the worker returns the link and exits.
pub(crate) const SHUTDOWN: EventBits = EventBits::from_bits(1 << 7);

/// Every bit the worker dispatches on.
pub const ALL_EVENTS: EventBits = EventBits::from_bits(
    RX_PENDING.bits() | TX_PENDING.bits() | ERROR.bits() | INSPECT.bits(),
);

/// Transfer-completion handshake from the hardware callback to the TX drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    None,
    TxComplete,
    Error,
}

/// State shared between the engine handle, the worker and the callbacks.
#[derive(Debug)]
pub(crate) struct Shared {
    pub events: Arc<EventGroup>,
    pub completions: MessageQueue<Completion>,
    /// Physical buffer toward the hardware.
    pub tx: Arc<StreamBuffer>,
    /// Physical buffer from the hardware.
    pub rx: Arc<StreamBuffer>,
    pub metrics: Metrics,
}

impl Shared {
    pub fn new(tx_size: usize, rx_size: usize, queue_depth: usize) -> Self {
        Self {
            events: Arc::new(EventGroup::new()),
            completions: MessageQueue::new(queue_depth),
            tx: Arc::new(StreamBuffer::new(tx_size)),
            rx: Arc::new(StreamBuffer::new(rx_size)),
            metrics: Metrics::default(),
        }
    }
}

/// [`LinkEvents`] sink registered with the hardware on init.
///
/// RX-received and errors become event bits for the worker loop; TX-complete
/// and errors become completion messages for the blocked TX drain.
pub(crate) struct EngineEvents {
    shared: Arc<Shared>,
}

impl EngineEvents {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl LinkEvents for EngineEvents {
    fn rx_received(&self) {
        self.shared.events.set(RX_PENDING);
    }

    fn tx_complete(&self) {
        self.shared.completions.try_put(Completion::TxComplete);
    }

    fn transfer_error(&self) {
        self.shared.completions.try_put(Completion::Error);
        self.shared.events.set(ERROR);
    }
}

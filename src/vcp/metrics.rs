//! Link counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by the worker.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    pub bytes_to_link: AtomicU64,
    pub bytes_from_link: AtomicU64,
    pub tx_cycles: AtomicU64,
    pub tx_timeouts: AtomicU64,
    pub recoveries: AtomicU64,
    pub inspections: AtomicU64,
    pub inspect_rx_kicks: AtomicU64,
    pub inspect_tx_kicks: AtomicU64,
}

impl Metrics {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkMetrics {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        LinkMetrics {
            bytes_to_link: get(&self.bytes_to_link),
            bytes_from_link: get(&self.bytes_from_link),
            tx_cycles: get(&self.tx_cycles),
            tx_timeouts: get(&self.tx_timeouts),
            recoveries: get(&self.recoveries),
            inspections: get(&self.inspections),
            inspect_rx_kicks: get(&self.inspect_rx_kicks),
            inspect_tx_kicks: get(&self.inspect_tx_kicks),
        }
    }
}

/// Point-in-time copy of the engine's link counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetrics {
    /// Bytes handed to the hardware and acknowledged with TX-complete.
    pub bytes_to_link: u64,
    /// Bytes read from the hardware and forwarded to the RX buffer.
    pub bytes_from_link: u64,
    /// Completed TX-pending cycles.
    pub tx_cycles: u64,
    /// TX cycles abandoned because TX-complete never arrived.
    pub tx_timeouts: u64,
    /// Times the error recovery action ran.
    pub recoveries: u64,
    /// Inspection ticks handled.
    pub inspections: u64,
    /// Inspections that found unread hardware data.
    pub inspect_rx_kicks: u64,
    /// Inspections that found undrained TX data.
    pub inspect_tx_kicks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes() {
        let metrics = Metrics::default();
        Metrics::add(&metrics.bytes_to_link, 12);
        Metrics::bump(&metrics.recoveries);
        let snap = metrics.snapshot();
        assert_eq!(snap.bytes_to_link, 12);
        assert_eq!(snap.recoveries, 1);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["bytes_to_link"], 12);
    }
}

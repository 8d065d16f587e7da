//! Link worker.
//!
//! One thread owns the hardware. It sleeps on the engine's event group and,
//! for each raised bit, runs the matching handler: forward inbound bytes,
//! drain the TX buffer to the link, recover from an error, or inspect for
//! work a lost notification left behind.

use super::direction::TransmitGuard;
use super::events::{Completion, Shared, ALL_EVENTS, ERROR, INSPECT, RX_PENDING, SHUTDOWN, TX_PENDING};
use super::metrics::Metrics;
use crate::error::{VcpError, VcpResult};
use crate::osal::Timing;
use crate::port::ByteIo;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    HandlingRx = 1,
    HandlingTx = 2,
    HandlingError = 3,
    Inspecting = 4,
    Stopped = 5,
}

impl WorkerState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::HandlingRx,
            2 => Self::HandlingTx,
            3 => Self::HandlingError,
            4 => Self::Inspecting,
            5 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::HandlingRx => "rx",
            Self::HandlingTx => "tx",
            Self::HandlingError => "error",
            Self::Inspecting => "inspect",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Worker state readable from other threads.
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> WorkerState {
        WorkerState::from_raw(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

pub(crate) struct Worker {
    link: Box<dyn ByteIo>,
    shared: Arc<Shared>,
    state: Arc<StateCell>,
    staging: Box<[u8]>,
    tx_timeout: Duration,
}

impl Worker {
    pub fn new(
        link: Box<dyn ByteIo>,
        shared: Arc<Shared>,
        state: Arc<StateCell>,
        staging_size: usize,
        tx_timeout: Duration,
    ) -> Self {
        Self {
            link,
            shared,
            state,
            staging: vec![0u8; staging_size.max(1)].into_boxed_slice(),
            tx_timeout,
        }
    }

    /// Give up the link without running.
    pub fn into_link(self) -> Box<dyn ByteIo> {
        self.link
    }

    /// Serve events until shutdown, then hand the link back.
    pub fn run(mut self) -> Box<dyn ByteIo> {
        tracing::debug!(link = self.link.name(), "link worker started");
        loop {
            let bits = self
                .shared
                .events
                .wait_any(ALL_EVENTS | SHUTDOWN, true, Timing::Forever);
            if bits.contains(SHUTDOWN) {
                break;
            }
            self.dispatch(bits);
        }
        self.state.set(WorkerState::Stopped);
        tracing::debug!(link = self.link.name(), "link worker stopped");
        self.link
    }

    fn dispatch(&mut self, bits: crate::osal::EventBits) {
        if bits.contains(RX_PENDING) {
            self.state.set(WorkerState::HandlingRx);
            if let Err(e) = self.handle_rx() {
                tracing::warn!(link = self.link.name(), error = %e, "rx forwarding failed");
                self.shared.events.set(ERROR);
            }
        }
        if bits.contains(TX_PENDING) {
            self.state.set(WorkerState::HandlingTx);
            if let Err(e) = self.handle_tx() {
                tracing::warn!(link = self.link.name(), error = %e, "tx drain failed");
                self.shared.events.set(ERROR);
            }
        }
        if bits.contains(ERROR) {
            self.state.set(WorkerState::HandlingError);
            self.handle_error();
        }
        if bits.contains(INSPECT) {
            self.state.set(WorkerState::Inspecting);
            self.handle_inspect();
        }
        self.state.set(WorkerState::Idle);
    }

    /// Move everything the hardware holds into the RX buffer.
    pub(crate) fn handle_rx(&mut self) -> VcpResult<()> {
        loop {
            if self.shared.events.peek().contains(SHUTDOWN) {
                return Ok(());
            }
            let n = self.link.read(&mut self.staging)?;
            if n == 0 {
                return Ok(());
            }
            let sent = self.shared.rx.send(&self.staging[..n], Timing::Forever);
            Metrics::add(&self.shared.metrics.bytes_from_link, sent);
        }
    }

    /// Drain the TX buffer to the link, one staging-sized chunk at a time.
    ///
    /// Each chunk waits for its TX-complete before the next is taken. The
    /// link is in transmit mode for the whole drain and back in receive mode
    /// afterwards, whether the drain succeeded or not.
    pub(crate) fn handle_tx(&mut self) -> VcpResult<()> {
        let shared = &self.shared;
        let mut link = TransmitGuard::engage(&mut *self.link)?;
        loop {
            let n = shared.tx.receive(&mut self.staging, Timing::Immediate);
            if n == 0 {
                break;
            }
            shared.completions.reset();
            link.write(&self.staging[..n])?;
            match shared.completions.get(Timing::Bounded(self.tx_timeout)) {
                Some(Completion::TxComplete) => {
                    Metrics::add(&shared.metrics.bytes_to_link, n);
                }
                Some(other) => {
                    return Err(VcpError::port(format!("transfer ended with {other:?}")));
                }
                None => {
                    Metrics::bump(&shared.metrics.tx_timeouts);
                    return Err(VcpError::port(format!(
                        "no TX-complete within {:?}",
                        self.tx_timeout
                    )));
                }
            }
        }
        link.release()?;
        Metrics::bump(&shared.metrics.tx_cycles);
        Ok(())
    }

    /// Discard all in-flight state and return the link to receive mode.
    pub(crate) fn handle_error(&mut self) {
        self.shared.completions.reset();
        self.shared.tx.reset();
        self.shared.rx.reset();
        self.staging.fill(0);
        if let Err(e) = self.link.set_receive_mode() {
            tracing::warn!(link = self.link.name(), error = %e, "receive mode not restored after error");
        }
        Metrics::bump(&self.shared.metrics.recoveries);
        tracing::info!(link = self.link.name(), "link recovered from transfer error");
    }

    /// Raise RX or TX work that no callback announced.
    pub(crate) fn handle_inspect(&mut self) {
        let metrics = &self.shared.metrics;
        Metrics::bump(&metrics.inspections);
        match self.link.is_read_data_available() {
            Ok(true) => {
                Metrics::bump(&metrics.inspect_rx_kicks);
                self.shared.events.set(RX_PENDING);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(link = self.link.name(), error = %e, "inspection could not poll link");
                self.shared.events.set(ERROR);
            }
        }
        if !self.shared.tx.is_empty() {
            Metrics::bump(&metrics.inspect_tx_kicks);
            self.shared.events.set(TX_PENDING);
        }
    }
}

//! Mock byte-I/O backend for testing.
//!
//! `MockLink` stands in for a UART driver. Inbound bytes are injected by the
//! test, outbound writes are logged, and every direction switch is recorded so
//! half-duplex behaviour can be asserted after the fact.

use super::error::PortError;
use super::traits::{ByteIo, LinkEvents, LinkMode};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Inner state of the mock link, shared between clones.
#[derive(Default)]
struct MockLinkState {
    /// Whether `open` has been called (and `close` not yet).
    open: bool,
    /// Callback sink registered on `open`.
    events: Option<Arc<dyn LinkEvents>>,
    /// Bytes to be returned by read operations.
    rx_queue: VecDeque<u8>,
    /// Log of every write, one entry per call.
    write_log: Vec<Vec<u8>>,
    /// Current transceiver direction.
    mode: Option<LinkMode>,
    /// Every direction switch, in order.
    mode_history: Vec<LinkMode>,
    /// Writes issued while the transceiver was not in transmit mode.
    writes_in_receive_mode: usize,
    /// Echo every write back into the receive queue.
    loopback: bool,
    /// Suppress the TX-complete callback on writes.
    withhold_completion: bool,
    /// Number of upcoming writes that should fail.
    failing_writes: usize,
    /// Number of `open` calls that should fail.
    failing_opens: usize,
}

/// Mock half-duplex link.
///
/// # Example
/// ```
/// use serial_vcp::port::{ByteIo, LinkEvents, LinkMode, MockLink};
/// use std::sync::Arc;
///
/// struct Quiet;
/// impl LinkEvents for Quiet {
///     fn rx_received(&self) {}
///     fn tx_complete(&self) {}
///     fn transfer_error(&self) {}
/// }
///
/// let mut link = MockLink::new("MOCK0");
/// link.open(Arc::new(Quiet)).unwrap();
/// link.enqueue_rx(b"hello");
///
/// let mut buffer = [0u8; 8];
/// let n = link.read(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"hello");
///
/// link.set_transmit_mode().unwrap();
/// link.write(b"reply").unwrap();
/// link.set_receive_mode().unwrap();
///
/// assert_eq!(link.written(), b"reply");
/// assert_eq!(link.mode(), Some(LinkMode::Receive));
/// ```
#[derive(Clone)]
pub struct MockLink {
    name: String,
    state: Arc<Mutex<MockLinkState>>,
}

impl MockLink {
    /// Create a closed mock link.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockLinkState::default())),
        }
    }

    /// Create a mock link that echoes every write back as inbound data.
    pub fn loopback(name: impl Into<String>) -> Self {
        let link = Self::new(name);
        link.state.lock().loopback = true;
        link
    }

    /// Queue inbound bytes and raise the RX-received callback.
    pub fn inject_rx(&self, data: &[u8]) {
        let events = {
            let mut state = self.state.lock();
            state.rx_queue.extend(data);
            state.events.clone()
        };
        if let Some(events) = events {
            events.rx_received();
        }
    }

    /// Queue inbound bytes without raising any callback, as if the interrupt
    /// had been lost.
    pub fn enqueue_rx(&self, data: &[u8]) {
        self.state.lock().rx_queue.extend(data);
    }

    /// Raise the RX/TX-error callback.
    pub fn raise_error(&self) {
        let events = self.state.lock().events.clone();
        if let Some(events) = events {
            events.transfer_error();
        }
    }

    /// Stop (or resume) delivering TX-complete after writes.
    pub fn set_withhold_completion(&self, withhold: bool) {
        self.state.lock().withhold_completion = withhold;
    }

    /// Make the next `count` writes fail with an I/O error.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    /// Make the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.state.lock().failing_opens = count;
    }

    /// All bytes written so far, concatenated in order.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// One entry per write call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.state.lock().write_log.clear();
    }

    /// Current direction, `None` until the first switch.
    pub fn mode(&self) -> Option<LinkMode> {
        self.state.lock().mode
    }

    /// Every direction switch made so far.
    pub fn mode_history(&self) -> Vec<LinkMode> {
        self.state.lock().mode_history.clone()
    }

    /// Writes issued while not in transmit mode.
    pub fn writes_in_receive_mode(&self) -> usize {
        self.state.lock().writes_in_receive_mode
    }

    /// Whether the link is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Number of unread inbound bytes.
    pub fn pending_rx(&self) -> usize {
        self.state.lock().rx_queue.len()
    }

    fn switch(&self, mode: LinkMode) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        state.mode = Some(mode);
        state.mode_history.push(mode);
        Ok(())
    }
}

impl ByteIo for MockLink {
    fn open(&mut self, events: Arc<dyn LinkEvents>) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(PortError::not_found(self.name.clone()));
        }
        if state.open {
            return Err(PortError::AlreadyOpen);
        }
        state.open = true;
        state.events = Some(events);
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        state.open = false;
        state.events = None;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        let (events, complete, echo) = {
            let mut state = self.state.lock();
            if !state.open {
                return Err(PortError::NotOpen);
            }
            if state.failing_writes > 0 {
                state.failing_writes -= 1;
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "simulated write failure",
                )));
            }
            if state.mode != Some(LinkMode::Transmit) {
                state.writes_in_receive_mode += 1;
            }
            state.write_log.push(data.to_vec());
            if state.loopback {
                state.rx_queue.extend(data);
            }
            (
                state.events.clone(),
                !state.withhold_completion,
                state.loopback,
            )
        };

        if let Some(events) = events {
            if complete {
                events.tx_complete();
            }
            if echo {
                events.rx_received();
            }
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        let n = buffer.len().min(state.rx_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.rx_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_transmit_mode(&mut self) -> Result<(), PortError> {
        self.switch(LinkMode::Transmit)
    }

    fn set_receive_mode(&mut self) -> Result<(), PortError> {
        self.switch(LinkMode::Receive)
    }

    fn is_read_data_available(&self) -> Result<bool, PortError> {
        let state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        Ok(!state.rx_queue.is_empty())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("name", &self.name)
            .field("pending_rx", &self.pending_rx())
            .field("mode", &self.mode())
            .finish()
    }
}

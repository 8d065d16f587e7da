//! Core traits for the byte-I/O provider.
//!
//! [`ByteIo`] is the hardware contract the VCP worker drives. It is deliberately
//! narrow: byte transfers, a data-available probe and the two half-duplex
//! direction switches. Completion is reported out of band through
//! [`LinkEvents`], mirroring the interrupt callbacks of a UART driver.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Electrical direction of a half-duplex transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Driver disabled, receiver enabled. The resting state.
    Receive,
    /// Driver enabled for an outbound transfer.
    Transmit,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receive => write!(f, "receive"),
            Self::Transmit => write!(f, "transmit"),
        }
    }
}

/// Callback sink a backend raises from its interrupt-equivalent context.
///
/// Implementations must only signal: no blocking, no allocation, no logging.
pub trait LinkEvents: Send + Sync {
    /// New inbound bytes are waiting to be read.
    fn rx_received(&self);

    /// The last `write` has fully left the transmitter.
    fn tx_complete(&self);

    /// A transfer failed in either direction.
    fn transfer_error(&self);
}

/// Trait for byte-level access to one physical link.
///
/// Both real serial devices and the [`MockLink`](super::MockLink) implement
/// this, so the engine can be exercised without hardware.
pub trait ByteIo: Send + fmt::Debug {
    /// Open the link and register the callback sink.
    fn open(&mut self, events: Arc<dyn LinkEvents>) -> Result<(), PortError>;

    /// Close the link. Callbacks must not fire after this returns.
    fn close(&mut self) -> Result<(), PortError>;

    /// Start transmitting `data`.
    ///
    /// Completion is signalled through [`LinkEvents::tx_complete`]; a backend
    /// may raise it before this call returns.
    fn write(&mut self, data: &[u8]) -> Result<(), PortError>;

    /// Read whatever is pending into `buffer`.
    ///
    /// Returns the number of bytes stored; zero means nothing is pending.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Switch the transceiver to transmit mode.
    fn set_transmit_mode(&mut self) -> Result<(), PortError>;

    /// Switch the transceiver back to receive mode.
    fn set_receive_mode(&mut self) -> Result<(), PortError>;

    /// Whether unread inbound bytes are waiting.
    fn is_read_data_available(&self) -> Result<bool, PortError>;

    /// Name of the device, for logging.
    fn name(&self) -> &str;
}

impl ByteIo for Box<dyn ByteIo> {
    fn open(&mut self, events: Arc<dyn LinkEvents>) -> Result<(), PortError> {
        (**self).open(events)
    }

    fn close(&mut self) -> Result<(), PortError> {
        (**self).close()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        (**self).write(data)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        (**self).read(buffer)
    }

    fn set_transmit_mode(&mut self) -> Result<(), PortError> {
        (**self).set_transmit_mode()
    }

    fn set_receive_mode(&mut self) -> Result<(), PortError> {
        (**self).set_receive_mode()
    }

    fn is_read_data_available(&self) -> Result<bool, PortError> {
        (**self).is_read_data_available()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

//! Scoped transmit mode for half-duplex links.

use crate::port::{ByteIo, PortError};
use std::ops::{Deref, DerefMut};

/// Holds a link in transmit mode for the guard's lifetime.
///
/// Dropping the guard, on any exit path, switches the link back to receive
/// mode. [`TransmitGuard::release`] does the same but reports the outcome.
pub(crate) struct TransmitGuard<'a, L: ByteIo + ?Sized> {
    link: &'a mut L,
    released: bool,
}

impl<'a, L: ByteIo + ?Sized> TransmitGuard<'a, L> {
    pub fn engage(link: &'a mut L) -> Result<Self, PortError> {
        link.set_transmit_mode()?;
        Ok(Self {
            link,
            released: false,
        })
    }

    pub fn release(mut self) -> Result<(), PortError> {
        self.released = true;
        self.link.set_receive_mode()
    }
}

impl<L: ByteIo + ?Sized> Deref for TransmitGuard<'_, L> {
    type Target = L;
    fn deref(&self) -> &L {
        self.link
    }
}

impl<L: ByteIo + ?Sized> DerefMut for TransmitGuard<'_, L> {
    fn deref_mut(&mut self) -> &mut L {
        self.link
    }
}

impl<L: ByteIo + ?Sized> Drop for TransmitGuard<'_, L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.link.set_receive_mode() {
            tracing::warn!(link = self.link.name(), error = %e, "failed to restore receive mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{LinkEvents, LinkMode, MockLink};
    use std::sync::Arc;

    struct Quiet;
    impl LinkEvents for Quiet {
        fn rx_received(&self) {}
        fn tx_complete(&self) {}
        fn transfer_error(&self) {}
    }

    fn open_link() -> MockLink {
        let mut link = MockLink::new("MOCK0");
        link.open(Arc::new(Quiet)).unwrap();
        link
    }

    #[test]
    fn test_drop_restores_receive_mode() {
        let mut link = open_link();
        let probe = link.clone();
        {
            let mut guard = TransmitGuard::engage(&mut link).unwrap();
            guard.write(b"x").unwrap();
            assert_eq!(probe.mode(), Some(LinkMode::Transmit));
        }
        assert_eq!(probe.mode(), Some(LinkMode::Receive));
        assert_eq!(probe.writes_in_receive_mode(), 0);
    }

    #[test]
    fn test_early_return_restores_receive_mode() {
        fn fails(link: &mut MockLink) -> Result<(), PortError> {
            let mut guard = TransmitGuard::engage(link)?;
            guard.write(b"x")?;
            Ok(())
        }
        let mut link = open_link();
        link.fail_next_writes(1);
        assert!(fails(&mut link).is_err());
        assert_eq!(link.mode_history(), vec![LinkMode::Transmit, LinkMode::Receive]);
    }

    #[test]
    fn test_explicit_release_switches_once() {
        let mut link = open_link();
        let guard = TransmitGuard::engage(&mut link).unwrap();
        guard.release().unwrap();
        assert_eq!(link.mode_history(), vec![LinkMode::Transmit, LinkMode::Receive]);
    }
}

//! Serial device backend.
//!
//! Wraps the `serialport` crate behind [`ByteIo`]. A small poll thread stands
//! in for the UART RX interrupt: it raises RX-received whenever the OS driver
//! reports unread bytes. When half-duplex direction control is enabled, RTS
//! drives the transceiver's driver-enable pin.

use super::error::PortError;
use super::traits::{ByteIo, LinkEvents};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Parameters for opening a serial device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    /// System path of the device (e.g. "/dev/ttyUSB0" or "COM3").
    pub path: String,
    /// Baud rate (bits per second).
    pub baud_rate: u32,
    /// Drive RTS high while transmitting.
    pub half_duplex_rts: bool,
    /// How often the poll thread checks for inbound bytes.
    pub poll_interval: Duration,
    /// Per-call driver timeout.
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: 115200,
            half_duplex_rts: false,
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(100),
        }
    }
}

struct RxPoller {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Turns successive `bytes_to_read` results into link events.
///
/// A failing device reports one transfer error per failure episode; the next
/// successful probe ends the episode.
#[derive(Debug, Default)]
struct RxWatch {
    faulted: bool,
}

impl RxWatch {
    fn observe<E: std::fmt::Display>(&mut self, probe: Result<u32, E>, events: &dyn LinkEvents) {
        match probe {
            Ok(pending) => {
                if self.faulted {
                    self.faulted = false;
                    tracing::info!("serial device answering again");
                }
                if pending > 0 {
                    events.rx_received();
                }
            }
            Err(e) if !self.faulted => {
                self.faulted = true;
                tracing::warn!(error = %e, "serial device stopped answering");
                events.transfer_error();
            }
            Err(_) => {}
        }
    }
}

/// Serial link implementing [`ByteIo`] over `serialport::SerialPort`.
pub struct SerialLink {
    settings: SerialSettings,
    port: Option<Box<dyn serialport::SerialPort>>,
    events: Option<Arc<dyn LinkEvents>>,
    poller: Option<RxPoller>,
}

impl SerialLink {
    /// Create a closed link; the device is opened by [`ByteIo::open`].
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
            events: None,
            poller: None,
        }
    }

    /// Settings this link was created with.
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, PortError> {
        self.port.as_mut().ok_or(PortError::NotOpen)
    }

    fn spawn_poller(
        &self,
        probe: Box<dyn serialport::SerialPort>,
        events: Arc<dyn LinkEvents>,
    ) -> Result<RxPoller, PortError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let interval = self.settings.poll_interval;
        let handle = std::thread::Builder::new()
            .name(format!("{}-rx-poll", self.settings.path))
            .spawn(move || {
                let mut watch = RxWatch::default();
                while flag.load(Ordering::Acquire) {
                    watch.observe(probe.bytes_to_read(), events.as_ref());
                    std::thread::sleep(interval);
                }
            })?;
        Ok(RxPoller { running, handle })
    }
}

impl ByteIo for SerialLink {
    fn open(&mut self, events: Arc<dyn LinkEvents>) -> Result<(), PortError> {
        if self.port.is_some() {
            return Err(PortError::AlreadyOpen);
        }
        let path = self.settings.path.as_str();
        let mut port = serialport::new(path, self.settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.settings.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(path),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        if self.settings.half_duplex_rts {
            port.write_request_to_send(false)?;
        }
        let probe = port.try_clone()?;
        self.poller = Some(self.spawn_poller(probe, events.clone())?);
        self.events = Some(events);
        self.port = Some(port);
        tracing::debug!(path = %self.settings.path, baud = self.settings.baud_rate, "serial link opened");
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        let port = self.port.take().ok_or(PortError::NotOpen)?;
        if let Some(poller) = self.poller.take() {
            poller.running.store(false, Ordering::Release);
            let _ = poller.handle.join();
        }
        self.events = None;
        drop(port);
        tracing::debug!(path = %self.settings.path, "serial link closed");
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        let events = self.events.clone();
        let port = self.port_mut()?;
        let result = port.write_all(data).and_then(|_| port.flush());
        match (result, events) {
            (Ok(()), Some(events)) => {
                events.tx_complete();
                Ok(())
            }
            (Ok(()), None) => Ok(()),
            (Err(e), Some(events)) => {
                events.transfer_error();
                Err(PortError::Io(e))
            }
            (Err(e), None) => Err(PortError::Io(e)),
        }
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let port = self.port_mut()?;
        let pending = port.bytes_to_read()? as usize;
        if pending == 0 || buffer.is_empty() {
            return Ok(0);
        }
        let want = pending.min(buffer.len());
        match port.read(&mut buffer[..want]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn set_transmit_mode(&mut self) -> Result<(), PortError> {
        let half_duplex = self.settings.half_duplex_rts;
        let port = self.port_mut()?;
        if half_duplex {
            port.write_request_to_send(true)
                .map_err(|e| PortError::Direction(e.to_string()))?;
        }
        Ok(())
    }

    fn set_receive_mode(&mut self) -> Result<(), PortError> {
        let half_duplex = self.settings.half_duplex_rts;
        let port = self.port_mut()?;
        if half_duplex {
            // The last byte must be off the wire before the driver is released.
            port.flush()?;
            port.write_request_to_send(false)
                .map_err(|e| PortError::Direction(e.to_string()))?;
        }
        Ok(())
    }

    fn is_read_data_available(&self) -> Result<bool, PortError> {
        let port = self.port.as_ref().ok_or(PortError::NotOpen)?;
        Ok(port.bytes_to_read()? > 0)
    }

    fn name(&self) -> &str {
        &self.settings.path
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if self.port.is_some() {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("path", &self.settings.path)
            .field("baud_rate", &self.settings.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Quiet;
    impl LinkEvents for Quiet {
        fn rx_received(&self) {}
        fn tx_complete(&self) {}
        fn transfer_error(&self) {}
    }

    #[test]
    fn test_port_not_found_error() {
        let mut link = SerialLink::new(SerialSettings {
            path: "/dev/nonexistent_port_12345".into(),
            ..Default::default()
        });
        let result = link.open(Arc::new(Quiet));
        assert!(result.is_err());
        assert!(matches!(
            link.is_read_data_available(),
            Err(PortError::NotOpen)
        ));
    }

    #[test]
    fn test_closed_link_rejects_io() {
        let mut link = SerialLink::new(SerialSettings::default());
        assert!(matches!(link.write(b"x"), Err(PortError::NotOpen)));
        assert!(matches!(link.close(), Err(PortError::NotOpen)));
    }

    #[derive(Default)]
    struct Counting {
        rx: AtomicUsize,
        errors: AtomicUsize,
    }
    impl LinkEvents for Counting {
        fn rx_received(&self) {
            self.rx.fetch_add(1, Ordering::SeqCst);
        }
        fn tx_complete(&self) {}
        fn transfer_error(&self) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_persistent_device_failure_reports_once() {
        let events = Counting::default();
        let mut watch = RxWatch::default();
        for _ in 0..50 {
            watch.observe(Err::<u32, _>("device gone"), &events);
        }
        assert_eq!(events.errors.load(Ordering::SeqCst), 1);
        assert_eq!(events.rx.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_device_recovery_rearms_error() {
        let events = Counting::default();
        let mut watch = RxWatch::default();
        watch.observe(Err::<u32, _>("device gone"), &events);
        watch.observe(Ok::<u32, &str>(0), &events);
        watch.observe(Ok::<u32, &str>(3), &events);
        watch.observe(Err::<u32, _>("device gone again"), &events);
        watch.observe(Err::<u32, _>("device gone again"), &events);
        assert_eq!(events.errors.load(Ordering::SeqCst), 2);
        assert_eq!(events.rx.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_settings() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 115200);
        assert!(!settings.half_duplex_rts);
    }
}

//! Log output over a write socket.
//!
//! [`SocketWriter`] lets `tracing_subscriber::fmt` emit into the link, so a
//! device console can carry the host's diagnostics:
//!
//! ```no_run
//! # use serial_vcp::{config::EngineConfig, port::MockLink, vcp::Vcp};
//! let vcp = Vcp::init(MockLink::new("MOCK0"), EngineConfig::default(), true, None, "stdio")?;
//! if let Some(writer) = vcp.standard_io_writer() {
//!     tracing_subscriber::fmt().with_writer(writer).with_ansi(false).init();
//! }
//! # Ok::<(), serial_vcp::VcpError>(())
//! ```

use crate::error::VcpError;
use crate::socket::Socket;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// `io::Write` adapter over a write-direction [`Socket`].
#[derive(Clone)]
pub struct SocketWriter {
    socket: Arc<Socket>,
    lock: Option<Arc<Mutex<()>>>,
}

impl SocketWriter {
    pub fn new(socket: Arc<Socket>) -> Self {
        Self { socket, lock: None }
    }

    /// Writer that holds `lock` for each write, so records do not interleave
    /// with other users of the same lock.
    pub fn with_lock(socket: Arc<Socket>, lock: Arc<Mutex<()>>) -> Self {
        Self {
            socket,
            lock: Some(lock),
        }
    }

    pub fn socket(&self) -> &Arc<Socket> {
        &self.socket
    }
}

impl io::Write for SocketWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.as_ref().map(|lock| lock.lock());
        self.socket.write(buf).map_err(into_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SocketWriter {
    type Writer = SocketWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl std::fmt::Debug for SocketWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketWriter")
            .field("owner", &self.socket.owner())
            .field("locked", &self.lock.is_some())
            .finish()
    }
}

fn into_io_error(err: VcpError) -> io::Error {
    let kind = match &err {
        VcpError::Timeout(_) => io::ErrorKind::TimedOut,
        VcpError::SessionClosed | VcpError::NotInitialized => io::ErrorKind::NotConnected,
        VcpError::DirectionMismatch { .. } | VcpError::InvalidArgs(_) => {
            io::ErrorKind::InvalidInput
        }
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osal::{StreamBuffer, Timing};
    use crate::session::{Direction, OwnerId};
    use crate::socket::SocketOptions;
    use std::io::Write;

    #[test]
    fn test_writes_land_in_buffer() {
        let buffer = Arc::new(StreamBuffer::new(64));
        let socket = Arc::new(Socket::new(
            Direction::Write,
            OwnerId::new(1),
            buffer.clone(),
            SocketOptions::default(),
        ));
        let mut writer = SocketWriter::with_lock(socket, Arc::new(Mutex::new(())));
        writeln!(writer, "level={}", "info").unwrap();

        let mut out = [0u8; 64];
        let n = buffer.receive(&mut out, Timing::Immediate);
        assert_eq!(&out[..n], b"level=info\n");
    }

    #[test]
    fn test_read_socket_is_invalid_input() {
        let socket = Arc::new(Socket::new(
            Direction::Read,
            OwnerId::new(1),
            Arc::new(StreamBuffer::new(8)),
            SocketOptions::default(),
        ));
        let err = SocketWriter::new(socket).write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_tracing_through_make_writer() {
        let buffer = Arc::new(StreamBuffer::new(512));
        let socket = Arc::new(Socket::new(
            Direction::Write,
            OwnerId::new(1),
            buffer.clone(),
            SocketOptions::default(),
        ));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(SocketWriter::new(socket))
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(port = "COM3", "link up");
        });

        let mut out = vec![0u8; 512];
        let n = buffer.receive(&mut out, Timing::Immediate);
        let text = String::from_utf8_lossy(&out[..n]);
        assert!(text.contains("link up"), "got {text:?}");
        assert!(text.contains("COM3"));
    }
}

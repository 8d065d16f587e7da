//! Single-direction logical channel over a [`StreamBuffer`].
//!
//! A socket is either read-only or write-only for its whole life. Transfers
//! are split into chunks no larger than the configured chunk size; after each
//! chunk the optional side-effect callback for that direction runs, and write
//! sockets bound to the engine ring the TX doorbell so the worker drains them.

pub mod format;

pub use format::{Arg, ScanArg};

use crate::error::{VcpError, VcpResult};
use crate::osal::{EventBits, EventGroup, StreamBuffer, Timing};
use crate::session::{Direction, OwnerId, SessionHandle};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Side-effect hook run after every chunk a socket transfers.
pub type SocketCallback = Arc<dyn Fn(&Socket, OwnerId) + Send + Sync>;

/// Transfer parameters shared by every socket the engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    /// Largest slice handed to the stream buffer in one send/receive.
    pub chunk_size: usize,
    /// Bound applied by [`Socket::write`].
    pub write_timeout: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            write_timeout: Duration::from_millis(1000),
        }
    }
}

/// Event bit raised after data is queued for the worker.
#[derive(Clone)]
pub struct Doorbell {
    events: Arc<EventGroup>,
    bit: EventBits,
}

impl Doorbell {
    pub fn new(events: Arc<EventGroup>, bit: EventBits) -> Self {
        Self { events, bit }
    }

    pub fn ring(&self) {
        self.events.set(self.bit);
    }
}

impl std::fmt::Debug for Doorbell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doorbell").field("bit", &self.bit).finish()
    }
}

#[derive(Default)]
struct Callbacks {
    on_read: Option<SocketCallback>,
    on_write: Option<SocketCallback>,
}

/// One direction of data flow for one consumer.
pub struct Socket {
    direction: Direction,
    owner: OwnerId,
    options: SocketOptions,
    buffer: Arc<StreamBuffer>,
    doorbell: Option<Doorbell>,
    handle: Option<SessionHandle>,
    callbacks: RwLock<Callbacks>,
    // Lookahead byte given back by scanf.
    pushback: Mutex<Option<u8>>,
    bound: AtomicBool,
}

impl Socket {
    /// Create a free-standing socket over `buffer`.
    pub fn new(
        direction: Direction,
        owner: OwnerId,
        buffer: Arc<StreamBuffer>,
        options: SocketOptions,
    ) -> Self {
        Self::bound(direction, owner, buffer, options, None, None)
    }

    pub(crate) fn bound(
        direction: Direction,
        owner: OwnerId,
        buffer: Arc<StreamBuffer>,
        options: SocketOptions,
        doorbell: Option<Doorbell>,
        handle: Option<SessionHandle>,
    ) -> Self {
        Self {
            direction,
            owner,
            options: SocketOptions {
                chunk_size: options.chunk_size.max(1),
                ..options
            },
            buffer,
            doorbell,
            handle,
            callbacks: RwLock::new(Callbacks::default()),
            pushback: Mutex::new(None),
            bound: AtomicBool::new(true),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn chunk_size(&self) -> usize {
        self.options.chunk_size
    }

    /// Session slot this socket belongs to, if it was opened through a table.
    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle
    }

    /// False once the owning session has been closed.
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    pub(crate) fn unbind(&self) {
        self.bound.store(false, Ordering::Release);
    }

    /// Install (or clear) the hook run after each chunk read.
    pub fn set_on_read(&self, callback: Option<SocketCallback>) {
        self.callbacks.write().on_read = callback;
    }

    /// Install (or clear) the hook run after each chunk written.
    pub fn set_on_write(&self, callback: Option<SocketCallback>) {
        self.callbacks.write().on_write = callback;
    }

    /// Write `item`, waiting at most the configured write timeout per chunk.
    ///
    /// # Errors
    ///
    /// - `VcpError::DirectionMismatch` on a read socket
    /// - `VcpError::InvalidArgs` for an empty item
    /// - `VcpError::Port` if a chunk send moves no bytes
    pub fn write(&self, item: &[u8]) -> VcpResult<usize> {
        self.write_with(item, Timing::Bounded(self.options.write_timeout))
    }

    /// Write `item`, blocking until every byte has been accepted.
    pub fn write_blocking(&self, item: &[u8]) -> VcpResult<usize> {
        self.write_with(item, Timing::Forever)
    }

    fn write_with(&self, item: &[u8], timing: Timing) -> VcpResult<usize> {
        self.check(Direction::Write)?;
        if item.is_empty() {
            return Err(VcpError::InvalidArgs("write of zero bytes"));
        }
        let mut total = 0;
        for chunk in item.chunks(self.options.chunk_size) {
            let mut sent = 0;
            while sent < chunk.len() {
                let n = self.buffer.send(&chunk[sent..], timing);
                if n == 0 {
                    return Err(VcpError::port("stream buffer accepted no bytes"));
                }
                sent += n;
            }
            total += sent;
            if let Some(doorbell) = &self.doorbell {
                doorbell.ring();
            }
            self.after_chunk(Direction::Write);
        }
        Ok(total)
    }

    /// Read up to `item.len()` bytes, waiting at most `timeout` for the first.
    ///
    /// Returns once the buffer runs dry, so fewer bytes than requested is not
    /// an error. A zero timeout is a non-blocking poll.
    ///
    /// # Errors
    ///
    /// - `VcpError::Empty` when a non-blocking poll finds nothing
    /// - `VcpError::Timeout` when a bounded wait transfers nothing
    pub fn read(&self, item: &mut [u8], timeout: Duration) -> VcpResult<usize> {
        self.check(Direction::Read)?;
        if item.is_empty() {
            return Err(VcpError::InvalidArgs("read into an empty buffer"));
        }
        let timing = Timing::from(timeout);
        let mut total = self.take_pushback(item);
        let chunk = self.options.chunk_size;
        while total < item.len() {
            let start = total;
            let end = (start + chunk).min(item.len());
            // Only the first chunk may wait; after that, take what is there.
            let wait = if start == 0 { timing } else { Timing::Immediate };
            let n = self.buffer.receive(&mut item[start..end], wait);
            if n == 0 {
                break;
            }
            total += n;
            self.after_chunk(Direction::Read);
            if n < end - start {
                break;
            }
        }
        match (total, timing) {
            (0, Timing::Immediate) => Err(VcpError::Empty),
            (0, _) => Err(VcpError::Timeout(timeout)),
            (n, _) => Ok(n),
        }
    }

    /// Fill all of `item`, blocking as long as it takes.
    pub fn read_blocking(&self, item: &mut [u8]) -> VcpResult<usize> {
        self.check(Direction::Read)?;
        if item.is_empty() {
            return Err(VcpError::InvalidArgs("read into an empty buffer"));
        }
        let mut total = self.take_pushback(item);
        let chunk = self.options.chunk_size;
        while total < item.len() {
            let end = (total + chunk).min(item.len());
            let n = self.buffer.receive(&mut item[total..end], Timing::Forever);
            if n == 0 {
                return Err(VcpError::port("stream buffer returned no bytes"));
            }
            total += n;
            self.after_chunk(Direction::Read);
        }
        Ok(total)
    }

    /// Whether nothing is waiting to be read (or drained, for a write socket).
    pub fn is_empty(&self) -> bool {
        self.pushback.lock().is_none() && self.buffer.is_empty()
    }

    /// printf-style output; see [`format`] for the supported conversions.
    ///
    /// Every byte goes through the blocking write path.
    pub fn print(&self, fmt: &str, args: &[Arg<'_>]) -> VcpResult<usize> {
        self.print_va_list(fmt, &mut args.iter().copied())
    }

    /// Like [`Socket::print`], consuming arguments from an iterator.
    pub fn print_va_list(
        &self,
        fmt: &str,
        args: &mut dyn Iterator<Item = Arg<'_>>,
    ) -> VcpResult<usize> {
        self.check(Direction::Write)?;
        format::format_to(fmt, args, &mut |byte| {
            self.write_blocking(std::slice::from_ref(&byte)).map(|_| ())
        })
    }

    /// scanf-style input. Returns the number of conversions assigned.
    ///
    /// Blocks until the format is satisfied or the input stops matching.
    pub fn scanf(&self, fmt: &str, args: &mut [ScanArg<'_>]) -> VcpResult<usize> {
        self.check(Direction::Read)?;
        let mut source = SocketSource { socket: self };
        format::scan_from(fmt, args, &mut source)
    }

    fn check(&self, expected: Direction) -> VcpResult<()> {
        if !self.is_bound() {
            return Err(VcpError::SessionClosed);
        }
        if self.direction != expected {
            return Err(VcpError::DirectionMismatch {
                expected,
                actual: self.direction,
            });
        }
        Ok(())
    }

    fn take_pushback(&self, item: &mut [u8]) -> usize {
        match self.pushback.lock().take() {
            Some(byte) => {
                item[0] = byte;
                1
            }
            None => 0,
        }
    }

    fn after_chunk(&self, direction: Direction) {
        let callback = {
            let callbacks = self.callbacks.read();
            match direction {
                Direction::Read => callbacks.on_read.clone(),
                Direction::Write => callbacks.on_write.clone(),
            }
        };
        if let Some(callback) = callback {
            callback(self, self.owner);
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("direction", &self.direction)
            .field("owner", &self.owner)
            .field("chunk_size", &self.options.chunk_size)
            .field("bound", &self.is_bound())
            .finish()
    }
}

struct SocketSource<'a> {
    socket: &'a Socket,
}

impl format::ByteSource for SocketSource<'_> {
    fn next_byte(&mut self) -> VcpResult<u8> {
        let mut byte = [0u8; 1];
        self.socket.read_blocking(&mut byte)?;
        Ok(byte[0])
    }

    fn unread(&mut self, byte: u8) {
        *self.socket.pushback.lock() = Some(byte);
    }
}

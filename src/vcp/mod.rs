//! The VCP engine.
//!
//! [`Vcp`] owns one half-duplex link and multiplexes it into logical
//! sessions. Writers push into a bounded TX stream buffer and raise the
//! TX-pending bit; a single worker thread drains that buffer to the hardware
//! and forwards inbound bytes into the RX stream buffer. A periodic
//! inspection timer re-raises work that a lost callback left behind.
//!
//! ```
//! use serial_vcp::config::EngineConfig;
//! use serial_vcp::port::MockLink;
//! use serial_vcp::vcp::Vcp;
//!
//! let link = MockLink::loopback("MOCK0");
//! let vcp = Vcp::init(link, EngineConfig::default(), false, None, "console").unwrap();
//!
//! vcp.print_str("ping\n").unwrap();
//! let mut line = [0u8; 16];
//! let n = vcp.scan_str(&mut line).unwrap();
//! assert_eq!(&line[..n], b"ping\n");
//!
//! vcp.deinit().unwrap();
//! ```

mod direction;
pub mod events;
mod metrics;
mod worker;

pub use events::Completion;
pub use metrics::LinkMetrics;
pub use worker::WorkerState;

use crate::config::EngineConfig;
use crate::error::{VcpError, VcpResult};
use crate::log_sink::SocketWriter;
use crate::osal::PeriodicTimer;
use crate::port::ByteIo;
use crate::session::{Direction, OwnerId, SessionInfo, SessionTable};
use crate::socket::{Doorbell, Socket};
use events::{EngineEvents, Shared, ALL_EVENTS, INSPECT, SHUTDOWN, TX_PENDING};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use worker::{StateCell, Worker};

/// Owner identity of the engine's own console sockets.
const CONSOLE_OWNER: OwnerId = OwnerId::new(0);

struct Runtime {
    timer: PeriodicTimer,
    worker: JoinHandle<Option<Box<dyn ByteIo>>>,
}

/// Handle to a running VCP engine.
///
/// All methods take `&self`; share the handle across threads with an `Arc`.
pub struct Vcp {
    name: String,
    parent: Option<OwnerId>,
    standard_io: bool,
    config: EngineConfig,
    shared: Arc<Shared>,
    sessions: SessionTable,
    console_tx: Arc<Socket>,
    console_rx: Arc<Socket>,
    print_lock: Arc<Mutex<()>>,
    read_lock: Mutex<()>,
    worker_state: Arc<StateCell>,
    runtime: Mutex<Option<Runtime>>,
    initialized: AtomicBool,
}

impl Vcp {
    /// Bring up the engine over `link`.
    ///
    /// Creates the buffers and event group, opens the link in receive mode,
    /// then starts the inspection timer and the worker thread. If any step
    /// fails, everything already set up is torn down again.
    ///
    /// # Errors
    ///
    /// - `VcpError::InvalidArgs` if `config` fails validation
    /// - `VcpError::Port` if the link cannot be opened or a thread cannot start
    pub fn init<L>(
        link: L,
        config: EngineConfig,
        used_for_standard_io: bool,
        parent: Option<OwnerId>,
        name: impl Into<String>,
    ) -> VcpResult<Self>
    where
        L: ByteIo + 'static,
    {
        let name = name.into();
        if let Err(e) = config.validate() {
            tracing::warn!(vcp = %name, error = %e, "rejecting engine configuration");
            return Err(VcpError::InvalidArgs("invalid engine configuration"));
        }

        let shared = Arc::new(Shared::new(
            config.tx_buffer_size,
            config.rx_buffer_size,
            config.completion_queue_depth,
        ));
        let doorbell = Doorbell::new(shared.events.clone(), TX_PENDING);
        let options = config.socket_options();
        let sessions = SessionTable::new(
            config.session_capacity,
            shared.tx.clone(),
            shared.rx.clone(),
            options,
            Some(doorbell.clone()),
        );
        let console_tx = Arc::new(Socket::bound(
            Direction::Write,
            CONSOLE_OWNER,
            shared.tx.clone(),
            options,
            Some(doorbell),
            None,
        ));
        let console_rx = Arc::new(Socket::new(
            Direction::Read,
            CONSOLE_OWNER,
            shared.rx.clone(),
            options,
        ));

        let mut link: Box<dyn ByteIo> = Box::new(link);
        link.open(Arc::new(EngineEvents::new(shared.clone())))?;
        if let Err(e) = link.set_receive_mode() {
            close_link(link);
            return Err(e.into());
        }
        tracing::debug!(vcp = %name, link = link.name(), "link opened in receive mode");

        let tick = shared.events.clone();
        let timer = match PeriodicTimer::start(
            &format!("{name}-inspect"),
            config.inspect_period(),
            move || {
                tick.set(INSPECT);
            },
        ) {
            Ok(timer) => timer,
            Err(e) => {
                close_link(link);
                return Err(VcpError::port(format!("inspection timer failed to start: {e}")));
            }
        };

        let worker_state = Arc::new(StateCell::default());
        let link_name = link.name().to_string();
        let staged = Arc::new(Mutex::new(Some(Worker::new(
            link,
            shared.clone(),
            worker_state.clone(),
            config.staging_size,
            config.tx_complete_timeout(),
        ))));
        let handoff = staged.clone();
        let spawned = thread::Builder::new()
            .name(format!("{name}-worker"))
            .stack_size(config.worker_stack_size)
            .spawn(move || {
                let worker = handoff.lock().take();
                worker.map(Worker::run)
            });
        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                drop(timer);
                if let Some(worker) = staged.lock().take() {
                    close_link(worker.into_link());
                }
                return Err(VcpError::port(format!("worker thread failed to start: {e}")));
            }
        };

        tracing::info!(
            vcp = %name,
            link = %link_name,
            standard_io = used_for_standard_io,
            "VCP engine initialized"
        );

        Ok(Self {
            name,
            parent,
            standard_io: used_for_standard_io,
            config,
            shared,
            sessions,
            console_tx,
            console_rx,
            print_lock: Arc::new(Mutex::new(())),
            read_lock: Mutex::new(()),
            worker_state,
            runtime: Mutex::new(Some(Runtime { timer, worker })),
            initialized: AtomicBool::new(true),
        })
    }

    /// Tear the engine down in reverse order of [`Vcp::init`].
    ///
    /// Every live session is force-released; sockets handed out earlier
    /// report `VcpError::SessionClosed` from then on.
    ///
    /// # Errors
    ///
    /// - `VcpError::NotInitialized` if the engine was already torn down
    /// - `VcpError::Port` if the worker panicked or the link fails to close
    pub fn deinit(&self) -> VcpResult<()> {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return Err(VcpError::NotInitialized);
        }
        let Some(mut runtime) = self.runtime.lock().take() else {
            return Err(VcpError::NotInitialized);
        };

        self.shared.events.set(SHUTDOWN);
        // A worker blocked forwarding into a full RX buffer needs room to finish.
        self.shared.rx.reset();
        let joined = runtime.worker.join();
        runtime.timer.stop();

        let released = self.sessions.close_all();
        self.console_tx.unbind();
        self.console_rx.unbind();
        self.shared.tx.reset();
        self.shared.rx.reset();
        self.shared.completions.reset();
        self.shared.events.clear(ALL_EVENTS | SHUTDOWN);

        let result = match joined {
            Ok(Some(mut link)) => link.close().map_err(VcpError::from),
            Ok(None) => Ok(()),
            Err(_) => Err(VcpError::port("link worker panicked")),
        };
        tracing::info!(vcp = %self.name, released_sessions = released, "VCP engine deinitialized");
        result
    }

    /// Whether the engine is running.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owner this engine was created for, if any.
    pub fn parent(&self) -> Option<OwnerId> {
        self.parent
    }

    /// Whether this engine serves the process's standard I/O.
    pub fn is_standard_io(&self) -> bool {
        self.standard_io
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current worker activity.
    pub fn worker_state(&self) -> WorkerState {
        self.worker_state.get()
    }

    /// Snapshot of the link counters.
    pub fn metrics(&self) -> LinkMetrics {
        self.shared.metrics.snapshot()
    }

    /// Queue `text` for transmission.
    ///
    /// Waits at most the configured write timeout for room in the TX buffer.
    pub fn print_str(&self, text: &str) -> VcpResult<usize> {
        self.ensure_initialized()?;
        if text.is_empty() {
            return Err(VcpError::InvalidArgs("empty string"));
        }
        let _guard = self.print_lock.lock();
        self.console_tx.write(text.as_bytes())
    }

    /// Queue one character for transmission, UTF-8 encoded.
    pub fn print_char(&self, ch: char) -> VcpResult<usize> {
        self.ensure_initialized()?;
        let mut encoded = [0u8; 4];
        let bytes = ch.encode_utf8(&mut encoded).as_bytes();
        let _guard = self.print_lock.lock();
        self.console_tx.write(bytes)
    }

    /// Read one byte, blocking until it arrives.
    pub fn scan_char(&self) -> VcpResult<char> {
        self.ensure_initialized()?;
        let _guard = self.read_lock.lock();
        let mut byte = [0u8; 1];
        self.console_rx.read_blocking(&mut byte)?;
        Ok(char::from(byte[0]))
    }

    /// Read one byte if one is waiting.
    ///
    /// # Errors
    ///
    /// - `VcpError::Empty` when nothing has arrived
    pub fn scan_char_non_block(&self) -> VcpResult<char> {
        self.ensure_initialized()?;
        let _guard = self.read_lock.lock();
        let mut byte = [0u8; 1];
        self.console_rx.read(&mut byte, Duration::ZERO)?;
        Ok(char::from(byte[0]))
    }

    /// Read a line into `buf` and return its length.
    ///
    /// Blocks for the first byte, then waits at most the scan timeout for
    /// each further byte. Stops after a `'\n'` (which is kept), when `buf` is
    /// full, or when the line goes quiet.
    pub fn scan_str(&self, buf: &mut [u8]) -> VcpResult<usize> {
        self.ensure_initialized()?;
        if buf.is_empty() {
            return Err(VcpError::InvalidArgs("scan into an empty buffer"));
        }
        let _guard = self.read_lock.lock();
        let mut filled = self.console_rx.read_blocking(&mut buf[..1])?;
        let timeout = self.config.scan_timeout();
        while filled < buf.len() && buf[filled - 1] != b'\n' {
            match self.console_rx.read(&mut buf[filled..filled + 1], timeout) {
                Ok(n) => filled += n,
                Err(VcpError::Timeout(_) | VcpError::Empty) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Whether no inbound bytes are waiting.
    pub fn scan_is_empty(&self) -> VcpResult<bool> {
        self.ensure_initialized()?;
        Ok(self.console_rx.is_empty())
    }

    /// Open a session for `owner` in `direction`.
    ///
    /// # Errors
    ///
    /// - `VcpError::NotInitialized` after [`Vcp::deinit`]
    /// - `VcpError::AlreadyOpen` if the key is already live
    /// - `VcpError::SlotExhausted` if every slot is taken
    pub fn session_open(&self, owner: OwnerId, direction: Direction) -> VcpResult<Arc<Socket>> {
        self.ensure_initialized()?;
        self.sessions.open(owner, direction)
    }

    /// Close the session for `owner` in `direction`.
    pub fn session_close(&self, owner: OwnerId, direction: Direction) -> VcpResult<()> {
        self.ensure_initialized()?;
        self.sessions.close(owner, direction)
    }

    /// Live sessions, in slot order.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.sessions()
    }

    /// Writer routing log output through the engine's console, when the
    /// engine serves standard I/O.
    pub fn standard_io_writer(&self) -> Option<SocketWriter> {
        if !self.standard_io || !self.is_initialized() {
            return None;
        }
        Some(SocketWriter::with_lock(
            self.console_tx.clone(),
            self.print_lock.clone(),
        ))
    }

    fn ensure_initialized(&self) -> VcpResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(VcpError::NotInitialized)
        }
    }
}

impl Drop for Vcp {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.deinit() {
                tracing::warn!(vcp = %self.name, error = %e, "deinit on drop failed");
            }
        }
    }
}

impl fmt::Debug for Vcp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vcp")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .field("standard_io", &self.standard_io)
            .field("worker_state", &self.worker_state())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

fn close_link(mut link: Box<dyn ByteIo>) {
    if let Err(e) = link.close() {
        tracing::warn!(link = link.name(), error = %e, "failed to close link during rollback");
    }
}

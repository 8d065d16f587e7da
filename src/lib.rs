//! Serial VCP Library
//!
//! A virtual communication port engine: one half-duplex serial link,
//! multiplexed into flow-controlled logical sessions.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `error`: Engine error taxonomy
//! - `port`: Byte-I/O provider contract with serial and mock backends
//! - `osal`: Stream buffer, event group, message queue and timer primitives
//! - `socket`: Direction-typed socket with printf/scanf formatting
//! - `session`: Fixed-capacity session table
//! - `vcp`: The engine handle and its link worker
//! - `log_sink`: `tracing` writer over a write socket

pub mod config;
pub mod error;
pub mod log_sink;
pub mod osal;
pub mod port;
pub mod session;
pub mod socket;
pub mod vcp;

// Re-export commonly used types for convenience
pub use error::{VcpError, VcpResult};
pub use log_sink::SocketWriter;
pub use port::{ByteIo, LinkEvents, LinkMode, MockLink, PortError, SerialLink, SerialSettings};
pub use session::{Direction, OwnerId, SessionHandle, SessionInfo, SessionTable, SESSION_CAPACITY};
pub use socket::{Arg, ScanArg, Socket, SocketCallback, SocketOptions};
pub use vcp::{LinkMetrics, Vcp, WorkerState};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult, EngineConfig};

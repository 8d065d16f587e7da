//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult, EngineRule};
use crate::port::SerialSettings;
use crate::session::SESSION_CAPACITY;
use crate::socket::SocketOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Physical link configuration
    pub link: LinkConfig,
    /// Engine sizing and timing
    pub engine: EngineConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Physical link section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device path; `None` means no device is configured
    pub path: Option<String>,
    /// Baud rate
    pub baud: u32,
    /// Drive RTS as the transceiver's transmit enable
    pub half_duplex_rts: bool,
    /// Poll interval of the serial RX thread in milliseconds
    pub poll_interval_ms: u64,
    /// Per-call driver timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud: 115200,
            half_duplex_rts: false,
            poll_interval_ms: 5,
            timeout_ms: 100,
        }
    }
}

impl LinkConfig {
    /// Serial backend settings for `path`.
    pub fn serial_settings(&self, path: impl Into<String>) -> SerialSettings {
        SerialSettings {
            path: path.into(),
            baud_rate: self.baud,
            half_duplex_rts: self.half_duplex_rts,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Engine section: buffer sizes, timeouts and worker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the stream buffer toward the hardware
    pub tx_buffer_size: usize,
    /// Capacity of the stream buffer from the hardware
    pub rx_buffer_size: usize,
    /// Size of the worker's staging buffer (one hardware transfer)
    pub staging_size: usize,
    /// Socket chunk size
    pub chunk_size: usize,
    /// How long the worker waits for TX-complete, in milliseconds
    pub tx_complete_timeout_ms: u64,
    /// Inspection timer period in milliseconds
    pub inspect_period_ms: u64,
    /// Socket and print write timeout in milliseconds
    pub write_timeout_ms: u64,
    /// Wait for each byte after the first in `scan_str`, in milliseconds
    pub scan_timeout_ms: u64,
    /// Worker thread stack size in bytes
    pub worker_stack_size: usize,
    /// Depth of the TX completion queue
    pub completion_queue_depth: usize,
    /// Number of session slots
    pub session_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tx_buffer_size: 1024,
            rx_buffer_size: 1024,
            staging_size: 64,
            chunk_size: 32,
            tx_complete_timeout_ms: 2000,
            inspect_period_ms: 1000,
            write_timeout_ms: 1000,
            scan_timeout_ms: 100,
            worker_stack_size: 256 * 1024,
            completion_queue_depth: 4,
            session_capacity: SESSION_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn tx_complete_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_complete_timeout_ms)
    }

    pub fn inspect_period(&self) -> Duration {
        Duration::from_millis(self.inspect_period_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Options applied to every socket the engine creates.
    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            chunk_size: self.chunk_size,
            write_timeout: self.write_timeout(),
        }
    }

    /// Reject sizes and periods the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let nonzero = [
            ("tx_buffer_size", self.tx_buffer_size as u64),
            ("rx_buffer_size", self.rx_buffer_size as u64),
            ("staging_size", self.staging_size as u64),
            ("chunk_size", self.chunk_size as u64),
            ("worker_stack_size", self.worker_stack_size as u64),
            ("completion_queue_depth", self.completion_queue_depth as u64),
            ("session_capacity", self.session_capacity as u64),
            ("tx_complete_timeout_ms", self.tx_complete_timeout_ms),
            ("inspect_period_ms", self.inspect_period_ms),
        ];
        if let Some((key, _)) = nonzero.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::engine(key, EngineRule::NonZero));
        }
        if self.rx_buffer_size < self.staging_size {
            return Err(ConfigError::engine("rx_buffer_size", EngineRule::AtLeastStaging));
        }
        Ok(())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive: "trace", "debug", "info", "warn", "error" or an
    /// `EnvFilter` expression
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Log file path (optional; stderr when unset)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

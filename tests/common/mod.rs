//! Shared test utilities for the engine integration tests.
//!
//! This module provides common test infrastructure including:
//! - Engine configurations with short timers
//! - Polling helpers for asynchronous worker effects
//! - Socket read helpers with deadlines

#![allow(dead_code)]

use serial_vcp::config::EngineConfig;
use serial_vcp::{MockLink, Socket, Vcp, VcpError};
use std::time::{Duration, Instant};

/// Engine configuration with timers short enough for tests.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        inspect_period_ms: 25,
        tx_complete_timeout_ms: 100,
        write_timeout_ms: 200,
        scan_timeout_ms: 50,
        ..EngineConfig::default()
    }
}

/// Start an engine over a fresh mock link and return both.
pub fn start_engine(name: &str) -> (Vcp, MockLink) {
    let link = MockLink::new(name);
    let vcp = Vcp::init(link.clone(), fast_config(), false, None, name).expect("engine init");
    (vcp, link)
}

/// Start an engine over a loopback mock link.
pub fn start_loopback(name: &str) -> (Vcp, MockLink) {
    let link = MockLink::loopback(name);
    let vcp = Vcp::init(link.clone(), fast_config(), false, None, name).expect("engine init");
    (vcp, link)
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Read from `socket` until `len` bytes arrived or `timeout` passes.
pub fn read_within(socket: &Socket, len: usize, timeout: Duration) -> Vec<u8> {
    let deadline = Instant::now() + timeout;
    let mut out = Vec::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len && Instant::now() < deadline {
        let want = (len - out.len()).min(buf.len());
        match socket.read(&mut buf[..want], Duration::from_millis(20)) {
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(VcpError::Timeout(_) | VcpError::Empty) => continue,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    out
}

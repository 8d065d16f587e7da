//! End-to-end engine behaviour over the mock link.

mod common;

use common::{read_within, start_engine, start_loopback, wait_until};
use pretty_assertions::assert_eq;
use serial_vcp::{Arg, Direction, LinkMode, OwnerId, Socket, VcpError, SESSION_CAPACITY};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

#[test]
fn test_print_reaches_hardware_in_order() {
    let (vcp, link) = start_engine("print");
    let tx = vcp.session_open(OwnerId::new(1), Direction::Write).unwrap();

    let n = tx.print("value=%d", &[Arg::from(42i32)]).unwrap();
    assert_eq!(n, 8);

    assert!(wait_until(WAIT, || link.written() == b"value=42"));
    assert_eq!(link.writes_in_receive_mode(), 0);
    assert!(wait_until(WAIT, || link.mode() == Some(LinkMode::Receive)));
}

#[test]
fn test_scan_str_returns_forwarded_line() {
    let (vcp, link) = start_engine("scan");
    let _rx = vcp.session_open(OwnerId::new(1), Direction::Read).unwrap();

    link.inject_rx(b"ok\n");
    let mut line = [0u8; 32];
    let n = vcp.scan_str(&mut line).unwrap();
    assert_eq!(&line[..n], b"ok\n");
    assert!(vcp.scan_is_empty().unwrap());
}

#[test]
fn test_slot_exhaustion_and_reuse() {
    let (vcp, _link) = start_engine("slots");
    for owner in 1..=SESSION_CAPACITY {
        vcp.session_open(OwnerId::new(owner), Direction::Write).unwrap();
    }
    let err = vcp
        .session_open(OwnerId::new(100), Direction::Write)
        .unwrap_err();
    assert!(matches!(err, VcpError::SlotExhausted { .. }));

    vcp.session_close(OwnerId::new(3), Direction::Write).unwrap();
    let socket = vcp.session_open(OwnerId::new(100), Direction::Write).unwrap();
    assert_eq!(socket.handle().map(|h| h.slot), Some(2));

    assert!(vcp.session_close(OwnerId::new(3), Direction::Write).is_err());
}

#[test]
fn test_tx_timeout_recovers_to_receive_mode() {
    let (vcp, link) = start_engine("timeout");
    link.set_withhold_completion(true);
    vcp.print_str("lost").unwrap();

    assert!(wait_until(WAIT, || vcp.metrics().tx_timeouts >= 1));
    assert!(wait_until(WAIT, || vcp.metrics().recoveries >= 1));
    assert_eq!(link.mode(), Some(LinkMode::Receive));

    // The link carries traffic again once completions resume.
    link.set_withhold_completion(false);
    link.clear_write_log();
    vcp.print_str("back").unwrap();
    assert!(wait_until(WAIT, || link.written() == b"back"));
}

#[test]
fn test_inspection_picks_up_silent_rx() {
    let (vcp, link) = start_engine("inspect");
    let rx = vcp.session_open(OwnerId::new(1), Direction::Read).unwrap();

    link.enqueue_rx(b"quiet");
    let got = read_within(&rx, 5, WAIT);
    assert_eq!(got, b"quiet".to_vec());
    assert!(vcp.metrics().inspect_rx_kicks >= 1);
}

#[test]
fn test_loopback_between_sessions() {
    let (vcp, _link) = start_loopback("loop");
    let tx = vcp.session_open(OwnerId::new(1), Direction::Write).unwrap();
    let rx = vcp.session_open(OwnerId::new(2), Direction::Read).unwrap();

    let payload: Vec<u8> = (0..200u8).collect();
    tx.write(&payload).unwrap();
    let echoed = read_within(&rx, payload.len(), WAIT);
    assert_eq!(echoed, payload);

    assert!(wait_until(WAIT, || vcp.metrics().bytes_from_link == 200));
    assert_eq!(vcp.metrics().bytes_to_link, 200);
}

#[test]
fn test_write_callbacks_fire_per_chunk() {
    let (vcp, link) = start_engine("callbacks");
    let tx = vcp.session_open(OwnerId::new(9), Direction::Write).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    tx.set_on_write(Some(Arc::new(move |socket: &Socket, owner: OwnerId| {
        assert_eq!(owner, OwnerId::new(9));
        assert_eq!(socket.direction(), Direction::Write);
        seen.fetch_add(1, Ordering::SeqCst);
    })));

    // 100 bytes at the default chunk size of 32.
    tx.write(&[b'x'; 100]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(wait_until(WAIT, || link.written().len() == 100));
}

#[test]
fn test_concurrent_writers_lose_nothing() {
    let (vcp, link) = start_engine("writers");
    let vcp = Arc::new(vcp);
    let handles: Vec<_> = [b'a', b'b', b'c']
        .into_iter()
        .enumerate()
        .map(|(i, byte)| {
            let vcp = vcp.clone();
            thread::spawn(move || {
                let tx = vcp.session_open(OwnerId::new(i + 1), Direction::Write).unwrap();
                for _ in 0..50 {
                    tx.write_blocking(&[byte; 20]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(wait_until(WAIT, || link.written().len() == 3 * 50 * 20));
    let written = link.written();
    for byte in [b'a', b'b', b'c'] {
        assert_eq!(written.iter().filter(|&&b| b == byte).count(), 1000);
    }
    assert_eq!(link.writes_in_receive_mode(), 0);
}

#[test]
fn test_error_callback_resets_and_engine_continues() {
    let (vcp, link) = start_engine("errors");
    link.raise_error();
    assert!(wait_until(WAIT, || vcp.metrics().recoveries >= 1));

    vcp.print_str("after").unwrap();
    assert!(wait_until(WAIT, || link.written() == b"after"));
}

#[test]
fn test_operations_after_deinit_fail() {
    let (vcp, link) = start_engine("teardown");
    let rx = vcp.session_open(OwnerId::new(1), Direction::Read).unwrap();
    vcp.deinit().unwrap();

    assert!(!link.is_open());
    assert!(matches!(
        vcp.session_open(OwnerId::new(2), Direction::Write),
        Err(VcpError::NotInitialized)
    ));
    assert!(matches!(vcp.scan_char_non_block(), Err(VcpError::NotInitialized)));
    let mut buf = [0u8; 4];
    assert!(matches!(
        rx.read(&mut buf, Duration::ZERO),
        Err(VcpError::SessionClosed)
    ));
}

#[test]
fn test_standard_io_writer_carries_logs() {
    let link = serial_vcp::MockLink::new("stdio");
    let vcp = serial_vcp::Vcp::init(link.clone(), common::fast_config(), true, None, "stdio").unwrap();
    let writer = vcp.standard_io_writer().unwrap();

    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        tracing::warn!("over the wire");
    });

    assert!(wait_until(WAIT, || {
        String::from_utf8_lossy(&link.written()).contains("over the wire")
    }));
}

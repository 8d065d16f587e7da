//! Tests requiring an actual serial device.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0          # or COM3 on Windows
//! export TEST_BAUD=115200                # optional, default: 115200
//! export TEST_LOOPBACK=1                 # if the port has TX wired to RX
//!
//! cargo test --features hardware-tests -- --ignored
//! ```

use super::super::common::{fast_config, read_within, wait_until};
use serial_vcp::{ByteIo, Direction, OwnerId, SerialLink, SerialSettings, Vcp};
use std::env;
use std::time::Duration;

fn settings_from_env() -> Option<SerialSettings> {
    let path = env::var("TEST_PORT").ok()?;
    let baud_rate = env::var("TEST_BAUD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(115200);
    Some(SerialSettings {
        path,
        baud_rate,
        ..SerialSettings::default()
    })
}

fn is_loopback_enabled() -> bool {
    env::var("TEST_LOOPBACK").ok().as_deref() == Some("1")
}

#[test]
#[ignore]
fn test_engine_over_real_port() {
    let Some(settings) = settings_from_env() else {
        println!("Skipping hardware test: TEST_PORT not set");
        return;
    };
    let vcp = Vcp::init(SerialLink::new(settings), fast_config(), false, None, "hw").unwrap();
    vcp.print_str("AT\r\n").unwrap();
    assert!(wait_until(Duration::from_secs(2), || vcp.metrics().tx_cycles >= 1));
    vcp.deinit().unwrap();
}

#[test]
#[ignore]
fn test_loopback_round_trip() {
    let Some(settings) = settings_from_env() else {
        println!("Skipping hardware test: TEST_PORT not set");
        return;
    };
    if !is_loopback_enabled() {
        println!("Skipping loopback test: TEST_LOOPBACK not set");
        return;
    }
    let vcp = Vcp::init(SerialLink::new(settings), fast_config(), false, None, "hw-loop").unwrap();
    let tx = vcp.session_open(OwnerId::new(1), Direction::Write).unwrap();
    let rx = vcp.session_open(OwnerId::new(2), Direction::Read).unwrap();

    tx.write(b"loopback-check").unwrap();
    let got = read_within(&rx, 14, Duration::from_secs(2));
    assert_eq!(got, b"loopback-check".to_vec());
}

#[test]
#[ignore]
fn test_direction_switching_on_real_port() {
    let Some(mut settings) = settings_from_env() else {
        println!("Skipping hardware test: TEST_PORT not set");
        return;
    };
    settings.half_duplex_rts = true;
    let mut link = SerialLink::new(settings);
    struct Quiet;
    impl serial_vcp::LinkEvents for Quiet {
        fn rx_received(&self) {}
        fn tx_complete(&self) {}
        fn transfer_error(&self) {}
    }
    link.open(std::sync::Arc::new(Quiet)).unwrap();
    link.set_transmit_mode().unwrap();
    link.set_receive_mode().unwrap();
    link.close().unwrap();
}

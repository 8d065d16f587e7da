//! Basic smoke tests for the vcp-console binary.
use std::io::Write;
use std::process::{Command, Stdio};

fn console(config: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vcp-console"));
    cmd.arg("--config")
        .arg(config)
        .env_remove("VCP_CONFIG")
        .env_remove("VCP_LINK_PATH")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn config_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("vcp.toml");
    std::fs::write(
        &path,
        "[engine]\ninspect_period_ms = 50\ntx_complete_timeout_ms = 200\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();
    path
}

#[test]
fn loopback_echoes_stdin_lines() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = console(&config_file(&dir))
        .arg("--loopback")
        .spawn()
        .expect("failed to start binary");

    {
        let stdin = child.stdin.as_mut().expect("stdin available");
        stdin.write_all(b"hello\nsecond line\n").unwrap();
    }
    drop(child.stdin.take());

    let output = child.wait_with_output().expect("console exits");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout, "hello\nsecond line\n");
}

#[test]
fn missing_device_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = console(&config_file(&dir))
        .stdin(Stdio::null())
        .output()
        .expect("failed to start binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no serial device"), "stderr: {stderr}");
}

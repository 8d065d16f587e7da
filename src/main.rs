use clap::Parser;
use serial_vcp::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use serial_vcp::{Direction, MockLink, OwnerId, SerialLink, Vcp, VcpError};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "vcp-console",
    version,
    about = "Interactive console over a half-duplex serial link.",
    long_about = "Opens a VCP engine on a serial device, copies stdin lines to the link through a write session and forwards everything the link receives to stdout."
)]
struct Args {
    /// Serial device path (overrides link.path)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides link.baud)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Explicit configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use an in-memory loopback link instead of a device
    #[arg(long)]
    loopback: bool,

    /// Log filter, e.g. "debug" or "serial_vcp=trace"
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("vcp-console: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let config_path = loader.config_path.clone();
    let mut config = loader.into_config();
    apply_args(&mut config, &args);
    init_tracing(&config.logging)?;
    if let Some(path) = config_path {
        tracing::debug!(path = %path.display(), "configuration loaded");
    }

    let vcp = if args.loopback {
        Vcp::init(
            MockLink::loopback("loopback"),
            config.engine.clone(),
            true,
            None,
            "console",
        )?
    } else {
        let path = config
            .link
            .path
            .clone()
            .ok_or("no serial device: pass --port or set link.path")?;
        let link = SerialLink::new(config.link.serial_settings(path));
        Vcp::init(link, config.engine.clone(), true, None, "console")?
    };

    let owner = OwnerId::new(std::process::id() as usize);
    let tx = vcp.session_open(owner, Direction::Write)?;
    let rx = vcp.session_open(owner, Direction::Read)?;

    let running = Arc::new(AtomicBool::new(true));
    let forwarding = running.clone();
    let forwarder = thread::Builder::new()
        .name("vcp-forward".to_string())
        .spawn(move || -> io::Result<()> {
            let mut buf = [0u8; 64];
            let mut stdout = io::stdout();
            while forwarding.load(Ordering::Acquire) {
                match rx.read(&mut buf, Duration::from_millis(100)) {
                    Ok(n) => {
                        stdout.write_all(&buf[..n])?;
                        stdout.flush()?;
                    }
                    Err(VcpError::Timeout(_) | VcpError::Empty) => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "read session ended");
                        break;
                    }
                }
            }
            Ok(())
        })?;

    for line in io::stdin().lock().lines() {
        let mut line = line?;
        line.push('\n');
        tx.write_blocking(line.as_bytes())?;
    }

    // Let the worker drain what is queued before tearing down.
    let deadline = Instant::now() + config.engine.tx_complete_timeout();
    while !tx.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(200));

    running.store(false, Ordering::Release);
    match forwarder.join() {
        Ok(result) => result?,
        Err(_) => tracing::warn!("forwarder thread panicked"),
    }

    vcp.session_close(owner, Direction::Write)?;
    vcp.session_close(owner, Direction::Read)?;
    let metrics = vcp.metrics();
    vcp.deinit()?;
    tracing::info!(metrics = %serde_json::to_string(&metrics)?, "console closed");
    Ok(())
}

fn apply_args(config: &mut Config, args: &Args) {
    if let Some(port) = &args.port {
        config.link.path = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.link.baud = baud;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
}

/// Install the global subscriber. Logs go to stderr (stdout carries link
/// data) unless a log file is configured.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;
    let writer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(logging.file.is_none());
    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    }
    .map_err(|e| -> Box<dyn Error> { e })?;
    Ok(())
}

//! Configuration module for serial-vcp.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `VCP_CONFIG` environment variable (explicit path)
//! 2. `./vcp.toml` (current directory)
//! 3. The platform config directory, e.g. `~/.config/serial-vcp/vcp.toml`
//!    on Linux or `%APPDATA%\serial-vcp\config\vcp.toml` on Windows
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any configuration value can be overridden via environment variables.
//! The pattern is: `VCP_<SECTION>_<KEY>`
//!
//! Examples:
//! - `VCP_LINK_PATH=/dev/ttyUSB0`
//! - `VCP_LINK_BAUD=9600`
//! - `VCP_ENGINE_CHUNK_SIZE=16`
//! - `VCP_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_vcp::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Baud: {}", config.link.baud);
//! println!("Chunk size: {}", config.engine.chunk_size);
//! # Ok::<(), serial_vcp::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult, EngineRule};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, EngineConfig, LinkConfig, LogFormat, LoggingConfig};

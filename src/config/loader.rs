//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "VCP";

/// Config file name
const CONFIG_FILE_NAME: &str = "vcp.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "VCP_CONFIG";

/// Application name used for the platform config directory
const APP_NAME: &str = "serial-vcp";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `VCP_CONFIG` environment variable (explicit path)
    /// 2. `./vcp.toml` (current directory)
    /// 3. `serial-vcp/vcp.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.engine.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.engine.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if let Err(e) = apply_env_overrides(&mut config) {
            tracing::warn!(error = %e, "ignoring invalid environment override");
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or(ConfigError::NoPath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            config.engine.validate()?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "{CONFIG_PATH_ENV} points at a missing file");
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read and parse `VCP_<name>`, if set.
fn env_value<T: FromStr>(name: &str, expected: &'static str) -> ConfigResult<Option<T>> {
    let var = format!("{ENV_PREFIX}_{name}");
    match std::env::var(&var) {
        Ok(val) => match val.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::env(var, val, expected)),
        },
        Err(_) => Ok(None),
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str) -> ConfigResult<Option<bool>> {
    let var = format!("{ENV_PREFIX}_{name}");
    match std::env::var(&var) {
        Ok(val) => match parse_bool(val.trim()) {
            Some(flag) => Ok(Some(flag)),
            None => Err(ConfigError::env(var, val, "a boolean")),
        },
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `VCP_<SECTION>_<KEY>`
/// For example:
/// - `VCP_LINK_BAUD=9600`
/// - `VCP_ENGINE_TX_BUFFER_SIZE=4096`
/// - `VCP_LOGGING_FORMAT=json`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Link overrides
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LINK_PATH")) {
        config.link.path = Some(val);
    }
    if let Some(val) = env_value("LINK_BAUD", "a baud rate")? {
        config.link.baud = val;
    }
    if let Some(val) = env_flag("LINK_HALF_DUPLEX_RTS")? {
        config.link.half_duplex_rts = val;
    }
    if let Some(val) = env_value("LINK_POLL_INTERVAL_MS", "milliseconds")? {
        config.link.poll_interval_ms = val;
    }
    if let Some(val) = env_value("LINK_TIMEOUT_MS", "milliseconds")? {
        config.link.timeout_ms = val;
    }

    // Engine overrides
    let engine = &mut config.engine;
    if let Some(val) = env_value("ENGINE_TX_BUFFER_SIZE", "a byte count")? {
        engine.tx_buffer_size = val;
    }
    if let Some(val) = env_value("ENGINE_RX_BUFFER_SIZE", "a byte count")? {
        engine.rx_buffer_size = val;
    }
    if let Some(val) = env_value("ENGINE_STAGING_SIZE", "a byte count")? {
        engine.staging_size = val;
    }
    if let Some(val) = env_value("ENGINE_CHUNK_SIZE", "a byte count")? {
        engine.chunk_size = val;
    }
    if let Some(val) = env_value("ENGINE_TX_COMPLETE_TIMEOUT_MS", "milliseconds")? {
        engine.tx_complete_timeout_ms = val;
    }
    if let Some(val) = env_value("ENGINE_INSPECT_PERIOD_MS", "milliseconds")? {
        engine.inspect_period_ms = val;
    }
    if let Some(val) = env_value("ENGINE_WRITE_TIMEOUT_MS", "milliseconds")? {
        engine.write_timeout_ms = val;
    }
    if let Some(val) = env_value("ENGINE_SCAN_TIMEOUT_MS", "milliseconds")? {
        engine.scan_timeout_ms = val;
    }
    if let Some(val) = env_value("ENGINE_WORKER_STACK_SIZE", "a byte count")? {
        engine.worker_stack_size = val;
    }

    // Logging overrides
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = val;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_FORMAT")) {
        config.logging.format = match val.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env(
                    format!("{ENV_PREFIX}_LOGGING_FORMAT"),
                    val,
                    "json, pretty or compact",
                ))
            }
        };
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_FILE")) {
        config.logging.file = Some(PathBuf::from(val));
    }

    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().engine.chunk_size, 32);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("VCP_LINK_BAUD", "9600");
        env::set_var("VCP_ENGINE_CHUNK_SIZE", "8");
        env::set_var("VCP_LINK_HALF_DUPLEX_RTS", "yes");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().link.baud, 9600);
        assert_eq!(loader.config().engine.chunk_size, 8);
        assert!(loader.config().link.half_duplex_rts);

        // Clean up
        env::remove_var("VCP_LINK_BAUD");
        env::remove_var("VCP_ENGINE_CHUNK_SIZE");
        env::remove_var("VCP_LINK_HALF_DUPLEX_RTS");
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_reported() {
        env::set_var("VCP_ENGINE_STAGING_SIZE", "lots");
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Env { ref var, ref value, .. }
                if var == "VCP_ENGINE_STAGING_SIZE" && value == "lots"
        ));
        env::remove_var("VCP_ENGINE_STAGING_SIZE");
    }

    #[test]
    #[serial]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut loader = ConfigLoader::with_defaults();
        loader.config_mut().link.path = Some("/dev/ttyACM0".to_string());
        loader.config_mut().engine.staging_size = 128;
        loader.save_to(&path).unwrap();

        let mut reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config().link.path.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(reloaded.config().engine.staging_size, 128);

        std::fs::write(&path, "[engine]\nstaging_size = 16\n").unwrap();
        reloaded.reload().unwrap();
        assert_eq!(reloaded.config().engine.staging_size, 16);
        assert_eq!(reloaded.config().link.path, None);
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[engine]\nchunk_size = 0\n").unwrap();

        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert_eq!(err.engine_key(), Some("chunk_size"));
    }

    #[test]
    #[serial]
    fn test_explicit_path_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[link]\nbaud = 57600\n").unwrap();
        env::set_var(CONFIG_PATH_ENV, &path);

        let loader = ConfigLoader::load().unwrap();
        assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(loader.config().link.baud, 57600);

        env::remove_var(CONFIG_PATH_ENV);
    }
}

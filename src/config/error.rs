//! Failures while locating, reading, overriding or checking `vcp.toml`.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Constraint an engine setting failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRule {
    /// Sizes, depths and periods the worker divides by or allocates from.
    NonZero,
    /// The RX buffer must hold one full staging transfer.
    AtLeastStaging,
}

impl fmt::Display for EngineRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineRule::NonZero => f.write_str("must be greater than zero"),
            EngineRule::AtLeastStaging => f.write_str("must be at least engine.staging_size"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid vcp.toml: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An `[engine]` setting the worker cannot run with.
    #[error("engine.{key} {rule}")]
    Engine { key: &'static str, rule: EngineRule },

    /// A `VCP_*` override that does not parse.
    #[error("{var}={value:?}: expected {expected}")]
    Env {
        var: String,
        value: String,
        expected: &'static str,
    },

    #[error("no configuration file to save to")]
    NoPath,
}

impl ConfigError {
    pub(crate) fn engine(key: &'static str, rule: EngineRule) -> Self {
        Self::Engine { key, rule }
    }

    pub(crate) fn env(
        var: impl Into<String>,
        value: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::Env {
            var: var.into(),
            value: value.into(),
            expected,
        }
    }

    /// The `[engine]` key a validation failure refers to.
    pub fn engine_key(&self) -> Option<&'static str> {
        match self {
            Self::Engine { key, .. } => Some(*key),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

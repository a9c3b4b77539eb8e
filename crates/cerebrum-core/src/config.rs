//! Centralized configuration and path management.
//!
//! Mirrors the environment-variable surface in the system spec (§6):
//! `CL_STORE_DIR`, `CL_LOG_LEVEL`, `CL_LLM_ENDPOINT`,
//! `CL_MAX_CONCURRENT_LLM`, `CL_CACHE_TTL_S`. Every field has a sane
//! default so a bare `Config::from_env()` never fails on a developer
//! machine with nothing set.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "cerebrum";
const APPLICATION: &str = "core";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a platform data directory; set CL_STORE_DIR explicitly")]
    NoDataDir,
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for `vector_store/`, `autoencoder.bin`,
    /// `intent_graph.txt`, `audit.log`.
    pub store_dir: PathBuf,
    pub log_level: LogLevel,
    pub llm_endpoint: Option<String>,
    pub max_concurrent_llm: usize,
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// The `tracing_subscriber::EnvFilter` directive this level corresponds to.
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir().unwrap_or_else(|| PathBuf::from(".cerebrum")),
            log_level: LogLevel::Info,
            llm_endpoint: None,
            max_concurrent_llm: 1,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

fn default_store_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.data_dir().to_path_buf())
}

impl Config {
    /// Build a `Config` from the process environment, falling back to
    /// platform-appropriate defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var("CL_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        } else if config.store_dir == PathBuf::from(".cerebrum") {
            // default_store_dir() failed and env var absent: surface it only
            // if the caller asked for strict resolution via `require_store_dir`.
        }

        if let Ok(level) = std::env::var("CL_LOG_LEVEL") {
            config.log_level = LogLevel::parse(&level).ok_or(ConfigError::InvalidValue {
                var: "CL_LOG_LEVEL",
                value: level,
            })?;
        }

        if let Ok(endpoint) = std::env::var("CL_LLM_ENDPOINT") {
            config.llm_endpoint = Some(endpoint);
        }

        if let Ok(max) = std::env::var("CL_MAX_CONCURRENT_LLM") {
            config.max_concurrent_llm = max.parse().map_err(|_| ConfigError::InvalidValue {
                var: "CL_MAX_CONCURRENT_LLM",
                value: max,
            })?;
        }

        if let Ok(ttl) = std::env::var("CL_CACHE_TTL_S") {
            let secs: u64 = ttl.parse().map_err(|_| ConfigError::InvalidValue {
                var: "CL_CACHE_TTL_S",
                value: ttl,
            })?;
            config.cache_ttl = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Require that a store directory was actually resolvable (env var or
    /// platform dir), for callers that must fail fast (exit code 1) rather
    /// than silently writing under `./.cerebrum`.
    pub fn require_store_dir(&self) -> Result<&PathBuf, ConfigError> {
        if std::env::var("CL_STORE_DIR").is_ok() || default_store_dir().is_some() {
            Ok(&self.store_dir)
        } else {
            Err(ConfigError::NoDataDir)
        }
    }

    pub fn vector_store_dir(&self) -> PathBuf {
        self.store_dir.join("vector_store")
    }

    pub fn autoencoder_path(&self) -> PathBuf {
        self.store_dir.join("autoencoder.bin")
    }

    pub fn intent_graph_path(&self) -> PathBuf {
        self.store_dir.join("intent_graph.txt")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.store_dir.join("audit.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_llm, 1);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn log_level_parses_known_values() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("bogus"), None);
    }
}

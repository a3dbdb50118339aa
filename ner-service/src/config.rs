//! Startup configuration read from environment variables.

use ner_bridge::workers::SidecarConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default request/reply address
pub const DEFAULT_BIND_ADDRESS: &str = "tcp://127.0.0.1:5555";

/// Default gazetteer model location
pub const DEFAULT_GAZETTEER_PATH: &str = "models/gazetteer.json";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown NER backend {0:?} (expected \"sidecar\" or \"gazetteer\")")]
    UnknownBackend(String),

    #[error("unknown log format {0:?} (expected \"pretty\" or \"json\")")]
    UnknownLogFormat(String),
}

/// Which model implementation serves extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// spaCy pipeline in a Python sidecar
    #[default]
    Sidecar,
    /// Dictionary lookup from a JSON model file
    Gazetteer,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sidecar" | "spacy" => Ok(Self::Sidecar),
            "gazetteer" => Ok(Self::Gazetteer),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnknownLogFormat(s.to_string())),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub backend: Backend,
    pub gazetteer_path: PathBuf,
    pub sidecar: SidecarConfig,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            backend: Backend::default(),
            gazetteer_path: PathBuf::from(DEFAULT_GAZETTEER_PATH),
            sidecar: SidecarConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup.
    ///
    /// Unset keys keep their defaults; unparsable timeouts fall back to the
    /// default as well.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(default, Duration::from_millis)
        };

        let sidecar = SidecarConfig {
            python: lookup("NER_PYTHON").unwrap_or(defaults.sidecar.python),
            script_path: lookup("NER_WORKER_SCRIPT").unwrap_or(defaults.sidecar.script_path),
            socket_path: lookup("NER_WORKER_SOCKET").unwrap_or(defaults.sidecar.socket_path),
            model: lookup("NER_SPACY_MODEL").unwrap_or(defaults.sidecar.model),
            startup_timeout: millis(
                "NER_WORKER_STARTUP_TIMEOUT_MS",
                defaults.sidecar.startup_timeout,
            ),
            infer_timeout: millis("NER_INFER_TIMEOUT_MS", defaults.sidecar.infer_timeout),
        };

        Ok(Self {
            bind_address: lookup("NER_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            backend: lookup("NER_BACKEND")
                .map(|v| v.parse::<Backend>())
                .transpose()?
                .unwrap_or(defaults.backend),
            gazetteer_path: lookup("NER_GAZETTEER_PATH")
                .map_or(defaults.gazetteer_path, PathBuf::from),
            sidecar,
            log_format: lookup("NER_LOG_FORMAT")
                .map(|v| v.parse::<LogFormat>())
                .transpose()?
                .unwrap_or(defaults.log_format),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_address, "tcp://127.0.0.1:5555");
        assert_eq!(config.backend, Backend::Sidecar);
        assert_eq!(config.gazetteer_path, PathBuf::from("models/gazetteer.json"));
        assert_eq!(config.sidecar.model, "en_core_web_trf");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("NER_BIND_ADDRESS", "tcp://0.0.0.0:6000"),
            ("NER_BACKEND", "Gazetteer"),
            ("NER_GAZETTEER_PATH", "/etc/ner/orgs.json"),
            ("NER_SPACY_MODEL", "en_core_web_sm"),
            ("NER_INFER_TIMEOUT_MS", "2500"),
            ("NER_LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.bind_address, "tcp://0.0.0.0:6000");
        assert_eq!(config.backend, Backend::Gazetteer);
        assert_eq!(config.gazetteer_path, PathBuf::from("/etc/ner/orgs.json"));
        assert_eq!(config.sidecar.model, "en_core_web_sm");
        assert_eq!(config.sidecar.infer_timeout, Duration::from_millis(2500));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_timeout_falls_back_to_default() {
        let config = config_from(&[("NER_WORKER_STARTUP_TIMEOUT_MS", "soon")]).unwrap();
        assert_eq!(config.sidecar.startup_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_unknown_backend_is_error() {
        let err = config_from(&[("NER_BACKEND", "bert")]).unwrap_err();
        assert_eq!(err, ConfigError::UnknownBackend("bert".to_string()));
    }

    #[test]
    fn test_unknown_log_format_is_error() {
        assert!(matches!(
            config_from(&[("NER_LOG_FORMAT", "xml")]),
            Err(ConfigError::UnknownLogFormat(_))
        ));
    }
}

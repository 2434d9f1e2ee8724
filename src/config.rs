//! Configuration module

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: IpAddr,

    /// Server port
    pub port: u16,

    /// Path to the model package (JSON)
    pub model_path: PathBuf,

    /// Expected SHA-256 of the model package, hex encoded
    pub model_sha256: Option<String>,

    /// Verbose logging
    pub debug: bool,

    /// Log output format
    pub log_format: LogFormat,

    /// Environment (development, production)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            model_path: PathBuf::from("models/anemia_classifier_model.json"),
            model_sha256: None,
            debug: false,
            log_format: LogFormat::Pretty,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            host: lookup("HOST")
                .and_then(|h| h.parse().ok())
                .unwrap_or(defaults.host),

            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),

            model_path: lookup("MODEL_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),

            model_sha256: lookup("MODEL_SHA256")
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty()),

            debug: lookup("DEBUG")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.debug),

            log_format: match lookup("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
                Some(f) if f == "json" => LogFormat::Json,
                _ => defaults.log_format,
            },

            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Socket address to bind the listener to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Default tracing filter, used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "anemia_classifier=debug,anemia_server=debug,tower_http=debug"
        } else {
            "anemia_classifier=info,anemia_server=info,tower_http=info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:5000");
        assert_eq!(config.model_path, PathBuf::from("models/anemia_classifier_model.json"));
        assert!(!config.debug);
        assert!(!config.is_production());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "7860"),
            ("HOST", "127.0.0.1"),
            ("DEBUG", "TRUE"),
            ("LOG_FORMAT", "json"),
            ("ENVIRONMENT", "production"),
            ("MODEL_SHA256", " ABCDEF "),
        ]));

        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:7860");
        assert!(config.debug);
        assert!(config.is_production());
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.model_sha256.as_deref(), Some("abcdef"));
        assert!(config.default_log_filter().contains("debug"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("HOST", "nowhere"),
            ("MODEL_PATH", "  "),
        ]));

        assert_eq!(config.port, 5000);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.model_path, PathBuf::from("models/anemia_classifier_model.json"));
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
pub const DEFAULT_HISTORY_PATH: &str = "caption_history.json";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend_url: String,
    pub history_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any variable source. Unset or blank variables fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let backend_url = var("CAPTION_BACKEND_URL", DEFAULT_BACKEND_URL)
            .trim_end_matches('/')
            .to_string();
        if backend_url.is_empty() {
            return Err(ConfigError::EmptyBackendUrl);
        }

        let bind = var("CAPTION_BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind
            .parse()
            .map_err(|source| ConfigError::BindAddr {
                value: bind.clone(),
                source,
            })?;

        Ok(Self {
            backend_url,
            history_path: PathBuf::from(var("CAPTION_HISTORY_PATH", DEFAULT_HISTORY_PATH)),
            bind_addr,
            static_dir: PathBuf::from(var("CAPTION_STATIC_DIR", DEFAULT_STATIC_DIR)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.history_path, PathBuf::from(DEFAULT_HISTORY_PATH));
        assert_eq!(config.bind_addr.port(), 3000);
    }

    #[test]
    fn backend_url_loses_trailing_slash() {
        let config =
            Config::from_lookup(lookup(&[("CAPTION_BACKEND_URL", "http://gpu-box:5000/")])).unwrap();
        assert_eq!(config.backend_url, "http://gpu-box:5000");
    }

    #[test]
    fn bad_bind_address_is_rejected() {
        let err = Config::from_lookup(lookup(&[("CAPTION_BIND_ADDR", "localhost")])).unwrap_err();
        assert!(matches!(err, ConfigError::BindAddr { .. }));
    }

    #[test]
    fn slash_only_backend_url_is_rejected() {
        let err = Config::from_lookup(lookup(&[("CAPTION_BACKEND_URL", "///")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyBackendUrl));
    }
}

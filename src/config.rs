use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite:./data/smart_home.db";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_AUTH_SERVICE_URL: &str = "http://localhost:8000";
const DEFAULT_STATIC_DIR: &str = "../frontend/dist";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Runtime configuration, read from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub auth_service_url: String,
    pub static_dir: PathBuf,
    pub remote_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values use defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid PORT '{}', using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let storage = match lookup("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("sqlite") => StorageBackend::Sqlite,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                tracing::warn!("Unknown STORAGE_BACKEND '{}', using sqlite", other);
                StorageBackend::Sqlite
            }
        };

        let remote_timeout_secs = match lookup("REMOTE_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(
                    "Invalid REMOTE_TIMEOUT_SECS '{}', using {}",
                    raw,
                    DEFAULT_REMOTE_TIMEOUT_SECS
                );
                DEFAULT_REMOTE_TIMEOUT_SECS
            }),
            None => DEFAULT_REMOTE_TIMEOUT_SECS,
        };

        Config {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            port,
            storage,
            auth_service_url: lookup("AUTH_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_AUTH_SERVICE_URL.to_string()),
            static_dir: lookup("STATIC_DIR")
                .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string())
                .into(),
            remote_timeout: Duration::from_secs(remote_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.storage, StorageBackend::Sqlite);
        assert_eq!(cfg.database_url, "sqlite:./data/smart_home.db");
        assert_eq!(cfg.auth_service_url, "http://localhost:8000");
        assert_eq!(cfg.remote_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_and_bad_values() {
        let cfg = config(&[
            ("PORT", "nine"),
            ("STORAGE_BACKEND", "memory"),
            ("AUTH_SERVICE_URL", "http://auth.local"),
            ("REMOTE_TIMEOUT_SECS", "3"),
        ]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.storage, StorageBackend::Memory);
        assert_eq!(cfg.auth_service_url, "http://auth.local");
        assert_eq!(cfg.remote_timeout, Duration::from_secs(3));
    }
}

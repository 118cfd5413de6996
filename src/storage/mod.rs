use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Ordered snapshot of every device record
pub const DEVICES_KEY: &str = "smartHomeDevices";
/// Copy of a device snapshot that could not be fully read at startup
pub const DEVICES_BACKUP_KEY: &str = "smartHomeDevices.unreadable";
/// Application settings document
pub const SETTINGS_KEY: &str = "smartHomeSettings";
/// Last authenticated user profile
pub const USER_KEY: &str = "user";
/// Bearer credential for the external auth/settings service
pub const TOKEN_KEY: &str = "token";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("could not (de)serialize `{key}`: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Capability ──────────────────────────────────────────────────────────────

/// Durable key/value storage. Values are whole documents; `set` replaces the
/// previous value atomically, so a failed write leaves the old value intact.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and decode a JSON document. A missing key is `Ok(None)`.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })
}

/// Encode a document as JSON and overwrite `key` with it.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw).await
}

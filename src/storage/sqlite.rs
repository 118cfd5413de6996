use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{KeyValueStore, StorageError};
use crate::db::queries;

/// Key/value documents kept in the `kv_store` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }

    /// Open (and migrate) the database behind `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::db::init_pool(database_url).await?;
        Ok(SqliteStore::new(pool))
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(queries::get_entry(&self.pool, key).await?.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        queries::put_entry(&self.pool, key, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        queries::delete_entry(&self.pool, key).await?;
        Ok(())
    }
}

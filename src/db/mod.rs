pub mod models;
pub mod queries;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;

use crate::storage::StorageError;

pub async fn init_pool(database_url: &str) -> Result<SqlitePool, StorageError> {
    // Parse the URL into connect options and enable file creation
    let connect_opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true);

    let filename = connect_opts.clone().get_filename().to_string_lossy().to_string();
    let in_memory = filename == ":memory:" || database_url.contains(":memory:");

    // Ensure the parent directory exists before sqlx tries to open the file
    if !in_memory {
        if let Some(parent) = std::path::Path::new(&filename).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }

    // Every in-memory connection is its own database; keep exactly one alive.
    let pool_opts = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    let pool = pool_opts.connect_with(connect_opts).await?;

    // Run embedded migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database initialized at {}", database_url);
    Ok(pool)
}

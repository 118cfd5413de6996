use sqlx::SqlitePool;

use super::models::KvEntry;

// ─── Key/value queries ───────────────────────────────────────────────────────

pub async fn get_entry(pool: &SqlitePool, key: &str) -> Result<Option<KvEntry>, sqlx::Error> {
    sqlx::query_as::<_, KvEntry>("SELECT * FROM kv_store WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn put_entry(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET
           value = excluded.value,
           updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_entry(pool: &SqlitePool, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM kv_store WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}


use serde::{Deserialize, Serialize};

// ─── Key/value entry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

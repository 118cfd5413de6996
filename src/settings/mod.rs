use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::storage::{self, KeyValueStore, StorageError, SETTINGS_KEY};

// ─── Document ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileSettings {
    pub name: String,
    pub email: String,
    pub language: String,
    pub timezone: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        ProfileSettings {
            name: String::new(),
            email: String::new(),
            language: "en".into(),
            timezone: "UTC".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
    pub two_factor_auth: bool,
    pub auto_lock: bool,
    pub device_approval: bool,
    pub data_collection: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        SecuritySettings {
            two_factor_auth: false,
            auto_lock: true,
            device_approval: false,
            data_collection: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub push_notifications: bool,
    pub email_alerts: bool,
    pub device_alerts: bool,
    pub update_notifications: bool,
    pub sound_alerts: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            push_notifications: true,
            email_alerts: true,
            device_alerts: true,
            update_notifications: true,
            sound_alerts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppearanceSettings {
    pub theme: String,
    pub font_size: String,
    pub color_scheme: String,
    pub animations: bool,
    pub compact_mode: bool,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        AppearanceSettings {
            theme: "light".into(),
            font_size: "medium".into(),
            color_scheme: "blue".into(),
            animations: true,
            compact_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemSettings {
    pub auto_update: bool,
    pub backup_enabled: bool,
    pub data_sync: bool,
    pub storage_optimization: bool,
    pub debug_mode: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        SystemSettings {
            auto_update: true,
            backup_enabled: true,
            data_sync: true,
            storage_optimization: false,
            debug_mode: false,
        }
    }
}

/// User and application preferences, persisted as one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDocument {
    pub profile: ProfileSettings,
    pub security: SecuritySettings,
    pub notifications: NotificationSettings,
    pub appearance: AppearanceSettings,
    pub system: SystemSettings,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown settings section '{0}'")]
    UnknownSection(String),
    #[error("unknown setting '{section}.{key}'")]
    UnknownKey { section: String, key: String },
    #[error("invalid value for '{section}.{key}': {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Holds the working copy of the settings document. Edits stay in memory
/// until [`SettingsStore::save`] writes the whole document.
pub struct SettingsStore {
    document: SettingsDocument,
    dirty: bool,
    storage: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    /// Load the saved document, or the defaults when nothing was saved yet.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let document = storage::load_json(storage.as_ref(), SETTINGS_KEY)
            .await?
            .unwrap_or_default();
        Ok(SettingsStore {
            document,
            dirty: false,
            storage,
        })
    }

    pub fn with_defaults(storage: Arc<dyn KeyValueStore>) -> Self {
        SettingsStore {
            document: SettingsDocument::default(),
            dirty: false,
            storage,
        }
    }

    pub fn document(&self) -> &SettingsDocument {
        &self.document
    }

    /// True when there are edits that have not been saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Edit one field in memory. `section` and `key` use the document's JSON
    /// names (`appearance`, `compactMode`).
    pub fn update_field(&mut self, section: &str, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut doc = serde_json::to_value(&self.document).map_err(|e| SettingsError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let fields = doc
            .get_mut(section)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| SettingsError::UnknownSection(section.to_string()))?;
        let current = fields.get(key).ok_or_else(|| SettingsError::UnknownKey {
            section: section.to_string(),
            key: key.to_string(),
        })?;

        let value = if current.is_boolean() {
            coerce_bool(&value).ok_or_else(|| SettingsError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("expected a boolean, got {value}"),
            })?
        } else {
            value
        };
        fields.insert(key.to_string(), value);

        self.document = serde_json::from_value(doc).map_err(|e| SettingsError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.dirty = true;
        Ok(())
    }

    /// Swap the whole working copy in memory.
    pub fn replace(&mut self, document: SettingsDocument) {
        self.document = document;
        self.dirty = true;
    }

    /// Write the whole document. The working copy is kept even if this fails.
    pub async fn save(&mut self) -> Result<(), SettingsError> {
        storage::save_json(self.storage.as_ref(), SETTINGS_KEY, &self.document).await?;
        self.dirty = false;
        tracing::info!("Settings saved");
        Ok(())
    }
}

/// Checkbox-style inputs: booleans, "true"/"false", "on"/"off", 1/0.
fn coerce_bool(value: &Value) -> Option<Value> {
    let flag = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_i64() {
            Some(1) => true,
            Some(0) => false,
            _ => return None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "1" | "yes" => true,
            "false" | "off" | "0" | "no" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(Value::Bool(flag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn falls_back_to_defaults() {
        let store = SettingsStore::load(Arc::new(MemoryStore::new())).await.unwrap();
        assert_eq!(store.document(), &SettingsDocument::default());
        assert_eq!(store.document().profile.language, "en");
        assert!(store.document().security.auto_lock);
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn partial_document_fills_missing_fields() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .set(SETTINGS_KEY, r#"{"appearance": {"theme": "dark"}}"#)
            .await
            .unwrap();

        let store = SettingsStore::load(backend).await.unwrap();
        assert_eq!(store.document().appearance.theme, "dark");
        assert_eq!(store.document().appearance.font_size, "medium");
        assert!(store.document().notifications.sound_alerts);
    }

    #[tokio::test]
    async fn edits_persist_only_on_save() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut store = SettingsStore::load(backend.clone()).await.unwrap();

        store.update_field("appearance", "compactMode", json!("on")).unwrap();
        store.update_field("profile", "name", json!("Ada")).unwrap();
        assert!(store.is_dirty());
        assert_eq!(backend.get(SETTINGS_KEY).await.unwrap(), None);

        store.save().await.unwrap();
        assert!(!store.is_dirty());

        let reloaded = SettingsStore::load(backend).await.unwrap();
        assert!(reloaded.document().appearance.compact_mode);
        assert_eq!(reloaded.document().profile.name, "Ada");
    }

    #[test]
    fn rejects_unknown_fields_and_wrong_types() {
        let mut store = SettingsStore::with_defaults(Arc::new(MemoryStore::new()));

        assert!(matches!(
            store.update_field("kitchen", "theme", json!("dark")),
            Err(SettingsError::UnknownSection(_))
        ));
        assert!(matches!(
            store.update_field("appearance", "wallpaper", json!("cats")),
            Err(SettingsError::UnknownKey { .. })
        ));
        assert!(matches!(
            store.update_field("system", "debugMode", json!("maybe")),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.update_field("profile", "timezone", json!(42)),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert_eq!(store.document(), &SettingsDocument::default());
        assert!(!store.is_dirty());
    }

    #[test]
    fn coerces_checkbox_values() {
        assert_eq!(coerce_bool(&json!("off")), Some(json!(false)));
        assert_eq!(coerce_bool(&json!(1)), Some(json!(true)));
        assert_eq!(coerce_bool(&json!(true)), Some(json!(true)));
        assert_eq!(coerce_bool(&json!(2)), None);
        assert_eq!(coerce_bool(&json!(null)), None);
    }
}

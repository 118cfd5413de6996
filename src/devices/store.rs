use std::sync::Arc;

use super::Device;
use crate::storage::{self, KeyValueStore, StorageError, DEVICES_BACKUP_KEY, DEVICES_KEY};

/// Ordered device collection mirrored to durable storage as one snapshot.
pub struct DeviceStore {
    devices: Vec<Device>,
    storage: Arc<dyn KeyValueStore>,
}

impl DeviceStore {
    pub fn empty(storage: Arc<dyn KeyValueStore>) -> Self {
        DeviceStore {
            devices: Vec::new(),
            storage,
        }
    }

    /// Load the last snapshot. An absent snapshot is an empty store.
    ///
    /// Records that no longer decode are skipped. The raw snapshot is then
    /// copied to [`DEVICES_BACKUP_KEY`] before anything can overwrite it.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let Some(raw) = storage.get(DEVICES_KEY).await? else {
            return Ok(DeviceStore::empty(storage));
        };

        let (devices, skipped) = match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(records) => decode_records(records),
            Err(e) => {
                tracing::warn!("Device snapshot is not a JSON array: {}", e);
                (Vec::new(), 1)
            }
        };

        if skipped > 0 {
            match storage.set(DEVICES_BACKUP_KEY, &raw).await {
                Ok(()) => tracing::warn!(
                    "{} unreadable device record(s); original snapshot kept under '{}'",
                    skipped,
                    DEVICES_BACKUP_KEY
                ),
                Err(e) => tracing::warn!("Could not back up device snapshot: {}", e),
            }
        }

        tracing::debug!("Loaded {} device(s) from storage", devices.len());
        Ok(DeviceStore { devices, storage })
    }

    pub fn list(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    pub fn insert(&mut self, device: Device) {
        self.devices.push(device);
    }

    /// Swap in `device` for the record with the same id. Returns false if absent.
    pub fn replace(&mut self, device: Device) -> bool {
        match self.get_mut(&device.id) {
            Some(slot) => {
                *slot = device;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Device> {
        let idx = self.devices.iter().position(|d| d.id == id)?;
        Some(self.devices.remove(idx))
    }

    /// Write the full collection to storage, replacing the previous snapshot.
    pub async fn persist(&self) -> Result<(), StorageError> {
        storage::save_json(self.storage.as_ref(), DEVICES_KEY, &self.devices).await
    }
}

fn decode_records(records: Vec<serde_json::Value>) -> (Vec<Device>, usize) {
    let mut devices = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for record in records {
        match serde_json::from_value::<Device>(record) {
            Ok(device) => devices.push(device),
            Err(e) => {
                tracing::warn!("Skipping device record: {}", e);
                skipped += 1;
            }
        }
    }
    (devices, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{NewDevice, Room};
    use crate::storage::MemoryStore;

    fn device(id: &str, name: &str) -> Device {
        NewDevice {
            name: name.into(),
            kind: "sensor".into(),
            room: "kitchen".into(),
            ..NewDevice::default()
        }
        .into_device(id.into(), "2024-06-03T10:00:00Z".into())
        .unwrap()
    }

    #[tokio::test]
    async fn snapshot_survives_reload_in_order() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut store = DeviceStore::load(backend.clone()).await.unwrap();
        assert!(store.list().is_empty());

        store.insert(device("a", "Smoke"));
        store.insert(device("b", "Humidity"));
        store.insert(device("c", "Door"));
        store.remove("b");
        store.persist().await.unwrap();

        let reloaded = DeviceStore::load(backend).await.unwrap();
        let ids: Vec<_> = reloaded.list().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(reloaded.get("a"), store.get("a"));
    }

    #[tokio::test]
    async fn replace_and_remove_unknown_ids_are_noops() {
        let mut store = DeviceStore::empty(Arc::new(MemoryStore::new()));
        store.insert(device("a", "Smoke"));

        assert!(!store.replace(device("zzz", "Ghost")));
        assert!(store.remove("zzz").is_none());
        assert_eq!(store.list().len(), 1);

        let mut renamed = device("a", "Smoke");
        renamed.name = "Smoke Alarm".into();
        assert!(store.replace(renamed));
        assert_eq!(store.get("a").map(|d| d.name.as_str()), Some("Smoke Alarm"));
    }

    #[tokio::test]
    async fn loads_dashboard_records_and_keeps_unreadable_ones() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let snapshot = r#"[
            {
                "id": 1717408800000,
                "name": "Kid TV",
                "type": "camera",
                "room": "Living Room",
                "status": "on",
                "parentalControls": {
                    "enabled": false,
                    "accessLevel": "unrestricted",
                    "blockedDays": [],
                    "timeRestrictions": []
                }
            },
            {
                "id": "1717408900000",
                "name": "Porch Lock",
                "type": "lock",
                "room": "Outdoor",
                "status": "off",
                "addedAt": "2024-06-03T10:01:40.000Z",
                "powerConsumption": 0,
                "parentalControls": {
                    "enabled": false,
                    "accessLevel": "unrestricted",
                    "timeRestrictions": [],
                    "blockedDays": [],
                    "maxUsageHours": 24,
                    "notifications": true,
                    "override": { "enabled": false, "password": "" }
                }
            },
            { "id": "broken", "name": "Toaster", "type": "toaster", "room": "Kitchen" }
        ]"#;
        backend.set(DEVICES_KEY, snapshot).await.unwrap();

        let mut store = DeviceStore::load(backend.clone()).await.unwrap();
        let names: Vec<_> = store.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Kid TV", "Porch Lock"]);
        assert_eq!(store.get("1717408800000").map(|d| d.room), Some(Room::LivingRoom));
        assert_eq!(
            backend.get(DEVICES_BACKUP_KEY).await.unwrap().as_deref(),
            Some(snapshot)
        );

        // The next write keeps every readable record
        store.insert(device("new", "Smoke"));
        store.persist().await.unwrap();
        let saved = backend.get(DEVICES_KEY).await.unwrap().unwrap();
        assert!(saved.contains("Kid TV"));
        assert!(saved.contains("Porch Lock"));
    }

    #[tokio::test]
    async fn unparsable_snapshot_is_backed_up() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        backend.set(DEVICES_KEY, "{not json").await.unwrap();

        let store = DeviceStore::load(backend.clone()).await.unwrap();
        assert!(store.list().is_empty());
        assert_eq!(
            backend.get(DEVICES_BACKUP_KEY).await.unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn clean_snapshot_writes_no_backup() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut store = DeviceStore::empty(backend.clone());
        store.insert(device("a", "Smoke"));
        store.persist().await.unwrap();

        DeviceStore::load(backend.clone()).await.unwrap();
        assert_eq!(backend.get(DEVICES_BACKUP_KEY).await.unwrap(), None);
    }
}

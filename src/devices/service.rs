use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use super::{
    validate_policy, validate_preferences, Device, DevicePreferences, DeviceStore, NewDevice,
    PowerState, ScheduleEntry, ValidationError,
};
use crate::analytics::{self, DeviceStats, PowerReport};
use crate::clock::Clock;
use crate::permissions::{self, AccessDecision, AccessPolicy, DenyReason};
use crate::storage::DEVICES_KEY;
use crate::ws::WsEvent;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result of a toggle attempt on an existing device
#[derive(Debug, Clone, Serialize)]
pub struct ToggleOutcome {
    pub device: Device,
    pub toggled: bool,
    pub overridden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied: Option<DenyReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub total: usize,
    pub on: usize,
    pub off: usize,
    pub restricted: usize,
}

/// Device mutation API: validates, applies parental controls on toggle,
/// and writes the whole snapshot after every change.
pub struct DeviceService {
    store: Mutex<DeviceStore>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<WsEvent>,
}

impl DeviceService {
    pub fn new(store: DeviceStore, clock: Arc<dyn Clock>, event_tx: broadcast::Sender<WsEvent>) -> Self {
        DeviceService {
            store: Mutex::new(store),
            clock,
            event_tx,
        }
    }

    pub async fn list(&self) -> Vec<Device> {
        self.store.lock().await.list().to_vec()
    }

    pub async fn get(&self, id: &str) -> Option<Device> {
        self.store.lock().await.get(id).cloned()
    }

    pub async fn summary(&self) -> DeviceSummary {
        let store = self.store.lock().await;
        let devices = store.list();
        DeviceSummary {
            total: devices.len(),
            on: devices.iter().filter(|d| d.status == PowerState::On).count(),
            off: devices.iter().filter(|d| d.status == PowerState::Off).count(),
            restricted: devices.iter().filter(|d| d.is_restricted()).count(),
        }
    }

    /// Validate and append a new device. It starts switched off with a
    /// disabled parental-control policy.
    pub async fn add(&self, req: NewDevice) -> Result<Device, DeviceError> {
        let device = req.into_device(Uuid::new_v4().to_string(), Utc::now().to_rfc3339())?;

        let mut store = self.store.lock().await;
        store.insert(device.clone());
        self.persist(&store).await;
        drop(store);

        tracing::info!("Added {} '{}' ({})", device.kind, device.name, device.id);
        let _ = self.event_tx.send(WsEvent::DeviceAdded {
            device_id: device.id.clone(),
            name: device.name.clone(),
        });
        Ok(device)
    }

    /// Flip power state if parental controls allow it right now.
    /// `None` when the id is unknown; a denied toggle writes nothing.
    pub async fn toggle(&self, id: &str, override_password: Option<&str>) -> Option<ToggleOutcome> {
        let now = self.clock.now();
        let mut store = self.store.lock().await;
        let device = store.get_mut(id)?;

        let decision =
            permissions::evaluate_with_override(device.parental_controls.as_ref(), now, override_password);

        let (overridden, reason) = match decision {
            AccessDecision::Denied(reason) => {
                let device = device.clone();
                drop(store);
                tracing::info!("Toggle of '{}' denied: {}", device.name, reason);
                let _ = self.event_tx.send(WsEvent::ToggleDenied {
                    device_id: device.id.clone(),
                    reason: reason.to_string(),
                });
                return Some(ToggleOutcome {
                    device,
                    toggled: false,
                    overridden: false,
                    denied: Some(reason),
                });
            }
            AccessDecision::Overridden(reason) => (true, Some(reason)),
            AccessDecision::Permitted => (false, None),
        };

        device.status = device.status.flipped();
        let device = device.clone();
        self.persist(&store).await;
        drop(store);

        if let Some(reason) = reason {
            tracing::warn!("Parental controls overridden for '{}' ({})", device.name, reason);
        }
        tracing::info!("Device '{}' switched {:?}", device.name, device.status);
        let _ = self.event_tx.send(WsEvent::DeviceToggled {
            device_id: device.id.clone(),
            status: device.status,
            overridden,
        });
        Some(ToggleOutcome {
            device,
            toggled: true,
            overridden,
            denied: None,
        })
    }

    /// Replace the whole stored record with the same id. `addedAt` stays as stored.
    pub async fn update(&self, mut device: Device) -> Result<Option<Device>, DeviceError> {
        device.validate()?;
        let mut store = self.store.lock().await;
        let Some(added_at) = store.get(&device.id).map(|d| d.added_at.clone()) else {
            return Ok(None);
        };
        device.added_at = added_at;
        store.replace(device.clone());
        self.persist(&store).await;
        drop(store);
        self.announce_update(&device.id);
        Ok(Some(device))
    }

    pub async fn delete(&self, id: &str) -> Option<Device> {
        let mut store = self.store.lock().await;
        let removed = store.remove(id)?;
        self.persist(&store).await;
        drop(store);

        tracing::info!("Deleted device '{}' ({})", removed.name, removed.id);
        let _ = self.event_tx.send(WsEvent::DeviceDeleted {
            device_id: removed.id.clone(),
        });
        Some(removed)
    }

    pub async fn set_schedule(&self, id: &str, schedule: Vec<ScheduleEntry>) -> Option<Device> {
        self.modify(id, |d| {
            d.schedule = schedule;
            Ok(())
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn set_parental_controls(
        &self,
        id: &str,
        policy: AccessPolicy,
    ) -> Result<Option<Device>, DeviceError> {
        let mut errors = ValidationError::default();
        validate_policy(&policy, &mut errors);
        errors.into_result()?;
        self.modify(id, |d| {
            d.parental_controls = Some(policy);
            Ok(())
        })
        .await
    }

    pub async fn set_preferences(
        &self,
        id: &str,
        prefs: DevicePreferences,
    ) -> Result<Option<Device>, DeviceError> {
        let mut errors = ValidationError::default();
        validate_preferences(&prefs, &mut errors);
        errors.into_result()?;
        self.modify(id, |d| {
            d.settings = prefs;
            Ok(())
        })
        .await
    }

    pub async fn stats(&self, id: &str) -> Option<DeviceStats> {
        let device = self.get(id).await?;
        Some(analytics::device_stats(&device, &mut rand::thread_rng(), Utc::now()))
    }

    pub async fn power_report(&self) -> PowerReport {
        let devices = self.list().await;
        analytics::power_report(&devices, &mut rand::thread_rng())
    }

    async fn modify<F>(&self, id: &str, apply: F) -> Result<Option<Device>, DeviceError>
    where
        F: FnOnce(&mut Device) -> Result<(), DeviceError>,
    {
        let mut store = self.store.lock().await;
        let Some(device) = store.get_mut(id) else {
            return Ok(None);
        };
        apply(device)?;
        let device = device.clone();
        self.persist(&store).await;
        drop(store);
        self.announce_update(&device.id);
        Ok(Some(device))
    }

    fn announce_update(&self, id: &str) {
        tracing::debug!("Device {} updated", id);
        let _ = self.event_tx.send(WsEvent::DeviceUpdated {
            device_id: id.to_string(),
        });
    }

    /// Write the snapshot. On failure the in-memory store stays authoritative
    /// and the next mutation writes the full snapshot again.
    async fn persist(&self, store: &DeviceStore) {
        if let Err(e) = store.persist().await {
            tracing::warn!("Failed to persist devices: {}", e);
            let _ = self.event_tx.send(WsEvent::StorageWarning {
                key: DEVICES_KEY.to_string(),
                message: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::permissions::{AccessLevel, TimeWindow};
    use crate::storage::{self, KeyValueStore, MemoryStore, StorageError};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use std::sync::atomic::{AtomicBool, Ordering};

    // 2024-06-04 is a Tuesday
    fn tuesday(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn hallway() -> NewDevice {
        NewDevice {
            name: "Hallway Light".into(),
            kind: "light".into(),
            room: "living_room".into(),
            ..NewDevice::default()
        }
    }

    struct Harness {
        service: DeviceService,
        backend: Arc<dyn KeyValueStore>,
        clock: Arc<FixedClock>,
        events: broadcast::Receiver<WsEvent>,
    }

    async fn harness_with(backend: Arc<dyn KeyValueStore>) -> Harness {
        let clock = Arc::new(FixedClock::new(tuesday(12, 0)));
        let (tx, events) = broadcast::channel(64);
        let store = DeviceStore::load(backend.clone()).await.unwrap();
        Harness {
            service: DeviceService::new(store, clock.clone(), tx),
            backend,
            clock,
            events,
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(MemoryStore::new())).await
    }

    async fn stored(backend: &Arc<dyn KeyValueStore>) -> Vec<Device> {
        storage::load_json(backend.as_ref(), DEVICES_KEY)
            .await
            .unwrap()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn hallway_light_scenario() {
        let h = harness().await;

        let device = h.service.add(hallway()).await.unwrap();
        assert_eq!(device.status, PowerState::Off);
        assert!(!device.id.is_empty());
        assert!(!device.is_restricted());

        let outcome = h.service.toggle(&device.id, None).await.unwrap();
        assert!(outcome.toggled);
        assert_eq!(outcome.device.status, PowerState::On);

        let mut policy = AccessPolicy::default();
        policy.enabled = true;
        policy.access_level = AccessLevel::Blocked;
        h.service
            .set_parental_controls(&device.id, policy)
            .await
            .unwrap()
            .unwrap();

        let outcome = h.service.toggle(&device.id, None).await.unwrap();
        assert!(!outcome.toggled);
        assert_eq!(outcome.denied, Some(DenyReason::Blocked));
        assert_eq!(outcome.device.status, PowerState::On);
        assert_eq!(stored(&h.backend).await[0].status, PowerState::On);
    }

    #[tokio::test]
    async fn repeated_denials_leave_snapshot_untouched() {
        let h = harness().await;
        let device = h.service.add(hallway()).await.unwrap();

        let mut policy = AccessPolicy::default();
        policy.enabled = true;
        policy.time_restrictions.push(TimeWindow {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
        });
        h.service.set_parental_controls(&device.id, policy).await.unwrap();

        let before = h.backend.get(DEVICES_KEY).await.unwrap();
        h.clock.set(tuesday(22, 15));
        for _ in 0..3 {
            let outcome = h.service.toggle(&device.id, None).await.unwrap();
            assert!(!outcome.toggled);
        }
        assert_eq!(h.backend.get(DEVICES_KEY).await.unwrap(), before);

        h.clock.set(tuesday(23, 45));
        let outcome = h.service.toggle(&device.id, None).await.unwrap();
        assert!(outcome.toggled);
        assert_eq!(outcome.device.status, PowerState::On);
    }

    #[tokio::test]
    async fn override_password_bypasses_policy() {
        let h = harness().await;
        let device = h.service.add(hallway()).await.unwrap();

        let mut policy = AccessPolicy::default();
        policy.enabled = true;
        policy.access_level = AccessLevel::Blocked;
        policy.override_.enabled = true;
        policy.override_.password = "parent".into();
        h.service.set_parental_controls(&device.id, policy).await.unwrap();

        assert!(!h.service.toggle(&device.id, Some("kid")).await.unwrap().toggled);
        let outcome = h.service.toggle(&device.id, Some("parent")).await.unwrap();
        assert!(outcome.toggled);
        assert!(outcome.overridden);
    }

    #[tokio::test]
    async fn add_then_reload_round_trips() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let h = harness_with(backend.clone()).await;
        let added = h.service.add(hallway()).await.unwrap();

        let reloaded = harness_with(backend).await;
        assert_eq!(reloaded.service.get(&added.id).await, Some(added));
    }

    #[tokio::test]
    async fn update_keeps_the_original_added_at() {
        let h = harness().await;
        let added = h.service.add(hallway()).await.unwrap();

        let mut edited = added.clone();
        edited.name = "Hall Light".into();
        edited.added_at = "1999-01-01T00:00:00Z".into();
        let updated = h.service.update(edited).await.unwrap().unwrap();

        assert_eq!(updated.name, "Hall Light");
        assert_eq!(updated.added_at, added.added_at);
        assert_eq!(stored(&h.backend).await[0].added_at, added.added_at);
    }

    #[tokio::test]
    async fn unknown_ids_are_noops() {
        let h = harness().await;
        let device = h.service.add(hallway()).await.unwrap();
        assert!(h.service.delete(&device.id).await.is_some());

        assert!(h.service.toggle(&device.id, None).await.is_none());
        assert!(h.service.delete(&device.id).await.is_none());
        assert!(h.service.set_schedule(&device.id, Vec::new()).await.is_none());
        assert!(h.service.update(device).await.unwrap().is_none());
        assert!(stored(&h.backend).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_add_changes_nothing() {
        let h = harness().await;
        let err = h
            .service
            .add(NewDevice {
                name: "".into(),
                ..hallway()
            })
            .await
            .unwrap_err();
        let DeviceError::Validation(fields) = err;
        assert!(fields.fields.contains_key("name"));
        assert!(h.service.list().await.is_empty());
        assert_eq!(h.backend.get(DEVICES_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn summary_counts_states() {
        let h = harness().await;
        let a = h.service.add(hallway()).await.unwrap();
        h.service.add(hallway()).await.unwrap();
        h.service.toggle(&a.id, None).await.unwrap();

        let mut policy = AccessPolicy::default();
        policy.enabled = true;
        h.service.set_parental_controls(&a.id, policy).await.unwrap();

        assert_eq!(
            h.service.summary().await,
            DeviceSummary {
                total: 2,
                on: 1,
                off: 1,
                restricted: 1,
            }
        );
    }

    #[tokio::test]
    async fn mutations_are_broadcast() {
        let mut h = harness().await;
        let device = h.service.add(hallway()).await.unwrap();
        h.service.toggle(&device.id, None).await.unwrap();
        h.service.delete(&device.id).await.unwrap();

        assert!(matches!(h.events.recv().await.unwrap(), WsEvent::DeviceAdded { .. }));
        assert!(matches!(
            h.events.recv().await.unwrap(),
            WsEvent::DeviceToggled { status: PowerState::On, .. }
        ));
        assert!(matches!(h.events.recv().await.unwrap(), WsEvent::DeviceDeleted { .. }));
    }

    /// Fails writes while `failing` is set.
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "quota exceeded",
                )));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn failed_write_is_retried_by_next_mutation() {
        let flaky = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(true),
        });
        let mut h = harness_with(flaky.clone()).await;

        let first = h.service.add(hallway()).await.unwrap();
        assert_eq!(h.service.list().await.len(), 1);
        assert!(stored(&h.backend).await.is_empty());
        assert!(matches!(h.events.recv().await.unwrap(), WsEvent::StorageWarning { .. }));

        flaky.failing.store(false, Ordering::SeqCst);
        let second = h.service.add(hallway()).await.unwrap();

        let ids: Vec<_> = stored(&h.backend).await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}

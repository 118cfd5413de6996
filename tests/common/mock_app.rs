use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use serde_json::Value;
use tower::ServiceExt;

use smart_home_backend::clock::FixedClock;
use smart_home_backend::remote::RemoteClient;
use smart_home_backend::storage::{KeyValueStore, MemoryStore, DEVICES_KEY};
use smart_home_backend::{build_router, AppState};

pub struct MockApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub storage: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

impl MockApp {
    /// Monday 2024-06-03 at the given wall-clock time.
    pub async fn at(hour: u32, minute: u32) -> Self {
        Self::start(Arc::new(MemoryStore::new()), hour, minute).await
    }

    /// Start against a storage that already holds a device snapshot.
    pub async fn with_devices(snapshot: &str) -> Self {
        let storage = Arc::new(MemoryStore::new());
        storage.set(DEVICES_KEY, snapshot).await.unwrap();
        Self::start(storage, 12, 0).await
    }

    async fn start(storage: Arc<MemoryStore>, hour: u32, minute: u32) -> Self {
        let now = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap();
        let clock = Arc::new(FixedClock::new(now));
        // Nothing listens here; only local pre-checks are exercised.
        let remote = RemoteClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();

        let shared: Arc<dyn KeyValueStore> = storage.clone();
        let state = AppState::load(shared, clock.clone(), remote).await;
        let router = build_router(state.clone(), Path::new("./no-frontend"));

        Self {
            router,
            state,
            storage,
            clock,
        }
    }

    pub async fn new() -> Self {
        Self::at(12, 0).await
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri).method(method);
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn create_test_device(&self, name: &str, kind: &str, room: &str) -> Value {
        let (status, device) = self
            .send(
                Method::POST,
                "/api/devices",
                Some(serde_json::json!({
                    "name": name,
                    "type": kind,
                    "room": room,
                    "powerConsumption": 9.5,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        device
    }
}

pub mod analytics;
pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod devices;
pub mod hhmm;
pub mod permissions;
pub mod remote;
pub mod settings;
pub mod storage;
pub mod ws;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::clock::Clock;
use crate::devices::{DeviceService, DeviceStore};
use crate::remote::{RemoteClient, SessionService};
use crate::settings::SettingsStore;
use crate::storage::KeyValueStore;
use crate::ws::WsEvent;

// ─── App State ───────────────────────────────────────────────────────────────

pub struct AppState {
    pub devices: DeviceService,
    pub settings: Mutex<SettingsStore>,
    pub session: SessionService,
    pub event_tx: broadcast::Sender<WsEvent>,
}

impl AppState {
    /// Load devices and settings from `storage`. Unreadable device records
    /// are skipped and backed up; an unreadable settings document falls back
    /// to defaults.
    pub async fn load(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        remote: RemoteClient,
    ) -> Arc<AppState> {
        let (event_tx, _) = broadcast::channel::<WsEvent>(256);

        let store = match DeviceStore::load(storage.clone()).await {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("Could not read device storage, starting empty: {}", e);
                DeviceStore::empty(storage.clone())
            }
        };
        tracing::info!("{} device(s) loaded", store.list().len());

        let settings = match SettingsStore::load(storage.clone()).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Could not load settings, using defaults: {}", e);
                SettingsStore::with_defaults(storage.clone())
            }
        };

        Arc::new(AppState {
            devices: DeviceService::new(store, clock, event_tx.clone()),
            settings: Mutex::new(settings),
            session: SessionService::new(remote, storage, event_tx.clone()),
            event_tx,
        })
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket
        .route("/ws", get(api::ws_handler::ws_handler))
        // Devices
        .route(
            "/api/devices",
            get(api::devices::list_devices).post(api::devices::add_device),
        )
        .route("/api/devices/summary", get(api::devices::device_summary))
        .route(
            "/api/devices/:id",
            get(api::devices::get_device)
                .put(api::devices::update_device)
                .delete(api::devices::delete_device),
        )
        .route("/api/devices/:id/toggle", post(api::devices::toggle_device))
        .route("/api/devices/:id/schedule", put(api::devices::set_schedule))
        .route(
            "/api/devices/:id/parental-controls",
            put(api::devices::set_parental_controls),
        )
        .route("/api/devices/:id/settings", put(api::devices::set_preferences))
        .route("/api/devices/:id/stats", get(api::devices::device_stats))
        // Analytics (simulated)
        .route("/api/analytics/power", get(api::devices::power_report))
        // Settings
        .route(
            "/api/settings",
            get(api::settings::get_settings).put(api::settings::replace_settings),
        )
        .route("/api/settings/save", post(api::settings::save_settings))
        .route(
            "/api/settings/:section/:key",
            patch(api::settings::update_setting),
        )
        // Session / external auth service
        .route("/api/session", get(api::session::current_session))
        .route("/api/session/login", post(api::session::login))
        .route("/api/session/signup", post(api::session::signup))
        .route("/api/session/logout", post(api::session::logout))
        .route(
            "/api/remote-settings",
            get(api::session::get_remote_settings).put(api::session::put_remote_settings),
        )
        // Serve static frontend (production)
        .nest_service(
            "/",
            tower_http::services::ServeDir::new(static_dir)
                .not_found_service(tower_http::services::ServeFile::new(static_dir.join("index.html"))),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

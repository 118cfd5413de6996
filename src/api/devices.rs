use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    api::JsonBody,
    devices::{Device, DeviceError, DevicePreferences, NewDevice, ScheduleEntry},
    permissions::AccessPolicy,
    AppState,
};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ToggleRequest {
    pub override_password: Option<String>,
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub schedule: Vec<ScheduleEntry>,
}

fn not_found() -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Device not found" })),
    )
        .into_response()
}

fn rejected(e: DeviceError) -> axum::response::Response {
    match e {
        DeviceError::Validation(v) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": v.to_string(), "fields": v.fields })),
        )
            .into_response(),
    }
}

/// GET /api/devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let devices = state.devices.list().await;
    Json(serde_json::json!({ "devices": devices }))
}

/// GET /api/devices/summary
pub async fn device_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.devices.summary().await)
}

/// GET /api/devices/:id
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.devices.get(&id).await {
        Some(device) => Json(device).into_response(),
        None => not_found(),
    }
}

/// POST /api/devices
pub async fn add_device(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<NewDevice>,
) -> impl IntoResponse {
    match state.devices.add(req).await {
        Ok(device) => (StatusCode::CREATED, Json(device)).into_response(),
        Err(e) => rejected(e),
    }
}

/// PUT /api/devices/:id  (whole-record replace)
pub async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(mut device): JsonBody<Device>,
) -> impl IntoResponse {
    // The path names the record; a mismatching body id is ignored.
    device.id = id;
    match state.devices.update(device).await {
        Ok(Some(device)) => Json(device).into_response(),
        Ok(None) => not_found(),
        Err(e) => rejected(e),
    }
}

/// DELETE /api/devices/:id
pub async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.devices.delete(&id).await {
        Some(_) => Json(serde_json::json!({ "ok": true })).into_response(),
        None => not_found(),
    }
}

/// POST /api/devices/:id/toggle
/// Body is optional; `{"overridePassword": "..."}` unlocks a policy override.
pub async fn toggle_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ToggleRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    match state
        .devices
        .toggle(&id, req.override_password.as_deref())
        .await
    {
        Some(outcome) if outcome.toggled => Json(outcome).into_response(),
        Some(outcome) => {
            let reason = outcome
                .denied
                .map(|r| r.to_string())
                .unwrap_or_else(|| "toggle denied".into());
            (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "error": reason,
                    "reason": outcome.denied,
                    "device": outcome.device,
                })),
            )
                .into_response()
        }
        None => not_found(),
    }
}

/// PUT /api/devices/:id/schedule
pub async fn set_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ScheduleRequest>,
) -> impl IntoResponse {
    match state.devices.set_schedule(&id, req.schedule).await {
        Some(device) => Json(device).into_response(),
        None => not_found(),
    }
}

/// PUT /api/devices/:id/parental-controls
pub async fn set_parental_controls(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(policy): JsonBody<AccessPolicy>,
) -> impl IntoResponse {
    match state.devices.set_parental_controls(&id, policy).await {
        Ok(Some(device)) => Json(device).into_response(),
        Ok(None) => not_found(),
        Err(e) => rejected(e),
    }
}

/// PUT /api/devices/:id/settings
pub async fn set_preferences(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(prefs): JsonBody<DevicePreferences>,
) -> impl IntoResponse {
    match state.devices.set_preferences(&id, prefs).await {
        Ok(Some(device)) => Json(device).into_response(),
        Ok(None) => not_found(),
        Err(e) => rejected(e),
    }
}

/// GET /api/devices/:id/stats  (simulated)
pub async fn device_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.devices.stats(&id).await {
        Some(stats) => Json(stats).into_response(),
        None => not_found(),
    }
}

/// GET /api/analytics/power  (simulated)
pub async fn power_report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.devices.power_report().await)
}

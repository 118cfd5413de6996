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
    settings::{SettingsDocument, SettingsError},
    ws::WsEvent,
    AppState,
};

#[derive(Deserialize)]
pub struct UpdateSettingRequest {
    pub value: serde_json::Value,
}

/// GET /api/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let settings = state.settings.lock().await;
    Json(serde_json::json!({
        "settings": settings.document(),
        "dirty": settings.is_dirty(),
    }))
}

/// PUT /api/settings  (replace the working copy; not saved)
pub async fn replace_settings(
    State(state): State<Arc<AppState>>,
    JsonBody(doc): JsonBody<SettingsDocument>,
) -> impl IntoResponse {
    let mut settings = state.settings.lock().await;
    settings.replace(doc);
    Json(serde_json::json!({ "settings": settings.document(), "dirty": true }))
}

/// PATCH /api/settings/:section/:key  (edit one field; not saved)
pub async fn update_setting(
    State(state): State<Arc<AppState>>,
    Path((section, key)): Path<(String, String)>,
    JsonBody(req): JsonBody<UpdateSettingRequest>,
) -> impl IntoResponse {
    let mut settings = state.settings.lock().await;
    match settings.update_field(&section, &key, req.value) {
        Ok(()) => Json(serde_json::json!({
            "ok": true,
            "section": section,
            "key": key,
            "settings": settings.document(),
        }))
        .into_response(),
        Err(e @ (SettingsError::UnknownSection(_) | SettingsError::UnknownKey { .. })) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// POST /api/settings/save
pub async fn save_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut settings = state.settings.lock().await;
    match settings.save().await {
        Ok(()) => {
            let _ = state.event_tx.send(WsEvent::SettingsSaved);
            Json(serde_json::json!({ "ok": true })).into_response()
        }
        Err(e) => {
            tracing::warn!("Failed to save settings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("Error saving settings: {e}") })),
            )
                .into_response()
        }
    }
}

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    api::JsonBody,
    remote::{RemoteError, RemotePreferences, SessionError},
    AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn session_error(e: SessionError) -> Response {
    let status = match &e {
        SessionError::Invalid(_) => StatusCode::BAD_REQUEST,
        SessionError::NotSignedIn => StatusCode::UNAUTHORIZED,
        SessionError::Remote(RemoteError::Rejected { status, .. }) if status.is_client_error() => {
            *status
        }
        SessionError::Remote(_) => StatusCode::BAD_GATEWAY,
        SessionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.user_message() }))).into_response()
}

/// POST /api/session/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> impl IntoResponse {
    match state.session.login(&req.username, &req.password).await {
        Ok(user) => Json(serde_json::json!({ "user": user })).into_response(),
        Err(e) => session_error(e),
    }
}

/// POST /api/session/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> impl IntoResponse {
    match state
        .session
        .signup(&req.username, &req.email, &req.password)
        .await
    {
        Ok(user) => (StatusCode::CREATED, Json(serde_json::json!({ "user": user }))).into_response(),
        Err(e) => session_error(e),
    }
}

/// POST /api/session/logout
pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.session.logout().await {
        Ok(()) => Json(serde_json::json!({ "ok": true })).into_response(),
        Err(e) => session_error(e),
    }
}

/// GET /api/session
pub async fn current_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.session.current_user().await {
        Ok(user) => Json(serde_json::json!({ "user": user })).into_response(),
        Err(e) => session_error(e),
    }
}

/// GET /api/remote-settings
pub async fn get_remote_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.session.fetch_remote_settings().await {
        Ok(prefs) => Json(prefs).into_response(),
        Err(e) => session_error(e),
    }
}

/// PUT /api/remote-settings
pub async fn put_remote_settings(
    State(state): State<Arc<AppState>>,
    JsonBody(prefs): JsonBody<RemotePreferences>,
) -> impl IntoResponse {
    match state.session.push_remote_settings(&prefs).await {
        Ok(()) => Json(serde_json::json!({ "ok": true })).into_response(),
        Err(e) => session_error(e),
    }
}

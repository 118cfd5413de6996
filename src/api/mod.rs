pub mod devices;
pub mod session;
pub mod settings;
pub mod ws_handler;

use axum::{
    extract::{FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

/// `Json` body extractor whose rejections are `{"error": ...}` JSON too.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err((
                rejection.status(),
                Json(serde_json::json!({ "error": rejection.body_text() })),
            )
                .into_response()),
        }
    }
}

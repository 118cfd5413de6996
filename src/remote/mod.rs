use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

pub mod session;

pub use session::{SessionError, SessionService};

const DEFAULT_LOGIN_ERROR: &str = "Login failed. Please check your credentials.";

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Successful login/signup response
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: UserProfile,
}

fn default_token_type() -> String {
    "bearer".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        QuietHours {
            enabled: false,
            start: "22:00".into(),
            end: "07:00".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// Account preferences kept by the external settings service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemotePreferences {
    pub notifications: bool,
    pub email_alerts: bool,
    pub dark_mode: bool,
    pub temperature: TemperatureUnit,
    pub auto_lock: bool,
    pub energy_reports: String,
    pub quiet_hours: QuietHours,
}

impl Default for RemotePreferences {
    fn default() -> Self {
        RemotePreferences {
            notifications: true,
            email_alerts: true,
            dark_mode: false,
            temperature: TemperatureUnit::Celsius,
            auto_lock: true,
            energy_reports: "weekly".into(),
            quiet_hours: QuietHours::default(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("auth service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid server response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            RemoteError::Rejected { message, .. } => message.clone(),
            RemoteError::Transport(_) => "Could not reach the server. Please try again.".into(),
            RemoteError::InvalidResponse(_) => "Invalid server response".into(),
        }
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// HTTP client for the external authentication and settings service
#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: String,
    client: Client,
}

impl RemoteClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(RemoteClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /auth/login
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSession, RemoteError> {
        let resp = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        decode(resp).await
    }

    /// POST /auth/signup
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, RemoteError> {
        let resp = self
            .client
            .post(format!("{}/auth/signup", self.base_url))
            .json(&serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            }))
            .send()
            .await?;
        decode(resp).await
    }

    /// GET /settings
    pub async fn fetch_settings(&self, token: &str) -> Result<RemotePreferences, RemoteError> {
        let resp = self
            .client
            .get(format!("{}/settings", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        decode(resp).await
    }

    /// PUT /settings
    pub async fn push_settings(&self, token: &str, prefs: &RemotePreferences) -> Result<(), RemoteError> {
        let resp = self
            .client
            .put(format!("{}/settings", self.base_url))
            .bearer_auth(token)
            .json(prefs)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }
}

async fn check(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|b| b.detail)
        .map(|detail| match detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| match status {
            StatusCode::UNAUTHORIZED => DEFAULT_LOGIN_ERROR.to_string(),
            _ => format!("Request failed ({status})"),
        });

    tracing::warn!("Auth service returned {}: {}", status, message);
    Err(RemoteError::Rejected { status, message })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    let resp = check(resp).await?;
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

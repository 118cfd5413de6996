use std::sync::Arc;
use tokio::sync::broadcast;

use super::{AuthSession, RemoteClient, RemoteError, RemotePreferences, UserProfile};
use crate::storage::{self, KeyValueStore, StorageError, TOKEN_KEY, USER_KEY};
use crate::ws::WsEvent;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("not signed in")]
    NotSignedIn,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Invalid(message) => message.to_string(),
            SessionError::NotSignedIn => "Please sign in first.".into(),
            SessionError::Remote(e) => e.user_message(),
            SessionError::Storage(_) => "Could not save your session on this device.".into(),
        }
    }
}

/// Signs the user in against the external service and remembers the
/// credential locally. A failed call never touches stored state.
pub struct SessionService {
    client: RemoteClient,
    storage: Arc<dyn KeyValueStore>,
    event_tx: broadcast::Sender<WsEvent>,
}

impl SessionService {
    pub fn new(
        client: RemoteClient,
        storage: Arc<dyn KeyValueStore>,
        event_tx: broadcast::Sender<WsEvent>,
    ) -> Self {
        SessionService {
            client,
            storage,
            event_tx,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, SessionError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(SessionError::Invalid("Please enter both username and password"));
        }
        tracing::info!("Login attempt for {}", username);
        let session = self.client.login(username.trim(), password).await?;
        self.remember(session).await
    }

    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, SessionError> {
        if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(SessionError::Invalid("Please fill in all fields"));
        }
        tracing::info!("Signup attempt for {}", username);
        let session = self
            .client
            .signup(username.trim(), email.trim(), password)
            .await?;
        self.remember(session).await
    }

    /// Forget the stored user and credential.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.storage.remove(TOKEN_KEY).await?;
        self.storage.remove(USER_KEY).await?;
        tracing::info!("Signed out");
        let _ = self.event_tx.send(WsEvent::SessionChanged { username: None });
        Ok(())
    }

    pub async fn current_user(&self) -> Result<Option<UserProfile>, SessionError> {
        Ok(storage::load_json(self.storage.as_ref(), USER_KEY).await?)
    }

    pub async fn fetch_remote_settings(&self) -> Result<RemotePreferences, SessionError> {
        let token = self.token().await?;
        Ok(self.client.fetch_settings(&token).await?)
    }

    pub async fn push_remote_settings(&self, prefs: &RemotePreferences) -> Result<(), SessionError> {
        let token = self.token().await?;
        self.client.push_settings(&token, prefs).await?;
        tracing::info!("Remote settings updated");
        Ok(())
    }

    async fn token(&self) -> Result<String, SessionError> {
        self.storage
            .get(TOKEN_KEY)
            .await?
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::NotSignedIn)
    }

    /// Stores the user, then the token. A token is never left without its user.
    async fn remember(&self, session: AuthSession) -> Result<UserProfile, SessionError> {
        storage::save_json(self.storage.as_ref(), USER_KEY, &session.user).await?;
        if let Err(e) = self.storage.set(TOKEN_KEY, &session.access_token).await {
            if let Err(cleanup) = self.storage.remove(USER_KEY).await {
                tracing::warn!("Could not roll back stored user: {}", cleanup);
            }
            return Err(e.into());
        }
        tracing::info!("Signed in as {}", session.user.username);
        let _ = self.event_tx.send(WsEvent::SessionChanged {
            username: Some(session.user.username.clone()),
        });
        Ok(session.user)
    }
}

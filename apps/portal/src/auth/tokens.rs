//! Process-wide holder of the credential pair and the logged-in identity.
//!
//! Only the request gateway (refresh), the login service and explicit logout
//! mutate the session. Everything else reads.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::storage::{KeyValueStore, StorageError};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_META_KEY: &str = "user_meta";

const SESSION_EVENT_CAPACITY: usize = 16;

/// The logged-in user, persisted as `user_meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub username: String,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}

/// Credential pair plus identity. `access_token.is_some()` is the one and only
/// "authenticated" signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserIdentity>,
}

/// Session lifecycle notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { username: String },
    LoggedOut,
    /// The refresh token was rejected; the UI should send the user to login.
    Expired,
}

#[derive(Clone)]
pub struct TokenStore {
    session: Arc<RwLock<Session>>,
    kv: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl TokenStore {
    /// An empty (logged-out) store backed by `kv`.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            session: Arc::new(RwLock::new(Session::default())),
            kv,
            events,
        }
    }

    /// Load whatever session was persisted by a previous run.
    pub async fn restore(kv: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let access_token = kv.get(ACCESS_TOKEN_KEY).await?;
        let refresh_token = kv.get(REFRESH_TOKEN_KEY).await?;
        let user = match kv.get(USER_META_KEY).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    tracing::warn!(?err, "ignoring unreadable user_meta");
                    None
                }
            },
            None => None,
        };

        let store = Self::new(kv);
        *store.session.write() = Session {
            access_token,
            refresh_token,
            user,
        };
        tracing::info!(
            authenticated = store.is_authenticated(),
            "restored session from storage"
        );
        Ok(store)
    }

    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.session.read().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.session.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().access_token.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Install a freshly issued session (login, registration, OAuth exchange).
    pub(crate) async fn establish(
        &self,
        access: String,
        refresh: Option<String>,
        user: UserIdentity,
    ) -> Result<(), StorageError> {
        *self.session.write() = Session {
            access_token: Some(access.clone()),
            refresh_token: refresh.clone(),
            user: Some(user.clone()),
        };

        self.kv.set(ACCESS_TOKEN_KEY, &access).await?;
        match &refresh {
            Some(refresh) => self.kv.set(REFRESH_TOKEN_KEY, refresh).await?,
            None => self.kv.del(REFRESH_TOKEN_KEY).await?,
        }
        self.kv
            .set(USER_META_KEY, &serde_json::to_string(&user)?)
            .await?;

        let _ = self.events.send(SessionEvent::LoggedIn {
            username: user.username,
        });
        Ok(())
    }

    /// Record the outcome of a successful token refresh. A rotated refresh
    /// token replaces the stored one; otherwise the old one is kept.
    pub(crate) async fn apply_refresh(
        &self,
        access: String,
        rotated_refresh: Option<String>,
    ) -> Result<(), StorageError> {
        {
            let mut session = self.session.write();
            session.access_token = Some(access.clone());
            if let Some(refresh) = &rotated_refresh {
                session.refresh_token = Some(refresh.clone());
            }
        }
        self.kv.set(ACCESS_TOKEN_KEY, &access).await?;
        if let Some(refresh) = rotated_refresh {
            self.kv.set(REFRESH_TOKEN_KEY, &refresh).await?;
        }
        Ok(())
    }

    /// Explicit logout.
    pub async fn logout(&self) -> Result<(), StorageError> {
        self.clear().await?;
        let _ = self.events.send(SessionEvent::LoggedOut);
        tracing::info!("logged out");
        Ok(())
    }

    /// Irrecoverable refresh failure: drop the session and tell the UI.
    pub(crate) async fn expire(&self) {
        if let Err(err) = self.clear().await {
            tracing::warn!(?err, "failed to clear persisted session");
        }
        let _ = self.events.send(SessionEvent::Expired);
    }

    /// Forget the in-memory session without touching storage or emitting events.
    pub fn reset(&self) {
        *self.session.write() = Session::default();
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.reset();
        self.kv.del(ACCESS_TOKEN_KEY).await?;
        self.kv.del(REFRESH_TOKEN_KEY).await?;
        self.kv.del(USER_META_KEY).await?;
        Ok(())
    }
}

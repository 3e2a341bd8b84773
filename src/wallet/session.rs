//! Session records and their plain-storage persistence.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::methods::records::SESSION_KEY;
use crate::vault::{PlainStorage, VaultError};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub auth_method: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, auth_method: impl Into<String>, token: impl Into<String>, ttl: std::time::Duration) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(24));
        Self {
            user_id: user_id.into(),
            auth_method: auth_method.into(),
            token: token.into(),
            expires_at: Utc::now() + ttl,
            address: None,
            username: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Public view for the host page. The token stays in the frame.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "userId": self.user_id,
            "authMethod": self.auth_method,
            "expiresAt": self.expires_at.to_rfc3339(),
            "address": self.address,
            "username": self.username,
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("auth_method", &self.auth_method)
            .field("expires_at", &self.expires_at)
            .field("address", &self.address)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Plaintext session persistence with expiry on read.
#[derive(Clone)]
pub struct SessionStore {
    plain: Arc<dyn PlainStorage>,
}

impl SessionStore {
    pub fn new(plain: Arc<dyn PlainStorage>) -> Self {
        Self { plain }
    }

    pub fn save(&self, session: &Session) -> Result<(), VaultError> {
        let raw = serde_json::to_string(session).map_err(|e| VaultError::Storage(format!("session json: {e}")))?;
        self.plain.set(SESSION_KEY, &raw)
    }

    /// Unexpired persisted session. Expired or unreadable entries are removed.
    pub fn load(&self) -> Result<Option<Session>, VaultError> {
        let Some(raw) = self.plain.get(SESSION_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if !session.is_expired() => Ok(Some(session)),
            Ok(_) => {
                tracing::info!("persisted session expired");
                self.clear()?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("discarding unreadable session: {e}");
                self.clear()?;
                Ok(None)
            }
        }
    }

    pub fn clear(&self) -> Result<(), VaultError> {
        self.plain.remove(SESSION_KEY)
    }
}
